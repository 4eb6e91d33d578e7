//! Artifact variants carried by result activities.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A fully decoded artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Artifact {
    /// A code change expressed as a unified diff against `base_commit_id`.
    ChangeSet {
        unidiff_patch: String,
        base_commit_id: String,
    },
    /// Captured output of a command run inside the remote session.
    CommandOutput { output: String, exit_code: i32 },
    /// Reference to an out-of-line media blob.
    Media { uri: String, mime_type: String },
}

/// Runtime kind of an [`Artifact`], used by codecs to claim variants for encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    ChangeSet,
    CommandOutput,
    Media,
}

impl Artifact {
    pub fn kind(&self) -> ArtifactKind {
        match self {
            Self::ChangeSet { .. } => ArtifactKind::ChangeSet,
            Self::CommandOutput { .. } => ArtifactKind::CommandOutput,
            Self::Media { .. } => ArtifactKind::Media,
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::ChangeSet => "change_set",
            Self::CommandOutput => "command_output",
            Self::Media => "media",
        };
        f.write_str(label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_matches_variant() {
        let artifact = Artifact::CommandOutput {
            output: "ok".into(),
            exit_code: 0,
        };
        assert_eq!(artifact.kind(), ArtifactKind::CommandOutput);
        assert_eq!(ArtifactKind::ChangeSet.to_string(), "change_set");
    }
}
