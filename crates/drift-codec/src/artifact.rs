//! Artifact codecs and the first-match registry that selects between them.

use std::sync::Arc;

use drift_protocol::{Artifact, ArtifactEnvelope, ArtifactKind, ProtocolError, ProtocolResult};
use serde_json::{Value, json};

use crate::payload::Fields;

pub const CHANGE_SET_KEY: &str = "changeSet";
pub const COMMAND_OUTPUT_KEY: &str = "commandOutput";
pub const MEDIA_KEY: &str = "media";

/// Decodes and encodes one family of artifact envelopes.
///
/// Codecs are chosen by capability: `can_decode` inspects the envelope's shape,
/// `can_encode` the artifact's runtime kind.
pub trait ArtifactCodec: Send + Sync {
    fn name(&self) -> &'static str;
    fn can_decode(&self, envelope: &ArtifactEnvelope) -> bool;
    fn can_encode(&self, kind: ArtifactKind) -> bool;
    fn decode(&self, envelope: &ArtifactEnvelope) -> ProtocolResult<Artifact>;
    fn encode(&self, artifact: &Artifact) -> ProtocolResult<ArtifactEnvelope>;
}

static ABSENT: Value = Value::Null;

fn section<'a>(envelope: &'a ArtifactEnvelope, key: &str) -> &'a Value {
    envelope.get(key).unwrap_or(&ABSENT)
}

fn wrong_kind(codec: &str, artifact: &Artifact) -> ProtocolError {
    ProtocolError::NoCodecFound(format!(
        "{codec} codec cannot encode {} artifacts",
        artifact.kind()
    ))
}

/// `{"changeSet": {"unidiffPatch": "...", "baseCommitId": "..."}}`
#[derive(Debug, Default, Clone, Copy)]
pub struct ChangeSetCodec;

impl ArtifactCodec for ChangeSetCodec {
    fn name(&self) -> &'static str {
        "change_set"
    }

    fn can_decode(&self, envelope: &ArtifactEnvelope) -> bool {
        envelope.contains(CHANGE_SET_KEY)
    }

    fn can_encode(&self, kind: ArtifactKind) -> bool {
        kind == ArtifactKind::ChangeSet
    }

    fn decode(&self, envelope: &ArtifactEnvelope) -> ProtocolResult<Artifact> {
        let fields = Fields::of(CHANGE_SET_KEY, section(envelope, CHANGE_SET_KEY))?;
        Ok(Artifact::ChangeSet {
            unidiff_patch: fields.str_or_default("unidiffPatch")?,
            base_commit_id: fields.str_or_default("baseCommitId")?,
        })
    }

    fn encode(&self, artifact: &Artifact) -> ProtocolResult<ArtifactEnvelope> {
        match artifact {
            Artifact::ChangeSet {
                unidiff_patch,
                base_commit_id,
            } => Ok(ArtifactEnvelope::new().with_field(
                CHANGE_SET_KEY,
                json!({ "unidiffPatch": unidiff_patch, "baseCommitId": base_commit_id }),
            )),
            other => Err(wrong_kind(self.name(), other)),
        }
    }
}

/// `{"commandOutput": {"output": "...", "exitCode": 0}}`
#[derive(Debug, Default, Clone, Copy)]
pub struct CommandOutputCodec;

impl ArtifactCodec for CommandOutputCodec {
    fn name(&self) -> &'static str {
        "command_output"
    }

    fn can_decode(&self, envelope: &ArtifactEnvelope) -> bool {
        envelope.contains(COMMAND_OUTPUT_KEY)
    }

    fn can_encode(&self, kind: ArtifactKind) -> bool {
        kind == ArtifactKind::CommandOutput
    }

    fn decode(&self, envelope: &ArtifactEnvelope) -> ProtocolResult<Artifact> {
        let fields = Fields::of(COMMAND_OUTPUT_KEY, section(envelope, COMMAND_OUTPUT_KEY))?;
        Ok(Artifact::CommandOutput {
            output: fields.str_or_default("output")?,
            exit_code: fields.i32_or_default("exitCode")?,
        })
    }

    fn encode(&self, artifact: &Artifact) -> ProtocolResult<ArtifactEnvelope> {
        match artifact {
            Artifact::CommandOutput { output, exit_code } => Ok(ArtifactEnvelope::new()
                .with_field(
                    COMMAND_OUTPUT_KEY,
                    json!({ "output": output, "exitCode": exit_code }),
                )),
            other => Err(wrong_kind(self.name(), other)),
        }
    }
}

/// `{"media": {"uri": "...", "mimeType": "..."}}`. The uri is required.
#[derive(Debug, Default, Clone, Copy)]
pub struct MediaCodec;

impl ArtifactCodec for MediaCodec {
    fn name(&self) -> &'static str {
        "media"
    }

    fn can_decode(&self, envelope: &ArtifactEnvelope) -> bool {
        envelope.contains(MEDIA_KEY)
    }

    fn can_encode(&self, kind: ArtifactKind) -> bool {
        kind == ArtifactKind::Media
    }

    fn decode(&self, envelope: &ArtifactEnvelope) -> ProtocolResult<Artifact> {
        let fields = Fields::of(MEDIA_KEY, section(envelope, MEDIA_KEY))?;
        Ok(Artifact::Media {
            uri: fields.required_str("uri")?,
            mime_type: fields.str_or_default("mimeType")?,
        })
    }

    fn encode(&self, artifact: &Artifact) -> ProtocolResult<ArtifactEnvelope> {
        match artifact {
            Artifact::Media { uri, mime_type } => Ok(ArtifactEnvelope::new()
                .with_field(MEDIA_KEY, json!({ "uri": uri, "mimeType": mime_type }))),
            other => Err(wrong_kind(self.name(), other)),
        }
    }
}

/// Ordered list of artifact codecs. Selection is first-match, so registration
/// order is priority.
#[derive(Clone)]
pub struct ArtifactCodecRegistry {
    codecs: Vec<Arc<dyn ArtifactCodec>>,
}

impl ArtifactCodecRegistry {
    /// A registry with no codecs; every decode and encode fails.
    pub fn empty() -> Self {
        Self { codecs: Vec::new() }
    }

    /// Built-in codecs, in priority order: change set, command output, media.
    pub fn with_default_codecs() -> Self {
        let mut registry = Self::empty();
        registry
            .register(ChangeSetCodec)
            .register(CommandOutputCodec)
            .register(MediaCodec);
        registry
    }

    /// Append a codec. It is consulted after every codec registered before it.
    pub fn register(&mut self, codec: impl ArtifactCodec + 'static) -> &mut Self {
        self.codecs.push(Arc::new(codec));
        self
    }

    pub fn codec_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.codecs.iter().map(|codec| codec.name())
    }

    pub fn decode(&self, envelope: &ArtifactEnvelope) -> ProtocolResult<Artifact> {
        let codec = self
            .codecs
            .iter()
            .find(|codec| codec.can_decode(envelope))
            .ok_or_else(|| {
                let keys: Vec<&str> = envelope.keys().collect();
                ProtocolError::NoCodecFound(format!(
                    "no artifact codec accepts an envelope with keys {keys:?}"
                ))
            })?;
        codec.decode(envelope)
    }

    pub fn encode(&self, artifact: &Artifact) -> ProtocolResult<ArtifactEnvelope> {
        let kind = artifact.kind();
        let codec = self
            .codecs
            .iter()
            .find(|codec| codec.can_encode(kind))
            .ok_or_else(|| {
                ProtocolError::NoCodecFound(format!("no artifact codec encodes {kind} artifacts"))
            })?;
        codec.encode(artifact)
    }
}

impl Default for ArtifactCodecRegistry {
    fn default() -> Self {
        Self::with_default_codecs()
    }
}

impl std::fmt::Debug for ArtifactCodecRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArtifactCodecRegistry")
            .field("codecs", &self.codec_names().collect::<Vec<_>>())
            .finish()
    }
}
