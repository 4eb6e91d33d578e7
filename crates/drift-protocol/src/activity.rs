//! Activity variants recorded in a session's log.
//!
//! `ActivityKind` is a closed set for everything this crate understands plus one
//! forward-compatible fallback: envelopes whose `typeTag` no codec claims become
//! `Unrecognized { type_tag, payload }` and are re-emitted unchanged.

use crate::artifact::Artifact;
use crate::envelope::{Originator, Payload};
use crate::ids::{ActivityId, PlanId};
use crate::timestamp::Timestamp;
use serde::{Deserialize, Serialize};

/// Stable `typeTag` values for the activity kinds this crate knows.
pub mod tags {
    pub const SESSION_ASSIGNED: &str = "sessionAssigned";
    pub const PLAN_PROPOSED: &str = "planProposed";
    pub const PLAN_APPROVED: &str = "planApproved";
    pub const MESSAGE: &str = "message";
    pub const PROGRESS: &str = "progress";
    pub const FAILURE: &str = "failure";
    pub const RESULT: &str = "result";
}

/// One step of a proposed plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanStep {
    pub index: u32,
    pub title: String,
    #[serde(default)]
    pub description: String,
}

impl PlanStep {
    pub fn new(index: u32, title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            index,
            title: title.into(),
            description: description.into(),
        }
    }
}

/// Variant-specific data of an activity.
#[derive(Debug, Clone, PartialEq)]
pub enum ActivityKind {
    SessionAssigned { task: String },
    PlanProposed { plan_id: PlanId, steps: Vec<PlanStep> },
    PlanApproved { plan_id: PlanId },
    Message { text: String },
    Progress { note: String },
    Failure { reason: String },
    Result { artifacts: Vec<Artifact> },
    Unrecognized { type_tag: String, payload: Payload },
}

impl ActivityKind {
    /// Whether this kind may influence the derived session state.
    ///
    /// This is the only place significance is decided.
    pub fn is_significant(&self) -> bool {
        match self {
            Self::SessionAssigned { .. }
            | Self::PlanProposed { .. }
            | Self::PlanApproved { .. }
            | Self::Failure { .. }
            | Self::Result { .. } => true,
            Self::Message { .. } | Self::Progress { .. } | Self::Unrecognized { .. } => false,
        }
    }

    /// The `typeTag` this kind is persisted under.
    pub fn type_tag(&self) -> &str {
        match self {
            Self::SessionAssigned { .. } => tags::SESSION_ASSIGNED,
            Self::PlanProposed { .. } => tags::PLAN_PROPOSED,
            Self::PlanApproved { .. } => tags::PLAN_APPROVED,
            Self::Message { .. } => tags::MESSAGE,
            Self::Progress { .. } => tags::PROGRESS,
            Self::Failure { .. } => tags::FAILURE,
            Self::Result { .. } => tags::RESULT,
            Self::Unrecognized { type_tag, .. } => type_tag,
        }
    }
}

/// An immutable, decoded activity.
#[derive(Debug, Clone, PartialEq)]
pub struct Activity {
    pub id: ActivityId,
    /// Identifier assigned by the remote service; empty for locally created activities.
    pub remote_id: String,
    pub timestamp: Timestamp,
    pub originator: Originator,
    pub kind: ActivityKind,
}

impl Activity {
    /// Create a locally originated activity stamped with the current time.
    pub fn new(kind: ActivityKind) -> Self {
        Self {
            id: ActivityId::new_uuid(),
            remote_id: String::new(),
            timestamp: Timestamp::now(),
            originator: Originator::System,
            kind,
        }
    }

    pub fn with_id(mut self, id: ActivityId) -> Self {
        self.id = id;
        self
    }

    pub fn with_remote_id(mut self, remote_id: impl Into<String>) -> Self {
        self.remote_id = remote_id.into();
        self
    }

    pub fn with_timestamp(mut self, timestamp: impl Into<Timestamp>) -> Self {
        self.timestamp = timestamp.into();
        self
    }

    pub fn with_originator(mut self, originator: Originator) -> Self {
        self.originator = originator;
        self
    }

    pub fn is_significant(&self) -> bool {
        self.kind.is_significant()
    }

    pub fn is_plan_proposal(&self) -> bool {
        matches!(self.kind, ActivityKind::PlanProposed { .. })
    }
}
