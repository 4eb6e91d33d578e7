//! # drift-protocol — shared types for remote coding sessions
//!
//! This crate defines the data every other drift crate exchanges: the envelopes
//! activities and artifacts are persisted as, the decoded variant models, the raw
//! status pulse, the derived session state, and the I/O ports.
//!
//! It is intentionally dependency-light (no tokio, no file I/O) so it can be used
//! as a pure contract crate.
//!
//! ## Module Overview
//!
//! - [`ids`] — Typed ID wrappers (SessionId, ActivityId, PlanId)
//! - [`envelope`] — ActivityEnvelope, ArtifactEnvelope, Originator
//! - [`activity`] — Activity + ActivityKind (forward-compatible via `Unrecognized`)
//! - [`artifact`] — Artifact + ArtifactKind
//! - [`state`] — SessionPulse, PulseStatus, SessionState
//! - [`timestamp`] — Timestamp (RFC 3339 instant that keeps its source text)
//! - [`ports`] — EnvelopeSource / EnvelopeSink boundary traits
//! - [`error`] — ProtocolError, ProtocolResult

pub mod activity;
pub mod artifact;
pub mod envelope;
pub mod error;
pub mod ids;
pub mod ports;
pub mod state;
pub mod timestamp;

// Re-export the most commonly used types at the crate root.
pub use activity::{Activity, ActivityKind, PlanStep, tags};
pub use artifact::{Artifact, ArtifactKind};
pub use envelope::{ActivityEnvelope, ArtifactEnvelope, Originator, Payload};
pub use error::{ProtocolError, ProtocolResult};
pub use ids::{ActivityId, PlanId, SessionId};
pub use ports::{EnvelopeSink, EnvelopeSource, EnvelopeStream, SourcedEnvelope, UnreadableRecord};
pub use state::{PulseStatus, SessionPulse, SessionState};
pub use timestamp::Timestamp;
