//! Boundary ports between the codec/policy core and its I/O collaborators.
//!
//! Object-safety note:
//! - Traits use `async-trait` for async dyn-dispatch.
//! - Reads stream boxed items (`EnvelopeStream`) so one bad record does not
//!   hide the records after it.

use crate::envelope::ActivityEnvelope;
use crate::error::ProtocolResult;
use crate::ids::SessionId;
use async_trait::async_trait;
use futures_util::stream::BoxStream;
use std::fmt;

/// A single raw record that could not be turned into an [`ActivityEnvelope`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnreadableRecord {
    /// 1-based position of the record in the source.
    pub line: usize,
    pub message: String,
}

impl fmt::Display for UnreadableRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "record {}: {}", self.line, self.message)
    }
}

/// One item of an envelope read: the record position plus the envelope or the
/// reason it could not be read.
pub type SourcedEnvelope = Result<(usize, ActivityEnvelope), UnreadableRecord>;

pub type EnvelopeStream = BoxStream<'static, SourcedEnvelope>;

/// Supplies a session's envelopes in a stable order for a given read.
#[async_trait]
pub trait EnvelopeSource: Send + Sync {
    async fn stream_envelopes(&self, session_id: &SessionId) -> ProtocolResult<EnvelopeStream>;
}

/// Durably appends one envelope at a time to a session's log.
#[async_trait]
pub trait EnvelopeSink: Send + Sync {
    async fn append_envelope(
        &self,
        session_id: &SessionId,
        envelope: &ActivityEnvelope,
    ) -> ProtocolResult<()>;
}
