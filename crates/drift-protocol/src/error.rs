//! Error types shared by codecs, stores, and the state policy.

use thiserror::Error;

/// Errors raised while decoding/encoding envelopes or evaluating session state.
///
/// An unknown activity `typeTag` is deliberately absent from this list: it decodes
/// into [`ActivityKind::Unrecognized`](crate::ActivityKind::Unrecognized).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("malformed envelope `{type_tag}`: {reason}")]
    MalformedEnvelope { type_tag: String, reason: String },
    #[error("no codec found: {0}")]
    NoCodecFound(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("io error: {0}")]
    Io(String),
}

impl ProtocolError {
    pub fn malformed(type_tag: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedEnvelope {
            type_tag: type_tag.into(),
            reason: reason.into(),
        }
    }
}

/// Convenience result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;
