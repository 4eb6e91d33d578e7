//! Codec registries for drift envelopes.
//!
//! - [`artifact`] — artifact codecs, selected first-match by envelope shape.
//!   A missing codec is a hard `NoCodecFound` error.
//! - [`activity`] — activity codecs, selected by `typeTag`. Unclaimed tags decode
//!   to `Unrecognized` so logs written by newer versions stay readable.

pub mod activity;
pub mod artifact;
mod payload;

pub use activity::{
    ActivityCodec, ActivityCodecRegistry, FailureCodec, MessageCodec, PlanApprovedCodec,
    PlanProposedCodec, ProgressCodec, ResultCodec, SessionAssignedCodec,
};
pub use artifact::{
    ArtifactCodec, ArtifactCodecRegistry, ChangeSetCodec, CommandOutputCodec, MediaCodec,
};
