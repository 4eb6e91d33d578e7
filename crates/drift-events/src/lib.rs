//! Durable activity logs for drift sessions.
//!
//! [`FileEnvelopeStore`] owns the physical format: one JSON envelope per line,
//! appended by a single writer per session, every line decodable on its own.
//! [`ActivityJournal`] layers the codec registry on top, turning stored records
//! into an [`ActivityHistory`] and reporting bad records one by one.

mod journal;
mod store;

pub use journal::{
    ActivityHistory, ActivityJournal, ActivityJournalBuilder, JournalConfig, RecordError,
    RecoveryMode,
};
pub use store::FileEnvelopeStore;
