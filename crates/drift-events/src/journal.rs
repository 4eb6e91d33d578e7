use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use drift_codec::ActivityCodecRegistry;
use drift_policy::{DefaultSessionStatePolicy, SessionStatePolicy};
use drift_protocol::{
    Activity, ActivityEnvelope, ActivityKind, Artifact, EnvelopeSink, EnvelopeSource,
    ProtocolError, SessionId, SessionPulse, SessionState,
};
use futures_util::StreamExt;
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::store::FileEnvelopeStore;

/// What to do when a single record of a log cannot be read or decoded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RecoveryMode {
    /// Log the record, keep it in [`ActivityHistory::skipped`], and keep reading.
    #[default]
    SkipCorrupt,
    /// Fail the whole load at the first bad record.
    Abort,
}

/// Failure of one record in a session log.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordError {
    #[error("record {line} is not a readable envelope: {message}")]
    Parse { line: usize, message: String },
    #[error("record {line} failed to decode: {source}")]
    Decode {
        line: usize,
        #[source]
        source: ProtocolError,
    },
}

impl RecordError {
    pub fn line(&self) -> usize {
        match self {
            Self::Parse { line, .. } | Self::Decode { line, .. } => *line,
        }
    }
}

/// A session's decoded log in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub struct ActivityHistory {
    pub session_id: SessionId,
    activities: Vec<Activity>,
    skipped: Vec<RecordError>,
}

impl ActivityHistory {
    pub fn activities(&self) -> &[Activity] {
        &self.activities
    }

    pub fn into_activities(self) -> Vec<Activity> {
        self.activities
    }

    /// Records dropped under [`RecoveryMode::SkipCorrupt`].
    pub fn skipped(&self) -> &[RecordError] {
        &self.skipped
    }

    pub fn is_clean(&self) -> bool {
        self.skipped.is_empty()
    }

    pub fn len(&self) -> usize {
        self.activities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.activities.is_empty()
    }

    /// Most recently arrived plan proposal.
    pub fn latest_plan(&self) -> Option<&Activity> {
        self.activities
            .iter()
            .rev()
            .find(|activity| activity.is_plan_proposal())
    }

    /// Every artifact across result activities, in arrival order.
    pub fn artifacts(&self) -> impl Iterator<Item = &Artifact> {
        self.activities
            .iter()
            .filter_map(|activity| match &activity.kind {
                ActivityKind::Result { artifacts } => Some(artifacts.iter()),
                _ => None,
            })
            .flatten()
    }
}

#[derive(Debug, Clone)]
pub struct JournalConfig {
    pub root: PathBuf,
    pub recovery: RecoveryMode,
}

impl JournalConfig {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            recovery: RecoveryMode::default(),
        }
    }
}

/// Wires a file-backed journal from a [`JournalConfig`].
#[derive(Debug, Clone)]
pub struct ActivityJournalBuilder {
    config: JournalConfig,
    codecs: Option<ActivityCodecRegistry>,
}

impl ActivityJournalBuilder {
    pub fn recovery(mut self, recovery: RecoveryMode) -> Self {
        self.config.recovery = recovery;
        self
    }

    pub fn codecs(mut self, codecs: ActivityCodecRegistry) -> Self {
        self.codecs = Some(codecs);
        self
    }

    pub fn build(self) -> ActivityJournal {
        let store = Arc::new(FileEnvelopeStore::new(self.config.root));
        ActivityJournal::new(
            store.clone(),
            store,
            self.codecs.unwrap_or_default(),
            self.config.recovery,
        )
    }
}

/// Encodes activities on the way into a log and decodes them on the way out.
#[derive(Clone)]
pub struct ActivityJournal {
    source: Arc<dyn EnvelopeSource>,
    sink: Arc<dyn EnvelopeSink>,
    codecs: Arc<ActivityCodecRegistry>,
    recovery: RecoveryMode,
}

impl ActivityJournal {
    pub fn new(
        source: Arc<dyn EnvelopeSource>,
        sink: Arc<dyn EnvelopeSink>,
        codecs: ActivityCodecRegistry,
        recovery: RecoveryMode,
    ) -> Self {
        Self {
            source,
            sink,
            codecs: Arc::new(codecs),
            recovery,
        }
    }

    pub fn builder(root: impl Into<PathBuf>) -> ActivityJournalBuilder {
        ActivityJournalBuilder {
            config: JournalConfig::new(root),
            codecs: None,
        }
    }

    pub fn from_config(config: JournalConfig) -> Self {
        ActivityJournalBuilder {
            config,
            codecs: None,
        }
        .build()
    }

    pub fn codecs(&self) -> &ActivityCodecRegistry {
        &self.codecs
    }

    pub fn recovery(&self) -> RecoveryMode {
        self.recovery
    }

    #[instrument(skip(self, activity), fields(session_id = %session_id, activity_id = %activity.id))]
    pub async fn append(
        &self,
        session_id: &SessionId,
        activity: &Activity,
    ) -> Result<ActivityEnvelope> {
        let envelope = self
            .codecs
            .encode(activity)
            .with_context(|| format!("failed encoding activity {}", activity.id))?;
        self.sink.append_envelope(session_id, &envelope).await?;
        debug!(type_tag = %envelope.type_tag, "activity appended");
        Ok(envelope)
    }

    /// Append an envelope received from elsewhere after checking that it decodes.
    #[instrument(skip(self, envelope), fields(session_id = %session_id, type_tag = %envelope.type_tag))]
    pub async fn append_envelope(
        &self,
        session_id: &SessionId,
        envelope: &ActivityEnvelope,
    ) -> Result<Activity> {
        let activity = self
            .codecs
            .decode(envelope)
            .with_context(|| format!("refusing to append undecodable envelope {}", envelope.id))?;
        self.sink.append_envelope(session_id, envelope).await?;
        Ok(activity)
    }

    /// Load and decode a session's log using the configured [`RecoveryMode`].
    pub async fn load(&self, session_id: &SessionId) -> Result<ActivityHistory> {
        self.load_with(session_id, self.recovery).await
    }

    #[instrument(skip(self), fields(session_id = %session_id))]
    pub async fn load_with(
        &self,
        session_id: &SessionId,
        recovery: RecoveryMode,
    ) -> Result<ActivityHistory> {
        let mut records = self.source.stream_envelopes(session_id).await?;
        let mut activities = Vec::new();
        let mut skipped = Vec::new();

        while let Some(record) = records.next().await {
            let outcome = match record {
                Ok((line, envelope)) => self
                    .codecs
                    .decode(&envelope)
                    .map_err(|source| RecordError::Decode { line, source }),
                Err(unreadable) => Err(RecordError::Parse {
                    line: unreadable.line,
                    message: unreadable.message,
                }),
            };

            match outcome {
                Ok(activity) => activities.push(activity),
                Err(err) => match recovery {
                    RecoveryMode::Abort => {
                        return Err(anyhow!(err).context(format!(
                            "failed loading activity log for session {session_id}"
                        )));
                    }
                    RecoveryMode::SkipCorrupt => {
                        warn!(line = err.line(), error = %err, "skipping corrupt activity record");
                        skipped.push(err);
                    }
                },
            }
        }

        debug!(
            count = activities.len(),
            skipped = skipped.len(),
            "activity history loaded"
        );
        Ok(ActivityHistory {
            session_id: session_id.clone(),
            activities,
            skipped,
        })
    }

    /// Load the history and derive the session's state with `policy`.
    pub async fn derive_state_with(
        &self,
        session_id: &SessionId,
        pulse: &SessionPulse,
        is_delivered: bool,
        policy: &dyn SessionStatePolicy,
    ) -> Result<SessionState> {
        let history = self.load(session_id).await?;
        let state = policy.evaluate(Some(pulse), Some(history.activities()), is_delivered)?;
        debug!(session_id = %session_id, %state, "session state derived");
        Ok(state)
    }

    /// [`derive_state_with`](Self::derive_state_with) using [`DefaultSessionStatePolicy`].
    pub async fn derive_state(
        &self,
        session_id: &SessionId,
        pulse: &SessionPulse,
        is_delivered: bool,
    ) -> Result<SessionState> {
        self.derive_state_with(session_id, pulse, is_delivered, &DefaultSessionStatePolicy)
            .await
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::time::{SystemTime, UNIX_EPOCH};

    use anyhow::Result;
    use chrono::DateTime;
    use drift_protocol::{
        Activity, ActivityEnvelope, ActivityId, ActivityKind, Artifact, Originator, PlanId,
        PlanStep, PulseStatus, SessionId, SessionPulse, SessionState,
    };
    use serde_json::json;
    use tokio::fs;

    use super::{ActivityJournal, RecordError, RecoveryMode};
    use crate::store::FileEnvelopeStore;

    fn unique_test_root(name: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        std::env::temp_dir().join(format!("{name}-{nanos}"))
    }

    fn activity(id: &str, secs: i64, kind: ActivityKind) -> Activity {
        Activity::new(kind)
            .with_id(ActivityId::from_string(id))
            .with_timestamp(DateTime::from_timestamp(secs, 0).unwrap())
            .with_originator(Originator::Agent)
    }

    fn plan(id: &str, secs: i64) -> Activity {
        activity(
            id,
            secs,
            ActivityKind::PlanProposed {
                plan_id: PlanId::from_string(id),
                steps: vec![PlanStep::new(0, "Write the fix", "")],
            },
        )
    }

    #[tokio::test]
    async fn appended_activities_load_back_unchanged() -> Result<()> {
        let root = unique_test_root("drift-journal");
        let journal = ActivityJournal::builder(&root).build();
        let session_id = SessionId::parse("sessions/7")?;

        let written = vec![
            activity(
                "A1",
                0,
                ActivityKind::SessionAssigned {
                    task: "add retries".into(),
                },
            ),
            plan("A2", 1),
            activity(
                "A3",
                2,
                ActivityKind::Result {
                    artifacts: vec![Artifact::ChangeSet {
                        unidiff_patch: "--- a\n+++ b\n".into(),
                        base_commit_id: "abc".into(),
                    }],
                },
            ),
        ];
        for item in &written {
            journal.append(&session_id, item).await?;
        }

        let history = journal.load(&session_id).await?;
        assert!(history.is_clean());
        assert_eq!(history.activities(), written.as_slice());
        assert_eq!(history.latest_plan().map(|a| a.id.as_str()), Some("A2"));
        assert_eq!(history.artifacts().count(), 1);

        let _ = fs::remove_dir_all(root).await;
        Ok(())
    }

    #[tokio::test]
    async fn skip_mode_reports_each_bad_record() -> Result<()> {
        let root = unique_test_root("drift-journal-skip");
        let journal = ActivityJournal::builder(&root).build();
        let session_id = SessionId::parse("S1")?;

        journal.append(&session_id, &plan("A1", 1)).await?;
        // Parses as an envelope but lacks the required planId.
        let broken = ActivityEnvelope::new(
            "planApproved",
            ActivityId::from_string("A2"),
            DateTime::from_timestamp(2, 0).unwrap(),
            Originator::User,
        );
        journal
            .sink
            .append_envelope(&session_id, &broken)
            .await?;
        journal
            .append(
                &session_id,
                &activity("A3", 3, ActivityKind::Progress { note: "n".into() }),
            )
            .await?;

        let history = journal.load(&session_id).await?;
        assert_eq!(history.len(), 2);
        assert_eq!(history.skipped().len(), 1);
        assert!(matches!(
            history.skipped()[0],
            RecordError::Decode { line: 2, .. }
        ));

        let err = journal
            .load_with(&session_id, RecoveryMode::Abort)
            .await
            .unwrap_err();
        assert!(format!("{err:#}").contains("record 2 failed to decode"));

        let _ = fs::remove_dir_all(root).await;
        Ok(())
    }

    #[tokio::test]
    async fn unknown_kinds_survive_a_load() -> Result<()> {
        let root = unique_test_root("drift-journal-unknown");
        let journal = ActivityJournal::builder(&root).build();
        let session_id = SessionId::parse("S1")?;

        let future = ActivityEnvelope::new(
            "reviewRequested",
            ActivityId::from_string("A1"),
            DateTime::from_timestamp(5, 0).unwrap(),
            Originator::User,
        )
        .with_payload(json!({"reviewer": "kim"}));
        let decoded = journal.append_envelope(&session_id, &future).await?;
        assert!(matches!(decoded.kind, ActivityKind::Unrecognized { .. }));

        let history = journal.load(&session_id).await?;
        let reencoded = journal.codecs().encode(&history.activities()[0])?;
        assert_eq!(reencoded, future);

        let _ = fs::remove_dir_all(root).await;
        Ok(())
    }

    #[tokio::test]
    async fn append_envelope_rejects_undecodable_input() -> Result<()> {
        let root = unique_test_root("drift-journal-reject");
        let journal = ActivityJournal::builder(&root).build();
        let session_id = SessionId::parse("S1")?;

        let bad = ActivityEnvelope::new(
            "planProposed",
            ActivityId::from_string("A1"),
            DateTime::from_timestamp(5, 0).unwrap(),
            Originator::Agent,
        )
        .with_payload(json!({"steps": "not a list"}));
        assert!(journal.append_envelope(&session_id, &bad).await.is_err());
        assert!(journal.load(&session_id).await?.is_empty());

        let _ = fs::remove_dir_all(root).await;
        Ok(())
    }

    #[tokio::test]
    async fn derives_state_from_stored_history() -> Result<()> {
        let root = unique_test_root("drift-journal-state");
        let journal = ActivityJournal::builder(&root)
            .recovery(RecoveryMode::Abort)
            .build();
        let session_id = SessionId::parse("S1")?;
        journal
            .append(
                &session_id,
                &activity(
                    "A1",
                    0,
                    ActivityKind::SessionAssigned {
                        task: "t".into(),
                    },
                ),
            )
            .await?;
        journal.append(&session_id, &plan("A2", 1)).await?;

        let completed = SessionPulse::new(PulseStatus::Completed);
        assert_eq!(
            journal.derive_state(&session_id, &completed, false).await?,
            SessionState::AwaitingPlanApproval
        );
        assert_eq!(
            journal.derive_state(&session_id, &completed, true).await?,
            SessionState::Idle
        );
        assert_eq!(
            journal
                .derive_state(&session_id, &SessionPulse::new(PulseStatus::Other(999)), false)
                .await?,
            SessionState::Unknown
        );

        let _ = fs::remove_dir_all(root).await;
        Ok(())
    }

    #[tokio::test]
    async fn undecodable_bytes_are_skipped_not_truncating() -> Result<()> {
        let root = unique_test_root("drift-journal-bytes");
        let journal = ActivityJournal::builder(&root).build();
        let session_id = SessionId::parse("S1")?;

        journal
            .append(
                &session_id,
                &activity(
                    "A1",
                    0,
                    ActivityKind::SessionAssigned {
                        task: "t".into(),
                    },
                ),
            )
            .await?;
        let path = FileEnvelopeStore::new(&root).file_path(&session_id);
        let mut contents = fs::read(&path).await?;
        contents.extend_from_slice(b"\xff\xfe garbage\n");
        fs::write(&path, contents).await?;
        journal.append(&session_id, &plan("A3", 3)).await?;

        let history = journal.load(&session_id).await?;
        assert_eq!(history.len(), 2);
        assert!(matches!(
            history.skipped(),
            [RecordError::Parse { line: 2, .. }]
        ));
        assert_eq!(
            journal
                .derive_state(&session_id, &SessionPulse::new(PulseStatus::Completed), false)
                .await?,
            SessionState::AwaitingPlanApproval
        );

        let _ = fs::remove_dir_all(root).await;
        Ok(())
    }
}
