//! Activity codecs and the registry that maps envelopes to [`Activity`] values.
//!
//! Decoding never fails on an unknown `typeTag`: such envelopes become
//! [`ActivityKind::Unrecognized`] carrying the tag and payload verbatim, and
//! encoding an `Unrecognized` activity reproduces the original envelope.

use std::sync::Arc;

use drift_protocol::{
    Activity, ActivityEnvelope, ActivityKind, ArtifactEnvelope, Payload, PlanId, PlanStep,
    ProtocolError, ProtocolResult, tags,
};
use serde_json::{Value, json};
use tracing::debug;

use crate::artifact::ArtifactCodecRegistry;
use crate::payload::Fields;

/// Decodes and encodes the payload of one activity kind.
pub trait ActivityCodec: Send + Sync {
    /// Tag written when encoding.
    fn type_tag(&self) -> &'static str;

    /// Whether envelopes carrying `type_tag` belong to this codec.
    fn claims_tag(&self, type_tag: &str) -> bool {
        type_tag == self.type_tag()
    }

    fn claims_kind(&self, kind: &ActivityKind) -> bool;

    fn decode_payload(
        &self,
        payload: &Payload,
        artifacts: &ArtifactCodecRegistry,
    ) -> ProtocolResult<ActivityKind>;

    fn encode_payload(
        &self,
        kind: &ActivityKind,
        artifacts: &ArtifactCodecRegistry,
    ) -> ProtocolResult<Payload>;
}

fn wrong_kind(codec: &str, kind: &ActivityKind) -> ProtocolError {
    ProtocolError::NoCodecFound(format!(
        "{codec} codec cannot encode `{}` activities",
        kind.type_tag()
    ))
}

/// Generates a codec for a kind with a single string field that defaults to empty.
macro_rules! text_codec {
    ($(#[$meta:meta])* $name:ident, $tag:expr, $variant:ident, $field:ident, $key:literal) => {
        $(#[$meta])*
        #[derive(Debug, Default, Clone, Copy)]
        pub struct $name;

        impl ActivityCodec for $name {
            fn type_tag(&self) -> &'static str {
                $tag
            }

            fn claims_kind(&self, kind: &ActivityKind) -> bool {
                matches!(kind, ActivityKind::$variant { .. })
            }

            fn decode_payload(
                &self,
                payload: &Payload,
                _artifacts: &ArtifactCodecRegistry,
            ) -> ProtocolResult<ActivityKind> {
                let fields = Fields::of($tag, payload)?;
                Ok(ActivityKind::$variant {
                    $field: fields.str_or_default($key)?,
                })
            }

            fn encode_payload(
                &self,
                kind: &ActivityKind,
                _artifacts: &ArtifactCodecRegistry,
            ) -> ProtocolResult<Payload> {
                match kind {
                    ActivityKind::$variant { $field } => Ok(json!({ $key: $field })),
                    other => Err(wrong_kind($tag, other)),
                }
            }
        }
    };
}

text_codec!(
    /// `{"task": "..."}`
    SessionAssignedCodec,
    tags::SESSION_ASSIGNED,
    SessionAssigned,
    task,
    "task"
);
text_codec!(
    /// `{"text": "..."}`
    MessageCodec,
    tags::MESSAGE,
    Message,
    text,
    "text"
);
text_codec!(
    /// `{"note": "..."}`
    ProgressCodec,
    tags::PROGRESS,
    Progress,
    note,
    "note"
);
text_codec!(
    /// `{"reason": "..."}`. A failure without a reason decodes to an empty reason.
    FailureCodec,
    tags::FAILURE,
    Failure,
    reason,
    "reason"
);

/// `{"planId": "...", "steps": [{"index": 0, "title": "...", "description": "..."}]}`
///
/// `planId` is required. A step without an index takes its position in the list.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlanProposedCodec;

impl PlanProposedCodec {
    fn decode_step(position: usize, value: &Value) -> ProtocolResult<PlanStep> {
        let fields = Fields::of(tags::PLAN_PROPOSED, value)?;
        let fallback = u32::try_from(position).map_err(|_| {
            ProtocolError::malformed(tags::PLAN_PROPOSED, "plan has too many steps")
        })?;
        Ok(PlanStep {
            index: fields.u32_or("index", fallback)?,
            title: fields.str_or_default("title")?,
            description: fields.str_or_default("description")?,
        })
    }
}

impl ActivityCodec for PlanProposedCodec {
    fn type_tag(&self) -> &'static str {
        tags::PLAN_PROPOSED
    }

    fn claims_kind(&self, kind: &ActivityKind) -> bool {
        matches!(kind, ActivityKind::PlanProposed { .. })
    }

    fn decode_payload(
        &self,
        payload: &Payload,
        _artifacts: &ArtifactCodecRegistry,
    ) -> ProtocolResult<ActivityKind> {
        let fields = Fields::of(tags::PLAN_PROPOSED, payload)?;
        let plan_id = PlanId::from_string(fields.required_str("planId")?);
        let steps = fields
            .array_or_empty("steps")?
            .iter()
            .enumerate()
            .map(|(position, step)| Self::decode_step(position, step))
            .collect::<ProtocolResult<Vec<_>>>()?;
        Ok(ActivityKind::PlanProposed { plan_id, steps })
    }

    fn encode_payload(
        &self,
        kind: &ActivityKind,
        _artifacts: &ArtifactCodecRegistry,
    ) -> ProtocolResult<Payload> {
        match kind {
            ActivityKind::PlanProposed { plan_id, steps } => {
                let steps: Vec<Value> = steps
                    .iter()
                    .map(|step| {
                        json!({
                            "index": step.index,
                            "title": step.title,
                            "description": step.description,
                        })
                    })
                    .collect();
                Ok(json!({ "planId": plan_id, "steps": steps }))
            }
            other => Err(wrong_kind(tags::PLAN_PROPOSED, other)),
        }
    }
}

/// `{"planId": "..."}`, required.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlanApprovedCodec;

impl ActivityCodec for PlanApprovedCodec {
    fn type_tag(&self) -> &'static str {
        tags::PLAN_APPROVED
    }

    fn claims_kind(&self, kind: &ActivityKind) -> bool {
        matches!(kind, ActivityKind::PlanApproved { .. })
    }

    fn decode_payload(
        &self,
        payload: &Payload,
        _artifacts: &ArtifactCodecRegistry,
    ) -> ProtocolResult<ActivityKind> {
        let fields = Fields::of(tags::PLAN_APPROVED, payload)?;
        Ok(ActivityKind::PlanApproved {
            plan_id: PlanId::from_string(fields.required_str("planId")?),
        })
    }

    fn encode_payload(
        &self,
        kind: &ActivityKind,
        _artifacts: &ArtifactCodecRegistry,
    ) -> ProtocolResult<Payload> {
        match kind {
            ActivityKind::PlanApproved { plan_id } => Ok(json!({ "planId": plan_id })),
            other => Err(wrong_kind(tags::PLAN_APPROVED, other)),
        }
    }
}

/// `{"artifacts": [<artifact envelope>, ...]}`; artifacts go through the
/// artifact registry.
#[derive(Debug, Default, Clone, Copy)]
pub struct ResultCodec;

impl ActivityCodec for ResultCodec {
    fn type_tag(&self) -> &'static str {
        tags::RESULT
    }

    fn claims_kind(&self, kind: &ActivityKind) -> bool {
        matches!(kind, ActivityKind::Result { .. })
    }

    fn decode_payload(
        &self,
        payload: &Payload,
        artifacts: &ArtifactCodecRegistry,
    ) -> ProtocolResult<ActivityKind> {
        let fields = Fields::of(tags::RESULT, payload)?;
        let decoded = fields
            .array_or_empty("artifacts")?
            .iter()
            .map(|value| match value {
                Value::Object(map) => artifacts.decode(&ArtifactEnvelope::from(map.clone())),
                _ => Err(ProtocolError::malformed(
                    tags::RESULT,
                    "every artifact must be an object",
                )),
            })
            .collect::<ProtocolResult<Vec<_>>>()?;
        Ok(ActivityKind::Result { artifacts: decoded })
    }

    fn encode_payload(
        &self,
        kind: &ActivityKind,
        artifacts: &ArtifactCodecRegistry,
    ) -> ProtocolResult<Payload> {
        match kind {
            ActivityKind::Result { artifacts: items } => {
                let encoded = items
                    .iter()
                    .map(|artifact| artifacts.encode(artifact).map(ArtifactEnvelope::into_value))
                    .collect::<ProtocolResult<Vec<_>>>()?;
                Ok(json!({ "artifacts": encoded }))
            }
            other => Err(wrong_kind(tags::RESULT, other)),
        }
    }
}

/// Ordered activity codecs plus the artifact registry result payloads need.
///
/// Selection is first-match on `claims_tag` (decode) and `claims_kind` (encode).
#[derive(Clone)]
pub struct ActivityCodecRegistry {
    codecs: Vec<Arc<dyn ActivityCodec>>,
    artifacts: ArtifactCodecRegistry,
}

impl ActivityCodecRegistry {
    /// No activity codecs; every envelope decodes as `Unrecognized`.
    pub fn empty(artifacts: ArtifactCodecRegistry) -> Self {
        Self {
            codecs: Vec::new(),
            artifacts,
        }
    }

    /// Every built-in activity codec over the default artifact registry.
    pub fn with_default_codecs() -> Self {
        let mut registry = Self::empty(ArtifactCodecRegistry::with_default_codecs());
        registry
            .register(SessionAssignedCodec)
            .register(PlanProposedCodec)
            .register(PlanApprovedCodec)
            .register(MessageCodec)
            .register(ProgressCodec)
            .register(FailureCodec)
            .register(ResultCodec);
        registry
    }

    /// Append a codec. Earlier registrations take priority for the same tag.
    pub fn register(&mut self, codec: impl ActivityCodec + 'static) -> &mut Self {
        self.codecs.push(Arc::new(codec));
        self
    }

    pub fn artifacts(&self) -> &ArtifactCodecRegistry {
        &self.artifacts
    }

    pub fn type_tags(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.codecs.iter().map(|codec| codec.type_tag())
    }

    /// Decode one envelope.
    ///
    /// Fails only when the envelope is structurally invalid or a claiming codec
    /// rejects its payload; an unclaimed tag yields `Unrecognized`.
    pub fn decode(&self, envelope: &ActivityEnvelope) -> ProtocolResult<Activity> {
        if !envelope.is_well_formed() {
            return Err(ProtocolError::malformed(
                envelope.type_tag.as_str(),
                "typeTag must not be empty",
            ));
        }

        let kind = match self
            .codecs
            .iter()
            .find(|codec| codec.claims_tag(&envelope.type_tag))
        {
            Some(codec) => codec.decode_payload(&envelope.payload, &self.artifacts)?,
            None => {
                debug!(type_tag = %envelope.type_tag, id = %envelope.id, "activity kept as unrecognized");
                ActivityKind::Unrecognized {
                    type_tag: envelope.type_tag.clone(),
                    payload: envelope.payload.clone(),
                }
            }
        };

        Ok(Activity {
            id: envelope.id.clone(),
            remote_id: envelope.remote_id.clone(),
            timestamp: envelope.timestamp.clone(),
            originator: envelope.originator,
            kind,
        })
    }

    /// Decode a batch, reporting each record's outcome separately.
    pub fn decode_each<'a, I>(
        &'a self,
        envelopes: I,
    ) -> impl Iterator<Item = ProtocolResult<Activity>> + 'a
    where
        I: IntoIterator<Item = &'a ActivityEnvelope>,
        I::IntoIter: 'a,
    {
        envelopes.into_iter().map(|envelope| self.decode(envelope))
    }

    pub fn encode(&self, activity: &Activity) -> ProtocolResult<ActivityEnvelope> {
        let (type_tag, payload) = match &activity.kind {
            ActivityKind::Unrecognized { type_tag, payload } => (type_tag.clone(), payload.clone()),
            kind => {
                let codec = self
                    .codecs
                    .iter()
                    .find(|codec| codec.claims_kind(kind))
                    .ok_or_else(|| {
                        ProtocolError::NoCodecFound(format!(
                            "no activity codec encodes `{}` activities",
                            kind.type_tag()
                        ))
                    })?;
                (
                    codec.type_tag().to_owned(),
                    codec.encode_payload(kind, &self.artifacts)?,
                )
            }
        };

        Ok(ActivityEnvelope {
            type_tag,
            id: activity.id.clone(),
            remote_id: activity.remote_id.clone(),
            timestamp: activity.timestamp.clone(),
            originator: activity.originator,
            payload,
        })
    }
}

impl Default for ActivityCodecRegistry {
    fn default() -> Self {
        Self::with_default_codecs()
    }
}

impl std::fmt::Debug for ActivityCodecRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActivityCodecRegistry")
            .field("codecs", &self.type_tags().collect::<Vec<_>>())
            .field("artifacts", &self.artifacts)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};
    use drift_protocol::{ActivityId, Artifact, Originator};

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    fn activity(kind: ActivityKind) -> Activity {
        Activity::new(kind)
            .with_id(ActivityId::from_string("A1"))
            .with_remote_id("sessions/1/activities/1")
            .with_timestamp(at(1_700_000_000))
            .with_originator(Originator::Agent)
    }

    fn envelope(type_tag: &str, payload: Value) -> ActivityEnvelope {
        ActivityEnvelope::new(type_tag, ActivityId::from_string("A1"), at(0), Originator::Agent)
            .with_payload(payload)
    }

    fn every_kind() -> Vec<ActivityKind> {
        vec![
            ActivityKind::SessionAssigned {
                task: "fix flaky test".into(),
            },
            ActivityKind::PlanProposed {
                plan_id: PlanId::from_string("P1"),
                steps: vec![
                    PlanStep::new(0, "Reproduce", "run the suite"),
                    PlanStep::new(1, "Fix", ""),
                ],
            },
            ActivityKind::PlanApproved {
                plan_id: PlanId::from_string("P1"),
            },
            ActivityKind::Message {
                text: "Should I also update docs?".into(),
            },
            ActivityKind::Progress {
                note: "running tests".into(),
            },
            ActivityKind::Failure {
                reason: "sandbox crashed".into(),
            },
            ActivityKind::Result {
                artifacts: vec![
                    Artifact::ChangeSet {
                        unidiff_patch: "--- a/x\n+++ b/x\n".into(),
                        base_commit_id: "deadbeef".into(),
                    },
                    Artifact::CommandOutput {
                        output: "2 passed".into(),
                        exit_code: 0,
                    },
                    Artifact::Media {
                        uri: "gs://bucket/screen.png".into(),
                        mime_type: "image/png".into(),
                    },
                ],
            },
        ]
    }

    #[test]
    fn every_concrete_kind_roundtrips() {
        let registry = ActivityCodecRegistry::default();
        for kind in every_kind() {
            let original = activity(kind);
            let envelope = registry.encode(&original).unwrap();
            assert_eq!(envelope.type_tag, original.kind.type_tag());
            assert_eq!(registry.decode(&envelope).unwrap(), original);
        }
    }

    #[test]
    fn unknown_tag_becomes_unrecognized() {
        let registry = ActivityCodecRegistry::default();
        let payload = json!({"reviewer": "sam", "lines": [1, 2, 3]});
        let decoded = registry
            .decode(&envelope("reviewRequested", payload.clone()))
            .unwrap();
        assert_eq!(
            decoded.kind,
            ActivityKind::Unrecognized {
                type_tag: "reviewRequested".into(),
                payload,
            }
        );
        assert!(!decoded.is_significant());
    }

    #[test]
    fn unrecognized_reencodes_byte_for_byte() {
        let registry = ActivityCodecRegistry::default();
        let line = r#"{"typeTag":"futureThing","id":"A9","remoteId":"r9","timestamp":"2024-05-01T10:00:00Z","originator":"user","payload":{"zeta":[true,null],"alpha":{"nested":1.5}}}"#;
        let envelope: ActivityEnvelope = serde_json::from_str(line).unwrap();
        let decoded = registry.decode(&envelope).unwrap();
        let reencoded = registry.encode(&decoded).unwrap();
        assert_eq!(reencoded, envelope);
        assert_eq!(serde_json::to_string(&reencoded).unwrap(), line);
    }

    #[test]
    fn unrecognized_keeps_number_and_offset_text() {
        let registry = ActivityCodecRegistry::default();
        let line = r#"{"typeTag":"futureThing","id":"A9","remoteId":"","timestamp":"2024-05-01T10:00:00.000+00:00","originator":"agent","payload":{"n":1e2,"ratio":2.50}}"#;
        let envelope: ActivityEnvelope = serde_json::from_str(line).unwrap();
        let reencoded = registry.encode(&registry.decode(&envelope).unwrap()).unwrap();
        assert_eq!(serde_json::to_string(&reencoded).unwrap(), line);
    }

    #[test]
    fn failure_without_reason_defaults_to_empty() {
        let registry = ActivityCodecRegistry::default();
        let decoded = registry.decode(&envelope("failure", json!({}))).unwrap();
        assert_eq!(
            decoded.kind,
            ActivityKind::Failure {
                reason: String::new()
            }
        );
    }

    #[test]
    fn plan_steps_default_index_to_position() {
        let registry = ActivityCodecRegistry::default();
        let decoded = registry
            .decode(&envelope(
                "planProposed",
                json!({"planId": "P7", "steps": [{"title": "a"}, {"title": "b"}]}),
            ))
            .unwrap();
        let ActivityKind::PlanProposed { plan_id, steps } = decoded.kind else {
            panic!("expected a plan");
        };
        assert_eq!(plan_id.as_str(), "P7");
        assert_eq!(steps[1], PlanStep::new(1, "b", ""));
    }

    #[test]
    fn missing_plan_id_is_malformed() {
        let registry = ActivityCodecRegistry::default();
        let err = registry
            .decode(&envelope("planApproved", json!({})))
            .unwrap_err();
        assert_eq!(
            err,
            ProtocolError::malformed("planApproved", "missing required field `planId`")
        );
    }

    #[test]
    fn empty_type_tag_is_malformed() {
        let registry = ActivityCodecRegistry::default();
        let err = registry.decode(&envelope("", json!({}))).unwrap_err();
        assert!(matches!(err, ProtocolError::MalformedEnvelope { .. }));
    }

    #[test]
    fn result_with_unknown_artifact_fails_loudly() {
        let registry = ActivityCodecRegistry::default();
        let err = registry
            .decode(&envelope("result", json!({"artifacts": [{"hologram": {}}]})))
            .unwrap_err();
        assert!(matches!(err, ProtocolError::NoCodecFound(_)));
    }

    #[test]
    fn known_kind_without_codec_cannot_encode() {
        let mut registry = ActivityCodecRegistry::empty(ArtifactCodecRegistry::default());
        registry.register(MessageCodec);
        let err = registry
            .encode(&activity(ActivityKind::Progress { note: "n".into() }))
            .unwrap_err();
        assert_eq!(
            err,
            ProtocolError::NoCodecFound("no activity codec encodes `progress` activities".into())
        );
        // The same registry still decodes the unclaimed tag without failing.
        let decoded = registry.decode(&envelope("progress", json!({"note": "n"}))).unwrap();
        assert!(matches!(decoded.kind, ActivityKind::Unrecognized { .. }));
    }

    #[test]
    fn decode_each_reports_records_individually() {
        let registry = ActivityCodecRegistry::default();
        let envelopes = [
            envelope("message", json!({"text": "hi"})),
            envelope("planApproved", json!({})),
            envelope("progress", json!({"note": "n"})),
        ];
        let outcomes: Vec<_> = registry.decode_each(&envelopes).collect();
        assert!(outcomes[0].is_ok());
        assert!(outcomes[1].is_err());
        assert!(outcomes[2].is_ok());
    }
}
