//! Variant-agnostic envelopes for activities and artifacts.
//!
//! The persisted field names (`typeTag`, `id`, `remoteId`, `timestamp`,
//! `originator`, `payload`) are a stable on-disk contract. Renaming any of them
//! breaks every previously written log.

use crate::ids::ActivityId;
use crate::timestamp::Timestamp;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Self-describing payload tree. Key order and number text are preserved so
/// opaque payloads re-serialize to the same bytes.
pub type Payload = Value;

/// Who produced an activity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Originator {
    #[default]
    System,
    Agent,
    User,
}

/// Wire/disk-neutral shape every activity passes through before variant decoding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityEnvelope {
    pub type_tag: String,
    pub id: ActivityId,
    #[serde(default)]
    pub remote_id: String,
    pub timestamp: Timestamp,
    #[serde(default)]
    pub originator: Originator,
    #[serde(default = "empty_payload")]
    pub payload: Payload,
}

fn empty_payload() -> Payload {
    Value::Object(Map::new())
}

impl ActivityEnvelope {
    /// Build an envelope with an empty object payload.
    pub fn new(
        type_tag: impl Into<String>,
        id: ActivityId,
        timestamp: impl Into<Timestamp>,
        originator: Originator,
    ) -> Self {
        Self {
            type_tag: type_tag.into(),
            id,
            remote_id: String::new(),
            timestamp: timestamp.into(),
            originator,
            payload: empty_payload(),
        }
    }

    pub fn with_remote_id(mut self, remote_id: impl Into<String>) -> Self {
        self.remote_id = remote_id.into();
        self
    }

    pub fn with_payload(mut self, payload: Payload) -> Self {
        self.payload = payload;
        self
    }

    /// Whether the envelope satisfies the structural invariants every reader relies on.
    pub fn is_well_formed(&self) -> bool {
        !self.type_tag.trim().is_empty()
    }
}

/// Artifact shape nested inside result activities.
///
/// An artifact is a JSON object keyed by the artifact's shape, e.g.
/// `{"changeSet": {"unidiffPatch": "...", "baseCommitId": "..."}}`. Codecs claim
/// envelopes by looking at which keys are present.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArtifactEnvelope(Map<String, Value>);

impl ArtifactEnvelope {
    pub fn new() -> Self {
        Self(Map::new())
    }

    pub fn with_field(mut self, key: impl Into<String>, value: Value) -> Self {
        self.0.insert(key.into(), value);
        self
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

impl From<Map<String, Value>> for ArtifactEnvelope {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}
