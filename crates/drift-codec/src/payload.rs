//! Field access over loosely-typed payload objects.
//!
//! Missing or `null` optional fields fall back to their defaults. A field that is
//! present with the wrong JSON type is a `MalformedEnvelope`, as is a missing
//! required field.

use drift_protocol::{ProtocolError, ProtocolResult};
use serde_json::{Map, Value};

pub(crate) struct Fields<'a> {
    owner: &'a str,
    map: Option<&'a Map<String, Value>>,
}

impl<'a> Fields<'a> {
    /// View `value` as an object. `null` is treated as an empty object.
    pub(crate) fn of(owner: &'a str, value: &'a Value) -> ProtocolResult<Self> {
        let map = match value {
            Value::Object(map) => Some(map),
            Value::Null => None,
            other => {
                return Err(ProtocolError::malformed(
                    owner,
                    format!("expected an object payload, found {}", json_type(other)),
                ));
            }
        };
        Ok(Self { owner, map })
    }

    fn get(&self, key: &str) -> Option<&'a Value> {
        self.map
            .and_then(|map| map.get(key))
            .filter(|value| !value.is_null())
    }

    fn mismatch(&self, key: &str, expected: &str, found: &Value) -> ProtocolError {
        ProtocolError::malformed(
            self.owner,
            format!("field `{key}` must be {expected}, found {}", json_type(found)),
        )
    }

    pub(crate) fn str_or_default(&self, key: &str) -> ProtocolResult<String> {
        match self.get(key) {
            None => Ok(String::new()),
            Some(Value::String(s)) => Ok(s.clone()),
            Some(other) => Err(self.mismatch(key, "a string", other)),
        }
    }

    pub(crate) fn required_str(&self, key: &str) -> ProtocolResult<String> {
        match self.get(key) {
            None => Err(ProtocolError::malformed(
                self.owner,
                format!("missing required field `{key}`"),
            )),
            Some(Value::String(s)) => Ok(s.clone()),
            Some(other) => Err(self.mismatch(key, "a string", other)),
        }
    }

    pub(crate) fn i32_or_default(&self, key: &str) -> ProtocolResult<i32> {
        match self.get(key) {
            None => Ok(0),
            Some(value) => value
                .as_i64()
                .and_then(|n| i32::try_from(n).ok())
                .ok_or_else(|| self.mismatch(key, "a 32-bit integer", value)),
        }
    }

    pub(crate) fn u32_or(&self, key: &str, default: u32) -> ProtocolResult<u32> {
        match self.get(key) {
            None => Ok(default),
            Some(value) => value
                .as_u64()
                .and_then(|n| u32::try_from(n).ok())
                .ok_or_else(|| self.mismatch(key, "a non-negative integer", value)),
        }
    }

    pub(crate) fn array_or_empty(&self, key: &str) -> ProtocolResult<&'a [Value]> {
        match self.get(key) {
            None => Ok(&[]),
            Some(Value::Array(items)) => Ok(items.as_slice()),
            Some(other) => Err(self.mismatch(key, "an array", other)),
        }
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
