use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};

use crate::error::{ProtocolError, ProtocolResult};

/// A telemetry or attribute value.
///
/// Serialized untagged, so `Int(3)` is `3` on the wire and `Str("on")` is
/// `"on"`. Integers are tried before reals when decoding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Real(f64),
    Str(String),
}

impl Value {
    /// Convert a decoded JSON value. Nulls, arrays and objects have no
    /// `Value` representation.
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Bool(b) => Some(Self::Bool(*b)),
            serde_json::Value::Number(n) => n
                .as_i64()
                .map(Self::Int)
                .or_else(|| n.as_f64().map(Self::Real)),
            serde_json::Value::String(s) => Some(Self::Str(s.clone())),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int(v.into())
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Self::Int(v.into())
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Self::Real(v.into())
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Real(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

/// A single key/value pair, published as the one-entry object `{key: value}`.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyValue {
    pub key: String,
    pub value: Value,
}

impl KeyValue {
    pub fn new(key: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Decode a one-entry object back into a pair.
    pub fn from_slice(payload: &[u8]) -> ProtocolResult<Self> {
        let object: serde_json::Map<String, serde_json::Value> = serde_json::from_slice(payload)?;
        let mut entries = object.into_iter();
        let (key, raw) = entries.next().ok_or(ProtocolError::MissingField("key"))?;
        if entries.next().is_some() {
            return Err(ProtocolError::Json("expected exactly one key".into()));
        }
        let value = Value::from_json(&raw).ok_or(ProtocolError::MissingField("value"))?;
        Ok(Self { key, value })
    }
}

impl Serialize for KeyValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry(&self.key, &self.value)?;
        map.end()
    }
}

/// Collect several pairs into one JSON object (later keys overwrite earlier ones).
pub fn to_object(pairs: &[KeyValue]) -> serde_json::Map<String, serde_json::Value> {
    pairs
        .iter()
        .map(|kv| {
            let value = serde_json::to_value(&kv.value).unwrap_or(serde_json::Value::Null);
            (kv.key.clone(), value)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(kv: &KeyValue) -> KeyValue {
        let bytes = serde_json::to_vec(kv).unwrap();
        KeyValue::from_slice(&bytes).unwrap()
    }

    #[test]
    fn bool_roundtrip() {
        let kv = KeyValue::new("relay", true);
        assert_eq!(roundtrip(&kv), kv);
    }

    #[test]
    fn int_roundtrip() {
        let kv = KeyValue::new("uptime", 86_400_i64);
        assert_eq!(roundtrip(&kv), kv);
        let negative = KeyValue::new("offset", -12);
        assert_eq!(roundtrip(&negative), negative);
    }

    #[test]
    fn real_roundtrip() {
        let kv = KeyValue::new("temperature", 21.75);
        assert_eq!(roundtrip(&kv), kv);
        // A whole-number real stays a real.
        let whole = KeyValue::new("ratio", 2.0);
        assert_eq!(roundtrip(&whole), whole);
    }

    #[test]
    fn string_roundtrip() {
        let kv = KeyValue::new("fw_state", "DOWNLOADING");
        assert_eq!(roundtrip(&kv), kv);
    }

    #[test]
    fn serializes_as_single_entry_object() {
        let json = serde_json::to_string(&KeyValue::new("saveConfig", 1)).unwrap();
        assert_eq!(json, r#"{"saveConfig":1}"#);
    }

    #[test]
    fn from_json_rejects_structures() {
        assert!(Value::from_json(&serde_json::json!(null)).is_none());
        assert!(Value::from_json(&serde_json::json!([1, 2])).is_none());
        assert!(Value::from_json(&serde_json::json!({"a": 1})).is_none());
    }

    #[test]
    fn decode_rejects_multiple_keys() {
        assert!(KeyValue::from_slice(br#"{"a":1,"b":2}"#).is_err());
        assert!(KeyValue::from_slice(b"{}").is_err());
    }

    #[test]
    fn to_object_merges_pairs() {
        let obj = to_object(&[KeyValue::new("a", 1), KeyValue::new("b", "x")]);
        assert_eq!(obj["a"], 1);
        assert_eq!(obj["b"], "x");
    }
}
