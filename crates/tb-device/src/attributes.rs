//! Last-known firmware descriptor from shared attributes.

use serde_json::{Map, Value};
use tb_mqtt_channel::Channel;
use tb_protocol::firmware::{FW_CHECKSUM, FW_CHECKSUM_ALGORITHM, FW_SIZE, FW_TITLE, FW_VERSION};

use crate::client::DeviceClient;
use crate::error::ClientResult;
use crate::flow::{self, Poll};

/// Firmware keys merged field by field from attribute messages.
///
/// A key missing from an update keeps its previous value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SharedAttributeSnapshot {
    pub fw_title: Option<String>,
    pub fw_version: Option<String>,
    pub fw_checksum: Option<String>,
    pub fw_checksum_algorithm: Option<String>,
    pub fw_size: Option<u64>,
}

impl SharedAttributeSnapshot {
    pub fn merge(&mut self, update: &Map<String, Value>) {
        merge_str(&mut self.fw_title, update.get(FW_TITLE));
        merge_str(&mut self.fw_version, update.get(FW_VERSION));
        merge_str(&mut self.fw_checksum, update.get(FW_CHECKSUM));
        merge_str(&mut self.fw_checksum_algorithm, update.get(FW_CHECKSUM_ALGORITHM));
        if let Some(size) = update.get(FW_SIZE).and_then(as_size) {
            self.fw_size = Some(size);
        }
    }

    /// Both title and version are known.
    pub fn has_descriptor(&self) -> bool {
        self.fw_title.is_some() && self.fw_version.is_some()
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

/// Poll-driven shared-attribute request.
///
/// Responses carry no correlation id, so the first attribute message
/// after the request that mentions any requested key completes the fetch.
#[derive(Debug, Clone)]
pub struct AttributeFetch {
    keys: Vec<String>,
    timeout_ms: u64,
    started: Option<Started>,
}

#[derive(Debug, Clone, Copy)]
struct Started {
    deadline_ms: u64,
    seen_messages: u64,
}

impl AttributeFetch {
    pub fn new(keys: &[&str], timeout_ms: u64) -> Self {
        Self {
            keys: keys.iter().map(|k| k.to_string()).collect(),
            timeout_ms,
            started: None,
        }
    }

    pub fn poll<C: Channel>(
        &mut self,
        client: &mut DeviceClient<C>,
    ) -> ClientResult<Poll<Map<String, Value>>> {
        let started = match self.started {
            Some(started) => started,
            None => {
                let seen_messages = client.attribute_messages();
                let keys: Vec<&str> = self.keys.iter().map(String::as_str).collect();
                client.request_shared_attributes(&keys)?;
                let started = Started {
                    deadline_ms: client.now_ms() + self.timeout_ms,
                    seen_messages,
                };
                self.started = Some(started);
                started
            }
        };

        client.pump();

        if client.attribute_messages() > started.seen_messages {
            if let Some(attributes) = client.last_attributes() {
                if self.keys.iter().any(|k| attributes.contains_key(k)) {
                    return Ok(Poll::Done(attributes.clone()));
                }
            }
        }
        if flow::expired(client.now_ms(), started.deadline_ms) {
            return Ok(Poll::TimedOut);
        }
        Ok(Poll::Pending)
    }
}

fn merge_str(slot: &mut Option<String>, value: Option<&Value>) {
    match value {
        Some(Value::String(s)) => *slot = Some(s.clone()),
        Some(Value::Number(n)) => *slot = Some(n.to_string()),
        _ => {}
    }
}

// Sizes arrive as numbers, occasionally as numeric strings.
fn as_size(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn obj(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn merge_is_field_by_field() {
        let mut snap = SharedAttributeSnapshot::default();
        snap.merge(&obj(json!({"fw_title": "app", "fw_size": 10000})));
        assert!(!snap.has_descriptor());

        snap.merge(&obj(json!({"fw_version": "1.1"})));
        assert_eq!(snap.fw_title.as_deref(), Some("app"));
        assert_eq!(snap.fw_version.as_deref(), Some("1.1"));
        assert_eq!(snap.fw_size, Some(10000));
        assert!(snap.has_descriptor());
    }

    #[test]
    fn unrelated_keys_are_ignored() {
        let mut snap = SharedAttributeSnapshot::default();
        snap.merge(&obj(json!({"model": "Relay4Ch", "logLev": 3})));
        assert_eq!(snap, SharedAttributeSnapshot::default());
    }

    #[test]
    fn numeric_version_and_string_size() {
        let mut snap = SharedAttributeSnapshot::default();
        snap.merge(&obj(json!({"fw_version": 2, "fw_size": "4096"})));
        assert_eq!(snap.fw_version.as_deref(), Some("2"));
        assert_eq!(snap.fw_size, Some(4096));
    }

    #[test]
    fn clear_resets_everything() {
        let mut snap = SharedAttributeSnapshot::default();
        snap.merge(&obj(json!({"fw_title": "app", "fw_version": "1"})));
        snap.clear();
        assert!(!snap.has_descriptor());
    }
}
