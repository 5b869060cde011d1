//! Shared-attribute request and update payloads.

use serde::{Deserialize, Serialize};

use crate::error::{ProtocolError, ProtocolResult};

/// Outbound shared-attribute request body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttributeRequest {
    /// Comma-separated attribute keys.
    pub shared_keys: String,
}

impl AttributeRequest {
    pub fn new<'a>(keys: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            shared_keys: keys.into_iter().collect::<Vec<_>>().join(","),
        }
    }
}

/// Decode an inbound attribute push or attribute-request response.
///
/// Both arrive in the same shape; a `{"shared": {...}}` wrapper is
/// unwrapped when present. Empty or non-object payloads are rejected.
pub fn parse_update(payload: &[u8]) -> ProtocolResult<serde_json::Map<String, serde_json::Value>> {
    let value: serde_json::Value = serde_json::from_slice(payload)?;
    let serde_json::Value::Object(mut object) = value else {
        return Err(ProtocolError::NotAnObject);
    };
    if object.is_empty() {
        return Err(ProtocolError::MissingField("shared"));
    }
    if let Some(serde_json::Value::Object(shared)) = object.remove("shared") {
        return Ok(shared);
    }
    Ok(object)
}
