//! Server-side RPC request payloads.

use serde::Deserialize;

use crate::error::{ProtocolError, ProtocolResult};

/// A decoded `{method, params}` RPC request.
#[derive(Debug, Clone, PartialEq)]
pub struct RpcRequest {
    pub method: String,
    /// Raw `params` exactly as received (`null` when absent).
    pub params: serde_json::Value,
}

#[derive(Deserialize)]
struct RawRpcRequest {
    #[serde(default)]
    method: Option<String>,
    #[serde(default)]
    params: serde_json::Value,
}

impl RpcRequest {
    pub fn parse(payload: &[u8]) -> ProtocolResult<Self> {
        let raw: RawRpcRequest = serde_json::from_slice(payload)?;
        let method = raw.method.ok_or(ProtocolError::MissingField("method"))?;
        Ok(Self {
            method,
            params: raw.params,
        })
    }

    /// Params as handed to a handler.
    ///
    /// A string holding a JSON object or array is decoded; anything else
    /// (scalars, malformed strings, already-structured params) is passed
    /// through unchanged.
    pub fn resolved_params(&self) -> serde_json::Value {
        if let serde_json::Value::String(text) = &self.params {
            if let Ok(nested) = serde_json::from_str::<serde_json::Value>(text) {
                if nested.is_object() || nested.is_array() {
                    return nested;
                }
            }
        }
        self.params.clone()
    }
}
