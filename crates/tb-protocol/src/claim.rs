use serde::{Deserialize, Serialize};

/// Device claiming request, published to `v1/devices/me/claim`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimRequest {
    pub secret_key: String,
    pub duration_ms: u64,
}
