//! MQTT topic builders and the inbound routing table.
//!
//! Topic structure:
//! ```text
//! /provision/request                        (pub)
//! /provision/response                       (sub)
//! v1/devices/me/telemetry                   (pub)
//! v1/devices/me/attributes                  (pub/sub)
//! v1/devices/me/attributes/request/{n}      (pub)
//! v1/devices/me/attributes/response/+       (sub)
//! v1/devices/me/rpc/request/{id}            (sub)
//! v1/devices/me/rpc/response/{id}           (pub)
//! v1/devices/me/claim                       (pub)
//! v2/fw/request/0/chunk/{n}                 (pub)
//! v2/fw/response/#                          (sub)
//! ```

// ─── Fixed topics ───

pub const PROVISION_REQUEST: &str = "/provision/request";
pub const PROVISION_RESPONSE: &str = "/provision/response";
pub const TELEMETRY: &str = "v1/devices/me/telemetry";
pub const ATTRIBUTES: &str = "v1/devices/me/attributes";
pub const CLAIM: &str = "v1/devices/me/claim";

// ─── Subscription filters (with MQTT wildcards) ───

pub const RPC_REQUEST_FILTER: &str = "v1/devices/me/rpc/request/+";
pub const ATTRIBUTES_RESPONSE_FILTER: &str = "v1/devices/me/attributes/response/+";
pub const FIRMWARE_RESPONSE_FILTER: &str = "v2/fw/response/#";

/// The five filters installed by a subscribe, in installation order.
pub const SUBSCRIPTIONS: [&str; 5] = [
    PROVISION_RESPONSE,
    RPC_REQUEST_FILTER,
    ATTRIBUTES_RESPONSE_FILTER,
    ATTRIBUTES,
    FIRMWARE_RESPONSE_FILTER,
];

// ─── Numbered topics ───

pub fn attributes_request(request_id: u32) -> String {
    format!("{ATTRIBUTES}/request/{request_id}")
}

pub fn firmware_chunk_request(chunk: u32) -> String {
    format!("v2/fw/request/0/chunk/{chunk}")
}

/// Derive the RPC reply topic from the request topic.
///
/// The `request` segment becomes `response`; every other segment,
/// including the numeric correlation id, is kept verbatim.
pub fn rpc_response_for(request_topic: &str) -> String {
    request_topic
        .split('/')
        .map(|segment| if segment == "request" { "response" } else { segment })
        .collect::<Vec<_>>()
        .join("/")
}

// ─── Routing ───

const RPC_PREFIX: &str = "v1/devices/me/rpc";
const ATTRIBUTES_PREFIX: &str = ATTRIBUTES;
const PROVISION_PREFIX: &str = PROVISION_RESPONSE;
const FIRMWARE_PREFIX: &str = "v2/fw/response/";

/// Which handling flow an inbound topic belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    RpcRequest,
    Attributes,
    ProvisionResponse,
    FirmwareChunk,
}

/// Classify an inbound topic by known prefix.
///
/// Prefixes are checked in priority order: RPC, attributes, provisioning,
/// firmware. Returns `None` for topics outside the subscription set.
pub fn route(topic: &str) -> Option<Route> {
    const TABLE: [(&str, Route); 4] = [
        (RPC_PREFIX, Route::RpcRequest),
        (ATTRIBUTES_PREFIX, Route::Attributes),
        (PROVISION_PREFIX, Route::ProvisionResponse),
        (FIRMWARE_PREFIX, Route::FirmwareChunk),
    ];

    TABLE
        .iter()
        .find(|(prefix, _)| topic.starts_with(prefix))
        .map(|(_, route)| *route)
}

/// Chunk index carried in the last segment of a firmware response topic.
pub fn chunk_index(topic: &str) -> Option<u32> {
    topic.rsplit('/').next()?.parse().ok()
}
