//! Inbound message classification (the message router).
//!
//! Parses raw inbound publishes into typed `IncomingMessage` variants so
//! the device client can dispatch them without topic string matching.

use tb_protocol::attributes;
use tb_protocol::provision::ProvisionResponse;
use tb_protocol::rpc::RpcRequest;
use tb_protocol::topics::{self, Route};

use crate::channel::InboundMessage;

/// A classified inbound message.
#[derive(Debug)]
pub enum IncomingMessage {
    /// Server-side RPC call; `topic` carries the correlation id.
    RpcRequest { topic: String, request: RpcRequest },
    /// Attribute push or attribute-request response (not distinguished).
    AttributeUpdate(serde_json::Map<String, serde_json::Value>),
    /// Reply to a provisioning request.
    ProvisionResponse(ProvisionResponse),
    /// One slice of a firmware image.
    FirmwareChunk { index: u32, data: Vec<u8> },
    /// Known topic, but the payload could not be decoded.
    Malformed { topic: String, reason: String },
    /// Topic outside the subscription set.
    Unknown { topic: String },
}

/// Classify a raw inbound publish into a typed message.
///
/// Uses `tb_protocol::topics::route` to pick the flow, then decodes the
/// payload for that flow.
pub fn classify(message: InboundMessage) -> IncomingMessage {
    let InboundMessage { topic, payload } = message;

    let Some(route) = topics::route(&topic) else {
        return IncomingMessage::Unknown { topic };
    };

    match route {
        Route::RpcRequest => match RpcRequest::parse(&payload) {
            Ok(request) => IncomingMessage::RpcRequest { topic, request },
            Err(e) => IncomingMessage::Malformed {
                topic,
                reason: e.to_string(),
            },
        },
        Route::Attributes => match attributes::parse_update(&payload) {
            Ok(update) => IncomingMessage::AttributeUpdate(update),
            Err(e) => IncomingMessage::Malformed {
                topic,
                reason: e.to_string(),
            },
        },
        Route::ProvisionResponse => match ProvisionResponse::parse(&payload) {
            Ok(response) => IncomingMessage::ProvisionResponse(response),
            Err(e) => IncomingMessage::Malformed {
                topic,
                reason: e.to_string(),
            },
        },
        Route::FirmwareChunk => match topics::chunk_index(&topic) {
            Some(index) => IncomingMessage::FirmwareChunk {
                index,
                data: payload,
            },
            None => IncomingMessage::Malformed {
                topic,
                reason: "missing chunk index".into(),
            },
        },
    }
}
