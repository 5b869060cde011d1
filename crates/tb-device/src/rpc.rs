//! Server-side RPC dispatch.

use tb_protocol::encode_capped;
use tb_protocol::rpc::RpcRequest;
use tb_protocol::topics;

use crate::callbacks::CallbackTable;

/// An encoded RPC reply ready to publish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RpcReply {
    pub topic: String,
    pub payload: Vec<u8>,
}

/// Run the first handler registered for the request's method.
///
/// Returns `None` when nothing should be published: no handler for the
/// method, or a reply larger than `capacity`.
pub(crate) fn dispatch(
    table: &mut CallbackTable,
    topic: &str,
    request: &RpcRequest,
    capacity: usize,
) -> Option<RpcReply> {
    let Some(handler) = table.rpc_handler(&request.method) else {
        tracing::debug!(method = %request.method, "no handler for RPC method");
        return None;
    };

    tracing::info!(method = %request.method, topic = %topic, "dispatching RPC");
    let reply = handler(&request.resolved_params());

    match encode_capped(&reply, capacity) {
        Ok(payload) => Some(RpcReply {
            topic: topics::rpc_response_for(topic),
            payload,
        }),
        Err(e) => {
            tracing::warn!(method = %request.method, error = %e, "RPC reply dropped");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callbacks::Callbacks;
    use serde_json::json;
    use std::cell::RefCell;
    use std::rc::Rc;
    use tb_protocol::KeyValue;

    const TOPIC: &str = "v1/devices/me/rpc/request/42";

    fn request(payload: &[u8]) -> RpcRequest {
        RpcRequest::parse(payload).unwrap()
    }

    #[test]
    fn reply_goes_to_response_topic() {
        let mut table =
            CallbackTable::install(Callbacks::new().rpc("ping", |_| KeyValue::new("pong", true)))
                .unwrap();
        let reply = dispatch(&mut table, TOPIC, &request(br#"{"method":"ping"}"#), 1500).unwrap();
        assert_eq!(reply.topic, "v1/devices/me/rpc/response/42");
        assert_eq!(reply.payload, br#"{"pong":true}"#);
    }

    #[test]
    fn handler_sees_resolved_params() {
        let seen = Rc::new(RefCell::new(serde_json::Value::Null));
        let sink = Rc::clone(&seen);
        let mut table = CallbackTable::install(Callbacks::new().rpc("set", move |params| {
            *sink.borrow_mut() = params.clone();
            KeyValue::new("set", 1)
        }))
        .unwrap();

        let req = request(br#"{"method":"set","params":"{\"ch\":2,\"on\":true}"}"#);
        let reply = dispatch(&mut table, TOPIC, &req, 1500).unwrap();
        assert_eq!(reply.payload, br#"{"set":1}"#);
        assert_eq!(*seen.borrow(), json!({"ch": 2, "on": true}));
    }

    #[test]
    fn duplicate_names_first_wins() {
        let mut table = CallbackTable::install(
            Callbacks::new()
                .rpc("dup", |_| KeyValue::new("dup", "first"))
                .rpc("dup", |_| KeyValue::new("dup", "second")),
        )
        .unwrap();
        let reply = dispatch(&mut table, TOPIC, &request(br#"{"method":"dup"}"#), 1500).unwrap();
        assert_eq!(reply.payload, br#"{"dup":"first"}"#);
    }

    #[test]
    fn unknown_method_sends_nothing() {
        let mut table =
            CallbackTable::install(Callbacks::new().rpc("a", |_| KeyValue::new("ok", 1))).unwrap();
        assert!(dispatch(&mut table, TOPIC, &request(br#"{"method":"b"}"#), 1500).is_none());
    }

    #[test]
    fn oversized_reply_is_dropped() {
        let mut table = CallbackTable::install(
            Callbacks::new().rpc("big", |_| KeyValue::new("blob", "x".repeat(2000))),
        )
        .unwrap();
        assert!(dispatch(&mut table, TOPIC, &request(br#"{"method":"big"}"#), 1500).is_none());
    }
}
