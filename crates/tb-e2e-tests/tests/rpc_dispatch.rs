//! Server-side RPC calls and outbound data through a live session.

mod helpers;

use std::sync::{Arc, Mutex};

use helpers::device;
use serde_json::{Value, json};
use tb_device::{CALLBACK_CAPACITY, Callbacks, ClientError, DataScope};
use tb_protocol::KeyValue;

#[test]
fn handler_reply_uses_request_correlation_id() {
    let mut dev = device(Callbacks::new().rpc("getTemp", |_| KeyValue::new("temp", 21.5)));

    dev.mock.push_inbound(
        "v1/devices/me/rpc/request/314",
        r#"{"method":"getTemp","params":{}}"#,
    );
    assert!(dev.client.pump());

    let reply = dev.mock.last_published().unwrap();
    assert_eq!(reply.topic, "v1/devices/me/rpc/response/314");
    assert_eq!(reply.json(), json!({"temp": 21.5}));
}

#[test]
fn string_encoded_params_reach_handler_decoded() {
    let seen = Arc::new(Mutex::new(Value::Null));
    let sink = Arc::clone(&seen);
    let mut dev = device(Callbacks::new().rpc("setRelay", move |params| {
        *sink.lock().unwrap() = params.clone();
        KeyValue::new("setRelay", true)
    }));

    dev.mock.push_inbound(
        "v1/devices/me/rpc/request/1",
        r#"{"method":"setRelay","params":"{\"pin\":4,\"state\":\"ON\"}"}"#,
    );
    dev.client.pump();

    assert_eq!(*seen.lock().unwrap(), json!({"pin": 4, "state": "ON"}));
}

#[test]
fn first_registration_wins() {
    let mut dev = device(
        Callbacks::new()
            .rpc("ping", |_| KeyValue::new("ping", "first"))
            .rpc("ping", |_| KeyValue::new("ping", "second")),
    );
    dev.mock
        .push_inbound("v1/devices/me/rpc/request/2", r#"{"method":"ping"}"#);
    dev.client.pump();
    assert_eq!(dev.mock.last_published().unwrap().json()["ping"], "first");
}

#[test]
fn unknown_method_publishes_nothing() {
    let mut dev = device(Callbacks::new().rpc("fireAndForget", |_| KeyValue::new("ok", 1)));

    dev.mock
        .push_inbound("v1/devices/me/rpc/request/3", r#"{"method":"nope"}"#);
    dev.client.pump();
    assert!(dev.mock.published().is_empty());

    dev.mock
        .push_inbound("v1/devices/me/rpc/request/4", r#"{"method":"fireAndForget"}"#);
    dev.client.pump();
    let reply = dev.mock.last_published().unwrap();
    assert_eq!(reply.topic, "v1/devices/me/rpc/response/4");
    assert_eq!(reply.json(), json!({"ok": 1}));
}

#[test]
fn oversized_reply_is_dropped() {
    let big = "x".repeat(4_000);
    let mut dev = device(Callbacks::new().rpc("dump", move |_| KeyValue::new("dump", big.as_str())));

    dev.mock
        .push_inbound("v1/devices/me/rpc/request/5", r#"{"method":"dump"}"#);
    dev.client.pump();
    assert!(dev.mock.published().is_empty());
}

#[test]
fn malformed_request_is_skipped() {
    let calls = Arc::new(Mutex::new(0));
    let counter = Arc::clone(&calls);
    let mut dev = device(Callbacks::new().rpc("ping", move |_| {
        *counter.lock().unwrap() += 1;
        KeyValue::new("ping", 1)
    }));

    dev.mock.push_inbound("v1/devices/me/rpc/request/6", "not json");
    dev.mock
        .push_inbound("v1/devices/me/rpc/request/7", r#"{"method":"ping"}"#);
    assert!(dev.client.pump());
    assert!(dev.client.pump());

    assert_eq!(*calls.lock().unwrap(), 1);
    assert_eq!(
        dev.mock.last_published().unwrap().topic,
        "v1/devices/me/rpc/response/7"
    );
}

#[test]
fn too_many_handlers_rejected_without_subscribing() {
    let mut dev = device(Callbacks::new());
    dev.client.disconnect();
    dev.client
        .connect(
            "tb.local",
            &tb_device::Credential::AccessToken("T".into()),
            1883,
            "TbDev",
        )
        .unwrap();
    let before = dev.mock.subscriptions().len();

    let callbacks = (0..=CALLBACK_CAPACITY).fold(Callbacks::new(), |cb, i| {
        cb.rpc(&format!("m{i}"), |_| KeyValue::new("ok", 1))
    });
    let err = dev.client.subscribe(callbacks).unwrap_err();

    assert!(matches!(err, ClientError::TableFull { .. }));
    assert_eq!(dev.mock.subscriptions().len(), before);
    assert!(!dev.client.is_subscribed());
}

#[test]
fn telemetry_attributes_and_claim() {
    let dev = device(Callbacks::new());

    dev.client
        .send_telemetry(&[KeyValue::new("temp", 20), KeyValue::new("hum", 55.5)])
        .unwrap();
    dev.client
        .send_keyval(DataScope::Attributes, &KeyValue::new("relay1", true))
        .unwrap();
    dev.client.send_claim_request("s3cret", 60_000).unwrap();

    let published = dev.mock.published();
    assert_eq!(published[0].topic, "v1/devices/me/telemetry");
    assert_eq!(published[0].json(), json!({"temp": 20, "hum": 55.5}));
    assert_eq!(published[1].topic, "v1/devices/me/attributes");
    assert_eq!(published[1].json(), json!({"relay1": true}));
    assert_eq!(published[2].topic, "v1/devices/me/claim");
    assert_eq!(published[2].json(), json!({"secretKey": "s3cret", "durationMs": 60000}));
}

#[test]
fn dropped_session_rejects_publishes() {
    let dev = device(Callbacks::new());
    dev.mock.drop_connection();
    let err = dev
        .client
        .send_telemetry(&[KeyValue::new("temp", 1)])
        .unwrap_err();
    assert!(matches!(err, ClientError::NotConnected));
}
