//! Shared scripted-server harness for the scenario tests.
//!
//! `ServerScript` answers the device the way a ThingsBoard server would:
//! provisioning requests, shared-attribute requests and firmware chunk
//! requests. Everything the device publishes stays recorded in the
//! `MockChannel` for assertions.

#![allow(dead_code)]

use std::sync::Arc;

use md5::{Digest, Md5};
use serde_json::{Value, json};
use tb_device::{Callbacks, Credential, DeviceClient, ManualClock, MemoryConfigStore, MemoryFlash};
use tb_mqtt_channel::{InboundMessage, MockChannel, PublishedMessage};

pub const TITLE: &str = "gadadar";

/// Deterministic firmware image of `len` bytes.
pub fn image(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 7 % 251) as u8).collect()
}

pub fn md5_hex(data: &[u8]) -> String {
    format!("{:x}", Md5::digest(data))
}

/// A firmware image offered through shared attributes.
#[derive(Debug, Clone)]
pub struct Offer {
    pub title: String,
    pub version: String,
    pub image: Vec<u8>,
    pub checksum: String,
    pub algorithm: String,
}

impl Offer {
    pub fn new(version: &str, image: Vec<u8>) -> Self {
        Self {
            title: TITLE.to_string(),
            version: version.to_string(),
            checksum: md5_hex(&image),
            algorithm: "MD5".to_string(),
            image,
        }
    }

    fn attributes(&self) -> Value {
        json!({
            "fw_title": self.title,
            "fw_version": self.version,
            "fw_checksum": self.checksum,
            "fw_checksum_algorithm": self.algorithm,
            "fw_size": self.image.len(),
        })
    }
}

/// Behaviour of the scripted server.
#[derive(Debug, Clone, Default)]
pub struct ServerScript {
    /// Access token issued on provisioning; `None` rejects the request.
    pub issue_token: Option<String>,
    /// Firmware offered through shared attributes.
    pub offer: Option<Offer>,
    /// Extra shared attributes merged into every attribute response.
    pub shared: Option<Value>,
}

impl ServerScript {
    pub fn issuing(token: &str) -> Self {
        Self {
            issue_token: Some(token.to_string()),
            ..Default::default()
        }
    }

    pub fn offering(offer: Offer) -> Self {
        Self {
            offer: Some(offer),
            ..Default::default()
        }
    }

    /// Attach this script to `mock` as its responder.
    pub fn install(self, mock: &MockChannel) {
        mock.respond_with(move |msg| self.answer(msg));
    }

    fn answer(&self, msg: &PublishedMessage) -> Vec<InboundMessage> {
        if msg.topic == "/provision/request" {
            let body = match &self.issue_token {
                Some(token) => json!({
                    "status": "SUCCESS",
                    "credentialsType": "ACCESS_TOKEN",
                    "credentialsValue": token,
                }),
                None => json!({"status": "ERROR", "errorMsg": "Provision data was not found!"}),
            };
            return vec![InboundMessage::new("/provision/response", body.to_string())];
        }

        if let Some(id) = msg.topic.strip_prefix("v1/devices/me/attributes/request/") {
            let mut shared = serde_json::Map::new();
            if let Some(offer) = &self.offer {
                if let Some(attrs) = offer.attributes().as_object() {
                    shared.extend(attrs.clone());
                }
            }
            if let Some(Value::Object(extra)) = &self.shared {
                shared.extend(extra.clone());
            }
            let body = json!({ "shared": shared }).to_string();
            return vec![InboundMessage::new(
                format!("v1/devices/me/attributes/response/{id}"),
                body,
            )];
        }

        if let Some(rest) = msg.topic.strip_prefix("v2/fw/request/") {
            let Some(offer) = &self.offer else {
                return Vec::new();
            };
            let Some(index) = rest.rsplit('/').next().and_then(|s| s.parse::<usize>().ok()) else {
                return Vec::new();
            };
            let chunk_size: usize = String::from_utf8_lossy(&msg.payload).parse().unwrap_or(4096);
            let start = (index * chunk_size).min(offer.image.len());
            let end = (start + chunk_size).min(offer.image.len());
            return vec![InboundMessage::new(
                format!("v2/fw/response/0/chunk/{index}"),
                offer.image[start..end].to_vec(),
            )];
        }

        Vec::new()
    }
}

/// A connected, subscribed client over a shared mock.
pub struct Device {
    pub client: DeviceClient<Arc<MockChannel>>,
    pub mock: Arc<MockChannel>,
    pub clock: ManualClock,
    pub flash: MemoryFlash,
    pub store: MemoryConfigStore,
}

pub fn device(callbacks: Callbacks) -> Device {
    let mock = Arc::new(MockChannel::new());
    let clock = ManualClock::new();
    let flash = MemoryFlash::new();
    let store = MemoryConfigStore::new(tb_device::DeviceConfig::fail_safe("dev-e2e"));
    let mut client = DeviceClient::new(Arc::clone(&mock))
        .with_clock(clock.clone())
        .with_flash(flash.clone())
        .with_config_store(store.clone());
    client
        .connect("tb.local", &Credential::AccessToken("T".into()), 1883, "TbDev")
        .expect("connect");
    client.subscribe(callbacks).expect("subscribe");
    Device {
        client,
        mock,
        clock,
        flash,
        store,
    }
}

/// Firmware states reported as telemetry, in order.
pub fn reported_states(mock: &MockChannel) -> Vec<String> {
    mock.published_to("v1/devices/me/telemetry")
        .iter()
        .filter_map(|m| m.json()["current_fw_state"].as_str().map(String::from))
        .collect()
}

/// Chunk indices requested by the device, in order.
pub fn requested_chunks(mock: &MockChannel) -> Vec<u32> {
    mock.published_with_prefix("v2/fw/request/")
        .iter()
        .filter_map(|m| m.topic.rsplit('/').next()?.parse().ok())
        .collect()
}
