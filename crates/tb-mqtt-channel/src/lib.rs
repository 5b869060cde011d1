//! MQTT channel for the ThingsBoard device protocol.
//!
//! Provides a typed MQTT abstraction for the device client:
//! - `Channel` trait for connect/publish/subscribe/receive (mockable in tests)
//! - `MqttChannel` backed by rumqttc, with optional server-verified TLS
//! - `MockChannel` for testing without a broker
//! - `IncomingMessage` classification for routing inbound publishes

pub mod channel;
pub mod config;
pub mod error;
pub mod handler;
pub mod mock;
pub mod tls;

// Re-exports for convenience.
pub use channel::{Channel, ConnectParams, InboundMessage, MqttChannel};
pub use config::MqttConfig;
pub use error::{MqttError, MqttResult};
pub use handler::{IncomingMessage, classify};
pub use mock::{MockChannel, PublishedMessage};
