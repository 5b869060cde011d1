//! Error types for the device client and its collaborators.

use thiserror::Error;

use tb_mqtt_channel::MqttError;
use tb_protocol::ProtocolError;

/// Errors surfaced by `DeviceClient` operations.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("transport error: {0}")]
    Transport(#[from] MqttError),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("callback table full: {requested} entries, capacity {capacity}")]
    TableFull { requested: usize, capacity: usize },

    #[error("routing already active; reconnect before subscribing again")]
    AlreadySubscribed,

    #[error("client is not connected")]
    NotConnected,

    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
}

/// Convenience alias for client results.
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors raised by a `FlashWriter`.
#[derive(Debug, Error)]
pub enum FlashError {
    #[error("cannot open update target: {0}")]
    Open(String),

    #[error("write failed: {0}")]
    Write(String),

    #[error("commit failed: {0}")]
    Commit(String),

    #[error("no update target is open")]
    NotOpen,
}

pub type FlashResult<T> = Result<T, FlashError>;

/// Errors raised by a `ConfigStore`.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("config I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config document is invalid: {0}")]
    Invalid(#[from] serde_json::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;
