//! Wire types for the ThingsBoard device MQTT protocol.
//!
//! Shared by the MQTT channel (inbound classification) and the device
//! client (outbound publishing). Nothing in here performs I/O.

pub mod attributes;
pub mod claim;
pub mod codec;
pub mod error;
pub mod firmware;
pub mod provision;
pub mod rpc;
pub mod topics;
pub mod value;

pub use codec::{DEFAULT_PAYLOAD_CAPACITY, encode_capped};
pub use error::{ProtocolError, ProtocolResult};
pub use value::{KeyValue, Value};
