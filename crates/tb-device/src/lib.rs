//! ThingsBoard device client core.
//!
//! `DeviceClient` owns one MQTT session and everything routed through it:
//! - RPC dispatch to a small ordered callback table
//! - shared-attribute requests and the firmware descriptor snapshot
//! - the provisioning handshake
//! - chunked OTA download with MD5 verification and flash commit
//!
//! Multi-step flows are poll-driven state machines over an injected
//! `Clock`; the `DeviceClient` methods of the same name are blocking
//! wrappers around them.

pub mod attributes;
pub mod callbacks;
pub mod client;
pub mod clock;
pub mod config_store;
pub mod error;
pub mod firmware;
pub mod flash;
pub mod flow;
pub mod provision;
mod rpc;

pub use attributes::{AttributeFetch, SharedAttributeSnapshot};
pub use callbacks::{CALLBACK_CAPACITY, Callbacks};
pub use client::{Credential, DataScope, DeviceClient};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config_store::{ConfigStore, DeviceConfig, MemoryConfigStore};
pub use error::{ClientError, ClientResult, FlashError, FlashResult, StoreError, StoreResult};
pub use firmware::FirmwareUpdate;
pub use flash::{FlashLog, FlashWriter, MemoryFlash};
pub use flow::Poll;
pub use provision::{ProvisionFlow, ProvisionOutcome, ProvisioningState};
