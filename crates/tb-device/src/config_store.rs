//! Persistent device configuration.
//!
//! The document is JSON with the field names the device has always used
//! on disk (`accessToken`, `provSent`, `logLev`, ...).

use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use crate::error::StoreResult;

/// Device identity, broker address and credentials.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceConfig {
    pub name: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub group: String,
    pub broker: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub access_token: String,
    #[serde(default)]
    pub prov_sent: bool,
    #[serde(default)]
    pub provision_device_key: String,
    #[serde(default)]
    pub provision_device_secret: String,
    #[serde(default = "default_log_level", rename = "logLev")]
    pub log_level: u8,
}

fn default_port() -> u16 {
    8883
}

fn default_log_level() -> u8 {
    5
}

impl DeviceConfig {
    /// Defaults used when no valid document exists.
    pub fn fail_safe(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            model: "Generic".to_string(),
            group: "default".to_string(),
            broker: "localhost".to_string(),
            port: default_port(),
            access_token: String::new(),
            prov_sent: false,
            provision_device_key: String::new(),
            provision_device_secret: String::new(),
            log_level: default_log_level(),
        }
    }

    pub fn has_access_token(&self) -> bool {
        !self.access_token.is_empty()
    }
}

/// Load/save access to the persisted `DeviceConfig`.
///
/// Takes `&self` so one store can be shared by the client (which writes
/// provisioned credentials) and the host (which applies config updates).
pub trait ConfigStore {
    fn load(&self) -> StoreResult<DeviceConfig>;
    fn save(&self, config: &DeviceConfig) -> StoreResult<()>;
}

#[derive(Debug)]
struct MemoryState {
    current: DeviceConfig,
    saves: Vec<DeviceConfig>,
}

/// In-memory `ConfigStore` that records every save.
#[derive(Debug, Clone)]
pub struct MemoryConfigStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryConfigStore {
    pub fn new(initial: DeviceConfig) -> Self {
        Self {
            state: Arc::new(Mutex::new(MemoryState {
                current: initial,
                saves: Vec::new(),
            })),
        }
    }

    /// The config as last saved (or the initial one).
    pub fn current(&self) -> DeviceConfig {
        self.state.lock().unwrap().current.clone()
    }

    /// Every document passed to `save`, in order.
    pub fn saves(&self) -> Vec<DeviceConfig> {
        self.state.lock().unwrap().saves.clone()
    }
}

impl ConfigStore for MemoryConfigStore {
    fn load(&self) -> StoreResult<DeviceConfig> {
        Ok(self.current())
    }

    fn save(&self, config: &DeviceConfig) -> StoreResult<()> {
        let mut state = self.state.lock().unwrap();
        state.current = config.clone();
        state.saves.push(config.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_uses_device_field_names() {
        let mut config = DeviceConfig::fail_safe("dev-1");
        config.access_token = "T".into();
        config.prov_sent = true;
        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["accessToken"], "T");
        assert_eq!(json["provSent"], true);
        assert_eq!(json["logLev"], 5);
        assert_eq!(json["provisionDeviceKey"], "");
    }

    #[test]
    fn sparse_document_gets_defaults() {
        let config: DeviceConfig =
            serde_json::from_str(r#"{"name":"dev-2","broker":"tb.example.com"}"#).unwrap();
        assert_eq!(config.port, 8883);
        assert_eq!(config.log_level, 5);
        assert!(!config.prov_sent);
        assert!(!config.has_access_token());
    }

    #[test]
    fn memory_store_records_saves() {
        let store = MemoryConfigStore::new(DeviceConfig::fail_safe("dev-3"));
        let mut config = store.load().unwrap();
        config.model = "Relay4Ch".into();
        store.save(&config).unwrap();

        assert_eq!(store.current().model, "Relay4Ch");
        assert_eq!(store.saves().len(), 1);
    }
}
