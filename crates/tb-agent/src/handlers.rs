//! Built-in RPC methods and the shared attribute handler.

use serde_json::{Map, Value};
use tb_device::{Callbacks, ConfigStore, DeviceConfig};
use tb_protocol::KeyValue;

use crate::signals::AgentSignals;

pub const SAVE_CONFIG: &str = "saveConfig";
pub const SYNC_CLIENT_ATTRIBUTES: &str = "syncClientAttributes";
pub const REBOOT: &str = "reboot";
pub const FW_UPDATE: &str = "fwUpdate";

/// Callbacks installed for a normal (token) session.
///
/// Shared attribute pushes are saved as they arrive, so the agent holds no
/// unsaved config. `saveConfig` therefore re-persists the stored document:
/// it is loaded and written back in canonical form, with defaults filled in
/// for missing keys and a hand-edited file rewritten. It replies 1 on
/// success and 0 when the store cannot be read or written.
pub fn device_callbacks<S>(store: S, signals: AgentSignals) -> Callbacks
where
    S: ConfigStore + Clone + 'static,
{
    let save_store = store.clone();
    let sync_signals = signals.clone();
    let reboot_signals = signals.clone();
    let fw_signals = signals;

    Callbacks::new()
        .rpc(SAVE_CONFIG, move |_| {
            let saved = save_store
                .load()
                .and_then(|config| save_store.save(&config));
            match saved {
                Ok(()) => KeyValue::new(SAVE_CONFIG, 1),
                Err(e) => {
                    tracing::error!(error = %e, "saveConfig failed");
                    KeyValue::new(SAVE_CONFIG, 0)
                }
            }
        })
        .rpc(SYNC_CLIENT_ATTRIBUTES, move |_| {
            sync_signals.request_attribute_sync();
            KeyValue::new(SYNC_CLIENT_ATTRIBUTES, 1)
        })
        .rpc(REBOOT, move |_| {
            tracing::warn!("reboot requested by server");
            reboot_signals.request_reboot();
            KeyValue::new(REBOOT, 1)
        })
        .rpc(FW_UPDATE, move |_| {
            fw_signals.request_firmware_check();
            KeyValue::new(FW_UPDATE, 1)
        })
        .on_attributes(move |attributes| {
            let mut config = match store.load() {
                Ok(config) => config,
                Err(e) => {
                    tracing::error!(error = %e, "cannot load device config");
                    return;
                }
            };
            if apply_shared_attributes(&mut config, attributes) {
                match store.save(&config) {
                    Ok(()) => tracing::info!("device config updated from shared attributes"),
                    Err(e) => tracing::error!(error = %e, "cannot save device config"),
                }
            }
        })
}

/// Copy recognised shared attributes into the device config.
///
/// Returns whether anything changed. Values of the wrong type are skipped.
pub fn apply_shared_attributes(config: &mut DeviceConfig, attributes: &Map<String, Value>) -> bool {
    let mut changed = false;

    for (key, value) in attributes {
        let applied = match key.as_str() {
            "model" => set_string(&mut config.model, value),
            "group" => set_string(&mut config.group, value),
            "broker" => set_string(&mut config.broker, value),
            "provisionDeviceKey" => set_string(&mut config.provision_device_key, value),
            "provisionDeviceSecret" => set_string(&mut config.provision_device_secret, value),
            "port" => set_number(&mut config.port, value),
            "logLev" => set_number(&mut config.log_level, value),
            _ => continue,
        };
        match applied {
            Some(true) => {
                tracing::debug!(key = %key, "shared attribute applied");
                changed = true;
            }
            Some(false) => {}
            None => tracing::warn!(key = %key, value = %value, "shared attribute has the wrong type"),
        }
    }
    changed
}

fn set_string(field: &mut String, value: &Value) -> Option<bool> {
    let value = value.as_str()?;
    if field == value {
        return Some(false);
    }
    *field = value.to_string();
    Some(true)
}

fn set_number<T>(field: &mut T, value: &Value) -> Option<bool>
where
    T: TryFrom<u64> + PartialEq,
{
    let raw = match value {
        Value::Number(n) => n.as_u64()?,
        Value::String(s) => s.trim().parse().ok()?,
        _ => return None,
    };
    let parsed = T::try_from(raw).ok()?;
    if *field == parsed {
        return Some(false);
    }
    *field = parsed;
    Some(true)
}
