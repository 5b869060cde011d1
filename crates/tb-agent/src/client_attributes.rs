//! Client-side attribute documents published on sync.
//!
//! Provisioning secrets and the access token are never published.

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Value, json};
use tb_device::{ClientResult, DeviceClient, DeviceConfig};
use tb_mqtt_channel::Channel;

use crate::config::AgentConfig;

/// Firmware identity and agent build information.
pub fn firmware_document(config: &AgentConfig, booted_at: DateTime<Utc>) -> Value {
    json!({
        "fmTitle": config.firmware_title,
        "fmVersion": config.firmware_version,
        "agentVersion": env!("CARGO_PKG_VERSION"),
        "bootedAt": booted_at.to_rfc3339_opts(SecondsFormat::Secs, true),
    })
}

/// The non-secret part of the device config.
pub fn device_document(device: &DeviceConfig) -> Value {
    json!({
        "name": device.name,
        "model": device.model,
        "group": device.group,
        "broker": device.broker,
        "port": device.port,
        "logLev": device.log_level,
    })
}

/// Publish both documents as client attributes.
pub fn sync<C: Channel>(
    client: &DeviceClient<C>,
    config: &AgentConfig,
    device: &DeviceConfig,
    booted_at: DateTime<Utc>,
) -> ClientResult<()> {
    client.send_attributes_json(&firmware_document(config, booted_at))?;
    client.send_attributes_json(&device_document(device))?;
    tracing::debug!("client attributes synced");
    Ok(())
}
