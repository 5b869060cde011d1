//! Agent configuration, loadable from TOML.

use serde::Deserialize;
use tb_mqtt_channel::MqttConfig;

/// Top-level configuration for the agent.
///
/// Device identity and credentials are not here: they live in the JSON
/// document at `state_path`, which the server can update at runtime.
#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    /// Name used when the device document has to be recreated.
    #[serde(default = "default_device_name")]
    pub device_name: String,
    /// Firmware title announced for OTA checks.
    #[serde(default = "default_firmware_title")]
    pub firmware_title: String,
    /// Firmware version announced for OTA checks.
    #[serde(default = "default_firmware_version")]
    pub firmware_version: String,
    /// Persisted device document (JSON).
    #[serde(default = "default_state_path")]
    pub state_path: String,
    /// Where a firmware image is written while downloading.
    #[serde(default = "default_staging_path")]
    pub staging_path: String,
    /// Where a verified image is moved on commit.
    #[serde(default = "default_image_path")]
    pub image_path: String,
    /// Device telemetry interval in seconds.
    #[serde(default = "default_telemetry_interval")]
    pub telemetry_interval_secs: u64,
    /// Pause between failed connection attempts, in seconds.
    #[serde(default = "default_reconnect_interval")]
    pub reconnect_interval_secs: u64,
    /// MQTT transport settings.
    #[serde(default)]
    pub mqtt: MqttConfig,
}

fn default_device_name() -> String {
    "tb-device".to_string()
}

fn default_firmware_title() -> String {
    "tb-agent".to_string()
}

fn default_firmware_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

fn default_state_path() -> String {
    "/var/lib/tb-agent/device.json".to_string()
}

fn default_staging_path() -> String {
    "/var/lib/tb-agent/firmware.part".to_string()
}

fn default_image_path() -> String {
    "/var/lib/tb-agent/firmware.bin".to_string()
}

fn default_telemetry_interval() -> u64 {
    60
}

fn default_reconnect_interval() -> u64 {
    5
}

impl AgentConfig {
    /// Load config from a TOML file path.
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        Ok(config)
    }
}

/// Map the device document's numeric log level onto a tracing filter.
///
/// Used only when `RUST_LOG` is not set.
pub fn log_directive(level: u8) -> &'static str {
    match level {
        0 => "off",
        1 => "error",
        2 => "warn",
        3 | 4 => "info",
        5 => "debug",
        _ => "trace",
    }
}
