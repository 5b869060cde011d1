use serde::Deserialize;

/// MQTT transport settings, loadable from TOML.
///
/// Broker address and credentials are not part of this struct: they live
/// in the persisted device config and are passed per connection.
#[derive(Debug, Clone, Deserialize)]
pub struct MqttConfig {
    /// MQTT client ID presented on connect.
    #[serde(default = "default_client_id")]
    pub client_id: String,
    /// Enable TLS. When false, connects plaintext (local dev).
    #[serde(default = "default_use_tls")]
    pub use_tls: bool,
    /// Path to the CA certificate used to verify the broker (PEM).
    #[serde(default)]
    pub ca_cert_path: String,
    /// Keep-alive interval in seconds.
    #[serde(default = "default_keepalive")]
    pub keepalive_secs: u16,
    /// How long to wait for CONNACK before giving up.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    /// Largest MQTT packet accepted or produced, in bytes.
    #[serde(default = "default_max_packet_size")]
    pub max_packet_size: usize,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            client_id: default_client_id(),
            use_tls: default_use_tls(),
            ca_cert_path: String::new(),
            keepalive_secs: default_keepalive(),
            connect_timeout_secs: default_connect_timeout(),
            max_packet_size: default_max_packet_size(),
        }
    }
}

fn default_client_id() -> String {
    "TbDev".to_string()
}

fn default_use_tls() -> bool {
    true
}

fn default_keepalive() -> u16 {
    30
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_max_packet_size() -> usize {
    // One 4 KiB firmware chunk plus topic and header headroom.
    8 * 1024
}
