//! TLS configuration for broker connections.
//!
//! The device authenticates with a token over the MQTT username, so TLS
//! only needs the CA that signed the broker certificate.

use rumqttc::{TlsConfiguration, Transport};

use crate::config::MqttConfig;
use crate::error::{MqttError, MqttResult};

/// Build a TLS transport from the CA certificate path in the config.
pub fn load_tls_transport(config: &MqttConfig) -> MqttResult<Transport> {
    let ca = std::fs::read(&config.ca_cert_path).map_err(|e| {
        MqttError::Tls(format!(
            "failed to read CA cert '{}': {e}",
            config.ca_cert_path
        ))
    })?;

    Ok(Transport::tls_with_config(TlsConfiguration::Simple {
        ca,
        alpn: None,
        client_auth: None,
    }))
}
