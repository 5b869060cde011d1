//! Device provisioning request/response payloads.

use serde::{Deserialize, Serialize};

use crate::error::ProtocolResult;

/// Token value that selects provisioning mode on connect.
pub const PROVISION_SENTINEL: &str = "provision";

/// Published to `/provision/request`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvisionRequest {
    pub device_name: String,
    pub provision_device_key: String,
    pub provision_device_secret: String,
}

/// Credential kind issued by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CredentialsType {
    AccessToken,
    MqttBasic,
    X509Certificate,
    #[serde(other)]
    Unknown,
}

/// Received on `/provision/response`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvisionResponse {
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials_type: Option<CredentialsType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials_value: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_msg: Option<String>,
}

impl ProvisionResponse {
    pub fn parse(payload: &[u8]) -> ProtocolResult<Self> {
        Ok(serde_json::from_slice(payload)?)
    }

    pub fn is_success(&self) -> bool {
        self.status == "SUCCESS"
    }

    /// The issued access token, if the credential is a plain string.
    pub fn access_token(&self) -> Option<&str> {
        self.credentials_value.as_ref()?.as_str()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_wire_names() {
        let req = ProvisionRequest {
            device_name: "UDAWA0A1B2C3D4E5F".into(),
            provision_device_key: "key".into(),
            provision_device_secret: "secret".into(),
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["deviceName"], "UDAWA0A1B2C3D4E5F");
        assert_eq!(json["provisionDeviceKey"], "key");
        assert_eq!(json["provisionDeviceSecret"], "secret");
    }

    #[test]
    fn parse_access_token_response() {
        let resp = ProvisionResponse::parse(
            br#"{"status":"SUCCESS","credentialsType":"ACCESS_TOKEN","credentialsValue":"T"}"#,
        )
        .unwrap();
        assert!(resp.is_success());
        assert_eq!(resp.credentials_type, Some(CredentialsType::AccessToken));
        assert_eq!(resp.access_token(), Some("T"));
    }

    #[test]
    fn parse_error_response() {
        let resp = ProvisionResponse::parse(br#"{"status":"ERROR","errorMsg":"x"}"#).unwrap();
        assert!(!resp.is_success());
        assert_eq!(resp.error_msg.as_deref(), Some("x"));
        assert!(resp.credentials_type.is_none());
    }

    #[test]
    fn parse_mqtt_basic_structured_value() {
        let resp = ProvisionResponse::parse(
            br#"{"status":"SUCCESS","credentialsType":"MQTT_BASIC","credentialsValue":{"clientId":"c","userName":"u","password":"p"}}"#,
        )
        .unwrap();
        assert_eq!(resp.credentials_type, Some(CredentialsType::MqttBasic));
        assert!(resp.access_token().is_none());
    }

    #[test]
    fn unknown_credentials_type() {
        let resp = ProvisionResponse::parse(
            br#"{"status":"SUCCESS","credentialsType":"LWM2M_CREDENTIALS"}"#,
        )
        .unwrap();
        assert_eq!(resp.credentials_type, Some(CredentialsType::Unknown));
    }

    #[test]
    fn missing_status_is_error() {
        assert!(ProvisionResponse::parse(br#"{"errorMsg":"x"}"#).is_err());
    }
}
