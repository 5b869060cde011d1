//! OTA firmware descriptor keys, state strings and telemetry payloads.

use serde::{Deserialize, Serialize};

/// Size requested for each firmware chunk.
pub const CHUNK_SIZE: u32 = 4096;

/// The only checksum algorithm the device verifies.
pub const SUPPORTED_CHECKSUM_ALGORITHM: &str = "MD5";

pub const FW_TITLE: &str = "fw_title";
pub const FW_VERSION: &str = "fw_version";
pub const FW_CHECKSUM: &str = "fw_checksum";
pub const FW_CHECKSUM_ALGORITHM: &str = "fw_checksum_algorithm";
pub const FW_SIZE: &str = "fw_size";

/// Shared attribute keys describing the firmware offered by the server.
pub const DESCRIPTOR_KEYS: [&str; 5] = [
    FW_CHECKSUM,
    FW_CHECKSUM_ALGORITHM,
    FW_SIZE,
    FW_TITLE,
    FW_VERSION,
];

/// Number of chunk requests needed for an image of `size` bytes, or `None`
/// when the count does not fit a chunk index.
pub fn chunk_count(size: u64, chunk_size: u32) -> Option<u32> {
    u32::try_from(size.div_ceil(u64::from(chunk_size))).ok()
}

/// Firmware update state as reported through `current_fw_state`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FirmwareState {
    #[serde(rename = "CHECKING FIRMWARE")]
    Checking,
    #[serde(rename = "DOWNLOADING")]
    Downloading,
    #[serde(rename = "UP TO DATE")]
    UpToDate,
    #[serde(rename = "NO FIRMWARE FOUND")]
    NotFound,
    #[serde(rename = "CHKS IS NOT MD5")]
    ChecksumUnsupported,
    #[serde(rename = "UPDATE ERROR")]
    UpdateError,
    #[serde(rename = "CHECKSUM ERROR")]
    ChecksumError,
    #[serde(rename = "SUCCESS")]
    Success,
    #[serde(rename = "FAILED")]
    Failed,
}

impl FirmwareState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Checking => "CHECKING FIRMWARE",
            Self::Downloading => "DOWNLOADING",
            Self::UpToDate => "UP TO DATE",
            Self::NotFound => "NO FIRMWARE FOUND",
            Self::ChecksumUnsupported => "CHKS IS NOT MD5",
            Self::UpdateError => "UPDATE ERROR",
            Self::ChecksumError => "CHECKSUM ERROR",
            Self::Success => "SUCCESS",
            Self::Failed => "FAILED",
        }
    }

    /// Whether the state ends an update attempt.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Checking | Self::Downloading)
    }
}

impl std::fmt::Display for FirmwareState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Running firmware announcement, published as telemetry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FirmwareInfo {
    pub current_fw_title: String,
    pub current_fw_version: String,
}

/// Update state report, published as telemetry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FirmwareStateReport {
    pub current_fw_state: FirmwareState,
}
