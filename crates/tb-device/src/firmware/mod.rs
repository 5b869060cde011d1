//! OTA firmware update engine.
//!
//! `FirmwareUpdate` walks one update attempt:
//!
//! ```text
//! announce version -> wait for descriptor -> { UP TO DATE | NO FIRMWARE FOUND | CHKS IS NOT MD5 }
//!                                         -> download chunks -> { SUCCESS | CHECKSUM ERROR | UPDATE ERROR | FAILED }
//! ```
//!
//! Every attempt ends by reporting `current_fw_state` telemetry.

pub mod transfer;

use tb_mqtt_channel::Channel;
use tb_protocol::firmware::{
    self, CHUNK_SIZE, DESCRIPTOR_KEYS, FirmwareState, SUPPORTED_CHECKSUM_ALGORITHM,
};
use tb_protocol::topics;

use crate::attributes::SharedAttributeSnapshot;
use crate::client::DeviceClient;
use crate::error::ClientResult;
use crate::flow::{self, Poll};

pub use transfer::{FirmwareDescriptor, FirmwareTransfer};

/// Wait for the firmware descriptor attributes.
pub const ATTRIBUTE_TIMEOUT_MS: u64 = 3000;
/// Wait for each requested chunk.
pub const CHUNK_TIMEOUT_MS: u64 = 3000;
/// Retries shared by every chunk of one transfer.
pub const RETRY_BUDGET: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Announce,
    AwaitDescriptor { deadline_ms: u64 },
    RequestChunk { index: u32 },
    AwaitChunk { index: u32, deadline_ms: u64 },
    Finished(FirmwareState),
}

/// One firmware update attempt, advanced by `poll`.
#[derive(Debug, Clone)]
pub struct FirmwareUpdate {
    current_title: String,
    current_version: String,
    phase: Phase,
    chunk_count: u32,
    retries_left: u32,
    chunk_requests: u32,
}

impl FirmwareUpdate {
    pub fn new(current_title: &str, current_version: &str) -> Self {
        Self {
            current_title: current_title.to_string(),
            current_version: current_version.to_string(),
            phase: Phase::Announce,
            chunk_count: 0,
            retries_left: RETRY_BUDGET,
            chunk_requests: 0,
        }
    }

    /// Chunk requests published so far.
    pub fn chunk_requests(&self) -> u32 {
        self.chunk_requests
    }

    pub fn retries_left(&self) -> u32 {
        self.retries_left
    }

    pub fn poll<C: Channel>(
        &mut self,
        client: &mut DeviceClient<C>,
    ) -> ClientResult<Poll<FirmwareState>> {
        match self.phase {
            Phase::Announce => {
                client.begin_firmware_check();
                client.send_firmware_info(&self.current_title, &self.current_version)?;
                if let Err(e) = client.send_firmware_state(FirmwareState::Checking) {
                    tracing::warn!(error = %e, "failed to report firmware state");
                }
                client.request_shared_attributes(&DESCRIPTOR_KEYS)?;
                self.phase = Phase::AwaitDescriptor {
                    deadline_ms: client.now_ms() + ATTRIBUTE_TIMEOUT_MS,
                };
            }
            Phase::AwaitDescriptor { deadline_ms } => {
                client.pump();
                if client.shared_attributes().has_descriptor() {
                    let snapshot = client.shared_attributes().clone();
                    self.evaluate(client, &snapshot);
                } else if flow::expired(client.now_ms(), deadline_ms) {
                    tracing::info!("no firmware descriptor received");
                    self.finish(client, FirmwareState::NotFound);
                }
            }
            Phase::RequestChunk { index } => {
                client.clear_last_chunk();
                let topic = topics::firmware_chunk_request(index);
                if let Err(e) = client.publish_raw(&topic, CHUNK_SIZE.to_string().as_bytes()) {
                    // Counts against the budget once the wait expires.
                    tracing::warn!(chunk = index, error = %e, "chunk request not sent");
                }
                self.chunk_requests += 1;
                self.phase = Phase::AwaitChunk {
                    index,
                    deadline_ms: client.now_ms() + CHUNK_TIMEOUT_MS,
                };
            }
            Phase::AwaitChunk { index, deadline_ms } => {
                client.pump();
                if client.last_chunk() == Some(index) {
                    self.on_chunk_arrived(client, index);
                } else if flow::expired(client.now_ms(), deadline_ms) {
                    tracing::warn!(chunk = index, "chunk timed out");
                    self.spend_retry(client, index);
                }
            }
            Phase::Finished(state) => return Ok(Poll::Done(state)),
        }

        match self.phase {
            Phase::Finished(state) => Ok(Poll::Done(state)),
            _ => Ok(Poll::Pending),
        }
    }

    fn evaluate<C: Channel>(
        &mut self,
        client: &mut DeviceClient<C>,
        snapshot: &SharedAttributeSnapshot,
    ) {
        let title = snapshot.fw_title.clone().unwrap_or_default();
        let version = snapshot.fw_version.clone().unwrap_or_default();

        if title == self.current_title && version == self.current_version {
            tracing::info!(version = %version, "firmware is up to date");
            return self.finish(client, FirmwareState::UpToDate);
        }
        if title != self.current_title {
            tracing::info!(
                offered = %title,
                running = %self.current_title,
                "firmware is for another title"
            );
            return self.finish(client, FirmwareState::NotFound);
        }

        let algorithm = snapshot.fw_checksum_algorithm.clone().unwrap_or_default();
        if algorithm != SUPPORTED_CHECKSUM_ALGORITHM {
            tracing::warn!(algorithm = %algorithm, "unsupported checksum algorithm");
            return self.finish(client, FirmwareState::ChecksumUnsupported);
        }

        let size = snapshot.fw_size.unwrap_or(0);
        if size == 0 {
            tracing::warn!("firmware descriptor has no size");
            return self.finish(client, FirmwareState::NotFound);
        }

        let Some(chunk_count) = firmware::chunk_count(size, CHUNK_SIZE) else {
            tracing::warn!(size, "firmware image too large to download");
            return self.finish(client, FirmwareState::NotFound);
        };
        self.chunk_count = chunk_count;
        tracing::info!(
            from = %self.current_version,
            to = %version,
            size,
            chunks = self.chunk_count,
            "new firmware available, downloading"
        );
        client.arm_transfer(FirmwareDescriptor {
            title,
            version,
            checksum: snapshot.fw_checksum.clone().unwrap_or_default(),
            algorithm,
            size,
        });
        if let Err(e) = client.send_firmware_state(FirmwareState::Downloading) {
            tracing::warn!(error = %e, "failed to report firmware state");
        }
        self.phase = Phase::RequestChunk { index: 0 };
    }

    fn on_chunk_arrived<C: Channel>(&mut self, client: &mut DeviceClient<C>, index: u32) {
        let is_last = index + 1 == self.chunk_count;
        if is_last {
            return self.finish_download(client);
        }
        if client.transfer_status() == Some(FirmwareState::Downloading) {
            self.phase = Phase::RequestChunk { index: index + 1 };
        } else {
            tracing::warn!(chunk = index, status = ?client.transfer_status(), "chunk not stored");
            self.spend_retry(client, index);
        }
    }

    fn spend_retry<C: Channel>(&mut self, client: &mut DeviceClient<C>, index: u32) {
        self.retries_left = self.retries_left.saturating_sub(1);
        if self.retries_left == 0 {
            tracing::error!(chunk = index, "firmware retry budget exhausted");
            return self.finish_download(client);
        }
        self.phase = Phase::RequestChunk { index };
    }

    fn finish_download<C: Channel>(&mut self, client: &mut DeviceClient<C>) {
        let state = match client.transfer_status() {
            Some(state) if state != FirmwareState::Downloading => state,
            _ => FirmwareState::Failed,
        };
        self.finish(client, state);
    }

    fn finish<C: Channel>(&mut self, client: &mut DeviceClient<C>, state: FirmwareState) {
        client.end_firmware_check();
        if let Err(e) = client.send_firmware_state(state) {
            tracing::warn!(error = %e, state = %state, "failed to report final firmware state");
        }
        tracing::info!(state = %state, "firmware update finished");
        self.phase = Phase::Finished(state);
    }
}
