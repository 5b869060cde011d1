//! Per-chunk handling of an OTA image: flash writes, MD5 accumulation
//! and the verify-then-commit step.

use md5::{Digest, Md5};
use tb_protocol::firmware::FirmwareState;

use crate::flash::FlashWriter;

/// What the server offered, as read from shared attributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirmwareDescriptor {
    pub title: String,
    pub version: String,
    /// Expected lowercase hex digest.
    pub checksum: String,
    pub algorithm: String,
    pub size: u64,
}

/// State of the image currently being received.
///
/// Chunks are only accepted while a descriptor is armed. Chunk 0 always
/// restarts the transfer.
#[derive(Default)]
pub struct FirmwareTransfer {
    descriptor: Option<FirmwareDescriptor>,
    bytes_received: u64,
    hasher: Md5,
    last_chunk: Option<u32>,
    status: Option<FirmwareState>,
    flash_open: bool,
}

impl std::fmt::Debug for FirmwareTransfer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FirmwareTransfer")
            .field("descriptor", &self.descriptor)
            .field("bytes_received", &self.bytes_received)
            .field("last_chunk", &self.last_chunk)
            .field("status", &self.status)
            .field("flash_open", &self.flash_open)
            .finish_non_exhaustive()
    }
}

impl FirmwareTransfer {
    pub fn arm(&mut self, descriptor: FirmwareDescriptor) {
        self.descriptor = Some(descriptor);
        self.bytes_received = 0;
        self.hasher = Md5::new();
        self.last_chunk = None;
        self.status = None;
    }

    /// Stop accepting chunks, discarding any unfinished image.
    pub fn disarm(&mut self, flash: Option<&mut dyn FlashWriter>) {
        self.abort_flash(flash);
        self.descriptor = None;
        self.last_chunk = None;
    }

    pub fn descriptor(&self) -> Option<&FirmwareDescriptor> {
        self.descriptor.as_ref()
    }

    pub fn bytes_received(&self) -> u64 {
        self.bytes_received
    }

    pub fn last_chunk(&self) -> Option<u32> {
        self.last_chunk
    }

    /// Forget which chunk arrived last, so a re-request waits for a fresh one.
    pub fn clear_last_chunk(&mut self) {
        self.last_chunk = None;
    }

    pub fn status(&self) -> Option<FirmwareState> {
        self.status
    }

    pub fn is_writing(&self) -> bool {
        self.flash_open
    }

    /// Process one received chunk.
    pub fn handle_chunk(&mut self, index: u32, data: &[u8], flash: Option<&mut dyn FlashWriter>) {
        let Some((size, checksum)) = self
            .descriptor
            .as_ref()
            .map(|d| (d.size, d.checksum.clone()))
        else {
            tracing::debug!(chunk = index, "no firmware download armed, chunk dropped");
            return;
        };

        tracing::debug!(chunk = index, len = data.len(), "firmware chunk received");
        self.last_chunk = Some(index);
        self.status = Some(FirmwareState::Downloading);

        let Some(flash) = flash else {
            tracing::error!("no flash writer configured");
            self.status = Some(FirmwareState::UpdateError);
            return;
        };

        if index == 0 {
            self.bytes_received = 0;
            self.hasher = Md5::new();
            if self.flash_open {
                flash.abort();
                self.flash_open = false;
            }
            if let Err(e) = flash.open(size) {
                tracing::error!(error = %e, size, "cannot open update target");
                self.status = Some(FirmwareState::UpdateError);
                return;
            }
            self.flash_open = true;
        } else if !self.flash_open {
            // Only chunk 0 reopens the target.
            tracing::warn!(chunk = index, "no update target open, chunk dropped");
            self.status = Some(FirmwareState::UpdateError);
            return;
        }

        match flash.write(data) {
            Ok(written) if written == data.len() => {}
            Ok(written) => {
                tracing::error!(chunk = index, written, len = data.len(), "partial flash write");
                return self.fail_write(flash);
            }
            Err(e) => {
                tracing::error!(chunk = index, error = %e, "flash write failed");
                return self.fail_write(flash);
            }
        }

        self.hasher.update(data);
        self.bytes_received += data.len() as u64;

        if self.bytes_received == size {
            self.verify_and_commit(&checksum, flash);
        }
    }

    fn fail_write(&mut self, flash: &mut dyn FlashWriter) {
        flash.abort();
        self.flash_open = false;
        self.status = Some(FirmwareState::UpdateError);
    }

    fn verify_and_commit(&mut self, expected: &str, flash: &mut dyn FlashWriter) {
        let digest = format!("{:x}", std::mem::take(&mut self.hasher).finalize());
        tracing::info!(computed = %digest, expected = %expected, "firmware image complete");

        self.flash_open = false;
        if digest != expected {
            tracing::warn!("firmware checksum mismatch");
            flash.abort();
            self.status = Some(FirmwareState::ChecksumError);
            return;
        }

        match flash.commit() {
            Ok(()) => {
                tracing::info!("firmware update committed");
                self.status = Some(FirmwareState::Success);
            }
            Err(e) => {
                tracing::error!(error = %e, "firmware commit failed");
                self.status = Some(FirmwareState::Failed);
            }
        }
    }

    fn abort_flash(&mut self, flash: Option<&mut dyn FlashWriter>) {
        if self.flash_open {
            if let Some(flash) = flash {
                flash.abort();
            }
            self.flash_open = false;
        }
    }
}
