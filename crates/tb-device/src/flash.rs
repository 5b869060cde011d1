//! Firmware image sink.
//!
//! A `FlashWriter` receives one image at a time: `open` sizes the target,
//! `write` appends, and the image only becomes bootable on `commit`.
//! `abort` discards whatever was written and must be safe to call when
//! nothing is open.

use std::sync::{Arc, Mutex};

use crate::error::{FlashError, FlashResult};

pub trait FlashWriter {
    /// Prepare a new target for an image of `size` bytes.
    fn open(&mut self, size: u64) -> FlashResult<()>;

    /// Append bytes. Returns how many were accepted; fewer than
    /// `data.len()` is a partial write.
    fn write(&mut self, data: &[u8]) -> FlashResult<usize>;

    /// Make the written image the active one.
    fn commit(&mut self) -> FlashResult<()>;

    /// Discard the open target, if any.
    fn abort(&mut self);
}

/// Snapshot of everything a `MemoryFlash` has seen.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlashLog {
    /// Sizes passed to `open`, in order.
    pub opens: Vec<u64>,
    /// Bytes written to the currently open target.
    pub staged: Vec<u8>,
    /// Image made active by the last successful commit.
    pub committed: Option<Vec<u8>>,
    pub commits: usize,
    pub aborts: usize,
    pub is_open: bool,
}

#[derive(Debug, Default)]
struct Faults {
    fail_open: bool,
    fail_commit: bool,
    /// Truncate the write with this zero-based call number.
    short_write_at: Option<usize>,
    writes: usize,
}

#[derive(Debug, Default)]
struct Inner {
    log: FlashLog,
    faults: Faults,
}

/// In-memory `FlashWriter` for tests and dry runs.
///
/// Clones share state, so a test keeps one handle for inspection while
/// the client owns another.
#[derive(Debug, Clone, Default)]
pub struct MemoryFlash {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryFlash {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn log(&self) -> FlashLog {
        self.inner.lock().unwrap().log.clone()
    }

    pub fn fail_open(&self) {
        self.inner.lock().unwrap().faults.fail_open = true;
    }

    pub fn fail_commit(&self) {
        self.inner.lock().unwrap().faults.fail_commit = true;
    }

    /// Accept only half of the bytes on the `nth` write call (zero-based).
    pub fn short_write_at(&self, nth: usize) {
        self.inner.lock().unwrap().faults.short_write_at = Some(nth);
    }
}

impl FlashWriter for MemoryFlash {
    fn open(&mut self, size: u64) -> FlashResult<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.log.opens.push(size);
        if inner.faults.fail_open {
            return Err(FlashError::Open("no space for image".into()));
        }
        inner.log.staged.clear();
        inner.log.is_open = true;
        Ok(())
    }

    fn write(&mut self, data: &[u8]) -> FlashResult<usize> {
        let mut inner = self.inner.lock().unwrap();
        if !inner.log.is_open {
            return Err(FlashError::NotOpen);
        }
        let call = inner.faults.writes;
        inner.faults.writes += 1;
        let accepted = if inner.faults.short_write_at == Some(call) {
            data.len() / 2
        } else {
            data.len()
        };
        inner.log.staged.extend_from_slice(&data[..accepted]);
        Ok(accepted)
    }

    fn commit(&mut self) -> FlashResult<()> {
        let mut inner = self.inner.lock().unwrap();
        if !inner.log.is_open {
            return Err(FlashError::NotOpen);
        }
        if inner.faults.fail_commit {
            return Err(FlashError::Commit("image rejected by bootloader".into()));
        }
        inner.log.is_open = false;
        inner.log.commits += 1;
        inner.log.committed = Some(std::mem::take(&mut inner.log.staged));
        Ok(())
    }

    fn abort(&mut self) {
        let mut inner = self.inner.lock().unwrap();
        inner.log.aborts += 1;
        inner.log.is_open = false;
        inner.log.staged.clear();
    }
}
