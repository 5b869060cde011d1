//! Requests raised by RPC handlers and the host, consumed by the agent loop.
//!
//! Handlers run inside `DeviceClient::pump`, so they cannot drive the
//! client themselves. They set a flag and the agent acts on the next tick.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Default)]
struct Flags {
    reboot: AtomicBool,
    firmware_check: AtomicBool,
    sync_attributes: AtomicBool,
    shutdown: AtomicBool,
}

/// Cloneable handle to the agent's pending requests.
#[derive(Debug, Clone, Default)]
pub struct AgentSignals {
    flags: Arc<Flags>,
}

impl AgentSignals {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_reboot(&self) {
        self.flags.reboot.store(true, Ordering::SeqCst);
    }

    pub fn request_firmware_check(&self) {
        self.flags.firmware_check.store(true, Ordering::SeqCst);
    }

    pub fn request_attribute_sync(&self) {
        self.flags.sync_attributes.store(true, Ordering::SeqCst);
    }

    pub fn request_shutdown(&self) {
        self.flags.shutdown.store(true, Ordering::SeqCst);
    }

    /// Consume a pending reboot request.
    pub fn take_reboot(&self) -> bool {
        self.flags.reboot.swap(false, Ordering::SeqCst)
    }

    pub fn take_firmware_check(&self) -> bool {
        self.flags.firmware_check.swap(false, Ordering::SeqCst)
    }

    pub fn take_attribute_sync(&self) -> bool {
        self.flags.sync_attributes.swap(false, Ordering::SeqCst)
    }

    /// Shutdown is sticky: it is observed, never consumed.
    pub fn shutdown_requested(&self) -> bool {
        self.flags.shutdown.load(Ordering::SeqCst)
    }
}
