//! Shared vocabulary for poll-driven flows.

/// Progress of a multi-step flow advanced by repeated `poll` calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Poll<T> {
    Pending,
    Done(T),
    TimedOut,
}

impl<T> Poll<T> {
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }
}

/// Pause between polls in the blocking wrappers.
pub const POLL_INTERVAL_MS: u64 = 5;

/// Deadline check shared by the flows: expired once `now` is past it.
pub(crate) fn expired(now_ms: u64, deadline_ms: u64) -> bool {
    now_ms > deadline_ms
}
