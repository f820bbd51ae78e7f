//! Cancellation handle for one armed retry.
//!
//! The handle and the timer thread share a small state cell. Whichever side
//! moves it out of `PENDING` first wins: a cancelled retry is dropped by the
//! timer instead of being handed off, and a fired retry can no longer be
//! cancelled.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

const PENDING: u8 = 0;
const FIRED: u8 = 1;
const CANCELLED: u8 = 2;

/// Observable state of a scheduled retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryState {
    /// Armed and waiting for its deadline.
    Pending,
    /// Handed off for execution.
    Fired,
    /// Cancelled before its deadline, or dropped because the scheduler shut down.
    Cancelled,
}

/// Returned by `schedule_after`. Dropping the handle does not cancel the retry.
#[derive(Debug, Clone)]
pub struct RetryHandle {
    state: Arc<AtomicU8>,
}

impl RetryHandle {
    pub(crate) fn new() -> Self {
        Self {
            state: Arc::new(AtomicU8::new(PENDING)),
        }
    }

    /// A handle for work that was never armed (e.g. offered after shutdown).
    pub(crate) fn cancelled() -> Self {
        Self {
            state: Arc::new(AtomicU8::new(CANCELLED)),
        }
    }

    /// Cancel the retry if it has not fired yet. Returns true if this call
    /// prevented the hand-off.
    pub fn cancel(&self) -> bool {
        self.state
            .compare_exchange(PENDING, CANCELLED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn state(&self) -> RetryState {
        match self.state.load(Ordering::Acquire) {
            PENDING => RetryState::Pending,
            FIRED => RetryState::Fired,
            _ => RetryState::Cancelled,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.state() == RetryState::Cancelled
    }

    /// Timer side: claim the retry for hand-off. False if it was cancelled.
    pub(crate) fn try_fire(&self) -> bool {
        self.state
            .compare_exchange(PENDING, FIRED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Timer side: the retry was discarded at shutdown.
    pub(crate) fn discard(&self) {
        let _ = self.cancel();
    }
}
