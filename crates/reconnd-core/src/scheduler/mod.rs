//! Delay scheduler: wait, then hand off.
//!
//! One dedicated timer thread owns the delay queue and runs a current-thread
//! tokio runtime for its sleeps. Callers never block: `schedule_after` only
//! pushes onto an unbounded channel. When a deadline passes, the timer thread
//! runs the retry's closure, which is expected to be a non-blocking hand-off
//! (the coordinator hands off to the execution pool). Blocking work done
//! directly on the timer thread would delay every other armed retry.

mod handle;
mod timer;

pub use handle::{RetryHandle, RetryState};

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::error::ReconnError;
use crate::task::Task;
use crate::thread_name::ThreadNamer;
use timer::{Command, PendingRetry};

const COMPONENT: &str = "delay scheduler";

/// Far-future cap for delays that would overflow `Instant`.
const MAX_DELAY: Duration = Duration::from_secs(86_400 * 365 * 30);

/// Single-threaded timer queue for pending retries.
#[derive(Debug)]
pub struct DelayScheduler {
    tx: mpsc::UnboundedSender<Command>,
    closed: Arc<AtomicBool>,
    pending: Arc<AtomicUsize>,
    timer: Mutex<Option<JoinHandle<()>>>,
    thread_name: String,
}

impl DelayScheduler {
    /// Start the timer thread, named `<thread_prefix>0`.
    pub fn start(thread_prefix: &str) -> Result<Self, ReconnError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .map_err(|source| ReconnError::Spawn {
                what: "timer runtime",
                source,
            })?;

        let (tx, rx) = mpsc::unbounded_channel();
        let pending = Arc::new(AtomicUsize::new(0));
        let loop_pending = Arc::clone(&pending);
        let closed = Arc::new(AtomicBool::new(false));
        let loop_closed = Arc::clone(&closed);
        let thread_name = ThreadNamer::new(thread_prefix).next_name();

        let timer = thread::Builder::new()
            .name(thread_name.clone())
            .spawn(move || runtime.block_on(timer::run_timer_loop(rx, loop_pending, loop_closed)))
            .map_err(|source| ReconnError::Spawn {
                what: "timer thread",
                source,
            })?;

        tracing::debug!(thread = %thread_name, "delay scheduler started");
        Ok(Self {
            tx,
            closed,
            pending,
            timer: Mutex::new(Some(timer)),
            thread_name,
        })
    }

    /// Arm `task` to run no earlier than `delay` from now. Never blocks.
    ///
    /// After `shutdown()` the task is dropped with a warning and the returned
    /// handle is already cancelled.
    pub fn schedule_after<F>(&self, delay: Duration, task: F) -> RetryHandle
    where
        F: FnOnce() + Send + 'static,
    {
        self.schedule_retry(None, delay, Box::new(task))
    }

    /// Like [`schedule_after`](Self::schedule_after) but reports a shutdown
    /// race to the caller instead of logging it.
    pub fn try_schedule_after<F>(&self, delay: Duration, task: F) -> Result<RetryHandle, ReconnError>
    where
        F: FnOnce() + Send + 'static,
    {
        self.arm(None, delay, Box::new(task))
    }

    pub(crate) fn schedule_retry(&self, target: Option<String>, delay: Duration, task: Task) -> RetryHandle {
        match self.arm(target.clone(), delay, task) {
            Ok(handle) => handle,
            Err(e) => {
                tracing::warn!(peer = target.as_deref().unwrap_or("-"), "{}", e);
                RetryHandle::cancelled()
            }
        }
    }

    fn arm(&self, target: Option<String>, delay: Duration, task: Task) -> Result<RetryHandle, ReconnError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(ReconnError::ShutdownRace {
                component: COMPONENT,
            });
        }
        let now = Instant::now();
        let deadline = now
            .checked_add(delay)
            .unwrap_or_else(|| now + MAX_DELAY);
        let handle = RetryHandle::new();
        self.pending.fetch_add(1, Ordering::AcqRel);
        let retry = PendingRetry {
            target,
            deadline,
            task,
            handle: handle.clone(),
        };
        if self.tx.send(Command::Arm(retry)).is_err() {
            // Timer loop already gone: shutdown won the race.
            self.pending.fetch_sub(1, Ordering::AcqRel);
            handle.discard();
            return Err(ReconnError::ShutdownRace {
                component: COMPONENT,
            });
        }
        Ok(handle)
    }

    /// Retries armed but not yet fired or discarded.
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    pub fn is_shutdown(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn thread_name(&self) -> &str {
        &self.thread_name
    }

    /// Stop accepting retries, discard everything still armed and wait for
    /// the timer thread to exit. Once the first call returns, no retry fires.
    /// Later calls return immediately.
    pub fn shutdown(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let _ = self.tx.send(Command::Shutdown);
        let timer = self
            .timer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(timer) = timer {
            if timer.thread().id() == thread::current().id() {
                // Called from a hand-off: the loop sees `closed` before the
                // next hand-off and discards the rest of the batch.
                tracing::debug!("delay scheduler shutdown requested from the timer thread");
                return;
            }
            if timer.join().is_err() {
                tracing::warn!("timer thread panicked during shutdown");
            }
        }
        tracing::info!("delay scheduler shut down");
    }
}

impl Drop for DelayScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}
