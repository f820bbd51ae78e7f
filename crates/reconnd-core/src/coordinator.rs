//! Reconnection coordinator: the facade callers talk to.
//!
//! Turns a failure report into a delay (via [`BackoffPolicy`]), arms the delay
//! in the [`DelayScheduler`], and on firing hands the task to the
//! [`ExecutionPool`]. The timer thread only ever performs that hand-off.
//!
//! Per peer the caller drives `Connected -> Failed(n) -> Scheduled -> Retrying
//! -> Connected | Failed(n + 1)`. None of that state lives here: failure counts
//! are taken as given, and nothing stops two retries for the same peer from
//! being in flight if the caller reports twice.

use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;

use crate::backoff::BackoffPolicy;
use crate::config::ReconnConfig;
use crate::error::ReconnError;
use crate::pool::ExecutionPool;
use crate::scheduler::{DelayScheduler, RetryHandle};

/// One per process. Build it in `main` and share it by reference or `Arc`.
#[derive(Debug)]
pub struct ReconnectionCoordinator {
    policy: BackoffPolicy,
    scheduler: DelayScheduler,
    pool: Arc<ExecutionPool>,
}

impl ReconnectionCoordinator {
    /// Build from config: parses the backoff schedule and starts the timer thread.
    pub fn from_config(cfg: &ReconnConfig) -> Result<Self, ReconnError> {
        let policy = BackoffPolicy::new(cfg.backoff_schedule()?);
        let scheduler = DelayScheduler::start(&cfg.scheduler_thread_prefix)?;
        let pool = ExecutionPool::new(
            &cfg.worker_thread_prefix,
            Duration::from_secs(cfg.worker_keep_alive_secs),
        );
        Ok(Self::with_parts(policy, scheduler, pool))
    }

    pub fn with_parts(policy: BackoffPolicy, scheduler: DelayScheduler, pool: ExecutionPool) -> Self {
        tracing::info!(schedule = %policy.schedule(), "reconnection coordinator started");
        Self {
            policy,
            scheduler,
            pool: Arc::new(pool),
        }
    }

    /// Report that `peer` failed for the `failure_count`-th consecutive time
    /// (zero-based) and arm `task` to run after the matching backoff.
    ///
    /// Never blocks. After `shutdown()` the task is dropped and the returned
    /// handle is already cancelled.
    pub fn on_failure<P, F>(&self, peer: &P, failure_count: u32, task: F) -> RetryHandle
    where
        P: Display + ?Sized,
        F: FnOnce() + Send + 'static,
    {
        let delay = self.policy.period_for(failure_count);
        let peer = peer.to_string();
        tracing::info!(
            peer = %peer,
            failure_count,
            delay_secs = delay.as_secs(),
            "scheduling reconnect"
        );
        let pool = Arc::clone(&self.pool);
        self.scheduler
            .schedule_retry(Some(peer), delay, Box::new(move || pool.submit(task)))
    }

    /// Run `task` on the pool now, skipping the backoff (first connect attempts).
    pub fn execute_reconnect<F>(&self, task: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.pool.submit(task);
    }

    pub fn policy(&self) -> &BackoffPolicy {
        &self.policy
    }

    pub fn scheduler(&self) -> &DelayScheduler {
        &self.scheduler
    }

    pub fn pool(&self) -> &ExecutionPool {
        &self.pool
    }

    /// Stop the scheduler first so nothing new reaches the pool, then the
    /// pool, which lets in-flight attempts finish. Safe to call more than once.
    pub fn shutdown(&self) {
        self.scheduler.shutdown();
        self.pool.shutdown();
    }
}

impl Drop for ReconnectionCoordinator {
    fn drop(&mut self) {
        self.shutdown();
    }
}
