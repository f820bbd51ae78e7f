//! On-demand execution pool for reconnection attempts.
//!
//! Every submitted task goes straight to a thread: an idle worker if one is
//! waiting, otherwise a freshly spawned one. There is no queue of unassigned
//! work and no upper bound on workers. Idle workers retire after the
//! keep-alive period.
//!
//! The pool is unbounded on purpose: reconnections are rare and a slow or hung
//! attempt must never hold up another peer. The flip side is that a task that
//! never returns pins its thread forever, and a burst of hung tasks grows the
//! thread count without limit. Tasks are expected to carry their own timeouts.

mod worker;

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use crate::error::ReconnError;
use crate::task::Task;
use crate::thread_name::ThreadNamer;

const COMPONENT: &str = "execution pool";

/// How long an idle worker waits for new work before exiting.
pub const DEFAULT_KEEP_ALIVE: Duration = Duration::from_secs(60);

struct State {
    /// Tasks handed to idle workers but not yet picked up. Never longer than `idle`.
    handoff: VecDeque<Task>,
    idle: usize,
    live: usize,
    shutdown: bool,
}

pub(super) struct Shared {
    state: Mutex<State>,
    available: Condvar,
    terminated: Condvar,
    keep_alive: Duration,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, State> {
        // Tasks never run under this lock, so poisoning only follows a bug here.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Park as idle until a task is handed over. `None` means retire: the
    /// keep-alive expired or the pool shut down with nothing left to pick up.
    ///
    /// The keep-alive is measured from the moment the worker went idle.
    /// Wakeups that bring no task do not restart it.
    pub(super) fn next_task(&self) -> Option<Task> {
        let retire_at = Instant::now() + self.keep_alive;
        let mut state = self.lock();
        state.idle += 1;
        loop {
            if let Some(task) = state.handoff.pop_front() {
                state.idle -= 1;
                return Some(task);
            }
            if state.shutdown {
                break;
            }
            let remaining = retire_at.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            let (guard, _) = self
                .available
                .wait_timeout(state, remaining)
                .unwrap_or_else(PoisonError::into_inner);
            state = guard;
        }
        state.idle -= 1;
        Self::retire(&mut state, &self.terminated);
        None
    }

    fn retire(state: &mut State, terminated: &Condvar) {
        state.live -= 1;
        if state.live == 0 {
            terminated.notify_all();
        }
    }
}

/// Unbounded, on-demand thread pool. Workers are named `<prefix>N`.
pub struct ExecutionPool {
    shared: Arc<Shared>,
    namer: ThreadNamer,
}

impl fmt::Debug for ExecutionPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.lock();
        f.debug_struct("ExecutionPool")
            .field("prefix", &self.namer.prefix())
            .field("live", &state.live)
            .field("idle", &state.idle)
            .field("shutdown", &state.shutdown)
            .finish()
    }
}

impl ExecutionPool {
    pub fn new(thread_prefix: &str, keep_alive: Duration) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State {
                    handoff: VecDeque::new(),
                    idle: 0,
                    live: 0,
                    shutdown: false,
                }),
                available: Condvar::new(),
                terminated: Condvar::new(),
                keep_alive,
            }),
            namer: ThreadNamer::new(thread_prefix),
        }
    }

    /// Run `task` on an idle or new worker and return immediately.
    ///
    /// After `shutdown()` the task is dropped with a warning.
    pub fn submit<F>(&self, task: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if let Err(e) = self.dispatch(Box::new(task)) {
            tracing::warn!("{}", e);
        }
    }

    /// Like [`submit`](Self::submit) but reports a shutdown race or a failed
    /// thread spawn to the caller.
    pub fn try_submit<F>(&self, task: F) -> Result<(), ReconnError>
    where
        F: FnOnce() + Send + 'static,
    {
        self.dispatch(Box::new(task))
    }

    pub(crate) fn dispatch(&self, task: Task) -> Result<(), ReconnError> {
        let mut state = self.shared.lock();
        if state.shutdown {
            return Err(ReconnError::ShutdownRace {
                component: COMPONENT,
            });
        }
        if state.idle > state.handoff.len() {
            state.handoff.push_back(task);
            drop(state);
            self.shared.available.notify_one();
            return Ok(());
        }
        state.live += 1;
        drop(state);
        self.spawn_worker(task)
    }

    fn spawn_worker(&self, task: Task) -> Result<(), ReconnError> {
        let name = self.namer.next_name();
        let shared = Arc::clone(&self.shared);
        let worker_name = name.clone();
        let spawned = thread::Builder::new()
            .name(name.clone())
            .spawn(move || worker::run_worker(shared, worker_name, task));
        match spawned {
            Ok(_) => {
                tracing::debug!(worker = %name, "spawned reconnection worker");
                Ok(())
            }
            Err(source) => {
                let mut state = self.shared.lock();
                Shared::retire(&mut state, &self.shared.terminated);
                Err(ReconnError::Spawn {
                    what: "worker thread",
                    source,
                })
            }
        }
    }

    /// Workers currently alive, busy or idle.
    pub fn live_workers(&self) -> usize {
        self.shared.lock().live
    }

    /// Workers parked and waiting for a hand-off.
    pub fn idle_workers(&self) -> usize {
        self.shared.lock().idle
    }

    pub fn is_shutdown(&self) -> bool {
        self.shared.lock().shutdown
    }

    /// Stop accepting tasks. In-flight tasks run to completion; idle workers
    /// exit right away. Does not wait; see [`await_termination`](Self::await_termination).
    pub fn shutdown(&self) {
        let mut state = self.shared.lock();
        if state.shutdown {
            return;
        }
        state.shutdown = true;
        let live = state.live;
        drop(state);
        self.shared.available.notify_all();
        self.shared.terminated.notify_all();
        tracing::info!(live_workers = live, "execution pool shut down; in-flight tasks will finish");
    }

    /// Block until the pool is shut down and every worker has exited, or the
    /// timeout elapses. Returns true on termination.
    pub fn await_termination(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.shared.lock();
        while !(state.shutdown && state.live == 0) {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return false;
            }
            let (guard, _) = self
                .shared
                .terminated
                .wait_timeout(state, remaining)
                .unwrap_or_else(PoisonError::into_inner);
            state = guard;
        }
        true
    }
}

impl Drop for ExecutionPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}
