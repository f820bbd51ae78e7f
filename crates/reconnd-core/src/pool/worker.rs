//! Worker thread body: run a task, then wait for the next hand-off or retire.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use super::Shared;
use crate::error::ReconnError;
use crate::task::{panic_message, Task};

pub(super) fn run_worker(shared: Arc<Shared>, name: String, first: Task) {
    tracing::trace!(worker = %name, "worker started");
    let mut next = Some(first);
    while let Some(task) = next.take() {
        run_contained(&name, task);
        next = shared.next_task();
    }
    tracing::trace!(worker = %name, "worker retired");
}

/// Run one task. A panic is logged and swallowed so the worker, the pool and
/// every other task keep going.
fn run_contained(worker: &str, task: Task) {
    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(task)) {
        let err = ReconnError::TaskExecution {
            worker: worker.to_string(),
            message: panic_message(payload.as_ref()),
        };
        tracing::warn!(worker, "{}", err);
    }
}
