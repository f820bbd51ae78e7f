//! The unit of work handed around by the scheduler and the pool.

use std::any::Any;
use std::fmt;
use std::thread;

use crate::error::ReconnError;

/// A reconnection attempt: callable once, no arguments, no result.
///
/// Tasks handle their own errors. A task that panics is contained by the
/// worker running it and reported in logs. Attempts written as
/// `Result`-returning closures can be wrapped with [`fallible`] to get the
/// same treatment for an `Err`.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Adapt a `Result`-returning attempt into a task. An `Err` is logged at
/// `warn` as [`ReconnError::TaskExecution`] with the running thread's name
/// and goes no further.
pub fn fallible<F, E>(attempt: F) -> impl FnOnce() + Send + 'static
where
    F: FnOnce() -> Result<(), E> + Send + 'static,
    E: fmt::Display,
{
    move || {
        if let Err(err) = run_fallible(attempt) {
            tracing::warn!("{}", err);
        }
    }
}

fn run_fallible<F, E>(attempt: F) -> Result<(), ReconnError>
where
    F: FnOnce() -> Result<(), E>,
    E: fmt::Display,
{
    attempt().map_err(|e| ReconnError::TaskExecution {
        worker: thread::current().name().unwrap_or("unnamed").to_string(),
        message: format!("{:#}", e),
    })
}

/// Best-effort text of a panic payload for log messages.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
