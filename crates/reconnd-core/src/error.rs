//! Error taxonomy shared by the scheduler, the pool and the backoff policy.

use std::io;

/// Errors surfaced by reconnd components.
///
/// Nothing here is fatal to the owning process. `ShutdownRace` is only
/// returned by the `try_*` entry points; the plain entry points log it and
/// drop the work.
#[derive(Debug, thiserror::Error)]
pub enum ReconnError {
    /// Malformed backoff schedule or an out-of-contract failure count.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Work was offered to a component after its `shutdown()`.
    #[error("{component} is shut down; submission dropped")]
    ShutdownRace { component: &'static str },

    /// A thread or runtime backing a component could not be started.
    #[error("failed to start {what}")]
    Spawn {
        what: &'static str,
        #[source]
        source: io::Error,
    },

    /// A task panicked, or a [`fallible`](crate::task::fallible) task returned
    /// `Err`, inside its worker. Reported in logs only, never propagated.
    #[error("reconnection task failed on {worker}: {message}")]
    TaskExecution { worker: String, message: String },
}

impl ReconnError {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        ReconnError::InvalidArgument(msg.into())
    }
}
