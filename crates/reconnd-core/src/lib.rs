pub mod config;
pub mod logging;

pub mod backoff;
pub mod coordinator;
pub mod error;
pub mod pool;
pub mod scheduler;
pub mod task;
pub mod thread_name;

pub use backoff::{BackoffPolicy, BackoffSchedule};
pub use coordinator::ReconnectionCoordinator;
pub use error::ReconnError;
pub use pool::ExecutionPool;
pub use scheduler::{DelayScheduler, RetryHandle};
pub use task::{fallible, Task};
