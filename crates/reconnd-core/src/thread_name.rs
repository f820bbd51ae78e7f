//! Sequentially numbered thread names for the timer and worker threads.
//!
//! Names are for logs and debuggers only; nothing depends on them for correctness.

use std::sync::atomic::{AtomicUsize, Ordering};

/// Produces `prefix0`, `prefix1`, ... in spawn order.
#[derive(Debug)]
pub struct ThreadNamer {
    prefix: String,
    sequence: AtomicUsize,
}

impl ThreadNamer {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            sequence: AtomicUsize::new(0),
        }
    }

    pub fn next_name(&self) -> String {
        let n = self.sequence.fetch_add(1, Ordering::Relaxed);
        format!("{}{}", self.prefix, n)
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }
}
