//! CLI command handlers, one per file.

mod periods;
mod simulate;

pub use periods::run_periods;
pub use simulate::{run_simulate, SimulateOptions};
