//! `reconnd periods` – show the backoff for given failure counts.

use anyhow::{Context, Result};
use reconnd_core::config::ReconnConfig;
use reconnd_core::BackoffPolicy;

pub fn run_periods(cfg: &ReconnConfig, counts: &[i64]) -> Result<()> {
    let policy = BackoffPolicy::new(cfg.backoff_schedule().context("backoff schedule")?);
    println!("schedule: {}", policy.schedule());
    println!("{:<8} {}", "FAILURE", "WAIT");
    for &count in counts {
        let period = policy.period_for_signed(count)?;
        println!("{:<8} {}s", count, period.as_secs());
    }
    Ok(())
}
