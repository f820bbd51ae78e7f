//! Reconnection backoff policy.
//!
//! Maps a zero-based count of consecutive failures for one peer to the wait
//! before the next attempt. Lookups past the end of the schedule saturate at
//! the last entry, so waits escalate with repeated failures but never grow
//! without bound.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ReconnError;

/// Default schedule in seconds, as written in config files.
pub const DEFAULT_SCHEDULE: &str = "1,5,15";

/// Ordered, non-empty list of wait periods in whole seconds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackoffSchedule {
    periods_secs: Vec<u64>,
}

impl BackoffSchedule {
    /// Build a schedule from explicit periods. Rejects an empty list and zero entries.
    pub fn new(periods_secs: Vec<u64>) -> Result<Self, ReconnError> {
        if periods_secs.is_empty() {
            return Err(ReconnError::invalid("backoff schedule must not be empty"));
        }
        if let Some(pos) = periods_secs.iter().position(|&p| p == 0) {
            return Err(ReconnError::invalid(format!(
                "backoff schedule entry {} must be a positive number of seconds",
                pos
            )));
        }
        Ok(Self { periods_secs })
    }

    pub fn len(&self) -> usize {
        self.periods_secs.len()
    }

    /// Never true for a constructed schedule.
    pub fn is_empty(&self) -> bool {
        self.periods_secs.is_empty()
    }

    pub fn periods_secs(&self) -> &[u64] {
        &self.periods_secs
    }

    /// The ceiling of the schedule.
    pub fn last_secs(&self) -> u64 {
        // Non-empty by construction.
        self.periods_secs[self.periods_secs.len() - 1]
    }
}

impl Default for BackoffSchedule {
    fn default() -> Self {
        Self {
            periods_secs: vec![1, 5, 15],
        }
    }
}

impl FromStr for BackoffSchedule {
    type Err = ReconnError;

    /// Parse a comma-separated list such as `"1,5,15"`. Whitespace around
    /// entries is ignored; empty, zero, negative or non-numeric entries are rejected.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().is_empty() {
            return Err(ReconnError::invalid("backoff schedule must not be empty"));
        }
        let periods = s
            .split(',')
            .enumerate()
            .map(|(i, raw)| {
                let entry = raw.trim();
                entry.parse::<u64>().map_err(|_| {
                    ReconnError::invalid(format!(
                        "backoff schedule entry {} ({:?}) is not a positive integer",
                        i, entry
                    ))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(periods)
    }
}

impl fmt::Display for BackoffSchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for p in &self.periods_secs {
            if !first {
                write!(f, ",")?;
            }
            write!(f, "{}", p)?;
            first = false;
        }
        Ok(())
    }
}

/// Pure lookup from failure count to wait duration.
#[derive(Debug, Clone, Default)]
pub struct BackoffPolicy {
    schedule: BackoffSchedule,
}

impl BackoffPolicy {
    pub fn new(schedule: BackoffSchedule) -> Self {
        Self { schedule }
    }

    pub fn schedule(&self) -> &BackoffSchedule {
        &self.schedule
    }

    /// Wait before the next attempt after `failure_count` consecutive failures
    /// (zero-based). Saturates at the last schedule entry.
    pub fn period_for(&self, failure_count: u32) -> Duration {
        let secs = usize::try_from(failure_count)
            .ok()
            .and_then(|i| self.schedule.periods_secs.get(i).copied())
            .unwrap_or_else(|| self.schedule.last_secs());
        Duration::from_secs(secs)
    }

    /// Same as [`period_for`](Self::period_for) for callers holding a signed
    /// count. Negative counts are a contract violation and are rejected.
    pub fn period_for_signed(&self, failure_count: i64) -> Result<Duration, ReconnError> {
        if failure_count < 0 {
            return Err(ReconnError::invalid(format!(
                "failure count must be non-negative, got {}",
                failure_count
            )));
        }
        let count = u32::try_from(failure_count).unwrap_or(u32::MAX);
        Ok(self.period_for(count))
    }
}
