use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::backoff::{BackoffSchedule, DEFAULT_SCHEDULE};
use crate::error::ReconnError;
use crate::pool::DEFAULT_KEEP_ALIVE;

/// Global configuration loaded from `~/.config/reconnd/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnConfig {
    /// Comma-separated backoff schedule in seconds, indexed by consecutive failure count.
    pub reconnection_periods: String,
    /// Seconds an idle reconnection worker waits for work before exiting.
    pub worker_keep_alive_secs: u64,
    /// Name prefix of the timer thread (suffixed with a sequence number).
    pub scheduler_thread_prefix: String,
    /// Name prefix of reconnection worker threads.
    pub worker_thread_prefix: String,
}

impl Default for ReconnConfig {
    fn default() -> Self {
        Self {
            reconnection_periods: DEFAULT_SCHEDULE.to_string(),
            worker_keep_alive_secs: DEFAULT_KEEP_ALIVE.as_secs(),
            scheduler_thread_prefix: "reconnd-scheduler-".to_string(),
            worker_thread_prefix: "reconnd-worker-".to_string(),
        }
    }
}

impl ReconnConfig {
    /// Parse `reconnection_periods`. Malformed schedules fail here, at construction time.
    pub fn backoff_schedule(&self) -> Result<BackoffSchedule, ReconnError> {
        self.reconnection_periods.parse()
    }

    /// Check the fields that only fail later, at coordinator construction.
    pub fn validate(&self) -> Result<()> {
        self.backoff_schedule().with_context(|| {
            format!(
                "invalid reconnection_periods {:?}",
                self.reconnection_periods
            )
        })?;
        Ok(())
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("reconnd")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<ReconnConfig> {
    let cfg = read_or_init()?;
    cfg.validate()?;
    Ok(cfg)
}

/// Load and validate configuration from an explicit file.
pub fn load_from_path(path: &Path) -> Result<ReconnConfig> {
    let cfg = read_from_path(path)?;
    cfg.validate()
        .with_context(|| format!("config {}", path.display()))?;
    Ok(cfg)
}

/// Like [`load_or_init`] but without [`ReconnConfig::validate`], for callers
/// that override fields before validating.
pub fn read_or_init() -> Result<ReconnConfig> {
    let path = config_path()?;
    if !path.exists() {
        let default_cfg = ReconnConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }
    read_from_path(&path)
}

/// Read and parse a config file. Field values are not validated.
pub fn read_from_path(path: &Path) -> Result<ReconnConfig> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    let cfg: ReconnConfig =
        toml::from_str(&data).with_context(|| format!("parsing config {}", path.display()))?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_values() {
        let cfg = ReconnConfig::default();
        assert_eq!(cfg.reconnection_periods, "1,5,15");
        assert_eq!(cfg.worker_keep_alive_secs, 60);
        assert_eq!(cfg.backoff_schedule().unwrap().periods_secs(), &[1, 5, 15]);
    }

    #[test]
    fn config_toml_roundtrip() {
        let cfg = ReconnConfig::default();
        let toml = toml::to_string_pretty(&cfg).unwrap();
        let parsed: ReconnConfig = toml::from_str(&toml).unwrap();
        assert_eq!(parsed.reconnection_periods, cfg.reconnection_periods);
        assert_eq!(parsed.worker_keep_alive_secs, cfg.worker_keep_alive_secs);
        assert_eq!(parsed.worker_thread_prefix, cfg.worker_thread_prefix);
    }

    #[test]
    fn config_toml_partial_uses_defaults() {
        let toml = r#"
            reconnection_periods = "2, 4, 8, 30"
        "#;
        let cfg: ReconnConfig = toml::from_str(toml).unwrap();
        assert_eq!(cfg.backoff_schedule().unwrap().periods_secs(), &[2, 4, 8, 30]);
        assert_eq!(cfg.worker_keep_alive_secs, 60);
        assert_eq!(cfg.scheduler_thread_prefix, "reconnd-scheduler-");
    }

    #[test]
    fn load_from_path_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            "reconnection_periods = \"3,9\"\nworker_keep_alive_secs = 5\n",
        )
        .unwrap();
        let cfg = load_from_path(&path).unwrap();
        assert_eq!(cfg.worker_keep_alive_secs, 5);
        assert_eq!(cfg.backoff_schedule().unwrap().last_secs(), 9);
    }

    #[test]
    fn load_from_path_rejects_bad_schedule() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "reconnection_periods = \"1,0\"\n").unwrap();
        let err = load_from_path(&path).unwrap_err();
        assert!(format!("{:#}", err).contains("invalid reconnection_periods"));
    }

    #[test]
    fn read_from_path_defers_validation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "reconnection_periods = \"\"\n").unwrap();
        let mut cfg = read_from_path(&path).unwrap();
        assert!(cfg.validate().is_err());

        cfg.reconnection_periods = "2".into();
        cfg.validate().unwrap();
    }
}
