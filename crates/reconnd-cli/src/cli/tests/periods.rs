//! Tests for the periods subcommand and global flags.

use super::parse;
use crate::cli::{Cli, CliCommand};
use clap::Parser;

#[test]
fn cli_parse_periods() {
    match parse(&["reconnd", "periods", "0", "2", "10"]).command {
        CliCommand::Periods { counts } => assert_eq!(counts, vec![0, 2, 10]),
        _ => panic!("expected Periods"),
    }
}

#[test]
fn cli_parse_periods_accepts_negative_counts() {
    // Rejected later by the backoff policy, not by the parser.
    match parse(&["reconnd", "periods", "-1"]).command {
        CliCommand::Periods { counts } => assert_eq!(counts, vec![-1]),
        _ => panic!("expected Periods"),
    }
}

#[test]
fn cli_parse_periods_requires_a_count() {
    assert!(Cli::try_parse_from(["reconnd", "periods"]).is_err());
}

#[test]
fn cli_parse_global_schedule_and_config() {
    let cli = parse(&[
        "reconnd",
        "periods",
        "1",
        "--schedule",
        "2,4",
        "--config",
        "/tmp/reconnd.toml",
    ]);
    assert_eq!(cli.schedule.as_deref(), Some("2,4"));
    assert_eq!(
        cli.config.as_deref(),
        Some(std::path::Path::new("/tmp/reconnd.toml"))
    );
}

#[test]
fn resolve_config_applies_schedule_override() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "reconnection_periods = \"1,5,15\"\n").unwrap();

    let path_str = path.to_str().unwrap();
    let cli = parse(&["reconnd", "--config", path_str, "--schedule", "7", "periods", "0"]);
    let cfg = cli.resolve_config().unwrap();
    assert_eq!(cfg.reconnection_periods, "7");

    let cli = parse(&["reconnd", "--config", path_str, "periods", "0"]);
    let cfg = cli.resolve_config().unwrap();
    assert_eq!(cfg.reconnection_periods, "1,5,15");
}

#[test]
fn schedule_override_replaces_a_broken_file_schedule() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "reconnection_periods = \"1,0\"\n").unwrap();
    let path_str = path.to_str().unwrap();

    let cli = parse(&["reconnd", "--config", path_str, "--schedule", "7", "periods", "0"]);
    let cfg = cli.resolve_config().unwrap();
    assert_eq!(cfg.backoff_schedule().unwrap().periods_secs(), &[7]);

    let cli = parse(&["reconnd", "--config", path_str, "periods", "0"]);
    let err = cli.resolve_config().unwrap_err();
    assert!(format!("{:#}", err).contains("invalid reconnection_periods"));

    let cli = parse(&["reconnd", "--config", path_str, "--schedule", "abc", "periods", "0"]);
    assert!(cli.resolve_config().is_err());
}
