//! CLI argument parsing tests for Pistelink

use assert_cmd::Command;
use predicates::prelude::*;

/// Get a command instance for the piste binary
fn piste() -> Command {
    Command::new(env!("CARGO_BIN_EXE_piste"))
}

#[test]
fn test_help_flag() {
    let mut cmd = piste();
    cmd.arg("--help");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("Agent link and cache diagnostics"))
        .stdout(predicate::str::contains("--help"))
        .stdout(predicate::str::contains("--version"));
}

#[test]
fn test_version_flag() {
    let mut cmd = piste();
    cmd.arg("--version");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("0.1.0"));
}

#[test]
fn test_no_args_shows_help() {
    let mut cmd = piste();
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Usage"));
}

// ============================================================================
// Fetch command tests
// ============================================================================

#[test]
fn test_fetch_help_lists_capabilities() {
    let mut cmd = piste();
    cmd.args(["fetch", "--help"]);
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("terrain"))
        .stdout(predicate::str::contains("weather"))
        .stdout(predicate::str::contains("equipment"));
}

#[test]
fn test_fetch_terrain_requires_run() {
    let mut cmd = piste();
    cmd.args(["fetch", "terrain"]);
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("--run"));
}

#[test]
fn test_fetch_terrain_rejects_unsupported_grid() {
    let mut cmd = piste();
    cmd.args(["fetch", "terrain", "--run", "alpine-a", "--grid", "48x48"]);
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("unsupported grid size"));
}

#[test]
fn test_fetch_weather_requires_area() {
    let mut cmd = piste();
    cmd.args(["fetch", "weather"]);
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("--area"));
}

// ============================================================================
// Offline command tests
// ============================================================================

#[test]
fn test_offline_requires_run() {
    let mut cmd = piste();
    cmd.arg("offline");
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("--run"));
}

// ============================================================================
// Cache command tests
// ============================================================================

#[test]
fn test_cache_help_lists_subcommands() {
    let mut cmd = piste();
    cmd.args(["cache", "--help"]);
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("stats"))
        .stdout(predicate::str::contains("cleanup"))
        .stdout(predicate::str::contains("clear"));
}

#[test]
fn test_cache_rejects_unknown_subcommand() {
    let mut cmd = piste();
    cmd.args(["cache", "evict"]);
    cmd.assert().failure();
}

// ============================================================================
// Monitor command tests
// ============================================================================

#[test]
fn test_monitor_help_shows_interval() {
    let mut cmd = piste();
    cmd.args(["monitor", "--help"]);
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("--interval"));
}
