//! CLI surface tests: argument validation, exit codes, and error output.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

use gambit_cli::config::{DeployConfig, PathsConfig};

/// A configuration whose every path lives under the temp dir and whose
/// bundle source is a closed local port.
fn write_config(tmp: &TempDir) -> std::path::PathBuf {
    let mut config = DeployConfig::default();
    config.paths = PathsConfig::rooted(&tmp.path().join("app"), &tmp.path().join("home"));
    config.paths.log_file = None;
    config.bundles.base_url = "http://127.0.0.1:9/bundles".to_string();
    let path = tmp.path().join("config.toml");
    config.save_to(&path).unwrap();
    path
}

fn gambit() -> Command {
    Command::cargo_bin("gambit").unwrap()
}

#[test]
fn help_lists_the_subcommands() {
    gambit()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("update"))
        .stdout(predicate::str::contains("install"))
        .stdout(predicate::str::contains("restore"))
        .stdout(predicate::str::contains("snapshot"));
}

#[test]
fn install_requires_a_variant() {
    let tmp = TempDir::new().unwrap();
    let config = write_config(&tmp);
    gambit()
        .args(["--config", config.to_str().unwrap(), "install"])
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("VARIANT"));
}

#[test]
fn install_rejects_unknown_variants() {
    let tmp = TempDir::new().unwrap();
    let config = write_config(&tmp);
    gambit()
        .args(["--config", config.to_str().unwrap(), "install", "full"])
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("unknown variant"));
}

#[test]
fn restore_rejects_unknown_scopes() {
    let tmp = TempDir::new().unwrap();
    let config = write_config(&tmp);
    gambit()
        .args(["--config", config.to_str().unwrap(), "restore", "bogus-scope"])
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("Unrecognized restore scope"));
}

#[test]
fn restore_single_bundle_without_backup_fails() {
    let tmp = TempDir::new().unwrap();
    let config = write_config(&tmp);
    gambit()
        .args(["--config", config.to_str().unwrap(), "restore", "books"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("No backup available"));
}

#[test]
fn restore_all_reports_partial_results() {
    let tmp = TempDir::new().unwrap();
    let config_path = write_config(&tmp);

    // A vault copy for 'books' only
    let vault = tmp.path().join("home/bundle-backup/books");
    std::fs::create_dir_all(&vault).unwrap();
    std::fs::write(vault.join("opening.bin"), b"book").unwrap();

    gambit()
        .args(["--config", config_path.to_str().unwrap(), "restore", "all"])
        .assert()
        .failure()
        .code(1)
        .stdout(predicate::str::contains("Restored books"))
        .stdout(predicate::str::contains("no backup available"));

    // The one restorable bundle really was restored
    assert!(tmp.path().join("app/books/opening.bin").exists());
}

#[test]
fn explicit_missing_config_is_a_config_error() {
    gambit()
        .args(["--config", "/nonexistent/gambit.toml", "run"])
        .assert()
        .failure()
        .code(4)
        .stderr(predicate::str::contains("Configuration file not found"));
}

#[test]
fn run_without_request_exits_cleanly() {
    let tmp = TempDir::new().unwrap();
    let config = write_config(&tmp);
    gambit().args(["--config", config.to_str().unwrap(), "run"]).assert().success();
}
