//! End-to-end runner behavior through the binary: cooldown policy, forced
//! refreshes, and failure retention as seen by the marker files.

use assert_cmd::Command;
use chrono::{Duration, Utc};
use serial_test::serial;
use tempfile::TempDir;

use gambit_cli::config::{DeployConfig, PathsConfig};

struct Fixture {
    _tmp: TempDir,
    config_path: std::path::PathBuf,
    state_dir: std::path::PathBuf,
}

/// A deployment with a 180-second cooldown and a closed-port bundle source.
fn fixture() -> Fixture {
    let tmp = TempDir::new().unwrap();
    let mut config = DeployConfig::default();
    config.paths = PathsConfig::rooted(&tmp.path().join("app"), &tmp.path().join("home"));
    config.paths.log_file = None;
    config.bundles.base_url = "http://127.0.0.1:9/bundles".to_string();
    config.update.cooldown_secs = 180;

    let config_path = tmp.path().join("config.toml");
    config.save_to(&config_path).unwrap();
    let state_dir = config.paths.state_dir.clone();
    std::fs::create_dir_all(&state_dir).unwrap();
    Fixture {
        _tmp: tmp,
        config_path,
        state_dir,
    }
}

fn gambit(fixture: &Fixture) -> Command {
    let mut cmd = Command::cargo_bin("gambit").unwrap();
    cmd.args(["--config", fixture.config_path.to_str().unwrap()]);
    cmd
}

#[test]
fn request_inside_cooldown_is_skipped_and_consumed() {
    let fx = fixture();
    let last = (Utc::now() - Duration::seconds(60)).to_rfc3339();
    std::fs::write(fx.state_dir.join("last-success"), &last).unwrap();
    std::fs::write(fx.state_dir.join("update-request"), "pico").unwrap();

    gambit(&fx).arg("run").assert().success();

    // Request consumed, nothing else changed
    assert!(!fx.state_dir.join("update-request").exists());
    assert!(!fx.state_dir.join("update-failed").exists());
    assert_eq!(std::fs::read_to_string(fx.state_dir.join("last-success")).unwrap(), last);
}

#[test]
#[serial]
fn forced_engine_refresh_runs_and_retains_request_on_failure() {
    let fx = fixture();
    let last = (Utc::now() - Duration::seconds(60)).to_rfc3339();
    std::fs::write(fx.state_dir.join("last-success"), &last).unwrap();
    std::fs::write(fx.state_dir.join("update-request"), "engines").unwrap();

    // Same timing as the skip test, but the forced reason dispatches the
    // engine refresh, which fails against the closed port.
    gambit(&fx).arg("run").assert().failure();

    assert!(
        fx.state_dir.join("update-request").exists(),
        "a failed update must leave the request for the next invocation"
    );
    assert!(fx.state_dir.join("update-failed").exists());
    assert_eq!(std::fs::read_to_string(fx.state_dir.join("last-success")).unwrap(), last);
}

#[test]
#[serial]
fn failure_marker_bypasses_cooldown() {
    let fx = fixture();
    let last = (Utc::now() - Duration::seconds(60)).to_rfc3339();
    std::fs::write(fx.state_dir.join("last-success"), &last).unwrap();
    std::fs::write(fx.state_dir.join("update-failed"), "previous failure").unwrap();
    std::fs::write(fx.state_dir.join("update-request"), "books-games").unwrap();

    // Inside the cooldown, but the failure marker forces a retry; the
    // dispatched refresh fails against the closed port and the marker
    // stays set.
    gambit(&fx).arg("run").assert().failure();
    assert!(fx.state_dir.join("update-failed").exists());
    assert!(fx.state_dir.join("update-request").exists());
}
