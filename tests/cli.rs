//! End-to-end tests of the `netbackup` binary.

use std::fs;
use std::path::{Path, PathBuf};

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;

fn write_config(dir: &Path, body: &str) -> PathBuf {
    let path = dir.join("backup.toml");
    fs::write(&path, body).expect("config should be written");
    path
}

#[test]
fn prints_version() {
    cargo_bin_cmd!("netbackup")
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn missing_config_flag_is_a_usage_error() {
    cargo_bin_cmd!("netbackup")
        .arg("-n")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("--config"));
}

#[test]
fn dry_run_logs_command_without_running_it() {
    let dir = tempfile::tempdir().expect("temp dir should be created");
    let log_file = dir.path().join("logs/run.log");
    let textfile = dir.path().join("backup.prom");
    let dest = dir.path().join("dest");
    let config = write_config(
        dir.path(),
        &format!(
            r#"
name = "e2e"
transport = "rsync"
source_dir = "/nonexistent/source"
dest_dir = "{}"
exclude = ["*.tmp"]
log_file = "{}"
prometheus_textfile = "{}"
"#,
            dest.display(),
            log_file.display(),
            textfile.display(),
        ),
    );

    cargo_bin_cmd!("netbackup")
        .args(["-n", "-v", "-c"])
        .arg(&config)
        .assert()
        .success()
        .stderr(predicate::str::contains("Dry-run mode"));

    let log = fs::read_to_string(&log_file).expect("run log should exist");
    assert!(
        log.contains("rsync -avAXH --delete --numeric-ids --filter=merge "),
        "{log}"
    );
    assert!(log.contains(&format!("/nonexistent/source/ {}", dest.display())), "{log}");
    assert!(log.contains("*** Backup Result: Success"), "{log}");
    assert!(!dest.exists(), "nothing should be copied");
    assert!(!textfile.exists(), "no metrics on a dry run");
}

#[test]
fn invalid_config_fails() {
    let dir = tempfile::tempdir().expect("temp dir should be created");
    let config = write_config(
        dir.path(),
        "name = \"broken\"\ntransport = \"rsync\"\nsource_dir = \"/a\"\nbogus = 1\n",
    );

    cargo_bin_cmd!("netbackup")
        .arg("-c")
        .arg(&config)
        .assert()
        .failure()
        .stderr(predicate::str::contains("bogus"));
}

#[test]
fn unreadable_config_fails() {
    let dir = tempfile::tempdir().expect("temp dir should be created");

    cargo_bin_cmd!("netbackup")
        .arg("-c")
        .arg(dir.path().join("missing.toml"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("missing.toml"));
}
