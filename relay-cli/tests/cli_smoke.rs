use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::process::Command;

#[test]
fn help_lists_every_config_flag() {
    let mut cmd = Command::cargo_bin("bxr").unwrap();
    cmd.arg("--help");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("--listen"))
        .stdout(predicate::str::contains("--next"))
        .stdout(predicate::str::contains("--protocol"));
}

#[test]
fn rejects_a_config_file_that_does_not_exist() {
    let mut cmd = Command::cargo_bin("bxr").unwrap();
    cmd.arg("--config").arg("/nonexistent/relay.toml");
    cmd.assert().failure();
}

#[test]
fn rejects_malformed_config_toml() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("relay.toml");
    std::fs::write(&path, "not = [[[ valid toml").unwrap();

    let mut cmd = Command::cargo_bin("bxr").unwrap();
    cmd.arg("--config").arg(&path);
    cmd.assert().failure();
}
