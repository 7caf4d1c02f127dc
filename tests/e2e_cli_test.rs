//! End-to-end runs of the `cloudsurf` binary.
//!
//! Every test points `CLOUDSURF_CONFIG` at a dry-run config inside a
//! temporary directory, so no automation is launched and no user state is
//! touched.

mod common;

use assert_cmd::Command;
use predicates::prelude::*;

use cloudsurf::test_utils::{TestDir, make_test_config_toml};

use common::logger::TestLogger;

struct Sandbox {
    dir: TestDir,
}

impl Sandbox {
    fn new(vendor: &str) -> Self {
        let dir = TestDir::new();
        let config = make_test_config_toml(dir.path());
        dir.create_file("config.toml", &config);
        dir.create_file("sys_vendor", &format!("{vendor}\n"));
        Self { dir }
    }

    #[allow(deprecated)]
    fn cmd(&self) -> Command {
        let mut cmd = Command::cargo_bin("cloudsurf").expect("binary");
        cmd.env("CLOUDSURF_CONFIG", self.dir.file_path("config.toml"))
            .env_remove("CLOUDSURF_DATABASE")
            .env_remove("CLOUDSURF_LOG")
            .env_remove("RUST_LOG")
            .env("NO_COLOR", "1");
        cmd
    }
}

#[test]
fn move_twice_is_rejected_the_second_time() {
    let log = TestLogger::new("move_twice_is_rejected_the_second_time");
    let sandbox = Sandbox::new("Xen");

    log.phase("first move");
    sandbox
        .cmd()
        .args(["move", "azure", "--initiator", "ops"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Moving to azure"))
        .stdout(predicate::str::contains("Dry run"));

    log.phase("second move");
    sandbox
        .cmd()
        .args(["move", "google"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("already in progress"))
        .stderr(predicate::str::contains("SURF-M001"));

    log.phase("history");
    sandbox
        .cmd()
        .args(["history", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"target\":\"Microsoft Azure\""))
        .stdout(predicate::str::contains("\"initiator\":\"ops\""));
    log.finish_ok();
}

#[test]
fn moving_to_current_host_is_rejected() {
    let log = TestLogger::new("moving_to_current_host_is_rejected");
    let sandbox = Sandbox::new("Google");

    sandbox
        .cmd()
        .args(["move", "google", "--json"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("SURF-M002"));

    sandbox
        .cmd()
        .arg("history")
        .assert()
        .success()
        .stdout(predicate::str::contains("No migrations recorded"));
    log.finish_ok();
}

#[test]
fn unknown_target_is_rejected() {
    let sandbox = Sandbox::new("Xen");
    sandbox
        .cmd()
        .args(["move", "mars"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("invalid migration target: mars"));
}

#[test]
fn status_prints_json_shape() {
    let log = TestLogger::new("status_prints_json_shape");
    let sandbox = Sandbox::new("Xen");

    log.phase("missing log");
    sandbox
        .cmd()
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::starts_with("{\"error\":"));

    log.phase("task line");
    let now = chrono::Local::now().format("%Y-%m-%d %H:%M:%S");
    sandbox.dir.create_file(
        "ansible.log",
        &format!("{now},123 p=1 u=ubuntu n=ansible | TASK [Install packages] ****\n"),
    );
    sandbox
        .cmd()
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("\"status\":\"Install packages\""))
        .stdout(predicate::str::contains("\"date\":\""));
    log.finish_ok();
}

#[test]
fn overview_without_history() {
    let sandbox = Sandbox::new("Microsoft Corporation");
    sandbox
        .cmd()
        .arg("overview")
        .assert()
        .success()
        .stdout(predicate::str::contains("Microsoft Azure"))
        .stdout(predicate::str::contains("eternity and/or never"));
}

#[test]
fn startup_on_target_finalizes_once() {
    let log = TestLogger::new("startup_on_target_finalizes_once");
    let sandbox = Sandbox::new("Xen");

    log.phase("move from aws");
    sandbox.cmd().args(["move", "google"]).assert().success();

    log.phase("arrive on google");
    sandbox.dir.set_vendor("Google");
    sandbox
        .cmd()
        .args(["startup", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"outcome\":\"arrived\""))
        .stdout(predicate::str::contains("\"outcome\":\"dry_run\""));
    sandbox
        .cmd()
        .args(["startup", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("already_finalized"));

    log.phase("move is accepted again");
    sandbox.cmd().args(["move", "aws"]).assert().success();
    log.finish_ok();
}

#[test]
fn log_command_reports_unavailable_file() {
    let sandbox = Sandbox::new("Xen");
    sandbox
        .cmd()
        .args(["log", "--deletion"])
        .assert()
        .success()
        .stdout(predicate::str::starts_with("Unavailable. Failed to open with"));
}

#[test]
fn doctor_fails_without_credentials() {
    let sandbox = Sandbox::new("Xen");
    sandbox
        .cmd()
        .args(["doctor", "--json"])
        .assert()
        .code(1)
        .stdout(predicate::str::contains("\"missing\":[\"access_key\",\"secret_key\"]"));
}

#[test]
fn cycle_without_api_key_is_a_config_error() {
    let sandbox = Sandbox::new("Xen");
    sandbox
        .cmd()
        .arg("cycle")
        .assert()
        .code(3)
        .stderr(predicate::str::contains("SURF-C002"));
}

#[test]
fn invalid_config_is_reported() {
    let sandbox = Sandbox::new("Xen");
    sandbox.dir.create_file("config.toml", "[decision]\nwindow = 0\n");
    sandbox
        .cmd()
        .arg("overview")
        .assert()
        .code(3)
        .stderr(predicate::str::contains("decision.window"));
}
