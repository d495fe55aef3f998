//! Integration tests for the `ledtwin` binary.
//!
//! Each test points `--config` at a temporary file so the user's own
//! configuration never leaks in, and clears the connection string variable.

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;

const CS_ENV: &str = "IOTHUB_DEVICE_CONNECTION_STRING";

fn cli(dir: &tempfile::TempDir) -> assert_cmd::Command {
    let mut cmd = cargo_bin_cmd!("ledtwin");
    cmd.env_remove(CS_ENV)
        .arg("--config")
        .arg(dir.path().join("config.toml"));
    cmd
}

fn json_output(cmd: &mut assert_cmd::Command) -> serde_json::Value {
    let output = cmd.assert().success().get_output().stdout.clone();
    serde_json::from_slice(&output).expect("command should produce valid JSON")
}

#[test]
fn cli_help_succeeds() {
    cargo_bin_cmd!("ledtwin")
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("ledtwin"));
}

#[test]
fn cli_version_prints_version() {
    cargo_bin_cmd!("ledtwin")
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

// ── config ──

#[test]
fn cli_config_json_produces_valid_json() {
    let dir = tempfile::tempdir().unwrap();
    let json = json_output(cli(&dir).args(["--json", "config"]));

    assert!(json["settings"].is_object());
    assert_eq!(json["config_file_exists"], false);
    assert!(json["connection_source"].is_null());
    assert_eq!(json["settings"]["render"]["scroll_step_ms"], 50);
}

#[test]
fn cli_config_reports_environment_connection() {
    let dir = tempfile::tempdir().unwrap();
    let json = json_output(
        cli(&dir)
            .env(CS_ENV, "HostName=h.example;DeviceId=strip-42;SharedAccessKey=k")
            .args(["config", "--json"]),
    );
    assert_eq!(json["connection_source"], "environment");
    assert_eq!(json["device_id"], "strip-42");
}

#[test]
fn cli_config_lists_problems() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("config.toml"), "brightness = 2.5\n").unwrap();
    cli(&dir)
        .arg("config")
        .assert()
        .success()
        .stdout(predicate::str::contains("Invalid brightness"));
}

#[test]
fn cli_config_init_writes_file_once() {
    let dir = tempfile::tempdir().unwrap();
    cli(&dir)
        .args(["config", "--init"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Wrote"));
    let text = std::fs::read_to_string(dir.path().join("config.toml")).unwrap();
    assert!(text.contains("max_connect_attempts = 5"));

    cli(&dir)
        .args(["config", "--init"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));
}

#[test]
fn cli_verbose_flag_accepted() {
    let dir = tempfile::tempdir().unwrap();
    cli(&dir).args(["-v", "config"]).assert().success();
    cli(&dir).args(["--verbose", "config"]).assert().success();
}

// ── keys / method / patch ──

#[test]
fn cli_keys_lists_forty_keys() {
    let dir = tempfile::tempdir().unwrap();
    let json = json_output(cli(&dir).args(["--json", "keys"]));
    assert_eq!(json["count"], 40);

    cli(&dir)
        .arg("keys")
        .assert()
        .success()
        .stdout(predicate::str::contains("led8_b"));
}

#[test]
fn cli_method_scroll_leds() {
    let dir = tempfile::tempdir().unwrap();
    let json = json_output(cli(&dir).args(["--json", "method", "ScrollLeds"]));
    assert_eq!(json["response"]["status"], 200);
    assert_eq!(json["response"]["payload"]["data"], "Leds are now scrolling");
    assert_eq!(json["reported"]["led1_r"], 255);
}

#[test]
fn cli_method_unknown_is_success() {
    let dir = tempfile::tempdir().unwrap();
    cli(&dir)
        .args(["method", "Reboot"])
        .assert()
        .success()
        .stdout(predicate::str::contains("unknown method"));
}

#[test]
fn cli_patch_applies_and_reports() {
    let dir = tempfile::tempdir().unwrap();
    let json = json_output(cli(&dir).args([
        "--json",
        "patch",
        r#"{"led2_status": "on", "led2_g": 0, "led3_r": 300, "color": "red"}"#,
    ]));
    assert_eq!(json["reported"]["led2_status"], true);
    assert_eq!(json["reported"]["led2_g"], 0);
    assert_eq!(json["reported"]["led3_r"], 255);
    assert_eq!(json["rejected"], serde_json::json!(["led3_r"]));
    assert_eq!(json["unknown"], serde_json::json!(["color"]));
}

#[test]
fn cli_patch_human_output() {
    let dir = tempfile::tempdir().unwrap();
    cli(&dir)
        .args(["patch", r#"{"led1_r": 1}"#])
        .assert()
        .success();
}

#[test]
fn cli_patch_invalid_json_fails() {
    let dir = tempfile::tempdir().unwrap();
    cli(&dir)
        .args(["patch", "{not json"])
        .assert()
        .failure()
        .stderr(predicate::str::starts_with("Error:"));
}

// ── run ──

#[test]
fn cli_run_without_connection_string_fails() {
    let dir = tempfile::tempdir().unwrap();
    cli(&dir)
        .arg("run")
        .write_stdin("q\n")
        .assert()
        .failure()
        .stderr(predicate::str::contains("no connection string"));
}

#[test]
fn cli_run_console_session() {
    let dir = tempfile::tempdir().unwrap();
    cli(&dir)
        .env(CS_ENV, "HostName=h.example;DeviceId=strip-07;SharedAccessKey=k")
        .arg("run")
        .write_stdin("m ScrollLeds\nm TurnLedsOff\nr\nq\n")
        .timeout(std::time::Duration::from_secs(30))
        .assert()
        .success()
        .stdout(predicate::str::contains("Connected as strip-07"))
        .stdout(predicate::str::contains("Leds are now scrolling"))
        .stdout(predicate::str::contains("Leds are all off"))
        .stdout(predicate::str::contains("\"led1_status\""));
}
