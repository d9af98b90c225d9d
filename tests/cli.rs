//! Command-line behaviour of the `tmt` binary

use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::process::Command;

fn tmt() -> Command {
    let mut cmd = Command::cargo_bin("tmt").unwrap();
    // Keep a developer's .env or shell settings out of the runs
    cmd.current_dir(std::env::temp_dir());
    for (key, _) in std::env::vars() {
        if key.starts_with("TMT_") {
            cmd.env_remove(key);
        }
    }
    cmd
}

#[test]
fn test_help_lists_subcommands() {
    tmt()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("server"))
        .stdout(predicate::str::contains("throughput"))
        .stdout(predicate::str::contains("reconnect"))
        .stdout(predicate::str::contains("stream"))
        .stdout(predicate::str::contains("sync"));
}

#[test]
fn test_version_flag() {
    let output = tmt().arg("--version").output().unwrap();
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    let pattern = regex::Regex::new(r"^tmt \d+\.\d+\.\d+").unwrap();
    assert!(pattern.is_match(&stdout), "unexpected version output: {}", stdout);
    assert!(stdout.contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_throughput_against_embedded_server() {
    tmt()
        .args(["throughput", "--count", "20", "--size", "64", "--clients", "2"])
        .args(["--endpoint", "127.0.0.1:0", "--no-color"])
        .assert()
        .success()
        .stdout(predicate::str::contains("TCP Messaging Test Results"))
        .stdout(predicate::str::contains("throughput"));
}

#[test]
fn test_sync_and_stream_against_embedded_server() {
    tmt()
        .args(["sync", "--count", "5", "--endpoint", "127.0.0.1:0", "--no-color"])
        .assert()
        .success();

    tmt()
        .args(["stream", "--content-length", "2048", "--source-size", "4096", "-n", "2"])
        .args(["--endpoint", "127.0.0.1:0", "--no-color"])
        .assert()
        .success();
}

#[test]
fn test_conflicting_color_flags_fail() {
    tmt()
        .args(["sync", "--color", "--no-color"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("--no-color"));
}

#[test]
fn test_invalid_stream_lengths_fail() {
    tmt()
        .args(["stream", "--content-length", "100", "--source-size", "10", "--no-color"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("Error:"));
}

#[test]
fn test_out_of_range_timeout_is_rejected_by_parser() {
    tmt().args(["sync", "--timeout", "0"]).assert().failure().code(2);
    tmt().args(["sync", "--timeout", "abc"]).assert().failure().code(2);
}

#[test]
fn test_unknown_subcommand() {
    tmt().arg("latency").assert().failure().code(2);
}

#[test]
fn test_remote_without_server_exits_with_failure() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let endpoint = listener.local_addr().unwrap().to_string();
    drop(listener);

    tmt()
        .args(["throughput", "--count", "3", "--remote", "--timeout", "1", "--no-color"])
        .args(["--endpoint", endpoint.as_str()])
        .assert()
        .failure()
        .code(6)
        .stderr(predicate::str::contains("Execution troubleshooting"));
}

#[test]
fn test_env_help_and_example() {
    tmt()
        .arg("env")
        .assert()
        .success()
        .stdout(predicate::str::contains("Supported Environment Variables"))
        .stdout(predicate::str::contains("TMT_ENDPOINT"));

    tmt()
        .args(["env", "--example"])
        .assert()
        .success()
        .stdout(predicate::str::contains("# TCP Messaging Tester Configuration"));
}

#[test]
fn test_env_write_then_check() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("example.env");

    tmt()
        .args(["env", "--write"])
        .arg(&path)
        .assert()
        .success();
    assert!(std::fs::read_to_string(&path).unwrap().contains("TMT_MESSAGE_COUNT"));

    tmt()
        .args(["env", "--check", "--file"])
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("Configuration OK"));

    tmt()
        .args(["env", "--check", "--file"])
        .arg(&path)
        .env("TMT_CLIENTS", "0")
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("TMT_CLIENTS"));
}

#[test]
fn test_quiet_prints_one_line() {
    tmt()
        .args(["sync", "--count", "3", "--endpoint", "127.0.0.1:0", "--no-color", "--quiet"])
        .assert()
        .success()
        .stdout(predicate::str::starts_with("Operations: 3/3 successful"))
        .stdout(predicate::str::contains("TCP Messaging Test Results").not());
}
