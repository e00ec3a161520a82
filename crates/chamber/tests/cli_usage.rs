#![cfg(all(unix, feature = "cli"))]

use std::process::Command;

#[test]
fn unknown_subcommand_returns_64() {
    let output = Command::new(env!("CARGO_BIN_EXE_chamber"))
        .arg("calibrate")
        .output()
        .expect("chamber should run");

    assert_eq!(output.status.code(), Some(64));
}

#[test]
fn bad_duration_returns_64() {
    let output = Command::new(env!("CARGO_BIN_EXE_chamber"))
        .args(["console", "--ack-timeout", "fast"])
        .output()
        .expect("chamber should run");

    assert_eq!(output.status.code(), Some(64));
    assert!(String::from_utf8_lossy(&output.stderr).contains("invalid duration"));
}

#[test]
fn help_exits_cleanly() {
    let output = Command::new(env!("CARGO_BIN_EXE_chamber"))
        .arg("--help")
        .output()
        .expect("chamber should run");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("run"));
    assert!(stdout.contains("console"));
}

#[test]
fn port_env_fallback_is_used() {
    let output = Command::new(env!("CARGO_BIN_EXE_chamber"))
        .args(["--log-level", "error", "console"])
        .env("CHAMBER_PORT", "/dev/chamber-env-port")
        .output()
        .expect("chamber should run");

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("/dev/chamber-env-port"));
}
