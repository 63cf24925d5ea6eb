//! The binary refuses to start on bad configuration and reports why.
use std::{io::Write, process::Command};

fn switchyard() -> Command {
    let mut command = Command::new(env!("CARGO_BIN_EXE_switchyard"));
    command.env_clear().env("PORT", "0").env("NO_COLOR", "1");
    command
}

#[test]
fn test_missing_target_env_fails_validation() {
    let output = switchyard()
        .arg("validate")
        .env("BOT_B_URL", "http://127.0.0.1:4002")
        .output()
        .unwrap();

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("BOT_A_URL"), "stderr: {stderr}");
    assert!(!stderr.contains("BOT_B_URL"), "stderr: {stderr}");
}

#[test]
fn test_serve_exits_before_binding_without_targets() {
    let output = switchyard().arg("serve").output().unwrap();
    assert!(!output.status.success());
}

#[test]
fn test_malformed_target_url_fails() {
    let output = switchyard()
        .arg("validate")
        .env("BOT_A_URL", "localhost:4001")
        .env("BOT_B_URL", "http://127.0.0.1:4002")
        .output()
        .unwrap();

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("localhost:4001"), "stderr: {stderr}");
}

#[test]
fn test_routes_lists_default_layout() {
    let output = switchyard()
        .arg("routes")
        .env("BOT_A_URL", "http://127.0.0.1:4001")
        .env("BOT_B_URL", "http://127.0.0.1:4002")
        .output()
        .unwrap();

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("/network"));
    assert!(stdout.contains("http://127.0.0.1:4001"));
    assert!(stdout.contains("/fogochain"));
    assert!(stdout.contains("http://127.0.0.1:4002"));
}

#[test]
fn test_routes_echo_target_urls_as_configured() {
    let output = switchyard()
        .arg("routes")
        .env("BOT_A_URL", "http://LocalHost:4001")
        .env("BOT_B_URL", "http://127.0.0.1:4002/")
        .output()
        .unwrap();

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("http://LocalHost:4001"), "stdout: {stdout}");
    assert!(stdout.contains("http://127.0.0.1:4002/"), "stdout: {stdout}");
}

#[test]
fn test_config_file_with_env_override() {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    write!(
        file,
        r#"
service_name = "Edge"
fallback = "web"

[targets.api]
url = "http://127.0.0.1:9000"

[targets.web]
url_env = "WEB_URL"

[[routes]]
prefix = "/api"
target = "api"
title = "API"
"#
    )
    .unwrap();

    let output = switchyard()
        .arg("validate")
        .arg("--config")
        .arg(file.path())
        .env("WEB_URL", "http://127.0.0.1:9001")
        .env("PROXY_UPSTREAM__REQUEST_TIMEOUT_SECS", "7")
        .output()
        .unwrap();

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    assert!(stdout.contains("Configuration is valid"));
    assert!(stdout.contains("http://127.0.0.1:9001"));
    assert!(stdout.contains("request 7s"));
}
