//! Integration tests for the rhino-dispatch binary.
//!
//! These verify the CLI surface and a live dispatcher process end-to-end
//! against the endpoints that do not require a worker executable.

use assert_cmd::Command;
use predicates::prelude::*;
use std::io::{Read, Write};
use std::net::TcpStream;
use std::time::{Duration, Instant};

/// Get a command for the dispatcher binary.
fn dispatcher() -> Command {
    #[allow(deprecated)]
    Command::cargo_bin("rhino-dispatch").unwrap()
}

// ============================================================================
// Help and Version Tests
// ============================================================================

#[test]
fn test_help_displays() {
    dispatcher()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("geometry compute workers"))
        .stdout(predicate::str::contains("--spawn-count"))
        .stdout(predicate::str::contains("--idle-span"))
        .stdout(predicate::str::contains("--spawn-on-startup"))
        .stdout(predicate::str::contains("--rhino-sys-dir"));
}

#[test]
fn test_version_displays() {
    dispatcher()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("rhino-dispatch"))
        .stdout(predicate::str::is_match(r"\d+\.\d+\.\d+").unwrap());
}

// ============================================================================
// Argument Validation Tests
// ============================================================================

#[test]
fn test_invalid_flag_fails() {
    dispatcher()
        .arg("--definitely-not-a-flag")
        .assert()
        .failure()
        .stderr(predicate::str::contains("error"));
}

#[test]
fn test_spawn_count_zero_rejected() {
    dispatcher()
        .args(["--spawn-count", "0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("0"));
}

#[test]
fn test_spawn_count_env_zero_rejected() {
    dispatcher()
        .env("RHINO_COMPUTE_SPAWN_COUNT", "0")
        .assert()
        .failure();
}

#[test]
fn test_verbose_conflicts_with_quiet() {
    dispatcher()
        .args(["-v", "-q"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("cannot be used with"));
}

// ============================================================================
// Startup Failure Tests
// ============================================================================

#[test]
fn test_spawn_on_startup_missing_worker_exe_fails_fast() {
    dispatcher()
        .args([
            "--spawn-on-startup",
            "--worker-exe",
            "/nonexistent/compute.geometry",
            "--port",
            "42911",
        ])
        .timeout(Duration::from_secs(10))
        .assert()
        .failure()
        .stderr(predicate::str::contains("error:"))
        .stderr(predicate::str::contains("not found"));
}

// ============================================================================
// Live Server Tests
// ============================================================================

/// Send one HTTP/1.1 GET and return (status line, body).
fn http_get(port: u16, path: &str) -> Option<(String, String)> {
    let mut stream = TcpStream::connect(("127.0.0.1", port)).ok()?;
    stream
        .set_read_timeout(Some(Duration::from_secs(2)))
        .ok()?;
    write!(
        stream,
        "GET {} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n",
        path
    )
    .ok()?;

    let mut raw = String::new();
    stream.read_to_string(&mut raw).ok()?;

    let status = raw.lines().next()?.to_string();
    let body = raw
        .split_once("\r\n\r\n")
        .map(|(_, b)| b.to_string())
        .unwrap_or_default();
    Some((status, body))
}

#[test]
fn test_live_dispatcher_endpoints() {
    let port = 42901;
    let mut child = std::process::Command::new(env!("CARGO_BIN_EXE_rhino-dispatch"))
        .args(["--host", "127.0.0.1", "--port", &port.to_string(), "--quiet"])
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .spawn()
        .expect("failed to start dispatcher");

    // Wait for the listener to come up.
    let deadline = Instant::now() + Duration::from_secs(10);
    let mut up = false;
    while Instant::now() < deadline {
        if TcpStream::connect(("127.0.0.1", port)).is_ok() {
            up = true;
            break;
        }
        std::thread::sleep(Duration::from_millis(100));
    }
    assert!(up, "dispatcher never started listening");

    // Dispatcher self-health.
    let (status, body) = http_get(port, "/healthcheck").expect("healthcheck request failed");
    assert!(status.contains("200"), "status was {}", status);
    assert!(body.contains("healthy"));

    // No request has hit the pool yet: the idle clock is the sentinel,
    // and the worker poll endpoint must not stamp it.
    let (status, body) = http_get(port, "/idlespan").expect("idlespan request failed");
    assert!(status.contains("200"));
    assert_eq!(body.trim(), "-1");

    // Cold pool with spawn-on-startup off: no children.
    let (status, body) = http_get(port, "/activechildren").expect("activechildren failed");
    assert!(status.contains("200"));
    assert!(body.contains("\"active_children\":0"));

    let (status, body) = http_get(port, "/version").expect("version request failed");
    assert!(status.contains("200"));
    assert!(body.contains(env!("CARGO_PKG_VERSION")));

    child.kill().expect("failed to kill dispatcher");
    let _ = child.wait();
}
