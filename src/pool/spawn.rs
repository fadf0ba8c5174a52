//! Worker subprocess spawning.
//!
//! Builds the worker command line and launches the subprocess. The
//! argument syntax is a contract with the worker executable and must not
//! drift: `-port:<int>` and `-childof:<pid>` always, `-rhinosysdir <dir>`
//! when configured, and `-parentport:<int> -idlespan:<secs>` together
//! when the parent port is set and the idle span exceeds one second.

use std::io::{BufRead, BufReader};
use std::process::{Command, Stdio};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::config::ServiceConfig;
use crate::error::{DispatchError, Result};
use crate::pool::proc::WorkerProcess;

/// Launch a worker subprocess bound to `port`.
///
/// Launch only: the caller owns readiness polling and promotion. The
/// returned worker is in `Starting` state.
pub fn spawn_worker(config: &ServiceConfig, port: u16) -> Result<WorkerProcess> {
    let exe = config.resolve_worker_exe()?;
    let args = worker_args(port, std::process::id(), config);

    debug!(exe = %exe.display(), ?args, "launching worker");

    let mut child = Command::new(&exe)
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| {
            DispatchError::Worker(format!("failed to spawn worker on port {}: {}", port, e))
        })?;

    // Relay worker stderr through tracing on a best-effort thread.
    if let Some(stderr) = child.stderr.take() {
        std::thread::Builder::new()
            .name(format!("worker-{}-stderr", port))
            .spawn(move || relay_worker_stderr(port, stderr))
            .ok();
    }

    info!(port, pid = child.id(), "spawned worker");
    Ok(WorkerProcess::new(child, port))
}

/// Build the worker argument vector.
fn worker_args(port: u16, parent_pid: u32, config: &ServiceConfig) -> Vec<String> {
    let mut args = vec![
        format!("-port:{}", port),
        format!("-childof:{}", parent_pid),
    ];

    if let Some(ref dir) = config.rhino_sys_dir {
        args.push("-rhinosysdir".to_string());
        args.push(dir.clone());
    }

    if config.port > 0 && config.child_idle_span > Duration::from_secs(1) {
        args.push(format!("-parentport:{}", config.port));
        args.push(format!("-idlespan:{}", config.child_idle_span.as_secs()));
    }

    args
}

/// Log worker stderr output through tracing.
///
/// `error:` lines surface at WARN; everything else stays at DEBUG since
/// worker chatter is informational from the dispatcher's point of view.
fn relay_worker_stderr(port: u16, stderr: std::process::ChildStderr) {
    let reader = BufReader::new(stderr);
    for line in reader.lines() {
        let line = match line {
            Ok(l) => l,
            Err(_) => break, // Pipe closed
        };
        if line.trim().is_empty() {
            continue;
        }
        if line.to_lowercase().contains("error:") {
            warn!(worker_port = port, "{}", line);
        } else {
            debug!(worker_port = port, "{}", line);
        }
    }
}
