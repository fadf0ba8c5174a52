//! Service configuration.
//!
//! Collects the CLI flags and the `RHINO_COMPUTE_*` environment contract
//! into one immutable value built at startup. Nothing here is mutated
//! after load; handlers and the pool receive clones or references.

use crate::cli::Cli;
use crate::error::{DispatchError, Result};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Default forwarder timeout in seconds (`RHINO_COMPUTE_TIMEOUT`).
pub const DEFAULT_PROXY_TIMEOUT_SECS: u64 = 180;

/// Default request body limit in bytes (`RHINO_COMPUTE_MAX_REQUEST_SIZE`).
pub const DEFAULT_MAX_REQUEST_SIZE: usize = 52_428_800;

/// Directory name holding the worker executable.
const WORKER_DIR_NAME: &str = "compute.geometry";

/// Worker executable file name.
#[cfg(windows)]
const WORKER_EXE_NAME: &str = "compute.geometry.exe";
#[cfg(not(windows))]
const WORKER_EXE_NAME: &str = "compute.geometry";

/// Immutable service configuration.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Host address the dispatcher binds to.
    pub host: String,
    /// Dispatcher listen port; passed to workers as `-parentport`.
    pub port: u16,
    /// Maximum number of simultaneously live workers.
    pub spawn_count: usize,
    /// Parent-inactivity span after which workers self-terminate
    /// (zero disables idle shutdown).
    pub child_idle_span: Duration,
    /// Spawn one worker and wait for readiness before serving traffic.
    pub spawn_on_startup: bool,
    /// Rhino system directory forwarded to workers via `-rhinosysdir`.
    pub rhino_sys_dir: Option<String>,
    /// Explicit worker executable path; when `None` the standard
    /// locations are searched at spawn time.
    pub worker_exe: Option<PathBuf>,
    /// API key required on forwarded requests (`RHINO_COMPUTE_KEY`);
    /// `None` disables admission auth.
    pub api_key: Option<String>,
    /// Timeout for a request forwarded to a worker.
    pub proxy_timeout: Duration,
    /// Request body size limit in bytes.
    pub max_request_size: usize,
    /// Enable CORS for all origins.
    pub cors: bool,
}

impl ServiceConfig {
    /// Freeze the configuration from parsed CLI flags plus the
    /// environment-only operator knobs.
    pub fn from_cli(cli: &Cli) -> Self {
        let api_key = std::env::var("RHINO_COMPUTE_KEY")
            .ok()
            .filter(|k| !k.is_empty());

        Self {
            host: cli.host.clone(),
            port: cli.port,
            spawn_count: cli.spawn_count as usize,
            child_idle_span: Duration::from_secs(cli.idle_span),
            spawn_on_startup: cli.spawn_on_startup,
            rhino_sys_dir: cli.rhino_sys_dir.clone(),
            worker_exe: cli.worker_exe.clone(),
            api_key,
            proxy_timeout: Duration::from_secs(env_parse(
                "RHINO_COMPUTE_TIMEOUT",
                DEFAULT_PROXY_TIMEOUT_SECS,
            )),
            max_request_size: env_parse(
                "RHINO_COMPUTE_MAX_REQUEST_SIZE",
                DEFAULT_MAX_REQUEST_SIZE,
            ),
            cors: cli.cors,
        }
    }

    /// Locate the worker executable.
    ///
    /// An explicit `--worker-exe` path wins. Otherwise a
    /// `compute.geometry` directory is searched as a child of the
    /// dispatcher binary's directory, then as a sibling of it.
    pub fn resolve_worker_exe(&self) -> Result<PathBuf> {
        if let Some(ref path) = self.worker_exe {
            if path.is_file() {
                return Ok(path.clone());
            }
            return Err(DispatchError::ExecutableNotFound {
                searched: path.display().to_string(),
            });
        }

        let exe_dir = std::env::current_exe()
            .ok()
            .and_then(|p| p.parent().map(|d| d.to_path_buf()));

        let mut candidates = Vec::new();
        if let Some(ref dir) = exe_dir {
            candidates.push(dir.join(WORKER_DIR_NAME).join(WORKER_EXE_NAME));
            if let Some(parent) = dir.parent() {
                candidates.push(parent.join(WORKER_DIR_NAME).join(WORKER_EXE_NAME));
            }
        }

        for candidate in &candidates {
            if candidate.is_file() {
                return Ok(candidate.clone());
            }
        }

        Err(DispatchError::ExecutableNotFound {
            searched: candidates
                .iter()
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>()
                .join(", "),
        })
    }
}

/// Parse an environment variable, falling back to `default` when the
/// variable is unset or malformed.
fn env_parse<T: FromStr + Copy>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
