//! Command-line interface definitions using clap.

use crate::logging::{LogConfig, LogFormat, LogRotation};
use clap::Parser;
use std::path::PathBuf;
use tracing::Level;

/// rhino-dispatch - HTTP dispatcher for geometry compute workers
#[derive(Parser, Debug)]
#[command(name = "rhino-dispatch")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Host address to bind to.
    #[arg(long, default_value = "0.0.0.0")]
    pub host: String,

    /// Port to listen on. Workers poll this port for parent activity.
    #[arg(long, env = "RHINO_COMPUTE_PARENT_PORT", default_value_t = 5000)]
    pub port: u16,

    /// Maximum number of simultaneously live workers.
    #[arg(long, env = "RHINO_COMPUTE_SPAWN_COUNT", default_value_t = 1,
          value_parser = clap::value_parser!(u16).range(1..))]
    pub spawn_count: u16,

    /// Seconds of parent inactivity after which workers self-terminate
    /// (0 disables idle shutdown).
    #[arg(long, env = "RHINO_COMPUTE_IDLE_SPAN", default_value_t = 0)]
    pub idle_span: u64,

    /// Spawn a worker and wait for it to become ready before serving.
    #[arg(long, env = "RHINO_COMPUTE_SPAWN_ON_STARTUP")]
    pub spawn_on_startup: bool,

    /// Rhino system directory forwarded to workers.
    #[arg(long, env = "RHINO_COMPUTE_RHINO_SYS_DIR")]
    pub rhino_sys_dir: Option<String>,

    /// Explicit path to the worker executable. When omitted, a
    /// `compute.geometry` directory next to (or below) this binary is
    /// searched.
    #[arg(long)]
    pub worker_exe: Option<PathBuf>,

    /// Enable CORS for all origins.
    #[arg(long)]
    pub cors: bool,

    /// Enable verbose output (-v for debug, -vv for trace).
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress all output except errors.
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log level: error, warn, info, debug, trace.
    #[arg(long, env = "RHINO_COMPUTE_LOG_LEVEL")]
    pub log_level: Option<String>,

    /// Log format: pretty, compact, json.
    #[arg(long, env = "RHINO_COMPUTE_LOG_FORMAT")]
    pub log_format: Option<String>,

    /// Log to file (in addition to stderr).
    #[arg(long, env = "RHINO_COMPUTE_LOG_FILE")]
    pub log_file: Option<PathBuf>,

    /// Log rotation: hourly, daily, never.
    #[arg(long, env = "RHINO_COMPUTE_LOG_ROTATION", default_value = "daily")]
    pub log_rotation: String,
}

impl Cli {
    /// Assemble the logging configuration from flags and environment.
    pub fn log_config(&self) -> LogConfig {
        let mut config = LogConfig::new();

        if self.quiet {
            config = config.with_level(Level::ERROR);
        } else {
            match self.verbose {
                0 => {}
                1 => config = config.with_level(Level::DEBUG),
                _ => config = config.with_level(Level::TRACE),
            }
        }

        if let Some(ref level) = self.log_level {
            if let Ok(l) = level.to_lowercase().parse::<Level>() {
                config = config.with_filter(format!("{}", l).to_lowercase());
            }
        }

        if let Some(ref format) = self.log_format {
            if let Ok(f) = format.parse::<LogFormat>() {
                config = config.with_format(f);
            }
        }

        if let Some(ref path) = self.log_file {
            config = config.with_file(path.clone());
        }

        if let Ok(rotation) = self.log_rotation.parse::<LogRotation>() {
            config = config.with_rotation(rotation);
        }

        config.with_env_overrides()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::parse_from(["rhino-dispatch"]);
        assert_eq!(cli.port, 5000);
        assert_eq!(cli.spawn_count, 1);
        assert_eq!(cli.idle_span, 0);
        assert!(!cli.spawn_on_startup);
        assert!(cli.rhino_sys_dir.is_none());
        assert!(cli.worker_exe.is_none());
    }

    #[test]
    fn test_cli_overrides() {
        let cli = Cli::parse_from([
            "rhino-dispatch",
            "--port",
            "8081",
            "--spawn-count",
            "4",
            "--idle-span",
            "3600",
            "--spawn-on-startup",
        ]);
        assert_eq!(cli.port, 8081);
        assert_eq!(cli.spawn_count, 4);
        assert_eq!(cli.idle_span, 3600);
        assert!(cli.spawn_on_startup);
    }

    #[test]
    fn test_spawn_count_rejects_zero() {
        assert!(Cli::try_parse_from(["rhino-dispatch", "--spawn-count", "0"]).is_err());
    }

    #[test]
    fn test_quiet_log_config() {
        let cli = Cli::parse_from(["rhino-dispatch", "--quiet"]);
        let config = cli.log_config();
        assert_eq!(config.level, Level::ERROR);
    }
}
