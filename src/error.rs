//! Error types for rhino-dispatch.

use thiserror::Error;

/// Main error type for the dispatcher.
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("no free worker port in range {base}..={last}")]
    NoFreePort { base: u16, last: u16 },

    #[error("worker executable not found; searched {searched}")]
    ExecutableNotFound { searched: String },

    #[error("worker on port {port} did not become ready within {timeout_secs}s")]
    SpawnTimeout { port: u16, timeout_secs: u64 },

    #[error("no worker available within the acquire budget")]
    NoWorkerAvailable,

    #[error("worker process error: {0}")]
    Worker(String),

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for dispatcher operations.
pub type Result<T> = std::result::Result<T, DispatchError>;
