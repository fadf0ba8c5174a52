//! API response types.

use serde::Serialize;
use utoipa::ToSchema;

/// Health check response.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// Service status.
    pub status: String,
    /// Dispatcher version.
    pub version: String,
}

/// Version response.
#[derive(Debug, Serialize, ToSchema)]
pub struct VersionResponse {
    /// Dispatcher version.
    pub version: String,
}

/// Live worker summary.
#[derive(Debug, Serialize, ToSchema)]
pub struct ActiveChildrenResponse {
    /// Number of live (Starting or Ready) workers.
    pub active_children: usize,
    /// Ports owned by live workers, oldest first.
    pub ports: Vec<u16>,
}
