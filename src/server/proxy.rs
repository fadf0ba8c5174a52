//! Compute request forwarder.
//!
//! Catch-all handler: admit the request, acquire a free worker, relay
//! the request to it, and relay the response back. The dispatcher never
//! tracks that it handed a worker out; the worker's own busy counter is
//! authoritative, so a worker taken by a concurrent caller answers with
//! a conflict status and the client retries.

use axum::{
    body::{to_bytes, Body},
    extract::{Request, State},
    http::header::CONTENT_TYPE,
    response::Response,
};
use std::sync::Arc;
use tracing::{debug, instrument};

use super::error::ApiError;
use super::AppState;

/// Header carrying the operator API key.
pub const API_KEY_HEADER: &str = "RhinoComputeKey";

/// Forward a compute request to an acquired worker.
#[instrument(skip(state, request), fields(method = %request.method(), uri = %request.uri()))]
pub async fn forward(
    State(state): State<Arc<AppState>>,
    request: Request,
) -> Result<Response, ApiError> {
    if let Some(ref key) = state.config.api_key {
        let presented = request
            .headers()
            .get(API_KEY_HEADER)
            .and_then(|v| v.to_str().ok());
        if presented != Some(key.as_str()) {
            return Err(ApiError::unauthorized("missing or invalid API key"));
        }
    }

    let (parts, body) = request.into_parts();
    let bytes = to_bytes(body, state.config.max_request_size)
        .await
        .map_err(|_| {
            ApiError::payload_too_large(format!(
                "request body exceeds {} bytes",
                state.config.max_request_size
            ))
        })?;

    let scheduler = state.scheduler.clone();
    let endpoint = tokio::task::spawn_blocking(move || scheduler.acquire())
        .await
        .map_err(|e| ApiError::internal(format!("Task join error: {}", e)))??;

    let path_and_query = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    let url = format!("http://{}{}", endpoint.authority(), path_and_query);
    debug!(worker = %endpoint.authority(), "forwarding request");

    let mut upstream = state
        .forward
        .request(parts.method.clone(), &url)
        .timeout(state.config.proxy_timeout)
        .body(bytes);
    if let Some(content_type) = parts.headers.get(CONTENT_TYPE) {
        upstream = upstream.header(CONTENT_TYPE, content_type.clone());
    }

    let response = upstream
        .send()
        .await
        .map_err(|e| ApiError::bad_gateway(format!("worker request failed: {}", e)))?;

    let status = response.status();
    let content_type = response.headers().get(CONTENT_TYPE).cloned();
    let body = response
        .bytes()
        .await
        .map_err(|e| ApiError::bad_gateway(format!("worker response failed: {}", e)))?;

    let mut builder = Response::builder().status(status);
    if let Some(content_type) = content_type {
        builder = builder.header(CONTENT_TYPE, content_type);
    }
    builder
        .body(Body::from(body))
        .map_err(|e| ApiError::internal(e.to_string()))
}
