//! HTTP server for the dispatcher.
//!
//! The dispatcher's own endpoints (`/healthcheck`, `/version`,
//! `/idlespan`, `/activechildren`, `/docs`) are routed explicitly; every
//! other path is forwarded to an acquired geometry worker.

pub mod error;
pub mod handlers;
pub mod middleware;
pub mod openapi;
pub mod proxy;
pub mod types;

use std::sync::Arc;
use std::time::Duration;

use axum::{middleware as axum_middleware, routing::get, Router};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_scalar::{Scalar, Servable};

use crate::config::ServiceConfig;
use crate::error::Result;
use crate::pool::Scheduler;

/// Shared application state.
pub struct AppState {
    pub scheduler: Arc<Scheduler>,
    pub config: ServiceConfig,
    /// Async client used to relay compute requests to workers.
    pub forward: reqwest::Client,
}

impl AppState {
    pub fn new(scheduler: Arc<Scheduler>, config: ServiceConfig) -> Self {
        Self {
            scheduler,
            config,
            forward: reqwest::Client::new(),
        }
    }
}

/// Build the dispatcher router.
pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = state.config.cors.then(|| {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
            .max_age(Duration::from_secs(3600))
    });

    let mut app = Router::new()
        .route("/healthcheck", get(handlers::healthcheck))
        .route("/version", get(handlers::version))
        .route("/idlespan", get(handlers::idlespan))
        .route("/activechildren", get(handlers::activechildren))
        .merge(Scalar::with_url("/docs", openapi::ApiDoc::openapi()))
        .route(
            "/openapi.json",
            get(|| async { axum::Json(openapi::ApiDoc::openapi()) }),
        )
        .fallback(proxy::forward)
        .layer(axum_middleware::from_fn(middleware::request_id_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    if let Some(cors_layer) = cors {
        app = app.layer(cors_layer);
    }

    app
}

/// Bind and serve until ctrl-c.
pub async fn run_server(state: Arc<AppState>) -> Result<()> {
    let addr = format!("{}:{}", state.config.host, state.config.port);
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "dispatcher listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("server stopped");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C).
async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install CTRL+C signal handler");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Cli;
    use crate::pool::scheduler::PoolConfig;
    use crate::pool::testutil::StubWorker;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use clap::Parser;
    use tower::ServiceExt;

    /// Build state off the async runtime: the scheduler owns a blocking
    /// HTTP client that must not be constructed on a runtime thread.
    fn test_state(port_base: u16, api_key: Option<&str>) -> Arc<AppState> {
        let api_key = api_key.map(String::from);
        std::thread::spawn(move || {
            let cli = Cli::parse_from(["rhino-dispatch"]);
            let mut config = ServiceConfig::from_cli(&cli);
            config.api_key = api_key;
            let pool_config = PoolConfig {
                acquire_timeout: Duration::from_millis(400),
                poll_interval: Duration::from_millis(50),
                probe_timeout: Duration::from_millis(300),
                port_base,
                port_count: 4,
                ..PoolConfig::default()
            };
            let scheduler = Arc::new(Scheduler::new(config.clone(), pool_config).unwrap());
            Arc::new(AppState::new(scheduler, config))
        })
        .join()
        .unwrap()
    }

    async fn body_string(response: axum::response::Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn seed_ready(state: &Arc<AppState>, port: u16) {
        let child = std::process::Command::new("sleep")
            .arg("60")
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::null())
            .spawn()
            .unwrap();
        state.scheduler.inject_ready_worker(child, port);
    }

    #[tokio::test]
    async fn test_healthcheck() {
        let state = test_state(42601, None);
        let app = build_router(state);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/healthcheck")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_string(response).await;
        assert!(body.contains("healthy"));
    }

    #[tokio::test]
    async fn test_version_reports_package_version() {
        let state = test_state(42602, None);
        let app = build_router(state);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/version")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_string(response).await;
        assert!(body.contains(env!("CARGO_PKG_VERSION")));
    }

    #[tokio::test]
    async fn test_idlespan_sentinel_and_no_self_stamp() {
        let state = test_state(42603, None);
        let app = build_router(state.clone());

        for _ in 0..2 {
            let response = app
                .clone()
                .oneshot(
                    Request::builder()
                        .uri("/idlespan")
                        .body(Body::empty())
                        .unwrap(),
                )
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            assert_eq!(body_string(response).await, "-1");
        }
    }

    #[tokio::test]
    async fn test_activechildren_empty_pool() {
        let state = test_state(42604, None);
        let app = build_router(state);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/activechildren")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_string(response).await;
        let parsed: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(parsed["active_children"], 0);
        assert!(parsed["ports"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_forward_relays_to_worker() {
        let stub = StubWorker::start(42611);
        let state = test_state(42611, None);
        seed_ready(&state, stub.port());

        let app = build_router(state.clone());
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/grasshopper")
                    .header("content-type", "application/json")
                    .body(Body::from("{\"pointcount\":1}"))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_string(response).await, "ok");

        state.scheduler.shutdown();
    }

    #[tokio::test]
    async fn test_forward_busy_pool_is_service_unavailable() {
        let stub = StubWorker::start(42621);
        stub.set_busy(1);
        let state = test_state(42621, None);
        seed_ready(&state, stub.port());

        let app = build_router(state.clone());
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/grasshopper")
                    .body(Body::from("{}"))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        state.scheduler.shutdown();
    }

    #[tokio::test]
    async fn test_forward_rejects_missing_api_key() {
        let stub = StubWorker::start(42631);
        let state = test_state(42631, Some("secret"));
        seed_ready(&state, stub.port());

        let app = build_router(state.clone());

        let denied = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/grasshopper")
                    .body(Body::from("{}"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(denied.status(), StatusCode::UNAUTHORIZED);

        let allowed = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/grasshopper")
                    .header("RhinoComputeKey", "secret")
                    .body(Body::from("{}"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(allowed.status(), StatusCode::OK);

        state.scheduler.shutdown();
    }

    #[tokio::test]
    async fn test_api_key_not_required_for_healthcheck() {
        let state = test_state(42641, Some("secret"));
        let app = build_router(state);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/healthcheck")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
