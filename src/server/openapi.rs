//! OpenAPI specification for the dispatcher API.

use utoipa::OpenApi;

use super::handlers;
use super::types::*;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "rhino-dispatch API",
        description = "Front-end dispatcher multiplexing compute requests across local geometry worker processes. Any path not listed here is forwarded to an acquired worker.",
        version = "0.1.0",
    ),
    servers(
        (url = "/", description = "Local server")
    ),
    paths(
        handlers::healthcheck,
        handlers::version,
        handlers::idlespan,
        handlers::activechildren,
    ),
    components(schemas(
        HealthResponse,
        VersionResponse,
        ActiveChildrenResponse,
    )),
    tags(
        (name = "health", description = "Dispatcher self-health"),
        (name = "workers", description = "Worker pool introspection")
    )
)]
pub struct ApiDoc;
