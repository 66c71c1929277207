//! Lidarmap Server - live point store behind HTTP and the message bus
//!
//! Points arrive as batches on a pub/sub topic (or through `POST /points`)
//! and are answered from memory by frustum queries on `POST /query`.
//!
//! # Example
//!
//! ```ignore
//! use lidarmap_server::{ServerCore, build_router};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() {
//!     let core = Arc::new(ServerCore::default());
//!     core.ingest([lidarmap::TimedPoint::new(2.0, 0.0, 0.0, 0.0)]);
//!
//!     let router = build_router(core);
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await.unwrap();
//!     axum::serve(listener, router).await.unwrap();
//! }
//! ```

pub mod config;
pub mod core;
pub mod error;
pub mod http;
pub mod ingest;
pub mod state;

// Re-exports for convenience
pub use config::{ConfigError, LidarmapConfig};
pub use core::{CoreError, ServerCore};
pub use error::AppError;
pub use ingest::{HeightFilter, IngestError, decode_point_batch, encode_point_batch};

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use tower_http::cors::CorsLayer;
use utoipa::OpenApi;

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    paths(
        http::query,
        http::ingest_points,
        http::stats,
    ),
    components(schemas(
        state::Vec3,
        state::QueryRequest,
        state::PointBody,
        state::PointsResponse,
        state::IngestRequest,
        state::IngestResponse,
        state::StatsResponse,
        state::ErrorResponse,
    ))
)]
struct ApiDoc;

pub fn openapi_spec() -> utoipa::openapi::OpenApi {
    ApiDoc::openapi()
}

/// Build the axum router with all endpoints
pub fn build_router(core: Arc<ServerCore>) -> Router {
    Router::new()
        .route("/query", post(http::query))
        .route("/points", post(http::ingest_points))
        .route("/stats", get(http::stats))
        .with_state(core)
}

/// Build the router with OpenAPI documentation and permissive CORS, for
/// browser clients
pub fn build_router_with_docs(core: Arc<ServerCore>) -> Router {
    use utoipa_swagger_ui::SwaggerUi;

    build_router(core)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", openapi_spec()))
        .layer(CorsLayer::permissive())
}
