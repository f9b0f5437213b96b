//! HTTP API server hosting the library bounded contexts.
//!
//! Every hosted context (members, books, loans, returns) gets CRUD routes
//! under `/api/{collection}` plus a composite `detail` view. Commands run
//! against the write store; queries are answered from the read store that
//! the projection workers keep up to date.

pub mod bootstrap;
pub mod config;
pub mod error;
pub mod routes;

use axum::Router;
use axum::routing::get;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use bootstrap::Runtime;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app(runtime: &Runtime, metrics_handle: PrometheusHandle) -> Router {
    let health_router = Router::new()
        .route("/health", get(routes::system::health))
        .with_state(runtime.hosted().to_vec());

    let metrics_router = Router::new()
        .route("/metrics", get(routes::system::metrics))
        .with_state(metrics_handle);

    runtime
        .routes()
        .merge(health_router)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}
