use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::AppState;

/// Build the application router with all routes
pub fn build(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(handlers::healthcheck))
        // MCP JSON-RPC
        .route("/mcp", post(handlers::mcp::mcp_endpoint))
        .route("/api/tools", get(handlers::mcp::list_tools))
        // Topology listings
        .route("/api/resources/:kind", get(handlers::resources::list_resources))
        .route("/api/cache", get(handlers::resources::cache_status))
        // Add state and middleware
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
}
