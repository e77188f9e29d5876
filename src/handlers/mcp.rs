use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;

use crate::auth::Caller;
use crate::mcp;
use crate::AppState;

/// JSON-RPC endpoint. Notifications are acknowledged with 202 and no body.
pub async fn mcp_endpoint(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    body: String,
) -> Response {
    match mcp::handle_message(&state.tools, &caller, &body).await {
        Some(response) => Json(response).into_response(),
        None => StatusCode::ACCEPTED.into_response(),
    }
}

/// Tool catalog as plain JSON, for humans poking at the server
pub async fn list_tools() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "tools": crate::tools::ToolContext::definitions() }))
}
