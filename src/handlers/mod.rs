pub mod mcp;
pub mod resources;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::models::query::{DEFAULT_LIMIT, MAX_LIMIT};
use crate::tools::ToolError;

/// Pagination query parameters for the plain REST listing endpoints.
/// Defaults: limit=200, offset=0. Max limit=5000.
#[derive(Debug, Deserialize)]
pub struct PaginationQuery {
    #[serde(default = "default_page_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

impl PaginationQuery {
    /// Clamp limit to [1, 5000] and offset to >= 0
    pub fn sanitize(&self) -> (i64, i64) {
        let limit = self.limit.clamp(1, MAX_LIMIT as i64);
        let offset = self.offset.max(0);
        (limit, offset)
    }
}

fn default_page_limit() -> i64 {
    DEFAULT_LIMIT as i64
}

/// Error response body: {"error": "message"}
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<&'static str>,
}

/// API error type
pub struct ApiError {
    status: StatusCode,
    message: String,
    kind: Option<&'static str>,
}

impl ApiError {
    fn new(status: StatusCode, msg: impl Into<String>) -> Self {
        Self {
            status,
            message: msg.into(),
            kind: None,
        }
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, msg)
    }

    pub fn not_found(resource: &str) -> Self {
        Self::new(StatusCode::NOT_FOUND, format!("{} not found", resource))
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, msg)
    }

    pub fn bad_gateway(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_GATEWAY, msg)
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, msg)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorResponse {
            error: self.message,
            kind: self.kind,
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<ToolError> for ApiError {
    fn from(err: ToolError) -> Self {
        let mut api = match &err {
            ToolError::AuthRequired => Self::unauthorized(err.to_string()),
            ToolError::NotFound(msg) => Self::new(StatusCode::NOT_FOUND, msg.clone()),
            ToolError::UnknownTool(_) => Self::new(StatusCode::NOT_FOUND, err.to_string()),
            ToolError::Upstream(_) => Self::bad_gateway(err.to_string()),
            ToolError::Topology(t) if t.kind() == "UpstreamFailure" => {
                Self::bad_gateway(err.to_string())
            }
            ToolError::Topology(t) if t.kind() == "Internal" => Self::internal(err.to_string()),
            _ => Self::bad_request(err.to_string()),
        };
        api.kind = Some(err.kind());
        api
    }
}

/// Healthcheck endpoint: returns 200 OK with status
pub async fn healthcheck() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "service": env!("CARGO_PKG_NAME"),
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}
