use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::auth::Caller;
use crate::testbed::ResourceKind;
use crate::tools::topology;
use crate::AppState;

use super::{ApiError, PaginationQuery};

/// List one topology resource kind, unfiltered, a page at a time
pub async fn list_resources(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(kind): Path<String>,
    Query(page): Query<PaginationQuery>,
) -> Result<Json<Value>, ApiError> {
    let kind = ResourceKind::parse(&kind).ok_or_else(|| ApiError::not_found("resource kind"))?;
    let (limit, offset) = page.sanitize();
    let token = state.tools.resolve_token(&caller).await;
    let result = topology::query(
        &state.tools,
        token.as_deref(),
        kind,
        json!({"limit": limit, "offset": offset}),
    )
    .await?;
    Ok(Json(result))
}

/// When the cache was last refreshed and how much it holds
pub async fn cache_status(State(state): State<Arc<AppState>>) -> Json<Value> {
    let snap = state.tools.cache.snapshot().await;
    Json(json!({
        "refreshed_at": snap.refreshed_at.map(|t| t.to_rfc3339()),
        "sites": snap.sites.len(),
        "hosts": snap.hosts.len(),
        "facility_ports": snap.facility_ports.len(),
        "links": snap.links.len(),
    }))
}
