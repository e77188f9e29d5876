//! The tool surface exposed over MCP.
//!
//! Each tool takes a JSON argument object and returns a JSON value. Tools that
//! reach the orchestrator need the caller's bearer token; cached topology reads
//! do not.

pub mod slices;
pub mod topology;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::Instrument;

use crate::auth::{decode_identity, Caller, MISSING_TOKEN_MESSAGE};
use crate::cache::ResourceCache;
use crate::config::Config;
use crate::query::FilterError;
use crate::slice::TopologyError;
use crate::testbed::{NotFoundError, Testbed};

/// Name, description and JSON schema of one tool, as listed by `tools/list`
#[derive(Debug, Clone, Serialize)]
pub struct ToolDef {
    pub name: &'static str,
    pub description: &'static str,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("unknown tool: {0}")]
    UnknownTool(String),

    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("{}", MISSING_TOKEN_MESSAGE)]
    AuthRequired,

    #[error(transparent)]
    Topology(#[from] TopologyError),

    #[error(transparent)]
    Filter(#[from] FilterError),

    #[error("{0}")]
    NotFound(String),

    #[error("upstream failure: {0:#}")]
    Upstream(anyhow::Error),
}

impl ToolError {
    pub fn kind(&self) -> &'static str {
        match self {
            ToolError::UnknownTool(_) => "UnknownTool",
            ToolError::InvalidArguments(_) => "InvalidArguments",
            ToolError::AuthRequired => "AuthenticationRequired",
            ToolError::Topology(e) => e.kind(),
            ToolError::Filter(e) => e.kind(),
            ToolError::NotFound(_) => "NotFound",
            ToolError::Upstream(_) => "UpstreamFailure",
        }
    }
}

impl From<anyhow::Error> for ToolError {
    fn from(err: anyhow::Error) -> Self {
        if let Some(nf) = err.downcast_ref::<NotFoundError>() {
            return ToolError::NotFound(nf.to_string());
        }
        ToolError::Upstream(err)
    }
}

/// Shared dependencies of every tool call
pub struct ToolContext {
    pub testbed: Arc<dyn Testbed>,
    pub cache: ResourceCache,
    pub config: Config,
}

impl ToolContext {
    pub fn new(testbed: Arc<dyn Testbed>, cache: ResourceCache, config: Config) -> Self {
        Self {
            testbed,
            cache,
            config,
        }
    }

    /// Every tool, in listing order
    pub fn definitions() -> Vec<ToolDef> {
        let mut defs = topology::definitions();
        defs.extend(slices::definitions());
        defs
    }

    /// The caller's token, falling back to the token file in local mode
    pub async fn resolve_token(&self, caller: &Caller) -> Option<String> {
        if caller.token.is_some() {
            return caller.token.clone();
        }
        let path = match (&self.config.token_location, self.config.local_mode) {
            (Some(path), true) => path,
            _ => return None,
        };
        match crate::auth::read_token_from_file(path).await {
            Ok(token) => Some(token),
            Err(e) => {
                tracing::warn!("{}", e);
                None
            }
        }
    }

    /// Run one tool inside a `tool` span and log how it went
    pub async fn call_tool(
        &self,
        caller: &Caller,
        name: &str,
        args: Value,
    ) -> Result<Value, ToolError> {
        let call_id = caller
            .request_id
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let token = self.resolve_token(caller).await;
        let identity = token.as_deref().map(decode_identity).unwrap_or_default();

        let span = tracing::info_span!(
            "tool",
            tool = %name,
            call_id = %call_id,
            user_sub = identity.sub.as_deref().unwrap_or(""),
            user_email = identity.email.as_deref().unwrap_or(""),
        );

        async move {
            tracing::info!("Tool started");
            tracing::debug!("Tool arguments: {}", truncate(&args.to_string(), 2000));
            let started = Instant::now();

            let result = self.dispatch(token.as_deref(), name, args).await;

            let elapsed_ms = started.elapsed().as_millis() as u64;
            match &result {
                Ok(_) => tracing::info!(elapsed_ms, "Tool completed"),
                Err(e) => tracing::warn!(elapsed_ms, kind = e.kind(), "Tool failed: {}", e),
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn dispatch(&self, token: Option<&str>, name: &str, args: Value) -> Result<Value, ToolError> {
        use crate::testbed::ResourceKind;

        match name {
            "fabric_query_sites" => topology::query(self, token, ResourceKind::Sites, args).await,
            "fabric_query_hosts" => topology::query(self, token, ResourceKind::Hosts, args).await,
            "fabric_query_facility_ports" => {
                topology::query(self, token, ResourceKind::FacilityPorts, args).await
            }
            "fabric_query_links" => topology::query(self, token, ResourceKind::Links, args).await,
            "fabric_build_slice" => slices::build(self, token, args).await,
            "fabric_modify_slice" => slices::modify(self, token, args).await,
            "fabric_accept_modify" => slices::accept_modify(self, token, args).await,
            "fabric_renew_slice" => slices::renew(self, token, args).await,
            "fabric_delete_slice" => slices::delete(self, token, args).await,
            "fabric_query_slices" => slices::query(self, token, args).await,
            "fabric_get_slice" => slices::get(self, token, args).await,
            other => Err(ToolError::UnknownTool(other.to_string())),
        }
    }
}

/// Deserialize tool arguments; a missing argument object counts as empty
pub(crate) fn parse_args<T: DeserializeOwned>(args: Value) -> Result<T, ToolError> {
    let args = match args {
        Value::Null => Value::Object(Default::default()),
        other => other,
    };
    serde_json::from_value(args).map_err(|e| ToolError::InvalidArguments(e.to_string()))
}

pub(crate) fn require_token(token: Option<&str>) -> Result<&str, ToolError> {
    token.filter(|t| !t.is_empty()).ok_or(ToolError::AuthRequired)
}

pub(crate) fn to_value<T: Serialize>(value: &T) -> Result<Value, ToolError> {
    serde_json::to_value(value).map_err(|e| ToolError::Upstream(e.into()))
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}... ({} chars)", &s[..end], s.len())
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use crate::testbed::fake::FakeTestbed;
    use serde_json::json;

    #[tokio::test]
    async fn test_unknown_tool() {
        let ctx = context(Arc::new(FakeTestbed::new()));
        let err = ctx
            .call_tool(&caller("tok"), "fabric_launch_rocket", json!({}))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "UnknownTool");
    }

    #[tokio::test]
    async fn test_definitions_cover_dispatch() {
        let names: Vec<&str> = ToolContext::definitions().iter().map(|d| d.name).collect();
        assert_eq!(names.len(), 11);
        let ctx = context(Arc::new(FakeTestbed::new()));
        for name in names {
            let result = ctx.call_tool(&Caller::default(), name, json!({})).await;
            if let Err(e) = result {
                assert_ne!(e.kind(), "UnknownTool", "{} is listed but not dispatched", name);
            }
        }
    }

    #[tokio::test]
    async fn test_local_mode_reads_token_file() {
        let path = std::env::temp_dir().join(format!("fabric-mcp-token-{}.json", uuid::Uuid::new_v4()));
        std::fs::write(&path, r#"{"id_token": "from-file"}"#).unwrap();

        let mut ctx = context(Arc::new(FakeTestbed::new()));
        ctx.config.local_mode = true;
        ctx.config.token_location = Some(path.to_string_lossy().into_owned());

        assert_eq!(ctx.resolve_token(&Caller::default()).await.as_deref(), Some("from-file"));
        assert_eq!(ctx.resolve_token(&caller("header")).await.as_deref(), Some("header"));

        ctx.config.local_mode = false;
        assert_eq!(ctx.resolve_token(&Caller::default()).await, None);
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn test_anyhow_not_found_maps_to_not_found() {
        let err: ToolError = anyhow::Error::from(NotFoundError::new("slice", "abc")).into();
        assert_eq!(err.kind(), "NotFound");
        let err: ToolError = anyhow::anyhow!("boom").into();
        assert_eq!(err.kind(), "UpstreamFailure");
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("abcdef", 3), "abc... (6 chars)");
    }
}
