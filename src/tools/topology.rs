use serde_json::{json, Value};

use super::{parse_args, require_token, to_value, ToolContext, ToolDef, ToolError};
use crate::models::query::QueryParams;
use crate::query;
use crate::testbed::ResourceKind;

const FILTER_HELP: &str = "Declarative filter: each key is ANDed. A field maps to a literal \
(equality) or to operators eq, ne, lt, lte, gt, gte, in, contains, icontains, regex, any, all. \
Use {\"or\": [{...}, {...}]} for alternatives and dotted names for nested fields.";

/// JSON schema shared by every query tool
pub fn query_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "filters": {"type": "object", "description": FILTER_HELP},
            "sort": {
                "type": "object",
                "properties": {
                    "field": {"type": "string"},
                    "direction": {"type": "string", "enum": ["asc", "desc"]}
                }
            },
            "limit": {
                "type": ["integer", "null"],
                "description": "Maximum results (default 200, null for all). Values are \
                    clamped to 1..=5000, so 0 returns one record"
            },
            "offset": {"type": "integer", "description": "Results to skip (default 0)"}
        }
    })
}

pub fn definitions() -> Vec<ToolDef> {
    vec![
        ToolDef {
            name: "fabric_query_sites",
            description: "Query testbed sites with filtering, sorting and pagination. \
                Records carry name, state, location, cores/ram/disk capacity, allocated \
                and available figures, hosts and components.",
            input_schema: query_schema(),
        },
        ToolDef {
            name: "fabric_query_hosts",
            description: "Query worker hosts with filtering, sorting and pagination. \
                Records carry name, site, cores/ram/disk figures and a components map.",
            input_schema: query_schema(),
        },
        ToolDef {
            name: "fabric_query_facility_ports",
            description: "Query facility ports (external network attachments) with \
                filtering, sorting and pagination.",
            input_schema: query_schema(),
        },
        ToolDef {
            name: "fabric_query_links",
            description: "Query inter-site links with filtering, sorting and pagination.",
            input_schema: query_schema(),
        },
    ]
}

/// Serve from the cache when it holds this kind, else fetch live
pub async fn query(
    ctx: &ToolContext,
    token: Option<&str>,
    kind: ResourceKind,
    args: Value,
) -> Result<Value, ToolError> {
    let params: QueryParams = parse_args(args)?;

    let records = match ctx.cache.records(kind).await {
        Some(records) => {
            tracing::debug!("Serving {} {} from cache", records.len(), kind.as_str());
            records
        }
        None => {
            let token = require_token(token)?;
            let fetch = live_fetch_limit(&params, ctx.config.max_fetch_for_sort);
            tracing::info!("Cache empty for {}, fetching up to {} live", kind.as_str(), fetch);
            ctx.testbed.list_resources(Some(token), kind, fetch).await?
        }
    };

    let page = query::run(records, &params)?;
    to_value(&page)
}

/// How many records a live fetch needs so that filtering, sorting and the
/// requested window all see the right data
fn live_fetch_limit(params: &QueryParams, max_fetch: usize) -> usize {
    let (limit, offset) = params.sanitize();
    match limit {
        Some(limit) if params.sort.is_none() && !params.has_filters() => {
            (offset + limit).min(max_fetch)
        }
        _ => max_fetch,
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use crate::auth::Caller;
    use crate::cache::Snapshot;
    use crate::testbed::fake::FakeTestbed;
    use std::sync::atomic::Ordering;
    use std::sync::Arc;

    fn sites() -> Value {
        json!([
            {"name": "STAR", "cores_available": 16},
            {"name": "TACC", "cores_available": 64},
            {"name": "UCSD", "cores_available": 128}
        ])
    }

    #[tokio::test]
    async fn test_live_fetch_when_cache_empty() {
        let tb = Arc::new(FakeTestbed::new().with_resources(ResourceKind::Sites, sites()));
        let ctx = context(tb.clone());

        let page = ctx
            .call_tool(
                &caller("tok"),
                "fabric_query_sites",
                json!({"filters": {"cores_available": {"gte": 32}}}),
            )
            .await
            .unwrap();
        assert_eq!(page["total"], 2);
        assert_eq!(page["items"][0]["name"], "TACC");
        assert_eq!(tb.resource_calls.load(Ordering::SeqCst), 1);
        assert_eq!(tb.tokens.lock().unwrap()[0].as_deref(), Some("tok"));
    }

    #[tokio::test]
    async fn test_cache_hit_needs_no_token() {
        let tb = Arc::new(FakeTestbed::new());
        let ctx = context(tb.clone());
        let mut snapshot = Snapshot::default();
        snapshot.hosts = serde_json::from_value(json!([
            {"name": "star-w1", "site": "STAR"},
            {"name": "tacc-w2", "site": "TACC"}
        ]))
        .unwrap();
        ctx.cache.replace(snapshot).await;

        let page = ctx
            .call_tool(
                &Caller::default(),
                "fabric_query_hosts",
                json!({"sort": {"field": "name", "direction": "desc"}, "limit": 1}),
            )
            .await
            .unwrap();
        assert_eq!(page["items"][0]["name"], "tacc-w2");
        assert_eq!(page["has_more"], true);
        assert_eq!(tb.resource_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_live_fetch_requires_token() {
        let ctx = context(Arc::new(FakeTestbed::new()));
        let err = ctx
            .call_tool(&Caller::default(), "fabric_query_links", json!({}))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "AuthenticationRequired");
    }

    #[tokio::test]
    async fn test_bad_operator_reported() {
        let tb = Arc::new(FakeTestbed::new().with_resources(ResourceKind::Sites, sites()));
        let ctx = context(tb);
        let err = ctx
            .call_tool(
                &caller("tok"),
                "fabric_query_sites",
                json!({"filters": {"name": {"startswith": "S"}}}),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "UnknownOperator");
    }

    #[tokio::test]
    async fn test_zero_limit_is_clamped_to_one() {
        let schema = query_schema();
        let text = schema["properties"]["limit"]["description"].as_str().unwrap();
        assert!(text.contains("clamped to 1..=5000"));

        let ctx = context(Arc::new(FakeTestbed::new()));
        let mut snapshot = Snapshot::default();
        snapshot.sites = serde_json::from_value(sites()).unwrap();
        ctx.cache.replace(snapshot).await;

        let page = ctx
            .call_tool(&caller("tok"), "fabric_query_sites", json!({"limit": 0}))
            .await
            .unwrap();
        assert_eq!(page["count"], 1);
        assert_eq!(page["total"], 3);
        assert_eq!(page["has_more"], true);
    }

    #[test]
    fn test_live_fetch_limit() {
        let params: QueryParams = serde_json::from_value(json!({"limit": 10, "offset": 5})).unwrap();
        assert_eq!(live_fetch_limit(&params, 5000), 15);

        let params: QueryParams =
            serde_json::from_value(json!({"limit": 10, "sort": {"field": "name"}})).unwrap();
        assert_eq!(live_fetch_limit(&params, 5000), 5000);

        let params: QueryParams = serde_json::from_value(json!({"limit": null})).unwrap();
        assert_eq!(live_fetch_limit(&params, 300), 300);
    }
}
