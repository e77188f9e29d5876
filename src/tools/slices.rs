use serde_json::{json, Value};

use super::topology::query_schema;
use super::{parse_args, require_token, to_value, ToolContext, ToolDef, ToolError};
use crate::models::catalog::{ComponentModel, NetworkType};
use crate::models::slice::{
    BuildSliceRequest, GetSliceRequest, ModifySliceRequest, QuerySlicesRequest,
    slice_state, RenewSliceRequest, SliceIdRequest, SliceSelector,
};
use crate::query;
use crate::slice::{self, CompileOptions, TopologyError};
use crate::testbed::SliceQuery;

fn string_list() -> Value {
    json!({"type": "array", "items": {"type": "string"}})
}

fn model_schema() -> Value {
    json!({
        "type": "string",
        "description": format!("One of: {}", ComponentModel::catalog())
    })
}

fn node_schema() -> Value {
    json!({
        "type": "object",
        "required": ["name"],
        "properties": {
            "name": {"type": "string"},
            "site": {"type": "string", "description": "Omit to pick a site with enough capacity"},
            "cores": {"type": "integer", "minimum": 1, "default": 2},
            "ram": {"type": "integer", "minimum": 1, "default": 8},
            "disk": {"type": "integer", "minimum": 1, "default": 10},
            "image": {"type": "string", "default": "default_rocky_8"},
            "components": {
                "type": "array",
                "items": {
                    "type": "object",
                    "required": ["model"],
                    "properties": {
                        "model": model_schema(),
                        "name": {"type": "string"}
                    }
                }
            },
            "fabnet": {"description": "true, \"IPv4\", \"IPv6\" or {\"type\": ...}"}
        }
    })
}

fn network_schema() -> Value {
    json!({
        "type": "object",
        "required": ["name"],
        "properties": {
            "name": {"type": "string"},
            "nodes": string_list(),
            "interfaces": {
                "type": "array",
                "description": "Endpoints: {node, nic?, port?, nic_model?, vlan?, sub_name?, mode?}, \
                    {node, component, port?}, {switch, port?} or {facility_port}",
                "items": {"type": "object"}
            },
            "type": {
                "type": "string",
                "description": format!(
                    "One of: {}. Omit for L2Bridge on one site, or per-site FABNetv4 networks \
                    named {{name}}-{{site}} on two or more; use \"L2\" for an L2STS circuit across sites",
                    NetworkType::catalog()
                )
            },
            "nic": {"type": "string", "description": "NIC model for node endpoints"},
            "bandwidth": {"type": "integer", "minimum": 1},
            "ero": string_list(),
            "subnet": {"type": "string", "description": "IPv4 CIDR for layer-2 networks"}
        }
    })
}

fn switch_schema() -> Value {
    json!({
        "type": "object",
        "required": ["name", "site"],
        "properties": {"name": {"type": "string"}, "site": {"type": "string"}}
    })
}

fn facility_port_schema() -> Value {
    json!({
        "type": "object",
        "required": ["name", "site", "vlan"],
        "properties": {
            "name": {"type": "string"},
            "site": {"type": "string"},
            "vlan": {"type": ["string", "integer"]}
        }
    })
}

fn port_mirror_schema() -> Value {
    json!({
        "type": "object",
        "required": ["name", "mirror_interface_name", "receive_interface"],
        "properties": {
            "name": {"type": "string"},
            "mirror_interface_name": {"type": "string"},
            "receive_interface": {"type": "object"},
            "mirror_direction": {"type": "string", "enum": ["rx", "tx", "both"]}
        }
    })
}

fn array_of(items: Value) -> Value {
    json!({"type": "array", "items": items})
}

fn slice_id_schema() -> Value {
    json!({
        "type": "object",
        "required": ["slice_id"],
        "properties": {"slice_id": {"type": "string"}}
    })
}

pub fn definitions() -> Vec<ToolDef> {
    let mut query_slices = query_schema();
    if let Some(props) = query_slices["properties"].as_object_mut() {
        props.insert("as_self".into(), json!({"type": "boolean", "default": true}));
        props.insert("slice_state".into(), string_list());
        props.insert("exclude_slice_state".into(), string_list());
    }

    vec![
        ToolDef {
            name: "fabric_build_slice",
            description: "Compile a declarative topology into a slice and submit it. \
                Returns once the request is accepted; it does not wait for provisioning.",
            input_schema: json!({
                "type": "object",
                "required": ["name"],
                "properties": {
                    "name": {"type": "string"},
                    "ssh_keys": string_list(),
                    "nodes": array_of(node_schema()),
                    "switches": array_of(switch_schema()),
                    "facility_ports": array_of(facility_port_schema()),
                    "networks": array_of(network_schema()),
                    "port_mirrors": array_of(port_mirror_schema()),
                    "lifetime": {"type": "integer", "minimum": 1, "description": "Lease in days"},
                    "lease_start_time": {"type": "string"},
                    "lease_end_time": {"type": "string"}
                }
            }),
        },
        ToolDef {
            name: "fabric_modify_slice",
            description: "Add or remove resources of an existing slice. Removals are \
                best-effort and run first; additions abort on the first error.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "slice_name": {"type": "string"},
                    "slice_id": {"type": "string"},
                    "add_nodes": array_of(node_schema()),
                    "add_components": array_of(json!({
                        "type": "object",
                        "required": ["node", "model"],
                        "properties": {
                            "node": {"type": "string"},
                            "model": model_schema(),
                            "name": {"type": "string"}
                        }
                    })),
                    "add_switches": array_of(switch_schema()),
                    "add_facility_ports": array_of(facility_port_schema()),
                    "add_networks": array_of(network_schema()),
                    "add_port_mirrors": array_of(port_mirror_schema()),
                    "remove_port_mirrors": string_list(),
                    "remove_networks": string_list(),
                    "remove_facility_ports": string_list(),
                    "remove_switches": string_list(),
                    "remove_components": array_of(json!({
                        "type": "object",
                        "required": ["node", "name"],
                        "properties": {"node": {"type": "string"}, "name": {"type": "string"}}
                    })),
                    "remove_nodes": string_list()
                }
            }),
        },
        ToolDef {
            name: "fabric_accept_modify",
            description: "Accept a pending slice modification.",
            input_schema: slice_id_schema(),
        },
        ToolDef {
            name: "fabric_renew_slice",
            description: "Extend a slice lease to a new end time (UTC).",
            input_schema: json!({
                "type": "object",
                "required": ["slice_id", "lease_end_time"],
                "properties": {
                    "slice_id": {"type": "string"},
                    "lease_end_time": {"type": "string"}
                }
            }),
        },
        ToolDef {
            name: "fabric_delete_slice",
            description: "Delete a slice.",
            input_schema: slice_id_schema(),
        },
        ToolDef {
            name: "fabric_query_slices",
            description: "List the caller's slices with filtering, sorting and pagination. \
                Closing and Dead slices are hidden unless requested.",
            input_schema: query_slices,
        },
        ToolDef {
            name: "fabric_get_slice",
            description: "Fetch one slice with its topology, by name or id.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "slice_name": {"type": "string"},
                    "slice_id": {"type": "string"}
                }
            }),
        },
    ]
}

fn compile_options(ctx: &ToolContext) -> CompileOptions {
    CompileOptions {
        assign_interface_modes: ctx.config.local_mode,
    }
}

pub async fn build(ctx: &ToolContext, token: Option<&str>, args: Value) -> Result<Value, ToolError> {
    let token = require_token(token)?;
    let request: BuildSliceRequest = serde_json::from_value(args).map_err(TopologyError::from)?;
    let result =
        slice::build_slice(ctx.testbed.as_ref(), Some(token), request, compile_options(ctx)).await?;
    to_value(&result)
}

pub async fn modify(ctx: &ToolContext, token: Option<&str>, args: Value) -> Result<Value, ToolError> {
    let token = require_token(token)?;
    let request: ModifySliceRequest = serde_json::from_value(args).map_err(TopologyError::from)?;
    let result =
        slice::modify_slice(ctx.testbed.as_ref(), Some(token), request, compile_options(ctx)).await?;
    to_value(&result)
}

pub async fn accept_modify(
    ctx: &ToolContext,
    token: Option<&str>,
    args: Value,
) -> Result<Value, ToolError> {
    let token = require_token(token)?;
    let SliceIdRequest { slice_id } = parse_args(args)?;
    let slice = ctx.testbed.accept_modify(Some(token), &slice_id).await?;
    tracing::info!("Accepted modification of slice {}", slice_id);
    Ok(json!({"status": "ok", "slice_id": slice_id, "slice": slice}))
}

pub async fn renew(ctx: &ToolContext, token: Option<&str>, args: Value) -> Result<Value, ToolError> {
    let token = require_token(token)?;
    let RenewSliceRequest {
        slice_id,
        lease_end_time,
    } = parse_args(args)?;
    ctx.testbed
        .renew_slice(Some(token), &slice_id, &lease_end_time)
        .await?;
    tracing::info!("Renewed slice {} until {}", slice_id, lease_end_time);
    Ok(json!({"status": "ok", "slice_id": slice_id, "lease_end_time": lease_end_time}))
}

pub async fn delete(ctx: &ToolContext, token: Option<&str>, args: Value) -> Result<Value, ToolError> {
    let token = require_token(token)?;
    let SliceIdRequest { slice_id } = parse_args(args)?;
    ctx.testbed.delete_slice(Some(token), &slice_id).await?;
    tracing::info!("Deleted slice {}", slice_id);
    Ok(json!({"status": "ok", "slice_id": slice_id}))
}

pub async fn query(ctx: &ToolContext, token: Option<&str>, args: Value) -> Result<Value, ToolError> {
    let token = require_token(token)?;
    let request: QuerySlicesRequest = parse_args(args)?;
    for state in request.slice_state.iter().chain(&request.exclude_slice_state) {
        if !slice_state::is_valid(state) {
            tracing::warn!("Ignoring unknown slice state: {}", state);
        }
    }
    let slice_query = SliceQuery {
        as_self: request.as_self,
        exclude_states: request.excluded_states(),
        limit: ctx.config.max_fetch_for_sort,
    };
    let records = ctx.testbed.list_slices(Some(token), &slice_query).await?;
    let page = query::run(records, &request.query)?;
    to_value(&page)
}

pub async fn get(ctx: &ToolContext, token: Option<&str>, args: Value) -> Result<Value, ToolError> {
    let token = require_token(token)?;
    let request: GetSliceRequest = parse_args(args)?;
    let selector =
        SliceSelector::from_parts(request.slice_name.as_deref(), request.slice_id.as_deref())?;
    match ctx.testbed.get_slice(Some(token), &selector).await? {
        Some(record) => to_value(&record),
        None => Err(ToolError::NotFound(format!("slice not found: {}", selector))),
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use crate::auth::Caller;
    use crate::models::slice::SliceRecord;
    use crate::slice::SliceGraph;
    use crate::testbed::fake::FakeTestbed;
    use std::sync::Arc;

    fn slice(id: &str, name: &str, state: &str) -> SliceRecord {
        SliceRecord {
            id: id.into(),
            name: name.into(),
            state: Some(state.into()),
            lease_start_time: None,
            lease_end_time: None,
            graph: SliceGraph::default(),
        }
    }

    #[test]
    fn test_network_type_description_matches_default_rule() {
        let schema = network_schema();
        let text = schema["properties"]["type"]["description"].as_str().unwrap();
        assert!(text.contains(
            "Omit for L2Bridge on one site, or per-site FABNetv4 networks named {name}-{site} \
             on two or more; use \"L2\" for an L2STS circuit across sites"
        ));
    }

    #[tokio::test]
    async fn test_build_slice_tool() {
        let tb = Arc::new(FakeTestbed::new());
        let ctx = context(tb.clone());
        let result = ctx
            .call_tool(
                &caller("tok"),
                "fabric_build_slice",
                json!({
                    "name": "demo",
                    "nodes": [{"name": "a", "site": "X"}, {"name": "b", "site": "Y"}],
                    "networks": [{"name": "net1", "nodes": ["a", "b"], "type": "FABNetv4"}]
                }),
            )
            .await
            .unwrap();
        assert_eq!(result["status"], "submitted");
        assert_eq!(result["identifiers"]["id"], "slice-1");
        assert_eq!(result["added"]["networks"], json!(["net1-X", "net1-Y"]));
        assert!(result.get("removed").is_none());
    }

    #[tokio::test]
    async fn test_build_rejects_unknown_model() {
        let ctx = context(Arc::new(FakeTestbed::new()));
        let err = ctx
            .call_tool(
                &caller("tok"),
                "fabric_build_slice",
                json!({
                    "name": "demo",
                    "nodes": [{"name": "a", "site": "X", "components": [{"model": "GPU_Unknown"}]}]
                }),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "UnknownComponentModel");
        assert!(err.to_string().contains("GPU_TeslaT4"));
    }

    #[tokio::test]
    async fn test_slice_tools_require_token() {
        let ctx = context(Arc::new(FakeTestbed::new()));
        let err = ctx
            .call_tool(&Caller::default(), "fabric_delete_slice", json!({"slice_id": "x"}))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "AuthenticationRequired");
        assert_eq!(
            err.to_string(),
            "Authentication Required: Missing or invalid Authorization Bearer token."
        );
    }

    #[tokio::test]
    async fn test_lifecycle_tools() {
        let tb = Arc::new(FakeTestbed::new().with_slice(slice("abc", "demo", "ModifyOK")));
        let ctx = context(tb.clone());
        let who = caller("tok");

        let accepted = ctx
            .call_tool(&who, "fabric_accept_modify", json!({"slice_id": "abc"}))
            .await
            .unwrap();
        assert_eq!(accepted["status"], "ok");
        assert_eq!(tb.slice("abc").unwrap().state.as_deref(), Some("StableOK"));

        let renewed = ctx
            .call_tool(
                &who,
                "fabric_renew_slice",
                json!({"slice_id": "abc", "lease_end_time": "2026-12-01 00:00:00 +0000"}),
            )
            .await
            .unwrap();
        assert_eq!(
            renewed,
            json!({"status": "ok", "slice_id": "abc", "lease_end_time": "2026-12-01 00:00:00 +0000"})
        );

        let deleted = ctx
            .call_tool(&who, "fabric_delete_slice", json!({"slice_id": "abc"}))
            .await
            .unwrap();
        assert_eq!(deleted, json!({"status": "ok", "slice_id": "abc"}));

        let err = ctx
            .call_tool(&who, "fabric_delete_slice", json!({"slice_id": "nope"}))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "NotFound");
    }

    #[tokio::test]
    async fn test_query_slices_hides_dead_by_default() {
        let tb = Arc::new(
            FakeTestbed::new()
                .with_slice(slice("1", "alpha", "StableOK"))
                .with_slice(slice("2", "beta", "Dead"))
                .with_slice(slice("3", "gamma", "Configuring")),
        );
        let ctx = context(tb);
        let who = caller("tok");

        let page = ctx
            .call_tool(&who, "fabric_query_slices", json!({}))
            .await
            .unwrap();
        assert_eq!(page["total"], 2);

        let page = ctx
            .call_tool(
                &who,
                "fabric_query_slices",
                json!({"slice_state": "[\"Dead\"]", "sort": {"field": "name"}}),
            )
            .await
            .unwrap();
        assert_eq!(page["total"], 1);
        assert_eq!(page["items"][0]["name"], "beta");
    }

    #[tokio::test]
    async fn test_get_slice() {
        let tb = Arc::new(FakeTestbed::new().with_slice(slice("abc", "demo", "StableOK")));
        let ctx = context(tb);
        let who = caller("tok");

        let found = ctx
            .call_tool(&who, "fabric_get_slice", json!({"slice_name": "demo"}))
            .await
            .unwrap();
        assert_eq!(found["id"], "abc");

        let err = ctx
            .call_tool(&who, "fabric_get_slice", json!({"slice_name": "other"}))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "NotFound");

        let err = ctx
            .call_tool(&who, "fabric_get_slice", json!({}))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "InvalidTopology");
    }
}
