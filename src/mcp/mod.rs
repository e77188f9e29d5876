//! JSON-RPC framing for the MCP methods this server answers

pub mod stdio;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Value};

use crate::auth::Caller;
use crate::tools::{ToolContext, ToolError};

pub const PROTOCOL_VERSION: &str = "2024-11-05";

pub const PARSE_ERROR: i32 = -32700;
pub const INVALID_REQUEST: i32 = -32600;
pub const METHOD_NOT_FOUND: i32 = -32601;
pub const INVALID_PARAMS: i32 = -32602;

/// MCP JSON-RPC request
#[derive(Debug, Deserialize)]
pub struct McpRequest {
    #[serde(default)]
    pub jsonrpc: String,
    /// `None` only when the field is absent; an explicit null is `Some(Value::Null)`
    #[serde(default, deserialize_with = "present_id")]
    pub id: Option<Value>,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

fn present_id<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Value>, D::Error> {
    Value::deserialize(d).map(Some)
}

impl McpRequest {
    /// Requests without an id are notifications and get no response
    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }
}

/// MCP JSON-RPC response
#[derive(Debug, Serialize)]
pub struct McpResponse {
    pub jsonrpc: &'static str,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<McpError>,
}

#[derive(Debug, Serialize)]
pub struct McpError {
    pub code: i32,
    pub message: String,
}

impl McpResponse {
    pub fn success(id: Option<Value>, result: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id: id.unwrap_or(Value::Null),
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(id: Option<Value>, code: i32, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0",
            id: id.unwrap_or(Value::Null),
            result: None,
            error: Some(McpError {
                code,
                message: message.into(),
            }),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ToolCallParams {
    name: String,
    #[serde(default)]
    arguments: Value,
}

/// Parse one raw message and handle it. `None` means nothing to send back.
pub async fn handle_message(ctx: &ToolContext, caller: &Caller, raw: &str) -> Option<McpResponse> {
    match serde_json::from_str::<McpRequest>(raw) {
        Ok(request) => handle_request(ctx, caller, request).await,
        Err(e) => Some(McpResponse::failure(
            None,
            PARSE_ERROR,
            format!("Parse error: {}", e),
        )),
    }
}

/// Handle an MCP request
pub async fn handle_request(
    ctx: &ToolContext,
    caller: &Caller,
    request: McpRequest,
) -> Option<McpResponse> {
    if request.is_notification() {
        tracing::debug!("Notification: {}", request.method);
        return None;
    }
    if !request.jsonrpc.is_empty() && request.jsonrpc != "2.0" {
        return Some(McpResponse::failure(
            request.id,
            INVALID_REQUEST,
            format!("Unsupported jsonrpc version: {}", request.jsonrpc),
        ));
    }

    let response = match request.method.as_str() {
        "initialize" => McpResponse::success(request.id, initialize_result()),
        "ping" => McpResponse::success(request.id, json!({})),
        "tools/list" => McpResponse::success(
            request.id,
            json!({ "tools": ToolContext::definitions() }),
        ),
        "tools/call" => {
            let params: ToolCallParams = match serde_json::from_value(request.params) {
                Ok(p) => p,
                Err(e) => {
                    return Some(McpResponse::failure(
                        request.id,
                        INVALID_PARAMS,
                        format!("Invalid tools/call params: {}", e),
                    ))
                }
            };
            match ctx.call_tool(caller, &params.name, params.arguments).await {
                Ok(value) => McpResponse::success(request.id, tool_content(&value, false)),
                Err(ToolError::UnknownTool(name)) => McpResponse::failure(
                    request.id,
                    INVALID_PARAMS,
                    format!("Unknown tool: {}", name),
                ),
                Err(e) => McpResponse::success(request.id, tool_content(&error_body(&e), true)),
            }
        }
        other => McpResponse::failure(
            request.id,
            METHOD_NOT_FOUND,
            format!("Method not found: {}", other),
        ),
    };
    Some(response)
}

fn initialize_result() -> Value {
    json!({
        "protocolVersion": PROTOCOL_VERSION,
        "serverInfo": {
            "name": env!("CARGO_PKG_NAME"),
            "version": env!("CARGO_PKG_VERSION")
        },
        "capabilities": {
            "tools": {}
        }
    })
}

fn tool_content(value: &Value, is_error: bool) -> Value {
    json!({
        "content": [{"type": "text", "text": value.to_string()}],
        "isError": is_error
    })
}

fn error_body(err: &ToolError) -> Value {
    json!({"error": err.kind(), "message": err.to_string()})
}
