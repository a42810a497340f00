// MCP tool server - exposes query_analysis_services over a line-framed stream
//
// Holds nothing but the immutable tool descriptor and the bridge, so one
// value can serve any number of connections.

use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, BufReader};
use tracing::{debug, error, info, warn};

use super::error::McpError;
use super::protocol::{
    write_message, CallToolParams, CallToolResult, Implementation, InitializeParams,
    InitializeResult, JsonRpcError, JsonRpcRequest, JsonRpcResponse, ListToolsResult, JSONRPC_VERSION,
};
use crate::bridge::QueryBridge;
use crate::config::constants::{PROTOCOL_VERSION, SERVER_NAME, SUPPORTED_PROTOCOL_VERSIONS};
use crate::errors::QueryError;
use crate::tools::query_tool;
use crate::tools::types::ToolDefinition;

/// Counter used only to correlate log lines
static REQUEST_COUNTER: AtomicU64 = AtomicU64::new(1);

#[derive(Clone)]
pub struct McpServer {
    bridge: Arc<QueryBridge>,
    tool: &'static ToolDefinition,
}

impl McpServer {
    pub fn new(bridge: QueryBridge) -> Self {
        Self {
            bridge: Arc::new(bridge),
            tool: query_tool::definition(),
        }
    }

    /// Serve the process's own stdin/stdout until stdin closes
    pub async fn serve_stdio(&self) -> Result<(), McpError> {
        self.serve(tokio::io::stdin(), tokio::io::stdout()).await
    }

    /// Serve one connection until the reader hits EOF.
    ///
    /// Requests are answered in arrival order. Per-request failures are sent
    /// back as JSON-RPC errors; only stream I/O errors end the loop.
    pub async fn serve<R, W>(&self, reader: R, mut writer: W) -> Result<(), McpError>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut lines = BufReader::new(reader).lines();
        info!("MCP server '{}' ready", SERVER_NAME);

        while let Some(line) = lines.next_line().await? {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            if let Some(response) = self.handle_line(line).await {
                write_message(&mut writer, &response).await?;
            }
        }

        info!("MCP client disconnected");
        Ok(())
    }

    /// Handle one raw frame. Returns `None` for notifications.
    pub async fn handle_line(&self, line: &str) -> Option<JsonRpcResponse> {
        let req_id = REQUEST_COUNTER.fetch_add(1, Ordering::Relaxed);
        debug!(req_id, raw = %line, "Received JSON-RPC frame");

        let request: JsonRpcRequest = match serde_json::from_str(line) {
            Ok(request) => request,
            Err(e) => {
                error!(req_id, error = %e, "Failed to parse JSON-RPC request");
                return Some(JsonRpcResponse::error(
                    Value::Null,
                    JsonRpcError::new(JsonRpcError::PARSE_ERROR, e.to_string()),
                ));
            }
        };

        if request.jsonrpc != JSONRPC_VERSION {
            warn!(req_id, got = %request.jsonrpc, "Invalid JSON-RPC version");
            return Some(JsonRpcResponse::error(
                request.id.unwrap_or(Value::Null),
                JsonRpcError::with_data(
                    JsonRpcError::INVALID_REQUEST,
                    "Invalid JSON-RPC version",
                    json!({"expected": JSONRPC_VERSION, "got": request.jsonrpc}),
                ),
            ));
        }

        self.handle_request(request).await
    }

    /// Dispatch a parsed request
    pub async fn handle_request(&self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        let result = match request.method.as_str() {
            "initialize" => self.initialize(&request.params),
            "initialized" | "notifications/initialized" => Ok(json!({})),
            "ping" => Ok(json!({})),
            "tools/list" => to_value(self.list_tools()),
            "tools/call" => self.handle_tools_call(&request.params).await,
            other => Err(JsonRpcError::new(
                JsonRpcError::METHOD_NOT_FOUND,
                format!("Method not found: {}", other),
            )),
        };

        let Some(id) = request.id else {
            if let Err(e) = result {
                warn!(method = %request.method, error = %e.message, "Notification handling failed");
            }
            return None;
        };

        Some(match result {
            Ok(value) => JsonRpcResponse::success(id, value),
            Err(e) => {
                warn!(method = %request.method, code = e.code, "Request failed: {}", e.message);
                JsonRpcResponse::error(id, e)
            }
        })
    }

    /// `tools/list`: always the same single descriptor
    pub fn list_tools(&self) -> ListToolsResult {
        ListToolsResult {
            tools: vec![self.tool.clone()],
        }
    }

    /// `tools/call`: route to the bridge if the name matches.
    ///
    /// Validation problems come back as an `isError` result rather than a
    /// protocol error so the caller sees a readable message.
    pub async fn call_tool(
        &self,
        name: &str,
        arguments: &Value,
    ) -> Result<CallToolResult, QueryError> {
        if name != self.tool.name {
            return Err(QueryError::UnknownCapability(name.to_string()));
        }

        info!(tool = %name, "Dispatching tool call");
        match self.bridge.invoke_with_arguments(arguments).await {
            Ok(text) => Ok(CallToolResult::text(text)),
            Err(QueryError::Validation(message)) => {
                warn!(tool = %name, "Rejected tool arguments: {}", message);
                Ok(CallToolResult::error(format!("Error: {}", message)))
            }
            Err(e) => Err(e),
        }
    }

    /// Echo the client's protocol revision when we speak it, else offer ours
    fn initialize(&self, params: &Value) -> Result<Value, JsonRpcError> {
        let requested = serde_json::from_value::<InitializeParams>(params.clone())
            .ok()
            .map(|params| params.protocol_version);
        let protocol_version = match requested {
            Some(version) if SUPPORTED_PROTOCOL_VERSIONS.contains(&version.as_str()) => version,
            _ => PROTOCOL_VERSION.to_string(),
        };

        info!(%protocol_version, "MCP session initialized");
        to_value(InitializeResult {
            protocol_version,
            capabilities: json!({"tools": {}}),
            server_info: Implementation {
                name: SERVER_NAME.to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
        })
    }

    async fn handle_tools_call(&self, params: &Value) -> Result<Value, JsonRpcError> {
        let params: CallToolParams = serde_json::from_value(params.clone()).map_err(|e| {
            JsonRpcError::new(
                JsonRpcError::INVALID_PARAMS,
                format!("Invalid tools/call params: {}", e),
            )
        })?;

        let result = self.call_tool(&params.name, &params.arguments).await?;
        to_value(result)
    }
}

fn to_value<T: serde::Serialize>(value: T) -> Result<Value, JsonRpcError> {
    serde_json::to_value(value)
        .map_err(|e| JsonRpcError::new(JsonRpcError::INTERNAL_ERROR, e.to_string()))
}
