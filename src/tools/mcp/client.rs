// MCP client - launches the tool server and talks to it through rust-mcp-sdk
//
// The SDK runtime lives in a session task that owns it; `McpClient` forwards
// requests over a channel, so calls are answered one at a time in order.

use async_trait::async_trait;
use rust_mcp_sdk::mcp_client::client_runtime::create_client;
use rust_mcp_sdk::mcp_client::{ClientHandler, McpClientOptions, ToMcpClientHandler};
use rust_mcp_sdk::schema::{
    self, CallToolRequestParams, ClientCapabilities, InitializeRequestParams, ProtocolVersion,
    RpcError,
};
use rust_mcp_sdk::task_store::InMemoryTaskStore;
use rust_mcp_sdk::McpClient as _;
use rust_mcp_sdk::{StdioTransport, TransportOptions};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

use super::config::McpServerConfig;
use super::error::McpError;
use super::protocol::{CallToolResult, Implementation};
use crate::tools::types::ToolDefinition;

/// What the agent loop needs from a tool connection
#[async_trait]
pub trait ToolInvoker: Send + Sync {
    async fn list_tools(&self) -> Result<Vec<ToolDefinition>, McpError>;

    async fn call_tool(&self, name: &str, arguments: Value) -> Result<CallToolResult, McpError>;
}

/// No server-initiated requests are supported beyond the SDK defaults
pub struct AgentClientHandler;

#[async_trait]
impl ClientHandler for AgentClientHandler {}

enum SessionRequest {
    ListTools(oneshot::Sender<Result<Vec<ToolDefinition>, McpError>>),
    CallTool {
        params: CallToolRequestParams,
        reply: oneshot::Sender<Result<CallToolResult, McpError>>,
    },
    Shutdown(oneshot::Sender<Result<(), McpError>>),
}

/// A connected MCP client
pub struct McpClient {
    requests: mpsc::Sender<SessionRequest>,
    server_info: Option<Implementation>,
}

impl McpClient {
    /// Launch the server as a child process, run the handshake and keep the
    /// session open until `shutdown`
    pub async fn spawn(config: &McpServerConfig) -> Result<Self, McpError> {
        config
            .validate()
            .map_err(|e| McpError::Spawn(e.to_string()))?;

        tracing::debug!(
            "Launching MCP server: {} {}",
            config.command,
            config.args.join(" ")
        );

        let transport = StdioTransport::create_with_server_launch(
            &config.command,
            config.args.clone(),
            if config.env.is_empty() {
                None
            } else {
                Some(config.env.clone())
            },
            TransportOptions::default(),
        )
        .map_err(|e| McpError::Spawn(format!("{}: {:?}", config.command, e)))?;

        let client = create_client(McpClientOptions {
            client_details: client_details(),
            transport,
            handler: AgentClientHandler.to_mcp_client_handler(),
            task_store: Some(Arc::new(InMemoryTaskStore::new(None))),
            server_task_store: Some(Arc::new(InMemoryTaskStore::new(None))),
        });

        client
            .clone()
            .start()
            .await
            .map_err(|e| McpError::Spawn(format!("{}: {}", config.command, e)))?;

        let server_info: Option<Implementation> = match client.server_version() {
            Some(info) => Some(convert(info)?),
            None => None,
        };
        if let Some(info) = &server_info {
            tracing::info!("Connected to MCP server '{}' v{}", info.name, info.version);
        }

        let (requests, mut inbox) = mpsc::channel::<SessionRequest>(8);
        tokio::spawn(async move {
            while let Some(request) = inbox.recv().await {
                match request {
                    SessionRequest::ListTools(reply) => {
                        let result = match client.request_tool_list(None).await {
                            Ok(list) => convert(list.tools),
                            Err(e) => Err(sdk_error(e)),
                        };
                        let _ = reply.send(result);
                    }
                    SessionRequest::CallTool { params, reply } => {
                        let result = match client.request_tool_call(params).await {
                            Ok(result) => convert(result),
                            Err(e) => Err(sdk_error(e)),
                        };
                        let _ = reply.send(result);
                    }
                    SessionRequest::Shutdown(reply) => {
                        let _ = reply.send(client.shut_down().await.map_err(sdk_error));
                        break;
                    }
                }
            }
            tracing::debug!("MCP session closed");
        });

        Ok(Self {
            requests,
            server_info,
        })
    }

    pub fn server_info(&self) -> Option<&Implementation> {
        self.server_info.as_ref()
    }

    /// Stop the server process. Later calls fail with `ConnectionClosed`.
    pub async fn shutdown(&self) -> Result<(), McpError> {
        let (reply, response) = oneshot::channel();
        if self
            .requests
            .send(SessionRequest::Shutdown(reply))
            .await
            .is_err()
        {
            return Ok(());
        }
        response.await.map_err(|_| McpError::ConnectionClosed)??;
        tracing::info!("MCP server stopped");
        Ok(())
    }

    async fn send<T>(
        &self,
        request: impl FnOnce(oneshot::Sender<Result<T, McpError>>) -> SessionRequest,
    ) -> Result<T, McpError> {
        let (reply, response) = oneshot::channel();
        self.requests
            .send(request(reply))
            .await
            .map_err(|_| McpError::ConnectionClosed)?;
        response.await.map_err(|_| McpError::ConnectionClosed)?
    }
}

#[async_trait]
impl ToolInvoker for McpClient {
    async fn list_tools(&self) -> Result<Vec<ToolDefinition>, McpError> {
        self.send(SessionRequest::ListTools).await
    }

    async fn call_tool(&self, name: &str, arguments: Value) -> Result<CallToolResult, McpError> {
        let params = call_params(name, arguments)?;
        self.send(|reply| SessionRequest::CallTool { params, reply })
            .await
    }
}

fn client_details() -> InitializeRequestParams {
    InitializeRequestParams {
        protocol_version: ProtocolVersion::V2025_11_25.into(),
        capabilities: ClientCapabilities::default(),
        client_info: schema::Implementation {
            name: env!("CARGO_PKG_NAME").to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            description: Some("Data analyst agent for Azure Analysis Services".to_string()),
            icons: vec![],
            title: None,
            website_url: None,
        },
        meta: None,
    }
}

/// `tools/call` params; arguments must be a JSON object or absent
fn call_params(name: &str, arguments: Value) -> Result<CallToolRequestParams, McpError> {
    let mut params = json!({ "name": name });
    match arguments {
        Value::Null => {}
        Value::Object(_) => params["arguments"] = arguments,
        other => {
            return Err(McpError::Protocol(format!(
                "tool arguments must be a JSON object, got {}",
                other
            )))
        }
    }
    Ok(serde_json::from_value(params)?)
}

/// Re-read an SDK value through its wire form into one of our types
fn convert<T: Serialize, U: DeserializeOwned>(value: T) -> Result<U, McpError> {
    Ok(serde_json::from_value(serde_json::to_value(value)?)?)
}

/// Error objects from the server stay request-scoped; anything else means
/// the session is in trouble
fn sdk_error<E>(e: E) -> McpError
where
    E: std::error::Error + 'static,
{
    let top: &(dyn std::error::Error + 'static) = &e;
    let rpc = std::iter::successors(Some(top), |err| err.source())
        .find_map(|err| err.downcast_ref::<RpcError>());

    match rpc {
        Some(rpc) => McpError::Rpc {
            code: rpc.code as i64,
            message: rpc.message.clone(),
        },
        None => McpError::Sdk(e.to_string()),
    }
}
