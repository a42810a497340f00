// MCP (Model Context Protocol) plumbing
//
// The tool server and the agent talk newline-delimited JSON-RPC 2.0 over the
// server's stdin/stdout. The server loop runs over any byte stream, so tests
// can drive it through an in-memory `tokio::io::duplex` pair.
//
// - McpServer: exposes query_analysis_services and routes calls to the bridge
// - McpClient: launches a server and calls it through rust-mcp-sdk
// - ToolInvoker: the seam the agent loop dispatches through
//
// Usage:
// ```rust,ignore
// let client = McpClient::spawn(&McpServerConfig::current_exe_serve()?).await?;
// let tools = client.list_tools().await?;
// let result = client.call_tool("query_analysis_services", json!({"query": "EVALUATE 'Product'"})).await?;
// ```

pub mod client;
pub mod config;
pub mod error;
pub mod protocol;
pub mod server;

pub use client::{McpClient, ToolInvoker};
pub use config::McpServerConfig;
pub use error::McpError;
pub use protocol::{CallToolResult, Content};
pub use server::McpServer;
