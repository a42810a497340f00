// MCP error types

use thiserror::Error;

use super::protocol::JsonRpcError;
use crate::errors::QueryError;

#[derive(Debug, Error)]
pub enum McpError {
    #[error("I/O error on MCP stream: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid JSON-RPC message: {0}")]
    Json(#[from] serde_json::Error),

    #[error("MCP server closed the connection")]
    ConnectionClosed,

    #[error("failed to launch MCP server: {0}")]
    Spawn(String),

    #[error("unexpected MCP message: {0}")]
    Protocol(String),

    #[error("MCP session failed: {0}")]
    Sdk(String),

    /// Error object returned by the peer; the connection is still usable
    #[error("{message} (code {code})")]
    Rpc { code: i64, message: String },
}

impl McpError {
    /// True when the stream itself failed, as opposed to a request-scoped error
    pub fn is_transport(&self) -> bool {
        !matches!(self, McpError::Rpc { .. })
    }
}

impl From<QueryError> for JsonRpcError {
    fn from(e: QueryError) -> Self {
        let code = match e {
            QueryError::UnknownCapability(_) | QueryError::Validation(_) => {
                JsonRpcError::INVALID_PARAMS
            }
            _ => JsonRpcError::INTERNAL_ERROR,
        };
        JsonRpcError::new(code, e.to_string())
    }
}
