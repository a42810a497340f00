// Tool layer
//
// The query capability's descriptor, the types shared with the LLM provider,
// and the MCP server/client that carry invocations between the two halves.

pub mod mcp;
pub mod query_tool;
pub mod types;

pub use types::{ToolDefinition, ToolInputSchema, ToolUse};
