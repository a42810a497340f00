// Project-wide constants
//
// Centralised here so defaults have one source of truth.
// Import via `use crate::config::constants::*;`.

/// Name of the single capability exposed by the tool server.
pub const QUERY_TOOL_NAME: &str = "query_analysis_services";

/// Server name reported in the MCP `initialize` handshake.
pub const SERVER_NAME: &str = "azure-aas-query";

/// Newest MCP protocol revision the tool server speaks.
pub const PROTOCOL_VERSION: &str = "2025-11-25";

/// Revisions the tool server accepts from a client, newest first.
pub const SUPPORTED_PROTOCOL_VERSIONS: &[&str] =
    &["2025-11-25", "2025-06-18", "2025-03-26", "2024-11-05"];

/// Upper bound on a single backend HTTP call.
pub const DEFAULT_BACKEND_TIMEOUT_SECS: u64 = 60;

/// Default Azure OpenAI deployment used for completions.
pub const DEFAULT_DEPLOYMENT: &str = "gpt-4o";

/// Default Azure OpenAI REST API version.
pub const DEFAULT_API_VERSION: &str = "2024-10-21";

/// Default maximum tokens per completion.
pub const DEFAULT_MAX_TOKENS: u32 = 4096;

/// Completion/dispatch rounds allowed for a single user turn.
pub const DEFAULT_MAX_TOOL_ROUNDS: usize = 10;

/// Tool-result text longer than this is truncated before it enters the transcript.
///
/// Row sets from the backend are unbounded; the LLM's context window is not.
pub const DEFAULT_MAX_TOOL_RESULT_CHARS: usize = 50_000;

/// Inputs that end the chat session (compared case-insensitively).
pub const EXIT_WORDS: &[&str] = &["exit", "quit", "q", "/exit", "/quit"];
