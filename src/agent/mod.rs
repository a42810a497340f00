// Conversational agent
//
// Owns the transcript and alternates between LLM completions and tool
// dispatch until the user exits.
//
// Usage:
//   aas-query chat

pub mod agent_loop;
pub mod conversation;
pub mod prompt;

pub use agent_loop::{is_exit_command, truncate_result, AgentLoop, AgentState, TurnOutcome, UserConsole};
pub use conversation::{Message, Transcript, TranscriptError};
pub use prompt::SYSTEM_PROMPT;
