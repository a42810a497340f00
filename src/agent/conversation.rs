// Conversation transcript for the agent loop
//
// Append-only. The push methods enforce the tool-call pairing rules: once an
// assistant message requests tools, the only thing that may follow is one
// tool result per request, in request order.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::tools::types::ToolUse;

/// One entry in the transcript
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum Message {
    System {
        content: String,
    },
    User {
        content: String,
    },
    Assistant {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        content: Option<String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        tool_calls: Vec<ToolUse>,
    },
    Tool {
        tool_call_id: String,
        content: String,
    },
}

impl Message {
    pub fn role(&self) -> &'static str {
        match self {
            Message::System { .. } => "system",
            Message::User { .. } => "user",
            Message::Assistant { .. } => "assistant",
            Message::Tool { .. } => "tool",
        }
    }

    /// Text content, if any
    pub fn text(&self) -> Option<&str> {
        match self {
            Message::System { content } | Message::User { content } => Some(content),
            Message::Assistant { content, .. } => content.as_deref(),
            Message::Tool { content, .. } => Some(content),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum TranscriptError {
    #[error("tool calls still waiting for results: {}", .0.join(", "))]
    PendingToolCalls(Vec<String>),

    #[error("tool result for '{got}' does not answer the next pending call ({expected:?})")]
    UnexpectedToolResult {
        expected: Option<String>,
        got: String,
    },

    #[error("assistant tool-call message must carry at least one call")]
    EmptyToolCalls,
}

/// Ordered, append-only conversation history
#[derive(Debug, Clone, Default)]
pub struct Transcript {
    messages: Vec<Message>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a transcript with a system prompt
    pub fn with_system_prompt(prompt: impl Into<String>) -> Self {
        Self {
            messages: vec![Message::System {
                content: prompt.into(),
            }],
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn push_user(&mut self, content: impl Into<String>) -> Result<(), TranscriptError> {
        self.ensure_ready_for_completion()?;
        self.messages.push(Message::User {
            content: content.into(),
        });
        Ok(())
    }

    /// Final assistant answer (no tool calls)
    pub fn push_assistant_text(&mut self, content: impl Into<String>) -> Result<(), TranscriptError> {
        self.ensure_ready_for_completion()?;
        self.messages.push(Message::Assistant {
            content: Some(content.into()),
            tool_calls: Vec::new(),
        });
        Ok(())
    }

    /// Assistant message that requests one or more tool invocations
    pub fn push_tool_calls(
        &mut self,
        content: Option<String>,
        tool_calls: Vec<ToolUse>,
    ) -> Result<(), TranscriptError> {
        if tool_calls.is_empty() {
            return Err(TranscriptError::EmptyToolCalls);
        }
        self.ensure_ready_for_completion()?;
        self.messages.push(Message::Assistant {
            content,
            tool_calls,
        });
        Ok(())
    }

    /// Answer the next pending tool call. Results must arrive in request order.
    pub fn push_tool_result(
        &mut self,
        tool_call_id: &str,
        content: impl Into<String>,
    ) -> Result<(), TranscriptError> {
        let pending = self.pending_tool_calls();
        match pending.first() {
            Some(next) if next.id == tool_call_id => {}
            next => {
                return Err(TranscriptError::UnexpectedToolResult {
                    expected: next.map(|call| call.id.clone()),
                    got: tool_call_id.to_string(),
                })
            }
        }

        self.messages.push(Message::Tool {
            tool_call_id: tool_call_id.to_string(),
            content: content.into(),
        });
        Ok(())
    }

    /// Calls from the latest assistant message that have no result yet, in request order
    pub fn pending_tool_calls(&self) -> Vec<&ToolUse> {
        let Some(idx) = self
            .messages
            .iter()
            .rposition(|m| matches!(m, Message::Assistant { .. }))
        else {
            return Vec::new();
        };

        let Message::Assistant { tool_calls, .. } = &self.messages[idx] else {
            return Vec::new();
        };

        let answered = self.messages[idx + 1..]
            .iter()
            .filter(|m| matches!(m, Message::Tool { .. }))
            .count();

        tool_calls.iter().skip(answered).collect()
    }

    /// A completion may only be requested when every tool call has its result
    pub fn ensure_ready_for_completion(&self) -> Result<(), TranscriptError> {
        let pending = self.pending_tool_calls();
        if pending.is_empty() {
            Ok(())
        } else {
            Err(TranscriptError::PendingToolCalls(
                pending.iter().map(|call| call.id.clone()).collect(),
            ))
        }
    }

    /// Number of tool-result messages
    pub fn tool_result_count(&self) -> usize {
        self.messages
            .iter()
            .filter(|m| matches!(m, Message::Tool { .. }))
            .count()
    }
}
