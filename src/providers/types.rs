// Provider-agnostic request/response types
//
// The agent hands the provider a borrowed view of the transcript; each
// provider implementation translates it into its own wire format.

use thiserror::Error;

use crate::agent::Message;
use crate::config::constants::DEFAULT_MAX_TOKENS;
use crate::tools::types::{ToolDefinition, ToolUse};

/// One completion request
#[derive(Debug, Clone)]
pub struct ProviderRequest<'a> {
    /// Full transcript, system prompt included
    pub messages: &'a [Message],

    /// Tools the model may call
    pub tools: &'a [ToolDefinition],

    /// Maximum tokens to generate
    pub max_tokens: u32,

    /// Temperature (0.0 to 2.0, optional)
    pub temperature: Option<f32>,
}

impl<'a> ProviderRequest<'a> {
    pub fn new(messages: &'a [Message]) -> Self {
        Self {
            messages,
            tools: &[],
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: None,
        }
    }

    /// Add tools to the request
    pub fn with_tools(mut self, tools: &'a [ToolDefinition]) -> Self {
        self.tools = tools;
        self
    }

    /// Set max tokens
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Set temperature
    pub fn with_temperature(mut self, temperature: Option<f32>) -> Self {
        self.temperature = temperature;
        self
    }
}

/// A completed assistant turn
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProviderResponse {
    /// Response ID (provider-specific)
    pub id: String,

    /// Model that generated the response
    pub model: String,

    /// Assistant text, if any
    pub content: Option<String>,

    /// Tool invocations requested by the model, in emission order
    pub tool_calls: Vec<ToolUse>,

    /// Why the model stopped generating
    pub stop_reason: Option<String>,
}

impl ProviderResponse {
    /// Plain text answer
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            stop_reason: Some("stop".to_string()),
            ..Self::default()
        }
    }

    /// Answer that asks for tool calls
    pub fn with_tool_calls(tool_calls: Vec<ToolUse>) -> Self {
        Self {
            tool_calls,
            stop_reason: Some("tool_calls".to_string()),
            ..Self::default()
        }
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

/// Non-success HTTP status from a provider API
#[derive(Debug, Error)]
#[error("{provider} API request failed\n\nStatus: {status}\nBody: {body}")]
pub struct ApiError {
    pub provider: String,
    pub status: u16,
    pub body: String,
}

impl ApiError {
    /// Rate limits and server errors are worth another attempt; other 4xx are not
    pub fn is_retryable(&self) -> bool {
        self.status == 429 || self.status >= 500
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_builder() {
        let messages = vec![Message::User {
            content: "hi".into(),
        }];
        let request = ProviderRequest::new(&messages)
            .with_max_tokens(100)
            .with_temperature(Some(0.2));
        assert_eq!(request.messages.len(), 1);
        assert!(request.tools.is_empty());
        assert_eq!(request.max_tokens, 100);
        assert_eq!(request.temperature, Some(0.2));
    }

    #[test]
    fn test_response_helpers() {
        assert!(!ProviderResponse::text("done").has_tool_calls());
        let response = ProviderResponse::with_tool_calls(vec![ToolUse::new(
            "query_analysis_services".into(),
            json!({"query": "EVALUATE 'Product'"}),
        )]);
        assert!(response.has_tool_calls());
    }

    #[test]
    fn test_retryable_statuses() {
        let err = |status| ApiError {
            provider: "azure-openai".into(),
            status,
            body: String::new(),
        };
        assert!(err(429).is_retryable());
        assert!(err(503).is_retryable());
        assert!(!err(400).is_retryable());
        assert!(!err(401).is_retryable());
    }
}
