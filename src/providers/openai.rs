// Azure OpenAI chat-completions provider
//
// The model is chosen by the deployment in the URL; the key goes in the
// `api-key` header.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

use super::retry::{with_retry, RetryPolicy};
use super::types::{ApiError, ProviderRequest, ProviderResponse};
use super::LlmProvider;
use crate::agent::Message;
use crate::config::LlmConfig;
use crate::tools::types::ToolUse;

const REQUEST_TIMEOUT_SECS: u64 = 120;

/// Chat-completions provider
#[derive(Clone)]
pub struct OpenAIProvider {
    client: Client,
    api_key: String,
    url: String,
    default_model: String,
    provider_name: String,
    retry: RetryPolicy,
}

impl OpenAIProvider {
    /// Azure OpenAI deployment
    pub fn new_azure(
        endpoint: &str,
        api_key: String,
        deployment: &str,
        api_version: &str,
    ) -> Result<Self> {
        let url = format!(
            "{}/openai/deployments/{}/chat/completions?api-version={}",
            endpoint.trim_end_matches('/'),
            deployment,
            api_version
        );
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            api_key,
            url,
            default_model: deployment.to_string(),
            provider_name: "azure-openai".to_string(),
            retry: RetryPolicy::default(),
        })
    }

    /// Build the Azure provider from loaded settings
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .context("AZURE_OPENAI_API_KEY is not configured")?;
        let endpoint = config
            .endpoint
            .as_deref()
            .context("AZURE_OPENAI_ENDPOINT is not configured")?;
        Self::new_azure(endpoint, api_key, &config.deployment, &config.api_version)
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Convert ProviderRequest to the chat-completions format
    fn to_openai_request(&self, request: &ProviderRequest<'_>) -> OpenAIRequest {
        let messages = request.messages.iter().map(to_openai_message).collect();

        let tools: Vec<Value> = request
            .tools
            .iter()
            .map(|tool| tool.to_function_schema())
            .collect();
        let has_tools = !tools.is_empty();

        OpenAIRequest {
            messages,
            max_tokens: Some(request.max_tokens),
            temperature: request.temperature,
            tools: has_tools.then_some(tools),
            tool_choice: has_tools.then(|| "auto".to_string()),
        }
    }

    /// Convert chat-completions response to ProviderResponse
    fn from_openai_response(&self, response: OpenAIResponse) -> Result<ProviderResponse> {
        let choice = response
            .choices
            .into_iter()
            .next()
            .context("OpenAI returned no choices in response")?;

        let tool_calls = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .filter(|call| call.tool_type == "function")
            .map(|call| {
                ToolUse::from_arguments(
                    call.id.unwrap_or_else(ToolUse::generate_id),
                    call.function.name,
                    &call.function.arguments,
                )
            })
            .collect();

        Ok(ProviderResponse {
            id: response.id,
            model: response.model.unwrap_or_else(|| self.default_model.clone()),
            content: choice.message.content.filter(|text| !text.is_empty()),
            tool_calls,
            stop_reason: choice.finish_reason,
        })
    }

    /// Send a single request (no retry)
    async fn send_message_once(&self, request: &ProviderRequest<'_>) -> Result<ProviderResponse> {
        let openai_request = self.to_openai_request(request);

        tracing::debug!(
            "Sending request to {}: {} messages, {} tools",
            self.provider_name,
            openai_request.messages.len(),
            request.tools.len()
        );

        let response = self
            .client
            .post(&self.url)
            .header("content-type", "application/json")
            .header("api-key", &self.api_key)
            .json(&openai_request)
            .send()
            .await
            .with_context(|| format!("Failed to send request to {}", self.provider_name))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError {
                provider: self.provider_name.clone(),
                status: status.as_u16(),
                body,
            }
            .into());
        }

        let openai_response: OpenAIResponse = response
            .json()
            .await
            .with_context(|| format!("Failed to parse {} response", self.provider_name))?;

        tracing::debug!("Received response: {:?}", openai_response);

        self.from_openai_response(openai_response)
    }
}

#[async_trait]
impl LlmProvider for OpenAIProvider {
    async fn send_message(&self, request: &ProviderRequest<'_>) -> Result<ProviderResponse> {
        with_retry(self.retry, || self.send_message_once(request)).await
    }

    fn name(&self) -> &str {
        &self.provider_name
    }

    fn default_model(&self) -> &str {
        &self.default_model
    }
}

fn to_openai_message(message: &Message) -> OpenAIMessage {
    match message {
        Message::System { content } => OpenAIMessage::Regular {
            role: "system".to_string(),
            content: content.clone(),
        },
        Message::User { content } => OpenAIMessage::Regular {
            role: "user".to_string(),
            content: content.clone(),
        },
        Message::Assistant {
            content,
            tool_calls,
        } => {
            // tool_calls must stay on the assistant message or the tool
            // results that follow are orphaned
            let tool_calls: Vec<OpenAIRequestToolCall> = tool_calls
                .iter()
                .map(|call| OpenAIRequestToolCall {
                    id: call.id.clone(),
                    tool_type: "function".to_string(),
                    function: OpenAIRequestFunction {
                        name: call.name.clone(),
                        arguments: call.arguments_text(),
                    },
                })
                .collect();

            OpenAIMessage::Assistant {
                role: "assistant".to_string(),
                content: content.clone(),
                tool_calls: (!tool_calls.is_empty()).then_some(tool_calls),
            }
        }
        Message::Tool {
            tool_call_id,
            content,
        } => OpenAIMessage::Tool {
            role: "tool".to_string(),
            content: if content.trim().is_empty() {
                "(no output)".to_string()
            } else {
                content.clone()
            },
            tool_call_id: tool_call_id.clone(),
        },
    }
}

// Chat-completions API types

#[derive(Debug, Clone, Serialize)]
struct OpenAIRequest {
    messages: Vec<OpenAIMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<String>,
}

/// Message format, request side only
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
enum OpenAIMessage {
    Tool {
        role: String, // "tool"
        content: String,
        tool_call_id: String,
    },
    Assistant {
        role: String, // "assistant"
        content: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        tool_calls: Option<Vec<OpenAIRequestToolCall>>,
    },
    Regular {
        role: String,
        content: String,
    },
}

#[derive(Debug, Clone, Serialize)]
struct OpenAIRequestToolCall {
    id: String,
    #[serde(rename = "type")]
    tool_type: String,
    function: OpenAIRequestFunction,
}

#[derive(Debug, Clone, Serialize)]
struct OpenAIRequestFunction {
    name: String,
    arguments: String, // JSON-encoded string
}

#[derive(Debug, Clone, Deserialize)]
struct OpenAIResponse {
    #[serde(default)]
    id: String,
    model: Option<String>,
    choices: Vec<OpenAIChoice>,
}

#[derive(Debug, Clone, Deserialize)]
struct OpenAIChoice {
    message: OpenAIResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct OpenAIResponseMessage {
    content: Option<String>,
    tool_calls: Option<Vec<OpenAIToolCall>>,
}

#[derive(Debug, Clone, Deserialize)]
struct OpenAIToolCall {
    id: Option<String>,
    #[serde(rename = "type", default = "default_tool_type")]
    tool_type: String,
    function: OpenAIToolFunction,
}

fn default_tool_type() -> String {
    "function".to_string()
}

#[derive(Debug, Clone, Deserialize)]
struct OpenAIToolFunction {
    name: String,
    arguments: String, // JSON string
}
