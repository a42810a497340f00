// Configuration structs

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::constants::*;
use crate::errors::{missing_env_error, QueryError};

/// Remote query backend (the Azure Function fronting Analysis Services)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// POST endpoint of the query function
    pub function_url: Option<String>,

    /// Per-request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            function_url: None,
            timeout_secs: DEFAULT_BACKEND_TIMEOUT_SECS,
        }
    }
}

impl BackendConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Azure OpenAI chat-completions settings
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub api_key: Option<String>,

    /// Resource endpoint, e.g. https://my-resource.openai.azure.com
    pub endpoint: Option<String>,

    pub deployment: String,
    pub api_version: String,
    pub max_tokens: u32,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            endpoint: None,
            deployment: DEFAULT_DEPLOYMENT.to_string(),
            api_version: DEFAULT_API_VERSION.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: None,
        }
    }
}

// Hand-written so the API key never lands in logs.
impl std::fmt::Debug for LlmConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("endpoint", &self.endpoint)
            .field("deployment", &self.deployment)
            .field("api_version", &self.api_version)
            .field("max_tokens", &self.max_tokens)
            .field("temperature", &self.temperature)
            .finish()
    }
}

/// Agent loop limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Completion/dispatch rounds allowed per user turn
    pub max_tool_rounds: usize,

    /// Tool results longer than this are truncated before entering the transcript
    pub max_tool_result_chars: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_tool_rounds: DEFAULT_MAX_TOOL_ROUNDS,
            max_tool_result_chars: DEFAULT_MAX_TOOL_RESULT_CHARS,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub backend: BackendConfig,
    pub llm: LlmConfig,
    pub agent: AgentConfig,
}

impl Config {
    /// Backend URL, or a startup error when it is not configured
    pub fn function_url(&self) -> Result<&str, QueryError> {
        match self.backend.function_url.as_deref() {
            Some(url) if !url.trim().is_empty() => Ok(url),
            _ => Err(missing_env_error(&["AZURE_FUNCTION_URL"])),
        }
    }

    /// Check everything `serve` needs
    pub fn validate_for_server(&self) -> Result<(), QueryError> {
        self.function_url()?;
        if self.backend.timeout_secs == 0 {
            return Err(QueryError::StartupConfiguration(
                "backend timeout must be at least one second".to_string(),
            ));
        }
        Ok(())
    }

    /// Check everything `chat` needs
    pub fn validate_for_agent(&self) -> Result<(), QueryError> {
        let mut missing = Vec::new();
        if is_blank(&self.llm.api_key) {
            missing.push("AZURE_OPENAI_API_KEY");
        }
        if is_blank(&self.llm.endpoint) {
            missing.push("AZURE_OPENAI_ENDPOINT");
        }
        if !missing.is_empty() {
            return Err(missing_env_error(&missing));
        }
        if self.agent.max_tool_rounds == 0 {
            return Err(QueryError::StartupConfiguration(
                "max_tool_rounds must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().map(str::trim).unwrap_or("").is_empty()
}
