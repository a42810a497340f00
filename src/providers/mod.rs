// LLM provider abstraction
//
// The agent loop only sees `LlmProvider`; the Azure OpenAI deployment is the
// production implementation and tests swap in scripted ones.

use anyhow::Result;
use async_trait::async_trait;

pub mod openai;
pub mod retry;
pub mod types;

pub use openai::OpenAIProvider;
pub use retry::{with_retry, RetryPolicy};
pub use types::{ApiError, ProviderRequest, ProviderResponse};

/// Trait for LLM providers
///
/// Given the full transcript and the tool catalogue, return one assistant
/// turn: text, tool invocations, or both.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Send a message and get a complete response
    async fn send_message(&self, request: &ProviderRequest<'_>) -> Result<ProviderResponse>;

    /// Provider name (e.g., "azure-openai")
    fn name(&self) -> &str;

    fn default_model(&self) -> &str;
}
