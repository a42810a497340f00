// Error taxonomy for the query bridge and startup
//
// Bridge- and capability-level failures are recovered into text before they
// reach the conversation. Only StartupConfiguration is fatal.

use std::time::Duration;
use thiserror::Error;

/// Failures while talking to the remote query backend.
///
/// The Display text of each variant is exactly what ends up in the
/// transcript, so keep it readable.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("Error calling Azure Function: HTTP error {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Error calling Azure Function: request timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("Error calling Azure Function: {0}")]
    Transport(String),

    #[error("Error: malformed response from Azure Function: {0}")]
    Malformed(String),
}

impl From<reqwest::Error> for BackendError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            BackendError::Malformed(e.to_string())
        } else {
            BackendError::Transport(e.to_string())
        }
    }
}

#[derive(Debug, Error)]
pub enum QueryError {
    /// Missing/empty query or unsupported query type. Never reaches the network.
    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error("Unknown tool: {0}")]
    UnknownCapability(String),

    #[error("Configuration error: {0}")]
    StartupConfiguration(String),
}

impl QueryError {
    pub fn validation(message: impl Into<String>) -> Self {
        QueryError::Validation(message.into())
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, QueryError::StartupConfiguration(_))
    }
}

/// Friendly message for a missing mandatory environment variable.
pub fn missing_env_error(names: &[&str]) -> QueryError {
    QueryError::StartupConfiguration(format!(
        "Missing required environment variables: {}.\n\
         Set them in your shell or in a .env file in the working directory.",
        names.join(", ")
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_error_text_contains_code_and_body() {
        let err = BackendError::Status {
            status: 500,
            body: "bad query".to_string(),
        };
        let text = err.to_string();
        assert!(text.contains("HTTP error 500"));
        assert!(text.contains("bad query"));
    }

    #[test]
    fn test_timeout_error_text() {
        let err = BackendError::Timeout(Duration::from_secs(60));
        assert_eq!(
            err.to_string(),
            "Error calling Azure Function: request timed out after 60s"
        );
    }

    #[test]
    fn test_only_startup_errors_are_fatal() {
        assert!(missing_env_error(&["AZURE_OPENAI_API_KEY"]).is_fatal());
        assert!(!QueryError::validation("Query parameter is required").is_fatal());
        assert!(!QueryError::UnknownCapability("x".into()).is_fatal());
    }

    #[test]
    fn test_missing_env_lists_every_name() {
        let text = missing_env_error(&["A", "B"]).to_string();
        assert!(text.contains("A, B"));
    }
}
