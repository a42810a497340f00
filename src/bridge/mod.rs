// Query bridge - forwards one DAX/MDX query to the Azure Function
//
// Stateless per call. Every call with a valid query ends in exactly one text
// result; HTTP, transport and decoding failures are rendered into that text.
// Only argument validation is reported as an error, and that happens before
// any network traffic.

mod response;

pub use response::{BackendResponse, NO_ROWS_MESSAGE};

use anyhow::{Context, Result};
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, instrument, warn};

use crate::config::BackendConfig;
use crate::errors::{BackendError, QueryError};

/// Query language understood by the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum QueryType {
    /// Tabular models
    #[default]
    Dax,
    /// Multidimensional models
    Mdx,
}

impl QueryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryType::Dax => "DAX",
            QueryType::Mdx => "MDX",
        }
    }
}

impl fmt::Display for QueryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QueryType {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "DAX" => Ok(QueryType::Dax),
            "MDX" => Ok(QueryType::Mdx),
            other => Err(QueryError::validation(format!(
                "query_type must be 'DAX' or 'MDX', got '{}'",
                other
            ))),
        }
    }
}

/// Validated arguments of a `query_analysis_services` call
#[derive(Debug, Clone, PartialEq)]
pub struct QueryArgs {
    pub query: String,
    pub query_type: QueryType,
}

impl QueryArgs {
    /// Parse the raw argument mapping sent by the client
    pub fn from_arguments(arguments: &Value) -> Result<Self, QueryError> {
        let query = arguments
            .get("query")
            .and_then(Value::as_str)
            .filter(|q| !q.trim().is_empty())
            .ok_or_else(|| QueryError::validation("Query parameter is required"))?;

        let query_type = match arguments.get("query_type") {
            None | Some(Value::Null) => QueryType::default(),
            Some(Value::String(s)) => s.parse()?,
            Some(other) => {
                return Err(QueryError::validation(format!(
                    "query_type must be a string, got {}",
                    other
                )))
            }
        };

        Ok(Self {
            query: query.to_string(),
            query_type,
        })
    }
}

/// Body of the POST sent to the function
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct BackendRequest<'a> {
    query_type: QueryType,
    query: &'a str,
}

/// HTTP bridge to the query function
#[derive(Clone)]
pub struct QueryBridge {
    client: Client,
    function_url: String,
    timeout: Duration,
}

impl QueryBridge {
    pub fn new(function_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            function_url: function_url.into(),
            timeout,
        })
    }

    /// Build from backend settings; the URL must be present
    pub fn from_config(config: &BackendConfig) -> Result<Self> {
        let url = config
            .function_url
            .clone()
            .filter(|u| !u.trim().is_empty())
            .context("AZURE_FUNCTION_URL is not configured")?;
        Self::new(url, config.timeout())
    }

    pub fn function_url(&self) -> &str {
        &self.function_url
    }

    /// Validate the raw arguments, then run the query
    pub async fn invoke_with_arguments(&self, arguments: &Value) -> Result<String, QueryError> {
        let args = QueryArgs::from_arguments(arguments)?;
        self.invoke(&args.query, args.query_type).await
    }

    /// Run one query and return its textual result.
    ///
    /// Errors only on an empty query; backend failures come back as `Ok(text)`.
    #[instrument(skip_all, fields(query_type = %query_type, query_len = query.len()))]
    pub async fn invoke(&self, query: &str, query_type: QueryType) -> Result<String, QueryError> {
        if query.trim().is_empty() {
            return Err(QueryError::validation("Query parameter is required"));
        }

        match self.execute(query, query_type).await {
            Ok(response) => {
                debug!("Backend answered with {:?}", variant_name(&response));
                Ok(response.into_text())
            }
            Err(e) => {
                warn!("Query backend call failed: {}", e);
                Ok(e.to_string())
            }
        }
    }

    async fn execute(
        &self,
        query: &str,
        query_type: QueryType,
    ) -> Result<BackendResponse, BackendError> {
        let response = self
            .client
            .post(&self.function_url)
            .json(&BackendRequest { query_type, query })
            .send()
            .await
            .map_err(|e| self.classify_transport(e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| self.classify_transport(e))?;

        if !status.is_success() {
            return Err(BackendError::Status {
                status: status.as_u16(),
                body,
            });
        }

        BackendResponse::parse(&body)
    }

    fn classify_transport(&self, e: reqwest::Error) -> BackendError {
        if e.is_timeout() {
            BackendError::Timeout(self.timeout)
        } else {
            e.into()
        }
    }
}

fn variant_name(response: &BackendResponse) -> &'static str {
    match response {
        BackendResponse::Rows(_) => "rows",
        BackendResponse::Error(_) => "error",
        BackendResponse::Raw(_) => "raw",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_query_type_parsing() {
        assert_eq!("dax".parse::<QueryType>().unwrap(), QueryType::Dax);
        assert_eq!(" MDX ".parse::<QueryType>().unwrap(), QueryType::Mdx);
        assert!("sql".parse::<QueryType>().is_err());
    }

    #[test]
    fn test_query_type_serializes_uppercase() {
        let body = serde_json::to_value(BackendRequest {
            query_type: QueryType::Mdx,
            query: "SELECT 1",
        })
        .unwrap();
        assert_eq!(body, json!({"queryType": "MDX", "query": "SELECT 1"}));
    }

    #[test]
    fn test_args_default_to_dax() {
        let args = QueryArgs::from_arguments(&json!({"query": "EVALUATE 'Product'"})).unwrap();
        assert_eq!(args.query_type, QueryType::Dax);
        assert_eq!(args.query, "EVALUATE 'Product'");
    }

    #[test]
    fn test_args_reject_missing_or_blank_query() {
        for arguments in [json!({}), json!({"query": ""}), json!({"query": "   "}), json!(null)] {
            let err = QueryArgs::from_arguments(&arguments).unwrap_err();
            assert!(matches!(err, QueryError::Validation(_)), "{:?}", arguments);
        }
    }

    #[test]
    fn test_args_reject_unknown_query_type() {
        let err = QueryArgs::from_arguments(&json!({"query": "x", "query_type": "SQL"})).unwrap_err();
        assert!(err.to_string().contains("DAX"));

        let err = QueryArgs::from_arguments(&json!({"query": "x", "query_type": 3})).unwrap_err();
        assert!(matches!(err, QueryError::Validation(_)));
    }

    #[test]
    fn test_from_config_requires_url() {
        assert!(QueryBridge::from_config(&BackendConfig::default()).is_err());

        let config = BackendConfig {
            function_url: Some("http://localhost:7071/api/query".into()),
            ..BackendConfig::default()
        };
        let bridge = QueryBridge::from_config(&config).unwrap();
        assert_eq!(bridge.function_url(), "http://localhost:7071/api/query");
    }
}
