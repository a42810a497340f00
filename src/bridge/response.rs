// Backend response classification
//
// The shape of the function's JSON body is decided once, here, and the rest
// of the bridge only deals with the resulting enum.

use serde::Serialize;
use serde_json::Value;

use crate::errors::BackendError;

/// Text returned when the query succeeded but produced an empty row set.
pub const NO_ROWS_MESSAGE: &str = "Query executed successfully but returned no rows.";

/// What the query function answered with
#[derive(Debug, Clone, PartialEq)]
pub enum BackendResponse {
    /// Any body with a `rows` key. An empty or falsy value is `Rows(vec![])`;
    /// a single non-array value becomes a one-row set.
    Rows(Vec<Value>),
    /// `{"error": "..."}`
    Error(String),
    /// Anything else, kept verbatim
    Raw(Value),
}

#[derive(Serialize)]
struct RowsPayload<'a> {
    row_count: usize,
    rows: &'a [Value],
}

impl BackendResponse {
    /// Parse a response body. Invalid JSON is a malformed-response error.
    pub fn parse(body: &str) -> Result<Self, BackendError> {
        let value: Value =
            serde_json::from_str(body).map_err(|e| BackendError::Malformed(e.to_string()))?;
        Ok(Self::classify(value))
    }

    /// `rows` takes priority over `error`; everything else is `Raw`.
    pub fn classify(value: Value) -> Self {
        if let Value::Object(map) = &value {
            if let Some(rows) = map.get("rows") {
                return BackendResponse::Rows(row_set(rows));
            }

            if let Some(error) = map.get("error") {
                let message = match error {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                return BackendResponse::Error(message);
            }
        }

        BackendResponse::Raw(value)
    }

    /// Render as the single text block handed back to the caller
    pub fn into_text(self) -> String {
        match self {
            BackendResponse::Rows(rows) if rows.is_empty() => NO_ROWS_MESSAGE.to_string(),
            BackendResponse::Rows(rows) => {
                let payload = RowsPayload {
                    row_count: rows.len(),
                    rows: &rows,
                };
                serde_json::to_string(&payload)
                    .unwrap_or_else(|e| format!("Error: failed to encode rows: {}", e))
            }
            BackendResponse::Error(message) => format!("Query failed: {}", message),
            BackendResponse::Raw(value) => value.to_string(),
        }
    }
}

fn row_set(rows: &Value) -> Vec<Value> {
    match rows {
        Value::Array(rows) => rows.clone(),
        Value::Null | Value::Bool(false) => Vec::new(),
        Value::String(s) if s.is_empty() => Vec::new(),
        Value::Object(map) if map.is_empty() => Vec::new(),
        Value::Number(n) if n.as_f64() == Some(0.0) => Vec::new(),
        other => vec![other.clone()],
    }
}
