// Core types for the tool layer
//
// ToolDefinition doubles as the MCP tool descriptor (camelCase `inputSchema`
// on the wire) and is translated into the OpenAI function-call convention
// for completions.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Tool definition (MCP `tools/list` entry)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub description: String,
    #[serde(rename = "inputSchema", alias = "input_schema")]
    pub input_schema: ToolInputSchema,
}

impl ToolDefinition {
    /// OpenAI-style function schema: `{"type":"function","function":{...}}`
    pub fn to_function_schema(&self) -> Value {
        serde_json::json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": self.description,
                "parameters": self.input_schema,
            }
        })
    }
}

/// JSON Schema for tool input parameters
///
/// Keywords other than `type`, `properties` and `required` (for example
/// `additionalProperties`) are carried through untouched in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInputSchema {
    #[serde(rename = "type")]
    pub schema_type: String, // Usually "object"
    #[serde(default = "empty_properties")]
    pub properties: Value,
    #[serde(default, deserialize_with = "null_as_default")]
    pub required: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn empty_properties() -> Value {
    Value::Object(Map::new())
}

/// Peers sometimes send `null` for optional fields instead of omitting them
pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

impl ToolInputSchema {
    pub fn object(properties: Value, required: Vec<String>) -> Self {
        Self {
            schema_type: "object".to_string(),
            properties,
            required,
            extra: Map::new(),
        }
    }
}

/// Tool use request emitted by the LLM
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolUse {
    pub id: String,   // correlation id chosen by the LLM (or generated)
    pub name: String, // Tool name
    pub input: Value, // Tool parameters (JSON object)
    /// Argument text exactly as the LLM sent it, kept only when it is not
    /// valid JSON. `input` is `Null` in that case.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_arguments: Option<String>,
}

impl ToolUse {
    /// Generate a unique tool use id for requests that arrive without one
    pub fn generate_id() -> String {
        format!("call_{}", uuid::Uuid::new_v4().simple())
    }

    pub fn new(name: String, input: Value) -> Self {
        Self::with_id(Self::generate_id(), name, input)
    }

    pub fn with_id(id: impl Into<String>, name: impl Into<String>, input: Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            input,
            raw_arguments: None,
        }
    }

    /// Build from a JSON-encoded argument string. Unparsable text is kept
    /// verbatim so it can be echoed back and rejected later.
    pub fn from_arguments(id: String, name: String, arguments: &str) -> Self {
        match serde_json::from_str(arguments) {
            Ok(input) => Self::with_id(id, name, input),
            Err(e) => {
                tracing::warn!(
                    "Tool call '{}' has unparsable arguments ({}): {}",
                    name,
                    e,
                    arguments
                );
                Self {
                    id,
                    name,
                    input: Value::Null,
                    raw_arguments: Some(arguments.to_string()),
                }
            }
        }
    }

    /// The argument string to put back on the wire
    pub fn arguments_text(&self) -> String {
        match &self.raw_arguments {
            Some(raw) => raw.clone(),
            None => self.input.to_string(),
        }
    }

    /// Why the arguments could not be parsed, if they could not
    pub fn argument_error(&self) -> Option<String> {
        let raw = self.raw_arguments.as_deref()?;
        match serde_json::from_str::<Value>(raw) {
            Err(e) => Some(e.to_string()),
            Ok(_) => None,
        }
    }
}
