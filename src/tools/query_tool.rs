// The one capability the tool server exposes

use once_cell::sync::Lazy;

use super::types::{ToolDefinition, ToolInputSchema};
use crate::config::constants::QUERY_TOOL_NAME;

static DEFINITION: Lazy<ToolDefinition> = Lazy::new(|| ToolDefinition {
    name: QUERY_TOOL_NAME.to_string(),
    description: "Execute DAX or MDX queries against Azure Analysis Services. \
        Use this tool to query the adventureworks tabular model. \
        Supports DAX queries for tabular models and MDX queries for multidimensional models. \
        Returns query results as rows of data."
        .to_string(),
    input_schema: ToolInputSchema::object(
        serde_json::json!({
            "query": {
                "type": "string",
                "description": "The DAX or MDX query to execute. \
                    Example DAX: EVALUATE TOPN(10, 'Product') \
                    Example MDX: SELECT [Measures].[Sales Amount] ON 0 FROM [AdventureWorks]"
            },
            "query_type": {
                "type": "string",
                "enum": ["DAX", "MDX"],
                "default": "DAX",
                "description": "The type of query - DAX for tabular models, MDX for multidimensional models"
            }
        }),
        vec!["query".to_string()],
    ),
});

/// Descriptor of `query_analysis_services`, built once per process
pub fn definition() -> &'static ToolDefinition {
    &DEFINITION
}
