use std::future::ready;

use codeact_core::tool::{Tool, ToolResult};
use schemars::{JsonSchema, schema_for};
use serde::Deserialize;
use serde_json::Value;

const DEFAULT_NUM_RESULTS: usize = 3;

#[derive(Deserialize, JsonSchema)]
pub struct WebSearchParameters {
    #[schemars(description = "The query string.")]
    query: String,
    #[schemars(description = "The number of results to return, default to 3.")]
    num_results: Option<usize>,
}

/// A tool that pretends to search the web.
///
/// No request leaves the process: the result only describes the search
/// that would have been made.
pub struct WebSearchTool {
    engine: String,
    parameter_schema: Value,
}

impl WebSearchTool {
    /// Creates a new search tool that claims to use `engine`.
    #[inline]
    pub fn new<S: Into<String>>(engine: S) -> Self {
        WebSearchTool {
            engine: engine.into(),
            parameter_schema: schema_for!(WebSearchParameters).to_value(),
        }
    }
}

impl Default for WebSearchTool {
    #[inline]
    fn default() -> Self {
        Self::new("bing")
    }
}

impl Tool for WebSearchTool {
    type Input = WebSearchParameters;

    fn name(&self) -> &str {
        "web_search"
    }

    fn description(&self) -> &str {
        "Search the web and return the search results as a string."
    }

    fn parameter_schema(&self) -> &Value {
        &self.parameter_schema
    }

    fn execute(
        &self,
        input: WebSearchParameters,
    ) -> impl Future<Output = ToolResult> + Send + 'static {
        let num_results = input.num_results.unwrap_or(DEFAULT_NUM_RESULTS);
        ready(Ok(Value::String(format!(
            "Searching the web using {} with query: {} ({} results)",
            self.engine, input.query, num_results
        ))))
    }
}
