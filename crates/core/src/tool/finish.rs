use std::future::ready;

use schemars::{JsonSchema, schema_for};
use serde::Deserialize;
use serde_json::Value;

use super::{Tool, ToolResult};

/// Name under which [`FinishTool`] is exposed to the code.
pub const FINAL_ANSWER_TOOL_NAME: &str = "final_answer";

/// Parameters of [`FinishTool`].
#[derive(Deserialize, JsonSchema)]
pub struct FinishToolParameters {
    #[schemars(description = "The final answer to the problem.")]
    answer: Value,
}

/// The terminal tool. Calling it ends the turn loop, and its argument
/// becomes the reply.
///
/// Every agent registers this tool, so it does not need to be added by
/// hand.
pub struct FinishTool {
    parameter_schema: Value,
}

impl FinishTool {
    /// Creates a new finish tool.
    #[inline]
    pub fn new() -> Self {
        Self {
            parameter_schema: schema_for!(FinishToolParameters).to_value(),
        }
    }
}

impl Default for FinishTool {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl Tool for FinishTool {
    type Input = FinishToolParameters;

    fn name(&self) -> &str {
        FINAL_ANSWER_TOOL_NAME
    }

    fn description(&self) -> &str {
        "Finish reasoning and give the final answer to the user."
    }

    fn parameter_schema(&self) -> &Value {
        &self.parameter_schema
    }

    fn is_terminal(&self) -> bool {
        true
    }

    fn execute(
        &self,
        input: FinishToolParameters,
    ) -> impl Future<Output = ToolResult> + Send + 'static {
        ready(Ok(input.answer))
    }
}
