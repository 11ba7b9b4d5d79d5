//! Tool call supports.
//!
//! Tools are the only way for model-authored code to reach outside the
//! sandbox. Each tool is exposed to the code as a plain function named
//! after [`Tool::name`], and is documented to the model through
//! [`Toolkit::tools_instruction`].

mod error;
mod finish;
mod object;
mod toolkit;

use serde::de::DeserializeOwned;
use serde_json::Value;

pub use error::{Error, ErrorKind};
pub use finish::{FINAL_ANSWER_TOOL_NAME, FinishTool};
pub(crate) use object::ToolObject;
pub use toolkit::{ToolDefinition, Toolkit};

/// The result of a tool call.
pub type ToolResult = Result<Value, Error>;

/// A tool that can be called by the model-authored code.
///
/// Implementations of this trait should be stateless, and may not maintain any
/// internal state.
///
/// The tool can be context-aware, meaning it can access additional information
/// about the current execution context, such as the working directory or the
/// current user. To do this, make the context an immutable state of the tool,
/// which can be set during initialization, and copy it when executing.
pub trait Tool: Send + Sync + 'static {
    /// The type of input that the tool accepts.
    type Input: DeserializeOwned;

    /// Returns the name of the tool.
    ///
    /// The name must be a valid Python identifier, since the code calls
    /// the tool as a function.
    fn name(&self) -> &str;

    /// Returns the description of the tool.
    fn description(&self) -> &str;

    /// Returns the parameter schema of the tool.
    ///
    /// This should be a JSON schema of an object. Positional arguments in
    /// a call are bound to its properties in declaration order.
    fn parameter_schema(&self) -> &Value;

    /// Returns `true` if calling this tool ends the turn loop, with the
    /// tool's output as the final answer.
    #[inline]
    fn is_terminal(&self) -> bool {
        false
    }

    /// Executes the tool with the given input.
    ///
    /// This method must return a future that is fully independent of `self`,
    /// and the future should be cancellation safe.
    fn execute(
        &self,
        input: Self::Input,
    ) -> impl Future<Output = ToolResult> + Send + 'static;
}
