//! Execution of model-authored code.
//!
//! A [`CodeExecutor`] runs one code blob per turn and reports what
//! happened as an [`ExecutionOutcome`]. The bundled [`LocalPythonExecutor`]
//! interprets a restricted subset of Python directly over the parsed AST:
//! nothing outside the registered tools, a handful of builtins and the
//! authorized modules is reachable.

mod builtins;
mod error;
mod interpreter;
mod modules;
mod value;

use std::fmt;

use async_trait::async_trait;

pub use error::{ExecutionError, ExecutionErrorKind};
pub use interpreter::{LocalPythonExecutor, MAX_OPERATIONS};
pub use value::{RegexMatch, Value};

use crate::tool::Toolkit;

/// What a successfully executed, non-terminal code blob produced.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Observation {
    /// Everything the code printed.
    pub logs: String,
    /// The rendering of the last expression statement, `None` if there is
    /// no such value.
    pub output: String,
}

impl fmt::Display for Observation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Execution logs:\n{}\nLast output from code snippet:\n{}",
            self.logs, self.output
        )
    }
}

/// The result of executing one code blob.
#[derive(Clone, Debug, PartialEq)]
pub enum ExecutionOutcome {
    /// The code ran to completion, the loop should go on.
    Continue(Observation),
    /// The code called a terminal tool.
    Terminate {
        /// The rendering of the terminal tool's result.
        answer: String,
        /// Everything printed before the terminal call.
        logs: String,
    },
    /// The code was rejected or failed.
    Failed(ExecutionError),
}

/// Runs model-authored code against a set of tools.
///
/// Implementations keep their state (variables, imports) across calls, for
/// the lifetime of one agent.
#[async_trait]
pub trait CodeExecutor: Send {
    /// Executes `code`, exposing the tools of `toolkit` as functions.
    async fn execute(&mut self, code: &str, toolkit: &Toolkit)
    -> ExecutionOutcome;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_observation() {
        let observation = Observation {
            logs: "hello\n".to_owned(),
            output: "None".to_owned(),
        };
        assert_eq!(
            observation.to_string(),
            "Execution logs:\nhello\n\nLast output from code snippet:\nNone"
        );
    }
}
