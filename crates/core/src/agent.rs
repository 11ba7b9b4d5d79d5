mod builder;
#[cfg(test)]
mod tests;
mod turn;

use codeact_model::ModelProviderError;

use crate::code::ParseError;
use crate::conversation::{Conversation, Item};
use crate::model_client::ModelClient;
use crate::sandbox::{CodeExecutor, ExecutionError};
use crate::tool::Toolkit;
pub use builder::CodeAgentBuilder;

type TranscriptFn = Box<dyn Fn(&Item) + Send + Sync>;

/// An agent that acts by writing code.
///
/// Each call to [`CodeAgent::reply`] runs the turn loop to completion:
/// the model writes a `Thought:` and a code block, the code runs in the
/// sandbox, and what it printed is fed back as an observation. The loop
/// ends when the code calls `final_answer`, or after `max_iters` turns,
/// in which case the model is asked to summarize instead.
///
/// The agent owns its memory and its sandbox state, both persist across
/// replies. Since `reply` takes `&mut self`, replies never overlap.
pub struct CodeAgent {
    name: String,
    model_client: ModelClient,
    toolkit: Toolkit,
    executor: Box<dyn CodeExecutor>,
    memory: Conversation,
    max_iters: usize,
    verbose: bool,
    recoverable_execution_errors: bool,
    on_transcript: Option<TranscriptFn>,
}

impl CodeAgent {
    /// Returns the name of the agent.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the rendered system prompt.
    #[inline]
    pub fn system_prompt(&self) -> &str {
        self.memory
            .items()
            .first()
            .map(Item::content)
            .unwrap_or_default()
    }

    /// Returns the whole conversation, system prompt included.
    #[inline]
    pub fn memory(&self) -> &Conversation {
        &self.memory
    }

    /// Returns the tools exposed to the code, `final_answer` included.
    #[inline]
    pub fn toolkit(&self) -> &Toolkit {
        &self.toolkit
    }

    fn push(&mut self, item: Item) {
        if item.display() {
            if let Some(on_transcript) = &self.on_transcript {
                on_transcript(&item);
            }
        }
        self.memory.push(item);
    }
}

/// The outcome of [`CodeAgent::reply`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Reply {
    /// The name of the agent.
    pub name: String,
    /// The final answer, or the summary if the loop was exhausted.
    pub content: String,
    /// The number of turns that ran.
    pub iterations: usize,
    /// `true` if no turn called `final_answer`.
    pub exhausted: bool,
}

/// Errors that abort a reply.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The model output contains no usable code.
    #[error(
        "Error in code parsing:\n{0}\nMake sure to provide correct code blobs."
    )]
    Parse(#[source] ParseError),
    /// The sandbox rejected the code, or the code failed.
    #[error("Error in code execution:\n{0}")]
    Execution(#[source] ExecutionError),
    /// The model request failed, after retries for transient errors.
    #[error("model request failed: {0}")]
    Model(Box<dyn ModelProviderError>),
}
