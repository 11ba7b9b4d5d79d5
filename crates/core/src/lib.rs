//! Core logic of the CodeAct agent: conversation memory, tool registry,
//! code extraction, the sandboxed executor and the turn loop.
//!
//! The agent asks the model to act by writing code. Each turn, the model
//! answers with a `Thought:` and a `Code:` block, the code runs in a
//! [`sandbox`] that only exposes the registered tools and a set of
//! authorized modules, and whatever the code printed is fed back to the
//! model as an observation. The loop ends when the code calls the
//! `final_answer` tool, or degrades to a plain summarization turn after
//! `max_iters` turns.

#![deny(missing_docs)]
#![deny(clippy::missing_safety_doc)]

#[macro_use]
extern crate tracing;

mod agent;
pub mod code;
pub mod conversation;
mod model_client;
pub mod prompt;
pub mod sandbox;
pub mod tool;

pub use agent::{CodeAgent, CodeAgentBuilder, Error, Reply};
pub use model_client::{ModelClient, ModelClientResponse};
