//! A ready-to-use CodeAct agent: demo tools, environment settings, and a
//! CLI for chatting with the agent in the terminal.
//!
//! The crate can also be used as a library, to bring the demo tools into
//! your own [`CodeAgentBuilder`](codeact_core::CodeAgentBuilder).

#![deny(missing_docs)]

#[allow(unused_imports)]
#[macro_use]
extern crate tracing;

mod settings;
pub mod tools;

pub use settings::{Settings, SettingsError};

/// Re-exports of [`codeact_core`] crate.
pub mod core {
    pub use codeact_core::*;
}
