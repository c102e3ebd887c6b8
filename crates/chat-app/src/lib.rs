#![deny(unsafe_code)]

/// Terminal chat assistant backed by Gemini.
///
/// The binary wires settings, the streaming client and the conversation
/// controller into a line-oriented shell.
pub mod app;
/// Conversation state, turn orchestration and terminal rendering.
pub mod chat;
pub mod cli;
pub mod error;
/// Settings persistence.
pub mod settings;
#[cfg(test)]
pub(crate) mod testing;

pub use error::{AppError, AppResult};
