//! onemin-relay - an OpenAI-compatible chat completions gateway for 1min.ai
//!
//! Clients speak the OpenAI chat-completions protocol; the relay flattens the
//! conversation into a single prompt, uploads any images as provider assets,
//! forwards the call with the caller's own key, and reshapes the reply
//! (blocking or streamed) back into OpenAI form.

pub mod app;
pub mod assets;
pub mod catalog;
pub mod config;
pub mod error;
#[cfg(test)]
mod log_capture;
pub mod models;
pub mod prompt;
pub mod ratelimit;
pub mod server;
pub mod stream;
pub mod tokens;
pub mod transform;
pub mod upstream;

pub use error::{Error, Result};
