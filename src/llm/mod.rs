//! OpenAI-compatible chat completions client.

mod client;
mod types;

pub use client::{LlmClient, TextStream};
pub use types::*;
