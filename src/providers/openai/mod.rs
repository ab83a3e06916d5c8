//! OpenAI-compatible chat completions (DeepInfra and friends).

pub mod client;
pub mod types;

pub use client::OpenAICompatProvider;
