use serde::{Deserialize, Serialize};

use super::message::Message;

/// Temperature used when a chat sets no creativity.
pub const DEFAULT_TEMPERATURE: f32 = 0.7;

/// Sampling options derived from a chat's settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GenerationOptions {
    pub temperature: f32,
}

impl GenerationOptions {
    /// Map a chat "creativity" value onto a temperature: clamped at zero,
    /// rounded to one decimal, 0.7 when unset.
    pub fn from_creativity(creativity: Option<f32>) -> Self {
        let temperature = match creativity {
            Some(c) if c.is_finite() => (c.max(0.0) * 10.0).round() / 10.0,
            _ => DEFAULT_TEMPERATURE,
        };
        Self { temperature }
    }
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            temperature: DEFAULT_TEMPERATURE,
        }
    }
}

/// Request handed to a provider for one attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// Model name, or `None` to let the upstream pick.
    pub model: Option<String>,
    pub messages: Vec<Message>,
    pub temperature: Option<f32>,
    /// Whether the dispatcher will consume the response incrementally.
    pub stream: bool,
}

impl GenerationRequest {
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            model: None,
            messages,
            temperature: None,
            stream: false,
        }
    }

    pub fn model(mut self, model: Option<String>) -> Self {
        self.model = model;
        self
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn stream(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }

    /// Text of the final user message, which single-prompt upstreams send on its own.
    pub fn last_user_text(&self) -> &str {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == super::message::Role::User)
            .map(|m| m.content.as_str())
            .unwrap_or_default()
    }
}
