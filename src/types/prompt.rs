use super::message::{Message, Role};

/// Rough characters-per-token ratio used for context budgeting.
const CHARS_PER_TOKEN: usize = 4;

/// A structured prompt: the ordered context sent to a provider.
#[derive(Debug, Clone, PartialEq)]
pub struct Prompt {
    items: Vec<Message>,
}

impl Prompt {
    /// Create a new empty prompt.
    pub fn new() -> Self {
        Self { items: Vec::new() }
    }

    /// Create a prompt with a system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            items: vec![Message::system(content)],
        }
    }

    /// Create a prompt with a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            items: vec![Message::user(content)],
        }
    }

    /// Add a system message.
    pub fn with_system(mut self, content: impl Into<String>) -> Self {
        self.items.push(Message::system(content));
        self
    }

    /// Add a user message.
    pub fn with_user(mut self, content: impl Into<String>) -> Self {
        self.items.push(Message::user(content));
        self
    }

    /// Add an assistant message.
    pub fn with_assistant(mut self, content: impl Into<String>) -> Self {
        self.items.push(Message::assistant(content));
        self
    }

    /// Add multiple messages.
    pub fn with_items(mut self, items: impl IntoIterator<Item = Message>) -> Self {
        self.items.extend(items);
        self
    }

    /// Get the messages.
    pub fn items(&self) -> &[Message] {
        &self.items
    }

    pub fn into_items(self) -> Vec<Message> {
        self.items
    }

    /// Approximate token count of the whole prompt.
    pub fn estimated_tokens(&self) -> usize {
        self.items
            .iter()
            .map(|m| m.content.chars().count().div_ceil(CHARS_PER_TOKEN))
            .sum()
    }

    /// Drop the oldest non-system messages until the estimate fits `limit`.
    ///
    /// System messages and the final message are never dropped, so the
    /// result may still exceed a very small limit.
    pub fn trim_to_tokens(mut self, limit: usize) -> Self {
        while self.estimated_tokens() > limit {
            let last = self.items.len().saturating_sub(1);
            let oldest = self
                .items
                .iter()
                .enumerate()
                .position(|(i, m)| i < last && m.role != Role::System);
            match oldest {
                Some(idx) => {
                    self.items.remove(idx);
                }
                None => break,
            }
        }
        self
    }

    /// Flatten the prompt into one text for upstreams that accept a single prompt field.
    pub fn to_transcript(&self) -> String {
        let mut out = String::new();
        for item in &self.items {
            out.push_str(item.role.as_str());
            out.push_str(": ");
            out.push_str(&item.content);
            out.push_str("\n\n");
        }
        out.push_str("assistant:");
        out
    }
}

impl Default for Prompt {
    fn default() -> Self {
        Self::new()
    }
}

impl From<&str> for Prompt {
    fn from(s: &str) -> Self {
        Prompt::user(s)
    }
}

impl From<String> for Prompt {
    fn from(s: String) -> Self {
        Prompt::user(s)
    }
}

impl From<Vec<Message>> for Prompt {
    fn from(items: Vec<Message>) -> Self {
        Prompt { items }
    }
}
