//! Conversation entities: message pairs, chat threads and the lite index.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicI64, Ordering};

use crate::Error;

/// Name given to chats created without one.
pub const DEFAULT_CHAT_NAME: &str = "New Chat";

/// Canned answer stored in the invisible system-priming pair.
pub const SYSTEM_ACKNOWLEDGEMENT: &str = "Understood. I will follow these instructions.";

static LAST_ID: AtomicI64 = AtomicI64::new(0);

/// Next id: the current Unix time in milliseconds, bumped when two ids
/// would collide within the process.
pub fn next_id() -> String {
    let now = Utc::now().timestamp_millis();
    let mut last = LAST_ID.load(Ordering::Relaxed);
    loop {
        let candidate = now.max(last + 1);
        match LAST_ID.compare_exchange_weak(last, candidate, Ordering::Relaxed, Ordering::Relaxed) {
            Ok(_) => return candidate.to_string(),
            Err(actual) => last = actual,
        }
    }
}

/// The user side of an exchange.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PromptContent {
    pub content: String,
    /// References to attached files, opaque to this crate.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<String>,
}

/// Where a pair is in its generation lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageState {
    Created,
    Streaming,
    Finished,
}

/// One prompt/answer exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePair {
    pub id: String,
    pub prompt: PromptContent,
    pub answer: String,
    pub visible: bool,
    pub finished: bool,
    pub creation_date: DateTime<Utc>,
}

impl MessagePair {
    /// A fresh, visible pair awaiting its answer.
    pub fn new(prompt: impl Into<String>) -> Self {
        Self::with_files(prompt, Vec::new())
    }

    pub fn with_files(prompt: impl Into<String>, files: Vec<String>) -> Self {
        Self {
            id: next_id(),
            prompt: PromptContent {
                content: prompt.into(),
                files,
            },
            answer: String::new(),
            visible: true,
            finished: false,
            creation_date: Utc::now(),
        }
    }

    /// An invisible, already finished pair that primes the model with a system prompt.
    pub fn system(prompt: impl Into<String>) -> Self {
        let mut pair = Self::new(prompt);
        pair.answer = SYSTEM_ACKNOWLEDGEMENT.to_string();
        pair.visible = false;
        pair.finished = true;
        pair
    }

    pub fn state(&self) -> MessageState {
        if self.finished {
            MessageState::Finished
        } else if self.answer.is_empty() {
            MessageState::Created
        } else {
            MessageState::Streaming
        }
    }

    /// Replace the answer with new cumulative text. Ignored once finished.
    pub fn apply_chunk(&mut self, cumulative: &str) -> bool {
        if self.finished {
            return false;
        }
        self.answer.clear();
        self.answer.push_str(cumulative);
        true
    }

    /// Settle the answer and mark the pair finished.
    pub fn finish(&mut self, answer: Option<&str>) {
        if let Some(answer) = answer {
            self.apply_chunk(answer);
        }
        self.finished = true;
    }
}

/// Per-chat generation settings.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ChatOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creativity: Option<f32>,
}

/// A full conversation thread.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chat {
    pub id: String,
    pub name: String,
    pub creation_date: DateTime<Utc>,
    pub provider: String,
    pub system_prompt: String,
    /// Newest first.
    pub messages: Vec<MessagePair>,
    #[serde(default)]
    pub options: ChatOptions,
}

impl Chat {
    /// Create a chat, seeded with a system-priming pair when `system_prompt` is non-empty.
    pub fn new(provider: impl Into<String>, system_prompt: impl Into<String>) -> Self {
        Self::with_id(next_id(), provider, system_prompt)
    }

    /// Create a chat under a known id, used when a stored record is missing.
    pub fn with_id(
        id: impl Into<String>,
        provider: impl Into<String>,
        system_prompt: impl Into<String>,
    ) -> Self {
        let system_prompt = system_prompt.into();
        let messages = if system_prompt.is_empty() {
            Vec::new()
        } else {
            vec![MessagePair::system(system_prompt.clone())]
        };
        Self {
            id: id.into(),
            name: DEFAULT_CHAT_NAME.to_string(),
            creation_date: Utc::now(),
            provider: provider.into(),
            system_prompt,
            messages,
            options: ChatOptions::default(),
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// True when nothing visible has been exchanged yet.
    pub fn is_empty(&self) -> bool {
        !self.messages.iter().any(|m| m.visible)
    }

    pub fn visible_messages(&self) -> impl DoubleEndedIterator<Item = &MessagePair> {
        self.messages.iter().filter(|m| m.visible)
    }

    /// The unfinished pair, if a generation is in flight.
    pub fn in_flight(&self) -> Option<&MessagePair> {
        self.messages.iter().find(|m| !m.finished)
    }

    /// Put a new pair at the head of the thread.
    ///
    /// Rejected while another pair is unfinished: a chat has at most one
    /// generation in flight.
    pub fn push_pair(&mut self, pair: MessagePair) -> Result<(), Error> {
        if let Some(pending) = self.in_flight() {
            return Err(Error::validation(format!(
                "message {} is still being generated",
                pending.id
            )));
        }
        self.messages.insert(0, pair);
        Ok(())
    }

    pub fn message_mut(&mut self, id: &str) -> Option<&mut MessagePair> {
        self.messages.iter_mut().find(|m| m.id == id)
    }

    /// Remove the pair at `index` (newest first).
    pub fn remove_pair(&mut self, index: usize) -> Result<MessagePair, Error> {
        match self.messages.get(index) {
            None => Err(Error::validation(format!("no message at index {index}"))),
            Some(pair) if !pair.finished => Err(Error::validation(
                "cannot delete a message while it is being generated",
            )),
            Some(_) => Ok(self.messages.remove(index)),
        }
    }

    pub fn lite(&self) -> LiteChat {
        LiteChat {
            id: self.id.clone(),
            name: self.name.clone(),
            creation_date: self.creation_date,
        }
    }
}

/// Chat metadata kept resident for every chat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiteChat {
    pub id: String,
    pub name: String,
    pub creation_date: DateTime<Utc>,
}

/// The top-level record: every chat's lite entry plus the active pointer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatIndex {
    pub current_chat_id: String,
    pub chats: Vec<LiteChat>,
}

impl ChatIndex {
    /// An index holding exactly `chat`, which is also current.
    pub fn single(chat: &Chat) -> Self {
        Self {
            current_chat_id: chat.id.clone(),
            chats: vec![chat.lite()],
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.position(id).is_some()
    }

    pub fn position(&self, id: &str) -> Option<usize> {
        self.chats.iter().position(|c| c.id == id)
    }

    pub fn ids(&self) -> Vec<String> {
        self.chats.iter().map(|c| c.id.clone()).collect()
    }

    /// Copy of this index with `chat` appended and made current.
    pub fn with_current(&self, chat: &Chat) -> Self {
        let mut next = self.clone();
        next.chats.push(chat.lite());
        next.current_chat_id = chat.id.clone();
        next
    }

    /// Copy of this index without `id`. When `id` was current, the pointer
    /// moves to the chat that took its place, or the previous one if it was last.
    pub fn without(&self, id: &str) -> Self {
        let mut next = self.clone();
        let Some(idx) = next.position(id) else {
            return next;
        };
        next.chats.remove(idx);
        if next.current_chat_id == id {
            let replacement = next.chats.get(idx).or_else(|| next.chats.last());
            if let Some(chat) = replacement {
                next.current_chat_id = chat.id.clone();
            }
        }
        next
    }
}
