//! Two-tier conversation persistence.
//!
//! The index record (lite entries plus the active pointer) is small and
//! always loaded. Full chats live in one record each under `prefix + id` and
//! are read on demand. Every mutation takes the prior snapshot by reference
//! and returns a new value, so callers never alias a snapshot across an await.

use std::collections::HashSet;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::chat::{Chat, ChatIndex};
use crate::storage::KeyValueStore;
use crate::Error;

/// Default prefix for per-chat records.
pub const DEFAULT_CHAT_PREFIX: &str = "promptline_chat_";
/// Default key of the index record.
pub const DEFAULT_INDEX_KEY: &str = "promptline_index";

/// Persistence for chat threads on top of a [`KeyValueStore`].
pub struct ConversationStore {
    storage: Arc<dyn KeyValueStore>,
    prefix: String,
    index_key: String,
    default_provider: String,
}

impl ConversationStore {
    /// Create a store; new chats are bound to `default_provider`.
    pub fn new(storage: Arc<dyn KeyValueStore>, default_provider: impl Into<String>) -> Self {
        Self {
            storage,
            prefix: DEFAULT_CHAT_PREFIX.to_string(),
            index_key: DEFAULT_INDEX_KEY.to_string(),
            default_provider: default_provider.into(),
        }
    }

    /// Use custom record keys, e.g. to keep several independent stores in one backend.
    pub fn with_keys(mut self, prefix: impl Into<String>, index_key: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self.index_key = index_key.into();
        self
    }

    pub fn chat_key(&self, id: &str) -> String {
        format!("{}{}", self.prefix, id)
    }

    pub fn default_provider(&self) -> &str {
        &self.default_provider
    }

    /// A fresh chat bound to the default provider.
    pub fn fresh_chat(&self) -> Chat {
        Chat::new(self.default_provider.clone(), "")
    }

    /// Read a record, treating unparseable data as absent.
    async fn read_record<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, Error> {
        let Some(raw) = self.storage.read(key).await? else {
            return Ok(None);
        };
        match decode::<T>(key, &raw) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                tracing::warn!(error = %e, "discarding corrupt record");
                Ok(None)
            }
        }
    }

    async fn write_record<T: Serialize>(&self, key: &str, value: &T) -> Result<(), Error> {
        let raw = serde_json::to_string(value)?;
        self.storage.write(key, &raw).await
    }

    /// Load the index, creating and persisting one when absent or unreadable.
    ///
    /// A missing index is rebuilt from the chat records already stored, so
    /// no chat is lost with it. A dangling active pointer is repaired by
    /// recreating the pointed-to chat as empty.
    pub async fn load_index(&self) -> Result<ChatIndex, Error> {
        let Some(index) = self.read_record::<ChatIndex>(&self.index_key).await? else {
            return self.rebuild_index().await;
        };

        if index.contains(&index.current_chat_id) {
            return Ok(index);
        }

        tracing::warn!(
            chat_id = %index.current_chat_id,
            "active chat missing from index, recreating"
        );
        let chat = Chat::with_id(index.current_chat_id.clone(), self.default_provider.clone(), "");
        let mut repaired = index.clone();
        repaired.chats.push(chat.lite());
        self.save_chat(&chat).await?;
        self.save_index(&repaired).await?;
        Ok(repaired)
    }

    /// Load a full chat. A missing or corrupt record yields an empty chat under the same id.
    pub async fn load_chat(&self, id: &str) -> Result<Chat, Error> {
        let key = self.chat_key(id);
        match self.read_record::<Chat>(&key).await? {
            Some(chat) => Ok(chat),
            None => {
                tracing::debug!(chat_id = %id, "no stored chat, using a fresh one");
                Ok(Chat::with_id(id, self.default_provider.clone(), ""))
            }
        }
    }

    pub async fn save_chat(&self, chat: &Chat) -> Result<(), Error> {
        self.write_record(&self.chat_key(&chat.id), chat).await
    }

    pub async fn save_index(&self, index: &ChatIndex) -> Result<(), Error> {
        self.write_record(&self.index_key, index).await
    }

    /// Add `chat` to the index as the current chat and persist both records.
    pub async fn add_chat(&self, index: &ChatIndex, chat: &Chat) -> Result<ChatIndex, Error> {
        let next = index.with_current(chat);
        self.save_chat(chat).await?;
        self.save_index(&next).await?;
        Ok(next)
    }

    /// Delete a chat's record and index entry.
    ///
    /// Deleting the last remaining chat resets the store to one fresh chat.
    pub async fn delete_chat(&self, index: &ChatIndex, id: &str) -> Result<ChatIndex, Error> {
        self.storage.delete(&self.chat_key(id)).await?;

        if !index.contains(id) {
            return Ok(index.clone());
        }
        if index.chats.len() == 1 {
            tracing::info!(chat_id = %id, "last chat deleted, starting a fresh one");
            return self.seed().await;
        }

        let next = index.without(id);
        self.save_index(&next).await?;
        tracing::info!(chat_id = %id, "chat deleted");
        Ok(next)
    }

    /// Delete every chat record and start over with one fresh chat.
    pub async fn reset(&self) -> Result<ChatIndex, Error> {
        self.prune_orphans(&[]).await?;
        self.seed().await
    }

    /// Persist one fresh chat and an index holding only it.
    async fn seed(&self) -> Result<ChatIndex, Error> {
        let chat = self.fresh_chat();
        let index = ChatIndex::single(&chat);
        self.save_chat(&chat).await?;
        self.save_index(&index).await?;
        Ok(index)
    }

    /// Index every readable chat record, oldest first, with the newest current.
    ///
    /// Falls back to a single fresh chat when there is nothing to recover.
    async fn rebuild_index(&self) -> Result<ChatIndex, Error> {
        let mut chats = Vec::new();
        for key in self.storage.list_keys().await? {
            if !key.starts_with(&self.prefix) {
                continue;
            }
            if let Some(chat) = self.read_record::<Chat>(&key).await? {
                chats.push(chat.lite());
            }
        }
        chats.sort_by(|a, b| {
            a.creation_date
                .cmp(&b.creation_date)
                .then_with(|| a.id.cmp(&b.id))
        });

        let Some(newest) = chats.last() else {
            return self.seed().await;
        };
        tracing::warn!(chats = chats.len(), "index missing, rebuilt from stored chats");
        let index = ChatIndex {
            current_chat_id: newest.id.clone(),
            chats,
        };
        self.save_index(&index).await?;
        Ok(index)
    }

    /// Delete every per-chat record whose id is not in `live_ids`.
    ///
    /// Scans the whole key space; meant for bulk operations only.
    pub async fn prune_orphans(&self, live_ids: &[String]) -> Result<usize, Error> {
        let live: HashSet<&str> = live_ids.iter().map(String::as_str).collect();
        let mut pruned = 0;
        for key in self.storage.list_keys().await? {
            let Some(id) = key.strip_prefix(&self.prefix) else {
                continue;
            };
            if !live.contains(id) {
                self.storage.delete(&key).await?;
                pruned += 1;
            }
        }
        tracing::info!(pruned, "pruned stored chats");
        Ok(pruned)
    }
}

fn decode<T: DeserializeOwned>(key: &str, raw: &str) -> Result<T, Error> {
    serde_json::from_str(raw).map_err(|e| Error::storage_corrupt(key, e.to_string()))
}
