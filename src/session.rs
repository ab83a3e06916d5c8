//! Chat session: the active thread, its index and the generation lifecycle.

use crate::chat::{Chat, ChatIndex, MessagePair};
use crate::dispatcher::{
    ChunkSink, Dispatcher, GenerateOptions, GenerationOutcome, GenerationSlot,
};
use crate::store::ConversationStore;
use crate::Error;

/// Stops the generation running in a session from another task.
#[derive(Debug, Clone)]
pub struct StopHandle {
    slot: GenerationSlot,
}

impl StopHandle {
    /// Returns false when nothing is running.
    pub fn stop(&self) -> bool {
        self.slot.stop()
    }

    pub fn is_generating(&self) -> bool {
        self.slot.is_busy()
    }
}

/// Applies streamed text to the in-flight pair, persisting and notifying on every chunk.
struct ChatSink<'a, F> {
    store: &'a ConversationStore,
    chat: &'a mut Chat,
    pair_id: String,
    on_update: F,
}

#[async_trait::async_trait]
impl<'a, F> ChunkSink for ChatSink<'a, F>
where
    F: FnMut(&Chat) + Send,
{
    async fn on_chunk(&mut self, cumulative: &str) {
        let Some(pair) = self.chat.message_mut(&self.pair_id) else {
            return;
        };
        if !pair.apply_chunk(cumulative) {
            return;
        }
        if let Err(e) = self.store.save_chat(&*self.chat).await {
            tracing::warn!(chat_id = %self.chat.id, error = %e, "failed to persist chunk");
        }
        (self.on_update)(&*self.chat);
    }
}

/// A user-facing conversation session.
///
/// Holds the lite index and the one fully loaded chat. Other chats are read
/// from the store only when switched to.
pub struct ChatSession {
    store: ConversationStore,
    dispatcher: Dispatcher,
    index: ChatIndex,
    current: Chat,
    slot: GenerationSlot,
    options: GenerateOptions,
}

impl ChatSession {
    /// Load the index and the active chat.
    pub async fn open(store: ConversationStore, dispatcher: Dispatcher) -> Result<Self, Error> {
        let index = store.load_index().await?;
        let current = store.load_chat(&index.current_chat_id).await?;
        tracing::debug!(chats = index.chats.len(), current = %current.id, "session opened");
        Ok(Self {
            store,
            dispatcher,
            index,
            current,
            slot: GenerationSlot::new(),
            options: GenerateOptions::default(),
        })
    }

    /// Share a generation slot with other sessions so only one of them generates at a time.
    pub fn with_slot(mut self, slot: GenerationSlot) -> Self {
        self.slot = slot;
        self
    }

    /// Retry settings for every generation; the cancel token is replaced per call.
    pub fn with_options(mut self, options: GenerateOptions) -> Self {
        self.options = options;
        self
    }

    pub fn current_chat(&self) -> &Chat {
        &self.current
    }

    pub fn index(&self) -> &ChatIndex {
        &self.index
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn is_generating(&self) -> bool {
        self.slot.is_busy()
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            slot: self.slot.clone(),
        }
    }

    /// Stop the running generation. The pair keeps the text delivered so far.
    pub fn stop_generation(&self) -> bool {
        self.slot.stop()
    }

    /// Ask the current chat's provider and stream the answer into a new pair.
    pub async fn send_query<F>(
        &mut self,
        query: &str,
        on_update: F,
    ) -> Result<GenerationOutcome, Error>
    where
        F: FnMut(&Chat) + Send,
    {
        self.run_query(query, Vec::new(), on_update).await
    }

    /// Like [`ChatSession::send_query`], with attachments recorded on the pair.
    ///
    /// Rejected for providers without file support.
    pub async fn send_query_with_files<F>(
        &mut self,
        query: &str,
        files: Vec<String>,
        on_update: F,
    ) -> Result<GenerationOutcome, Error>
    where
        F: FnMut(&Chat) + Send,
    {
        if !files.is_empty() {
            let descriptor = self.dispatcher.registry().lookup(Some(&self.current.provider));
            if !descriptor.supports_files {
                return Err(Error::validation(format!(
                    "provider '{}' does not accept files",
                    descriptor.key
                )));
            }
        }
        self.run_query(query, files, on_update).await
    }

    async fn run_query<F>(
        &mut self,
        query: &str,
        files: Vec<String>,
        on_update: F,
    ) -> Result<GenerationOutcome, Error>
    where
        F: FnMut(&Chat) + Send,
    {
        if query.trim().is_empty() {
            return Err(Error::validation("query must not be empty"));
        }
        let ticket = self.slot.try_begin()?;

        let pair = MessagePair::with_files(query, files);
        let pair_id = pair.id.clone();
        let mut next = self.current.clone();
        next.push_pair(pair)?;
        self.store.save_chat(&next).await?;
        // History as it was before this query
        let context = std::mem::replace(&mut self.current, next);

        let options = self.options.clone().with_cancel(ticket.token());
        let provider = self.current.provider.clone();
        let mut sink = ChatSink {
            store: &self.store,
            chat: &mut self.current,
            pair_id: pair_id.clone(),
            on_update,
        };
        let result = self
            .dispatcher
            .generate(Some(&provider), &context, query, &mut sink, &options)
            .await;
        let mut on_update = sink.on_update;

        let answer = match &result {
            Ok(outcome) => outcome.text.as_str(),
            Err(Error::StreamFailed { partial, .. }) => partial.as_str(),
            Err(_) => "",
        };
        if let Some(pair) = self.current.message_mut(&pair_id) {
            pair.finish(Some(answer));
        }
        self.store.save_chat(&self.current).await?;
        on_update(&self.current);
        drop(ticket);

        if let Err(e) = &result {
            tracing::warn!(chat_id = %self.current.id, error = %e, "generation failed");
        }
        result
    }

    /// Delete the pair at `index` (newest first) from the current chat.
    pub async fn delete_message(&mut self, index: usize) -> Result<(), Error> {
        self.current.remove_pair(index)?;
        self.store.save_chat(&self.current).await
    }

    /// Start a chat and make it current. The provider falls back to the default when unknown.
    pub async fn new_chat(
        &mut self,
        name: Option<&str>,
        system_prompt: &str,
        provider: Option<&str>,
    ) -> Result<&Chat, Error> {
        self.ensure_idle()?;
        let provider = self.dispatcher.registry().resolve_key(provider).to_string();
        let mut chat = Chat::new(provider, system_prompt);
        if let Some(name) = name.filter(|n| !n.trim().is_empty()) {
            chat = chat.named(name);
        }
        self.index = self.store.add_chat(&self.index, &chat).await?;
        self.current = chat;
        Ok(&self.current)
    }

    /// Make another chat current, loading its record.
    pub async fn switch_chat(&mut self, id: &str) -> Result<&Chat, Error> {
        self.ensure_idle()?;
        if !self.index.contains(id) {
            return Err(Error::validation(format!("unknown chat '{id}'")));
        }
        let chat = self.store.load_chat(id).await?;
        let mut index = self.index.clone();
        index.current_chat_id = id.to_string();
        self.store.save_index(&index).await?;
        self.index = index;
        self.current = chat;
        Ok(&self.current)
    }

    pub async fn rename_chat(&mut self, id: &str, name: &str) -> Result<(), Error> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::validation("chat name must not be empty"));
        }
        let Some(position) = self.index.position(id) else {
            return Err(Error::validation(format!("unknown chat '{id}'")));
        };

        if self.current.id == id {
            self.current.name = name.to_string();
            self.store.save_chat(&self.current).await?;
        } else {
            let chat = self.store.load_chat(id).await?.named(name);
            self.store.save_chat(&chat).await?;
        }

        let mut index = self.index.clone();
        index.chats[position].name = name.to_string();
        self.store.save_index(&index).await?;
        self.index = index;
        Ok(())
    }

    /// Delete a chat. The active pointer moves to a neighbour; deleting the
    /// only chat leaves one fresh chat.
    pub async fn delete_chat(&mut self, id: &str) -> Result<(), Error> {
        self.ensure_idle()?;
        let index = self.store.delete_chat(&self.index, id).await?;
        if index.current_chat_id != self.current.id || !index.contains(&self.current.id) {
            self.current = self.store.load_chat(&index.current_chat_id).await?;
        }
        self.index = index;
        Ok(())
    }

    /// Remove every stored chat and start over with one fresh chat.
    pub async fn clear_all_chats(&mut self) -> Result<(), Error> {
        self.ensure_idle()?;
        self.index = self.store.reset().await?;
        self.current = self.store.load_chat(&self.index.current_chat_id).await?;
        Ok(())
    }

    fn ensure_idle(&self) -> Result<(), Error> {
        if self.slot.is_busy() {
            return Err(Error::Busy);
        }
        Ok(())
    }
}
