//! A conversation engine over many LLM backends.
//!
//! Providers are declared once in a [`Registry`]. The [`Dispatcher`] turns a
//! chat plus a query into provider calls, retrying failures that happen
//! before any output and normalizing delta, snapshot and custom chunk shapes
//! into cumulative text. [`ChatSession`] ties generation to persisted chats
//! kept by the [`ConversationStore`].

pub mod chat;
pub mod dispatcher;
pub mod error;
pub mod factory;
pub mod normalize;
pub mod provider;
pub mod providers;
pub mod registry;
pub mod response;
pub mod session;
pub mod sse_stream;
pub mod storage;
pub mod store;
pub mod types;

// Re-export core types for easy usage
pub use chat::{Chat, ChatIndex, ChatOptions, LiteChat, MessagePair, MessageState, PromptContent};
pub use dispatcher::{
    ChunkSink, Dispatcher, GenerateOptions, GenerationOutcome, GenerationSlot, GenerationTicket,
};
pub use error::Error;
pub use factory::{builtin_registry, Settings};
pub use normalize::{ChunkAdapter, Framing, StreamNormalizer};
pub use provider::Provider;
pub use registry::{ContextMode, Delivery, ModelSpec, ProviderDescriptor, Registry};
pub use response::*;
pub use session::{ChatSession, StopHandle};
pub use sse_stream::SseEvent;
pub use storage::{FileStore, KeyValueStore, MemoryStore};
pub use store::ConversationStore;
pub use types::*;
