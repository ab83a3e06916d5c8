//! Provider implementations for different LLM services.

pub mod ai_chats;
pub mod gemini;
pub mod ollama;
pub mod openai;
pub mod pizzagpt;

// Re-export commonly used provider types
pub use ai_chats::AiChatsProvider;
pub use gemini::GeminiProvider;
pub use ollama::OllamaProvider;
pub use openai::OpenAICompatProvider;
pub use pizzagpt::PizzaGptProvider;
