pub mod ai_chats;
pub mod gemini;
pub mod ollama;
pub mod openai;
pub mod pizzagpt;

use promptline::{
    Chat, Dispatcher, Error, GenerateOptions, GenerationOutcome, ProviderDescriptor, Registry,
};
use std::sync::Arc;

/// Everything a provider run produced.
pub struct Run {
    pub result: Result<GenerationOutcome, Error>,
    pub chunks: Vec<String>,
}

/// Register `descriptor` alone and send `query` through a fresh dispatcher.
pub async fn run(descriptor: ProviderDescriptor, query: &str, options: GenerateOptions) -> Run {
    let key = descriptor.key.clone();
    let registry = Registry::builder(key.clone())
        .register(descriptor)
        .expect("register provider")
        .build()
        .expect("build registry");
    let dispatcher = Dispatcher::new(Arc::new(registry));
    let chat = Chat::new(key.clone(), "");

    let mut chunks = Vec::new();
    let mut sink = |text: &str| chunks.push(text.to_string());
    let result = dispatcher
        .generate(Some(&key), &chat, query, &mut sink, &options)
        .await;
    Run { result, chunks }
}

/// SSE body with one `data:` event per payload.
pub fn sse_body(payloads: &[&str]) -> String {
    payloads.iter().map(|p| format!("data: {p}\n\n")).collect()
}
