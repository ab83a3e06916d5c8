#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use promptline::{
    ChunkAdapter, ConversationStore, Dispatcher, Error, GenerationRequest, MemoryStore, Provider,
    ProviderDescriptor, Registry, Response,
};

/// One scripted answer to a provider call.
pub enum Step {
    /// Fail before producing a response.
    Fail(&'static str),
    /// Answer in one piece.
    Text(&'static str),
    /// Stream these raw chunks; `Err` entries break the stream.
    Chunks(Vec<Result<&'static str, &'static str>>),
}

/// A provider that replays a fixed script, one step per call.
pub struct Scripted {
    steps: Mutex<VecDeque<Step>>,
    calls: AtomicU32,
    requests: Mutex<Vec<GenerationRequest>>,
}

impl Scripted {
    pub fn new(steps: Vec<Step>) -> Arc<Self> {
        Arc::new(Self {
            steps: Mutex::new(steps.into()),
            calls: AtomicU32::new(0),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Provider for Scripted {
    fn name(&self) -> &str {
        "Scripted"
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<Response, Error> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());
        let step = self.steps.lock().unwrap().pop_front();
        match step {
            None => Err(Error::provider("Scripted", "script exhausted")),
            Some(Step::Fail(message)) => Err(Error::provider("Scripted", message)),
            Some(Step::Text(text)) => Ok(Response::from_text(text)),
            Some(Step::Chunks(chunks)) => {
                let chunks: Vec<Result<String, Error>> = chunks
                    .into_iter()
                    .map(|c| c.map(str::to_string).map_err(Error::streaming))
                    .collect();
                Ok(Response::from_stream(futures_util::stream::iter(chunks)))
            }
        }
    }
}

/// Registry with a batch default ("Batch") and a streaming entry ("Stream").
pub fn registry(batch: Arc<Scripted>, stream: Arc<Scripted>, adapter: ChunkAdapter) -> Registry {
    Registry::builder("Batch")
        .register(ProviderDescriptor::new("Batch", batch))
        .unwrap()
        .register(ProviderDescriptor::new("Stream", stream).streaming(adapter))
        .unwrap()
        .build()
        .unwrap()
}

pub fn dispatcher(registry: Registry) -> Dispatcher {
    Dispatcher::new(Arc::new(registry))
}

pub fn memory_store(default_provider: &str) -> (Arc<MemoryStore>, ConversationStore) {
    let backend = Arc::new(MemoryStore::new());
    let store = ConversationStore::new(backend.clone(), default_provider);
    (backend, store)
}
