//! Unified generation entry point: provider selection, context building,
//! retry, cancellation and chunk delivery.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use futures_util::StreamExt;
use tokio_util::sync::CancellationToken;

use crate::chat::Chat;
use crate::normalize::StreamNormalizer;
use crate::registry::{ContextMode, Delivery, ProviderDescriptor, Registry};
use crate::{Error, GenerationOptions, GenerationRequest, Prompt};

/// Retry bound used when the caller does not pick one.
pub const DEFAULT_MAX_RETRIES: u32 = 5;

/// Receives the cumulative text after every chunk that carried output.
#[async_trait::async_trait]
pub trait ChunkSink: Send {
    async fn on_chunk(&mut self, cumulative: &str);
}

#[async_trait::async_trait]
impl<F> ChunkSink for F
where
    F: FnMut(&str) + Send,
{
    async fn on_chunk(&mut self, cumulative: &str) {
        self(cumulative)
    }
}

/// Per-call knobs for [`Dispatcher::generate`].
#[derive(Debug, Clone)]
pub struct GenerateOptions {
    /// Retries after the first attempt, for failures before any output.
    pub max_retries: u32,
    /// Pause between attempts.
    pub retry_delay: Duration,
    /// Polled at every chunk boundary.
    pub cancel: CancellationToken,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay: Duration::ZERO,
            cancel: CancellationToken::new(),
        }
    }
}

impl GenerateOptions {
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }
}

/// Result of a generation that did not fail.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationOutcome {
    /// Final cumulative text; for an interrupted run, the text delivered last.
    pub text: String,
    /// The caller cancelled before the provider finished.
    pub interrupted: bool,
    /// Registry key that served the request.
    pub provider: String,
    pub attempts: u32,
    pub elapsed: Duration,
}

impl GenerationOutcome {
    pub fn chars_per_sec(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64().max(0.001);
        self.text.chars().count() as f64 / secs
    }

    /// Treat interruption as an error, for callers that need the distinction.
    pub fn into_result(self) -> Result<String, Error> {
        if self.interrupted {
            Err(Error::GenerationInterrupted { partial: self.text })
        } else {
            Ok(self.text)
        }
    }
}

enum AttemptOutput {
    Completed(String),
    Interrupted(String),
}

enum AttemptError {
    /// Nothing reached the sink; safe to retry.
    BeforeOutput(Error),
    /// The sink already saw `partial`; retrying would duplicate it.
    AfterOutput { partial: String, error: Error },
}

/// Build the context a descriptor receives for `query`.
pub fn build_context(chat: &Chat, query: &str, descriptor: &ProviderDescriptor) -> Prompt {
    match descriptor.context {
        ContextMode::SingleTurn => Prompt::user(query),
        ContextMode::FullHistory => {
            let mut prompt = if chat.system_prompt.is_empty() {
                Prompt::new()
            } else {
                Prompt::system(chat.system_prompt.clone())
            };
            for pair in chat.visible_messages().rev() {
                if pair.finished && !pair.answer.is_empty() {
                    prompt = prompt
                        .with_user(pair.prompt.content.clone())
                        .with_assistant(pair.answer.clone());
                }
            }
            let prompt = prompt.with_user(query);
            match descriptor.context_tokens {
                Some(limit) => prompt.trim_to_tokens(limit),
                None => prompt,
            }
        }
    }
}

/// Sampling options: single-turn requests run at zero creativity.
pub fn options_for(chat: &Chat, descriptor: &ProviderDescriptor) -> GenerationOptions {
    match descriptor.context {
        ContextMode::SingleTurn => GenerationOptions::from_creativity(Some(0.0)),
        ContextMode::FullHistory => GenerationOptions::from_creativity(chat.options.creativity),
    }
}

/// Routes generations to registry providers.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    registry: Arc<Registry>,
}

impl Dispatcher {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Generate an answer to `query` in the context of `chat`.
    ///
    /// Failures before any output are retried up to `options.max_retries`
    /// times; a failure after output is returned at once as
    /// [`Error::StreamFailed`]. Cancellation is observed between chunks and
    /// ends the call successfully with the text delivered so far.
    pub async fn generate(
        &self,
        provider_key: Option<&str>,
        chat: &Chat,
        query: &str,
        sink: &mut dyn ChunkSink,
        options: &GenerateOptions,
    ) -> Result<GenerationOutcome, Error> {
        if query.trim().is_empty() {
            return Err(Error::validation("query must not be empty"));
        }

        let descriptor = self.registry.lookup(provider_key);
        let messages = build_context(chat, query, descriptor).into_items();
        let sampling = options_for(chat, descriptor);
        let started = Instant::now();
        let mut attempt = 0;

        loop {
            if options.cancel.is_cancelled() {
                return Ok(self.outcome(descriptor, String::new(), true, attempt, started));
            }

            let request = GenerationRequest::new(messages.clone())
                .model(descriptor.model.for_attempt(attempt).map(str::to_string))
                .temperature(sampling.temperature)
                .stream(descriptor.is_streaming());

            tracing::debug!(
                provider = %descriptor.key,
                model = ?request.model,
                attempt,
                messages = request.messages.len(),
                "dispatching generation"
            );

            match self.attempt(descriptor, &request, sink, &options.cancel).await {
                Ok(AttemptOutput::Completed(text)) => {
                    let outcome = self.outcome(descriptor, text, false, attempt + 1, started);
                    tracing::info!(
                        provider = %outcome.provider,
                        chars = outcome.text.chars().count(),
                        chars_per_sec = outcome.chars_per_sec(),
                        elapsed_secs = outcome.elapsed.as_secs_f64(),
                        "response finished"
                    );
                    return Ok(outcome);
                }
                Ok(AttemptOutput::Interrupted(text)) => {
                    tracing::info!(
                        provider = %descriptor.key,
                        chars = text.len(),
                        "generation stopped"
                    );
                    return Ok(self.outcome(descriptor, text, true, attempt + 1, started));
                }
                Err(AttemptError::AfterOutput { partial, error }) => {
                    tracing::warn!(
                        provider = %descriptor.key,
                        error = %error,
                        "stream failed after output"
                    );
                    return Err(Error::StreamFailed {
                        provider: descriptor.key.clone(),
                        partial,
                        message: error.to_string(),
                    });
                }
                Err(AttemptError::BeforeOutput(error)) if attempt < options.max_retries => {
                    tracing::warn!(
                        provider = %descriptor.key,
                        attempt,
                        error = %error,
                        "generation attempt failed, retrying"
                    );
                    attempt += 1;
                    if !options.retry_delay.is_zero() {
                        tokio::time::sleep(options.retry_delay).await;
                    }
                }
                Err(AttemptError::BeforeOutput(error)) => {
                    return Err(Error::ProviderUnavailable {
                        provider: descriptor.key.clone(),
                        attempts: attempt + 1,
                        source: Box::new(error),
                    });
                }
            }
        }
    }

    fn outcome(
        &self,
        descriptor: &ProviderDescriptor,
        text: String,
        interrupted: bool,
        attempts: u32,
        started: Instant,
    ) -> GenerationOutcome {
        GenerationOutcome {
            text,
            interrupted,
            provider: descriptor.key.clone(),
            attempts,
            elapsed: started.elapsed(),
        }
    }

    async fn attempt(
        &self,
        descriptor: &ProviderDescriptor,
        request: &GenerationRequest,
        sink: &mut dyn ChunkSink,
        cancel: &CancellationToken,
    ) -> Result<AttemptOutput, AttemptError> {
        let response = descriptor
            .provider
            .generate(request)
            .await
            .map_err(AttemptError::BeforeOutput)?;

        let adapter = match &descriptor.delivery {
            Delivery::Batch => {
                let text = response.text().await.map_err(AttemptError::BeforeOutput)?;
                sink.on_chunk(&text).await;
                return Ok(AttemptOutput::Completed(text));
            }
            Delivery::Stream(adapter) => adapter.clone(),
        };

        let mut stream = response.into_stream();
        let mut normalizer = StreamNormalizer::new(adapter);
        let mut delivered = false;

        while let Some(chunk) = stream.next().await {
            if cancel.is_cancelled() {
                return Ok(AttemptOutput::Interrupted(normalizer.into_text()));
            }

            let fail = |normalizer: &StreamNormalizer, error: Error| {
                if delivered {
                    AttemptError::AfterOutput {
                        partial: normalizer.text().to_string(),
                        error,
                    }
                } else {
                    AttemptError::BeforeOutput(error)
                }
            };

            let raw = match chunk {
                Ok(raw) => raw,
                Err(error) => return Err(fail(&normalizer, error)),
            };
            match normalizer.push(&raw) {
                Ok(Some(text)) => {
                    sink.on_chunk(text).await;
                    delivered = true;
                }
                Ok(None) => {}
                Err(error) => return Err(fail(&normalizer, error)),
            }
        }

        Ok(AttemptOutput::Completed(normalizer.into_text()))
    }
}

/// Process-wide guard allowing one generation at a time, with a stop switch.
#[derive(Debug, Clone, Default)]
pub struct GenerationSlot {
    inner: Arc<SlotInner>,
}

#[derive(Debug, Default)]
struct SlotInner {
    in_flight: AtomicBool,
    cancel: Mutex<CancellationToken>,
}

impl GenerationSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the slot, or fail with [`Error::Busy`] while another generation runs.
    pub fn try_begin(&self) -> Result<GenerationTicket, Error> {
        if self
            .inner
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(Error::Busy);
        }
        let token = CancellationToken::new();
        *self.inner.cancel.lock().unwrap_or_else(PoisonError::into_inner) = token.clone();
        Ok(GenerationTicket {
            slot: self.clone(),
            token,
        })
    }

    pub fn is_busy(&self) -> bool {
        self.inner.in_flight.load(Ordering::Acquire)
    }

    /// Ask the running generation to stop at its next chunk boundary.
    /// Returns false when nothing is running.
    pub fn stop(&self) -> bool {
        if !self.is_busy() {
            return false;
        }
        self.inner
            .cancel
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .cancel();
        true
    }
}

/// Proof of holding the [`GenerationSlot`]; releases it on drop.
#[derive(Debug)]
pub struct GenerationTicket {
    slot: GenerationSlot,
    token: CancellationToken,
}

impl GenerationTicket {
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }
}

impl Drop for GenerationTicket {
    fn drop(&mut self) {
        self.slot.inner.in_flight.store(false, Ordering::Release);
    }
}
