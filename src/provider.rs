use crate::{Error, GenerationRequest, Response};

/// A backend that produces model output for a request.
///
/// Streaming backends return [`Response::Stream`] with raw, still-framed chunks;
/// batch backends return [`Response::Complete`] with the final text.
#[async_trait::async_trait]
pub trait Provider: Send + Sync + 'static {
    /// Human-readable name used in errors and logs.
    fn name(&self) -> &str;

    /// Perform the network request for one attempt.
    async fn generate(&self, request: &GenerationRequest) -> Result<Response, Error>;
}
