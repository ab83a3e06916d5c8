//! Response handling for provider calls.

use crate::Error;
use futures::stream::BoxStream;
use futures_util::stream::Stream;
use futures_util::StreamExt;

/// Lazy sequence of raw chunks from a streaming provider.
pub type ChunkStream = BoxStream<'static, Result<String, Error>>;

/// What a provider hands back for one attempt.
pub enum Response {
    /// The full text, already extracted from the upstream envelope.
    Complete(String),
    /// Raw chunks, still carrying provider framing.
    Stream(ChunkStream),
}

impl Response {
    /// Create a response from a stream of raw chunks.
    pub fn from_stream<S>(stream: S) -> Self
    where
        S: Stream<Item = Result<String, Error>> + Send + 'static,
    {
        Response::Stream(stream.boxed())
    }

    /// Create a complete response.
    pub fn from_text(text: impl Into<String>) -> Self {
        Response::Complete(text.into())
    }

    pub fn is_stream(&self) -> bool {
        matches!(self, Response::Stream(_))
    }

    /// View the response as a chunk stream. A complete response becomes a
    /// single chunk.
    pub fn into_stream(self) -> ChunkStream {
        match self {
            Response::Stream(stream) => stream,
            Response::Complete(text) => futures_util::stream::once(async move { Ok(text) }).boxed(),
        }
    }

    /// Buffer the response by concatenating every raw chunk.
    pub async fn text(self) -> Result<String, Error> {
        match self {
            Response::Complete(text) => Ok(text),
            Response::Stream(mut stream) => {
                let mut text = String::new();
                while let Some(chunk) = stream.next().await {
                    text.push_str(&chunk?);
                }
                Ok(text)
            }
        }
    }
}

impl std::fmt::Debug for Response {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Response::Complete(text) => f.debug_tuple("Complete").field(text).finish(),
            Response::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}
