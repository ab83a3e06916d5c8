use thiserror::Error;

/// Errors that can occur when using the promptline library.
#[derive(Error, Debug)]
pub enum Error {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Provider error: {provider} - {message}")]
    Provider { provider: String, message: String },

    #[error("Rate limit exceeded for {provider}")]
    RateLimit { provider: String },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Streaming error: {0}")]
    Streaming(String),

    /// Every attempt failed before any output was produced.
    #[error("Provider {provider} unavailable after {attempts} attempt(s): {source}")]
    ProviderUnavailable {
        provider: String,
        attempts: u32,
        #[source]
        source: Box<Error>,
    },

    /// The caller stopped the generation. The partial text is kept.
    #[error("Generation interrupted after {} chars", partial.len())]
    GenerationInterrupted { partial: String },

    /// The stream broke after output was already delivered.
    #[error("Stream from {provider} failed after partial output: {message}")]
    StreamFailed {
        provider: String,
        partial: String,
        message: String,
    },

    #[error("Corrupt stored record {key}: {message}")]
    StorageCorrupt { key: String, message: String },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("A generation is already in progress")]
    Busy,
}

impl Error {
    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Provider {
            provider: provider.into(),
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Error::Config(message.into())
    }

    pub fn streaming(message: impl Into<String>) -> Self {
        Error::Streaming(message.into())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Error::Validation(message.into())
    }

    pub fn storage_corrupt(key: impl Into<String>, message: impl Into<String>) -> Self {
        Error::StorageCorrupt {
            key: key.into(),
            message: message.into(),
        }
    }

    /// Map a non-success HTTP status from an upstream into the matching error.
    pub fn from_status(provider: &str, status: reqwest::StatusCode, body: &str) -> Self {
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Error::RateLimit {
                provider: provider.to_string(),
            };
        }
        Error::provider(provider, format!("API error ({status}): {body}"))
    }
}
