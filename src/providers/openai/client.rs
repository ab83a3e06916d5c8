use super::types::{ChatCompletionRequest, ChatCompletionResponse, ChatMessage};
use crate::provider::Provider;
use crate::sse_stream::FramedStreamExt;
use crate::{Error, GenerationRequest, Response};
use futures_util::StreamExt;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Client;
use std::time::Duration;

/// DeepInfra's OpenAI-compatible endpoint.
pub const DEEPINFRA_BASE_URL: &str = "https://api.deepinfra.com/v1/openai";

/// Client for any OpenAI-compatible `chat/completions` endpoint.
///
/// Streaming responses are handed back as the raw `data` payload of each SSE
/// event, one JSON envelope per chunk; the normalizer extracts the delta.
pub struct OpenAICompatProvider {
    name: String,
    client: Client,
    api_key: Option<String>,
    base_url: String,
    default_model: String,
}

impl OpenAICompatProvider {
    /// Create a provider against DeepInfra.
    pub fn deepinfra(api_key: Option<String>) -> Result<Self, Error> {
        Self::new_with_base_url("DeepInfra", api_key, DEEPINFRA_BASE_URL.to_string())
    }

    /// Create a provider with custom base URL.
    pub fn new_with_base_url(
        name: impl Into<String>,
        api_key: Option<String>,
        base_url: String,
    ) -> Result<Self, Error> {
        Self::with_headers(name, api_key, base_url, &[])
    }

    /// Create a provider that sends extra static headers with every request.
    pub fn with_headers(
        name: impl Into<String>,
        api_key: Option<String>,
        base_url: String,
        headers: &[(&str, &str)],
    ) -> Result<Self, Error> {
        let mut default_headers = HeaderMap::new();
        for (key, value) in headers {
            let key = HeaderName::from_bytes(key.as_bytes())
                .map_err(|e| Error::config(format!("invalid header name '{key}': {e}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| Error::config(format!("invalid header value: {e}")))?;
            default_headers.insert(key, value);
        }
        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .default_headers(default_headers)
            .build()?;

        Ok(Self {
            name: name.into(),
            client,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            default_model: "meta-llama/Meta-Llama-3.1-70B-Instruct".to_string(),
        })
    }

    /// Model used when a request does not name one.
    pub fn default_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = model.into();
        self
    }

    fn convert_request(&self, request: &GenerationRequest) -> ChatCompletionRequest {
        ChatCompletionRequest {
            model: request
                .model
                .clone()
                .unwrap_or_else(|| self.default_model.clone()),
            messages: request.messages.iter().map(ChatMessage::from).collect(),
            temperature: request.temperature,
            stream: request.stream,
        }
    }
}

#[async_trait::async_trait]
impl Provider for OpenAICompatProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<Response, Error> {
        let body = self.convert_request(request);

        let mut builder = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Content-Type", "application/json")
            .json(&body);
        if let Some(key) = &self.api_key {
            builder = builder.header("Authorization", format!("Bearer {key}"));
        }
        let response = builder.send().await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await?;
            return Err(Error::from_status(&self.name, status, &error_text));
        }

        if !body.stream {
            let parsed: ChatCompletionResponse = response.json().await?;
            return Ok(Response::from_text(parsed.into_text()));
        }

        let chunks = response
            .bytes_stream()
            .sse_events()
            .filter_map(|event| async move {
                match event {
                    Ok(event) if event.is_done() => None,
                    Ok(event) => Some(Ok(event.data)),
                    Err(e) => Some(Err(e)),
                }
            });

        Ok(Response::from_stream(chunks))
    }
}
