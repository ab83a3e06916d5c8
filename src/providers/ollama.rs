//! Local Ollama server, `/api/chat` with newline-delimited JSON streaming.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::provider::Provider;
use crate::providers::openai::types::ChatMessage;
use crate::sse_stream::FramedStreamExt;
use crate::{Error, GenerationRequest, Response};

pub const DEFAULT_OLLAMA_HOST: &str = "http://localhost:11434";
const DEFAULT_MODEL: &str = "llama3.1";

#[derive(Debug, Serialize)]
struct OllamaChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<OllamaOptions>,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    message: Option<ChatMessage>,
}

/// Raw chunks are single NDJSON lines; the text sits at `/message/content`.
pub struct OllamaProvider {
    client: Client,
    host: String,
}

impl OllamaProvider {
    pub fn new(host: impl Into<String>) -> Result<Self, Error> {
        // Local models can take a while to load on first use
        let client = Client::builder().timeout(Duration::from_secs(600)).build()?;
        Ok(Self {
            client,
            host: host.into().trim_end_matches('/').to_string(),
        })
    }

    fn convert_request(request: &GenerationRequest) -> OllamaChatRequest {
        OllamaChatRequest {
            model: request
                .model
                .clone()
                .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            messages: request.messages.iter().map(ChatMessage::from).collect(),
            stream: request.stream,
            options: request.temperature.map(|temperature| OllamaOptions { temperature }),
        }
    }
}

#[async_trait::async_trait]
impl Provider for OllamaProvider {
    fn name(&self) -> &str {
        "Ollama"
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<Response, Error> {
        let response = self
            .client
            .post(format!("{}/api/chat", self.host))
            .json(&Self::convert_request(request))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await?;
            return Err(Error::from_status("Ollama", status, &error_text));
        }

        if !request.stream {
            let parsed: OllamaChatResponse = response.json().await?;
            return Ok(Response::from_text(
                parsed.message.map(|m| m.content).unwrap_or_default(),
            ));
        }

        Ok(Response::from_stream(response.bytes_stream().lines()))
    }
}
