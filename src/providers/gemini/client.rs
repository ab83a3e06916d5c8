use futures_util::StreamExt;
use reqwest::Client;
use std::time::Duration;

use super::types::{convert_messages, GeminiGenerationConfig, GeminiRequest, GeminiResponse};
use crate::provider::Provider;
use crate::sse_stream::FramedStreamExt;
use crate::{Error, GenerationRequest, Response};

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";
const DEFAULT_MODEL: &str = "gemini-1.5-flash";

/// Gemini provider.
///
/// Streams are consumed here: every chunk handed back is the full answer so
/// far, so the registry declares this provider with the custom adapter.
pub struct GeminiProvider {
    client: Client,
    api_key: Option<String>,
    base_url: String,
}

impl GeminiProvider {
    /// Without a key every call fails with a configuration error.
    pub fn new(api_key: Option<String>) -> Result<Self, Error> {
        Self::new_with_base_url(api_key, GEMINI_BASE_URL.to_string())
    }

    /// Create a new Gemini provider with custom base URL (for testing).
    pub fn new_with_base_url(api_key: Option<String>, base_url: String) -> Result<Self, Error> {
        let client = Client::builder().timeout(Duration::from_secs(120)).build()?;
        Ok(Self {
            client,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn convert_request(&self, request: &GenerationRequest) -> GeminiRequest {
        let (contents, system_instruction) = convert_messages(&request.messages);
        GeminiRequest {
            contents,
            system_instruction,
            generation_config: Some(GeminiGenerationConfig {
                temperature: request.temperature,
            }),
        }
    }

    fn endpoint(&self, stream: bool, model: &str) -> String {
        if stream {
            format!(
                "{}/v1beta/models/{model}:streamGenerateContent?alt=sse",
                self.base_url
            )
        } else {
            format!("{}/v1beta/models/{model}:generateContent", self.base_url)
        }
    }
}

#[async_trait::async_trait]
impl Provider for GeminiProvider {
    fn name(&self) -> &str {
        "Gemini"
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<Response, Error> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| Error::config("GEMINI_API_KEY is not set"))?;
        let model = request.model.as_deref().unwrap_or(DEFAULT_MODEL);
        let body = self.convert_request(request);

        let response = self
            .client
            .post(self.endpoint(request.stream, model))
            .header("Content-Type", "application/json")
            .header("x-goog-api-key", api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await?;
            return Err(Error::from_status("Gemini", status, &error_text));
        }

        if !request.stream {
            let parsed: GeminiResponse = response.json().await?;
            return Ok(Response::from_text(parsed.text()));
        }

        let mut events = response.bytes_stream().sse_events();
        let stream = async_stream::try_stream! {
            let mut answer = String::new();
            while let Some(event) = events.next().await {
                let event = event?;
                let data = event.data.trim();
                if data.is_empty() || event.is_done() {
                    continue;
                }
                let parsed: GeminiResponse = serde_json::from_str(data).map_err(|e| {
                    Error::provider("Gemini", format!("Failed to parse SSE event: {e}"))
                })?;
                let text = parsed.text();
                if text.is_empty() {
                    continue;
                }
                answer.push_str(&text);
                yield answer.clone();
            }
        };

        Ok(Response::from_stream(stream))
    }
}
