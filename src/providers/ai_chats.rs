//! ai-chats.org, a keyless chat endpoint that streams `data: ` lines.

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ORIGIN, REFERER, USER_AGENT};
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;

use crate::provider::Provider;
use crate::sse_stream::FramedStreamExt;
use crate::{Error, GenerationRequest, Prompt, Response};

const AI_CHATS_URL: &str = "https://ai-chats.org";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ChatPayload<'a> {
    r#type: &'a str,
    messages_history: Vec<HistoryEntry>,
}

#[derive(Debug, Serialize)]
struct HistoryEntry {
    content: String,
    from: &'static str,
}

/// The upstream takes the whole conversation as one transcript. Each raw
/// chunk is one line of the response body, `data: ` prefix included.
pub struct AiChatsProvider {
    client: Client,
    base_url: String,
}

impl AiChatsProvider {
    pub fn new() -> Result<Self, Error> {
        Self::new_with_base_url(AI_CHATS_URL.to_string())
    }

    pub fn new_with_base_url(base_url: String) -> Result<Self, Error> {
        let base_url = base_url.trim_end_matches('/').to_string();
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json, text/event-stream"));
        headers.insert(
            USER_AGENT,
            HeaderValue::from_static(
                "Mozilla/5.0 (Macintosh; Intel Mac OS X 10.15; rv:129.0) Gecko/20100101 Firefox/129.0",
            ),
        );
        let origin = HeaderValue::from_str(&base_url)
            .map_err(|e| Error::config(format!("invalid base url: {e}")))?;
        let referer = HeaderValue::from_str(&format!("{base_url}/chat/"))
            .map_err(|e| Error::config(format!("invalid base url: {e}")))?;
        headers.insert(ORIGIN, origin);
        headers.insert(REFERER, referer);

        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .default_headers(headers)
            .build()?;
        Ok(Self { client, base_url })
    }

    fn payload(request: &GenerationRequest) -> ChatPayload<'static> {
        let transcript = Prompt::from(request.messages.clone()).to_transcript();
        ChatPayload {
            r#type: "chat",
            messages_history: vec![HistoryEntry {
                content: transcript,
                from: "you",
            }],
        }
    }
}

#[async_trait::async_trait]
impl Provider for AiChatsProvider {
    fn name(&self) -> &str {
        "BestIM"
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<Response, Error> {
        let response = self
            .client
            .post(format!("{}/chat/send2/", self.base_url))
            .json(&Self::payload(request))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await?;
            return Err(Error::from_status("BestIM", status, &error_text));
        }

        if !request.stream {
            // Still line-framed; strip it here since no normalizer runs
            let body = response.text().await?;
            let text = crate::normalize::Framing::DataLines
                .unwrap_payload(&body)?
                .unwrap_or_default();
            return Ok(Response::from_text(text));
        }

        Ok(Response::from_stream(response.bytes_stream().lines()))
    }
}
