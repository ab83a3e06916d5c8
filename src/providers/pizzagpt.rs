//! PizzaGPT: one question in, one answer out.

use reqwest::Client;
use serde::Serialize;
use std::time::Duration;

use crate::provider::Provider;
use crate::{Error, GenerationRequest, Response};

const PIZZAGPT_URL: &str = "https://www.pizzagpt.it";

#[derive(Debug, Serialize)]
struct Question<'a> {
    question: &'a str,
}

/// Batch-only upstream that sees the latest user message alone.
pub struct PizzaGptProvider {
    client: Client,
    base_url: String,
}

impl PizzaGptProvider {
    pub fn new() -> Result<Self, Error> {
        Self::new_with_base_url(PIZZAGPT_URL.to_string())
    }

    pub fn new_with_base_url(base_url: String) -> Result<Self, Error> {
        let client = Client::builder().timeout(Duration::from_secs(60)).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait::async_trait]
impl Provider for PizzaGptProvider {
    fn name(&self) -> &str {
        "PizzaGPT"
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<Response, Error> {
        let response = self
            .client
            .post(format!("{}/api/chatx-completion", self.base_url))
            .header("x-secret", "Marinara")
            .json(&Question {
                question: request.last_user_text(),
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await?;
            return Err(Error::from_status("PizzaGPT", status, &error_text));
        }

        let body: serde_json::Value = response.json().await?;
        let answer = body
            .pointer("/answer/content")
            .and_then(|v| v.as_str())
            .ok_or_else(|| Error::provider("PizzaGPT", "response has no answer content"))?;
        Ok(Response::from_text(answer))
    }
}
