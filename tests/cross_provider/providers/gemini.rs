use super::{run, sse_body};
use promptline::providers::GeminiProvider;
use promptline::{ChunkAdapter, Error, GenerateOptions, ProviderDescriptor};
use std::sync::Arc;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn descriptor(provider: GeminiProvider) -> ProviderDescriptor {
    ProviderDescriptor::new("GoogleGemini", Arc::new(provider))
        .models(["gemini-a", "gemini-b"])
        .streaming(ChunkAdapter::Custom)
        .with_files()
}

#[tokio::test]
async fn test_stream_accumulates_and_falls_back_to_next_model() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1beta/models/gemini-a:streamGenerateContent"))
        .respond_with(ResponseTemplate::new(500).set_body_string("model overloaded"))
        .expect(1)
        .mount(&server)
        .await;

    let body = sse_body(&[
        r#"{"candidates":[{"content":{"role":"model","parts":[{"text":"Hello"}]}}]}"#,
        r#"{"candidates":[{"content":{"role":"model","parts":[{"text":" world"}]},"finishReason":"STOP"}]}"#,
    ]);
    Mock::given(method("POST"))
        .and(path("/v1beta/models/gemini-b:streamGenerateContent"))
        .and(query_param("alt", "sse"))
        .and(header("x-goog-api-key", "test-key"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .expect(1)
        .mount(&server)
        .await;

    let provider = GeminiProvider::new_with_base_url(Some("test-key".into()), server.uri())
        .expect("Failed to create Gemini provider");
    let run = run(descriptor(provider), "Greet me", GenerateOptions::default()).await;

    let outcome = run.result.expect("generation failed");
    assert_eq!(outcome.text, "Hello world");
    assert_eq!(outcome.attempts, 2);
    assert_eq!(run.chunks, vec!["Hello", "Hello world"]);
}

#[tokio::test]
async fn test_missing_key_is_unavailable() {
    let server = MockServer::start().await;
    let provider = GeminiProvider::new_with_base_url(None, server.uri())
        .expect("Failed to create Gemini provider");

    let run = run(
        descriptor(provider),
        "hi",
        GenerateOptions::default().max_retries(0),
    )
    .await;

    match run.result {
        Err(Error::ProviderUnavailable { attempts, source, .. }) => {
            assert_eq!(attempts, 1);
            assert!(matches!(*source, Error::Config(_)));
        }
        other => panic!("expected ProviderUnavailable, got {other:?}"),
    }
    assert!(run.chunks.is_empty());
}
