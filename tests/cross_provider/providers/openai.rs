use super::{run, sse_body};
use promptline::providers::OpenAICompatProvider;
use promptline::{ChunkAdapter, Framing, GenerateOptions, ProviderDescriptor};
use serde_json::json;
use std::sync::Arc;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn provider(server: &MockServer) -> Arc<OpenAICompatProvider> {
    Arc::new(
        OpenAICompatProvider::new_with_base_url(
            "DeepInfra",
            Some("test-api-key".to_string()),
            server.uri(),
        )
        .expect("Failed to create provider"),
    )
}

#[tokio::test]
async fn test_streaming_chat_completion() {
    let server = MockServer::start().await;
    let body = sse_body(&[
        r#"{"choices":[{"index":0,"delta":{"role":"assistant"}}]}"#,
        r#"{"choices":[{"index":0,"delta":{"content":"Hel"}}]}"#,
        r#"{"choices":[{"index":0,"delta":{"content":"lo"}}]}"#,
        r#"{"choices":[{"index":0,"delta":{},"finish_reason":"stop"}]}"#,
        "[DONE]",
    ]);

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("Authorization", "Bearer test-api-key"))
        .and(body_partial_json(json!({
            "model": "meta-llama/Meta-Llama-3.1-8B-Instruct",
            "stream": true,
            "messages": [{"role": "user", "content": "Say hello"}]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .expect(1)
        .mount(&server)
        .await;

    let descriptor = ProviderDescriptor::new("DeepInfraLlama31_8B", provider(&server))
        .model("meta-llama/Meta-Llama-3.1-8B-Instruct")
        .streaming(ChunkAdapter::Delta(Framing::Json("/choices/0/delta/content".into())));
    let run = run(descriptor, "Say hello", GenerateOptions::default()).await;

    let outcome = run.result.expect("generation failed");
    assert_eq!(outcome.text, "Hello");
    assert_eq!(run.chunks, vec!["Hel", "Hello"]);
}

#[tokio::test]
async fn test_batch_chat_completion() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_partial_json(json!({"stream": false, "temperature": 0.0})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"index": 0, "message": {"role": "assistant", "content": "Bonjour"}}]
        })))
        .mount(&server)
        .await;

    let descriptor = ProviderDescriptor::new("DeepInfraBatch", provider(&server)).model("m");
    let run = run(descriptor, "Translate hello", GenerateOptions::default()).await;

    assert_eq!(run.result.expect("generation failed").text, "Bonjour");
    assert_eq!(run.chunks, vec!["Bonjour"]);
}

#[tokio::test]
async fn test_server_error_is_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"content": "recovered"}}]
        })))
        .mount(&server)
        .await;

    let descriptor = ProviderDescriptor::new("DeepInfraBatch", provider(&server));
    let run = run(descriptor, "hi", GenerateOptions::default()).await;

    let outcome = run.result.expect("generation failed");
    assert_eq!(outcome.text, "recovered");
    assert_eq!(outcome.attempts, 2);
}
