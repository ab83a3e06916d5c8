use super::run;
use promptline::providers::OllamaProvider;
use promptline::{ChunkAdapter, Framing, GenerateOptions, ProviderDescriptor};
use serde_json::json;
use std::sync::Arc;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn test_ndjson_token_stream() {
    let server = MockServer::start().await;
    let body = concat!(
        r#"{"message":{"role":"assistant","content":"Ciao"},"done":false}"#,
        "\n",
        r#"{"message":{"role":"assistant","content":" mondo"},"done":false}"#,
        "\n",
        r#"{"done":true,"total_duration":1234}"#,
        "\n",
    );
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .and(body_partial_json(json!({"stream": true, "model": "llama3.1"})))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "application/x-ndjson"))
        .expect(1)
        .mount(&server)
        .await;

    let provider = OllamaProvider::new(server.uri()).expect("Failed to create provider");
    let descriptor = ProviderDescriptor::new("OllamaLocal", Arc::new(provider))
        .streaming(ChunkAdapter::Delta(Framing::Json("/message/content".into())));
    let run = run(descriptor, "Say hi in Italian", GenerateOptions::default()).await;

    assert_eq!(run.result.expect("generation failed").text, "Ciao mondo");
    assert_eq!(run.chunks, vec!["Ciao", "Ciao mondo"]);
}
