use super::run;
use promptline::providers::AiChatsProvider;
use promptline::{ChunkAdapter, Framing, GenerateOptions, ProviderDescriptor};
use serde_json::json;
use std::sync::Arc;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn test_data_lines_are_concatenated() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/send2/"))
        .and(body_partial_json(json!({
            "type": "chat",
            "messagesHistory": [{"from": "you", "content": "user: Hi there\n\nassistant:"}]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            "data: Hi\n\ndata: ! How\ndata:  can I help?\n\n",
            "text/event-stream",
        ))
        .expect(1)
        .mount(&server)
        .await;

    let provider = AiChatsProvider::new_with_base_url(server.uri())
        .expect("Failed to create provider");
    let descriptor = ProviderDescriptor::new("BestIM_GPT4oMini", Arc::new(provider))
        .streaming(ChunkAdapter::Delta(Framing::DataLines));
    let run = run(descriptor, "Hi there", GenerateOptions::default()).await;

    let outcome = run.result.expect("generation failed");
    assert_eq!(outcome.text, "Hi! How can I help?");
    assert_eq!(run.chunks, vec!["Hi", "Hi! How", "Hi! How can I help?"]);
}
