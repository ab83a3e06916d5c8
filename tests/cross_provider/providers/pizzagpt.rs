use super::run;
use promptline::providers::PizzaGptProvider;
use promptline::{Error, GenerateOptions, ProviderDescriptor};
use serde_json::json;
use std::sync::Arc;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn descriptor(server: &MockServer) -> ProviderDescriptor {
    let provider =
        PizzaGptProvider::new_with_base_url(server.uri()).expect("Failed to create provider");
    ProviderDescriptor::new("PizzaGPT", Arc::new(provider))
}

#[tokio::test]
async fn test_single_blob_answer() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chatx-completion"))
        .and(body_json(json!({"question": "Best pizza?"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "answer": {"content": "Margherita"}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let run = run(descriptor(&server), "Best pizza?", GenerateOptions::default()).await;

    assert_eq!(run.result.expect("generation failed").text, "Margherita");
    assert_eq!(run.chunks, vec!["Margherita"]);
}

#[tokio::test]
async fn test_rate_limit_exhausts_retries() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chatx-completion"))
        .respond_with(ResponseTemplate::new(429))
        .expect(3)
        .mount(&server)
        .await;

    let run = run(
        descriptor(&server),
        "hi",
        GenerateOptions::default().max_retries(2),
    )
    .await;

    match run.result {
        Err(Error::ProviderUnavailable { attempts, source, .. }) => {
            assert_eq!(attempts, 3);
            assert!(matches!(*source, Error::RateLimit { .. }));
        }
        other => panic!("expected ProviderUnavailable, got {other:?}"),
    }
}
