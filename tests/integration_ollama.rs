#![expect(
    clippy::tests_outside_test_module,
    reason = "integration tests are only compiled in test mode"
)]

// Ollama client tests against a mock embedding server

use docs_rag::RagError;
use docs_rag::config::OllamaConfig;
use docs_rag::embeddings::EmbeddingProvider;
use docs_rag::embeddings::ollama::OllamaClient;
use serde_json::{Value, json};
use std::time::Duration;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

const DIMENSION: usize = 4;

/// Answers `/api/embed` with `[len, first byte, index, 1.0]` per input
struct EmbedResponder;

impl Respond for EmbedResponder {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let body: Value = serde_json::from_slice(&request.body).unwrap_or_default();
        let embeddings: Vec<Vec<f32>> = body["input"]
            .as_array()
            .map(|inputs| {
                inputs
                    .iter()
                    .enumerate()
                    .map(|(index, text)| {
                        let text = text.as_str().unwrap_or_default();
                        vec![
                            text.chars().count() as f32,
                            f32::from(text.bytes().next().unwrap_or(0)),
                            index as f32,
                            1.0,
                        ]
                    })
                    .collect()
            })
            .unwrap_or_default();

        ResponseTemplate::new(200).set_body_json(json!({
            "model": body["model"],
            "embeddings": embeddings,
        }))
    }
}

fn client_for(server: &MockServer, batch_size: u32) -> OllamaClient {
    let address = server.address();
    let config = OllamaConfig {
        protocol: "http".to_string(),
        host: address.ip().to_string(),
        port: address.port(),
        model: "all-minilm".to_string(),
        batch_size,
        embedding_dimension: DIMENSION as u32,
    };

    OllamaClient::new(&config)
        .expect("Failed to create Ollama client")
        .with_timeout(Duration::from_secs(5))
        .with_retry_attempts(1)
}

fn texts(items: &[&str]) -> Vec<String> {
    items.iter().map(ToString::to_string).collect()
}

#[tokio::test(flavor = "multi_thread")]
async fn embed_returns_one_vector_per_input_in_order() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .and(body_partial_json(json!({"model": "all-minilm"})))
        .respond_with(EmbedResponder)
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server, 32);
    let vectors = client
        .embed(texts(&["a", "bb", "ccc"]))
        .await
        .expect("embedding should succeed");

    assert_eq!(vectors.len(), 3);
    assert!(vectors.iter().all(|v| v.len() == DIMENSION));
    assert_eq!(vectors[0][0], 1.0);
    assert_eq!(vectors[1][0], 2.0);
    assert_eq!(vectors[2][0], 3.0);
}

#[tokio::test(flavor = "multi_thread")]
async fn inputs_are_sent_in_sub_batches() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(EmbedResponder)
        .expect(3)
        .mount(&server)
        .await;

    let client = client_for(&server, 2);
    let vectors = client
        .embed(texts(&["one", "two", "three", "four", "five"]))
        .await
        .expect("embedding should succeed");

    // Index within each request restarts per sub-batch
    let positions: Vec<f32> = vectors.iter().map(|v| v[2]).collect();
    assert_eq!(positions, vec![0.0, 1.0, 0.0, 1.0, 0.0]);
    let lengths: Vec<f32> = vectors.iter().map(|v| v[0]).collect();
    assert_eq!(lengths, vec![3.0, 3.0, 5.0, 4.0, 4.0]);

    let requests = server.received_requests().await.expect("recording enabled");
    let batch_sizes: Vec<usize> = requests
        .iter()
        .map(|r| {
            let body: Value = serde_json::from_slice(&r.body).expect("json body");
            body["input"].as_array().map_or(0, Vec::len)
        })
        .collect();
    assert_eq!(batch_sizes, vec![2, 2, 1]);
}

#[tokio::test(flavor = "multi_thread")]
async fn server_error_is_embedding_unavailable() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server, 32);
    let result = client.embed(texts(&["text"])).await;

    assert!(matches!(result, Err(RagError::EmbeddingUnavailable(_))));
}

#[tokio::test(flavor = "multi_thread")]
async fn missing_model_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(
            ResponseTemplate::new(404).set_body_json(json!({"error": "model not found"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server, 32).with_retry_attempts(3);
    let result = client.embed(texts(&["text"])).await;

    assert!(matches!(result, Err(RagError::EmbeddingUnavailable(_))));
}

#[tokio::test(flavor = "multi_thread")]
async fn transient_server_error_is_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(EmbedResponder)
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server, 32).with_retry_attempts(2);
    let vectors = client
        .embed(texts(&["retry me"]))
        .await
        .expect("second attempt should succeed");

    assert_eq!(vectors.len(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn response_count_mismatch_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "embeddings": [[0.1, 0.2, 0.3, 0.4]]
        })))
        .mount(&server)
        .await;

    let client = client_for(&server, 32);
    let result = client.embed(texts(&["first", "second"])).await;

    assert!(matches!(result, Err(RagError::EmbeddingUnavailable(_))));
}

#[tokio::test(flavor = "multi_thread")]
async fn unreachable_server_is_embedding_unavailable() {
    let server = MockServer::start().await;
    let client = client_for(&server, 32);
    drop(server);

    let result = client.embed(texts(&["text"])).await;
    assert!(matches!(result, Err(RagError::EmbeddingUnavailable(_))));
}

#[tokio::test(flavor = "multi_thread")]
async fn health_check_finds_tagged_model() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/tags"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "models": [
                {"name": "llama3:latest", "size": 4_000_000_000_u64, "digest": "abc"},
                {"name": "all-minilm:latest", "size": 45_000_000, "digest": "def"}
            ]
        })))
        .mount(&server)
        .await;

    let client = client_for(&server, 32);
    let models = tokio::task::spawn_blocking(move || {
        client.health_check()?;
        client.list_models()
    })
    .await
    .expect("task should not panic")
    .expect("health check should pass");

    assert_eq!(models.len(), 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn health_check_reports_missing_model() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/tags"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "models": [{"name": "llama3:latest"}]
        })))
        .mount(&server)
        .await;

    let client = client_for(&server, 32);
    let result = tokio::task::spawn_blocking(move || client.health_check())
        .await
        .expect("task should not panic");

    let message = format!("{:#}", result.expect_err("model is missing"));
    assert!(message.contains("all-minilm"), "unexpected error: {message}");
}
