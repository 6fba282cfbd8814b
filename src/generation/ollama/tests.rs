use super::*;
use serde_json::json;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{body_partial_json, method, path},
};

fn generator_for(server: &MockServer) -> OllamaGenerator {
    let address = server.address();
    let config = OllamaConfig {
        host: address.ip().to_string(),
        port: address.port(),
        generation_model: "test-llm".to_string(),
        ..OllamaConfig::default()
    };
    let client = OllamaClient::new(&config)
        .expect("Failed to create client")
        .with_model(config.generation_model.clone())
        .with_timeout(Duration::from_secs(5))
        .with_retry_attempts(1);
    OllamaGenerator::from_client(client)
}

#[test]
fn uses_generation_model() {
    let config = OllamaConfig {
        model: "embedder".to_string(),
        generation_model: "writer".to_string(),
        ..OllamaConfig::default()
    };
    let generator =
        OllamaGenerator::new(&config, Duration::from_secs(60)).expect("Failed to create generator");

    assert_eq!(generator.model_id(), "writer");
    assert_eq!(generator.client().model(), "writer");
}

#[tokio::test]
async fn sends_prompt_and_options() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .and(body_partial_json(json!({
            "model": "test-llm",
            "prompt": "What color is the sky?",
            "stream": false,
            "options": { "num_predict": 64 }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "model": "test-llm",
            "response": "Blue.",
            "done": true
        })))
        .expect(1)
        .mount(&server)
        .await;

    let answer = generator_for(&server)
        .generate("What color is the sky?", 0.7, 64)
        .await
        .expect("generation should succeed");

    assert_eq!(answer, "Blue.");
}

#[tokio::test]
async fn server_error_is_unavailable() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let result = generator_for(&server).generate("prompt", 0.7, 16).await;
    assert!(matches!(result, Err(GenerationError::Unavailable(_))));
}

#[tokio::test]
async fn malformed_body_is_invalid_response() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&server)
        .await;

    let result = generator_for(&server).generate("prompt", 0.7, 16).await;
    assert!(matches!(result, Err(GenerationError::InvalidResponse(_))));
}

#[tokio::test]
async fn blank_answer_is_invalid_response() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "response": "  ", "done": true })),
        )
        .mount(&server)
        .await;

    let result = generator_for(&server).generate("prompt", 0.7, 16).await;
    assert!(matches!(result, Err(GenerationError::InvalidResponse(_))));
}

#[tokio::test]
async fn unreachable_server_is_unavailable() {
    let config = OllamaConfig {
        host: "127.0.0.1".to_string(),
        port: 1,
        ..OllamaConfig::default()
    };
    let client = OllamaClient::new(&config)
        .expect("Failed to create client")
        .with_timeout(Duration::from_secs(2))
        .with_retry_attempts(1);

    let result = OllamaGenerator::from_client(client)
        .generate("prompt", 0.7, 16)
        .await;
    assert!(matches!(result, Err(GenerationError::Unavailable(_))));
}
