//! HTTP-level retry behavior of the completion client.

use autocrew::llm::{ChatMessage, Client, CompletionClient};
use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn success_body() -> serde_json::Value {
    json!({
        "id": "msg_1",
        "model": "claude-sonnet-4-20250514",
        "content": [{"type": "text", "text": "ok"}],
        "stop_reason": "end_turn"
    })
}

fn client_for(server: &MockServer) -> Client {
    Client::new("test-key".to_string())
        .with_base_url(server.uri())
        .with_backoff_base(Duration::from_millis(1))
}

#[tokio::test]
async fn retries_through_transient_errors() {
    let server = MockServer::start().await;

    // Mocks are consulted in mount order; exhausted mocks fall through.
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(429))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(success_body()))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let response = client
        .complete_with_tools("system", &[ChatMessage::user("hi")], &[])
        .await
        .unwrap();

    assert_eq!(response.text(), "ok");
    assert_eq!(response.stop_reason.as_deref(), Some("end_turn"));
    assert_eq!(server.received_requests().await.unwrap().len(), 3);
}

#[tokio::test]
async fn auth_errors_fail_without_retry() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": {"type": "authentication_error", "message": "invalid x-api-key"}
        })))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let err = client
        .complete_with_tools("system", &[ChatMessage::user("hi")], &[])
        .await
        .unwrap_err();

    assert!(err.to_string().contains("invalid x-api-key"));
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
}

#[tokio::test]
async fn exhausting_retries_surfaces_the_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let err = client
        .complete_with_tools("system", &[ChatMessage::user("hi")], &[])
        .await
        .unwrap_err();

    assert!(err.to_string().contains("503"));
    // Initial attempt plus three retries.
    assert_eq!(server.received_requests().await.unwrap().len(), 4);
}

#[tokio::test]
async fn tool_use_blocks_are_parsed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "msg_2",
            "content": [
                {"type": "text", "text": "creating the issue"},
                {"type": "tool_use", "id": "tu_1", "name": "create_issue",
                 "input": {"title": "Add /healthz"}}
            ],
            "stop_reason": "tool_use"
        })))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let response = client
        .complete_with_tools("system", &[ChatMessage::user("go")], &[])
        .await
        .unwrap();

    let calls = response.tool_calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].id, "tu_1");
    assert_eq!(calls[0].name, "create_issue");
    assert_eq!(calls[0].input["title"], "Add /healthz");
}
