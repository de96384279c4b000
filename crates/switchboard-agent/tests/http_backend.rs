#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::time::Duration;
use switchboard_agent::*;
use switchboard_core::{CompletionService, WorkerHandler, WorkerRequest};
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn chat_body(content: &str, total_tokens: u64) -> serde_json::Value {
    serde_json::json!({
        "id": "chatcmpl-1",
        "object": "chat.completion",
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": content},
            "finish_reason": "stop"
        }],
        "usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": total_tokens}
    })
}

// ---------------------------------------------------------------------------
// 1. Successful completion: auth header, model and messages are sent
// ---------------------------------------------------------------------------

#[tokio::test]
async fn completion_round_trip() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("Authorization", "Bearer sk-test"))
        .and(body_partial_json(serde_json::json!({"model": "gpt-4o-mini"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(chat_body("Your refund is on its way.", 42)))
        .expect(1)
        .mount(&server)
        .await;

    let svc = HttpCompletionService::new(HttpBackendConfig::new(server.uri(), "gpt-4o-mini").with_api_key("sk-test"))
        .unwrap();
    let completion = svc
        .complete("Where is my refund?", &serde_json::json!({"worker": "billing"}))
        .await
        .unwrap();

    assert_eq!(completion.text, "Your refund is on its way.");
    assert_eq!(completion.tokens_used, 42);
}

// ---------------------------------------------------------------------------
// 2. Non-2xx responses map to Upstream
// ---------------------------------------------------------------------------

#[tokio::test]
async fn server_error_is_upstream() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
        .mount(&server)
        .await;

    let svc = HttpCompletionService::new(HttpBackendConfig::new(server.uri(), "m")).unwrap();
    let err = svc.complete("hi", &serde_json::Value::Null).await.unwrap_err();
    assert_eq!(err.kind(), "upstream");
    assert!(err.to_string().contains("503"));
    assert!(err.to_string().contains("overloaded"));
}

// ---------------------------------------------------------------------------
// 3. Client-side timeout maps to Upstream
// ---------------------------------------------------------------------------

#[tokio::test]
async fn slow_backend_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(chat_body("late", 1))
                .set_delay(Duration::from_millis(500)),
        )
        .mount(&server)
        .await;

    let svc = HttpCompletionService::new(HttpBackendConfig::new(server.uri(), "m").with_timeout_ms(50)).unwrap();
    let err = svc.complete("hi", &serde_json::Value::Null).await.unwrap_err();
    assert_eq!(err.kind(), "upstream");
    assert!(err.to_string().contains("timed out"));
}

// ---------------------------------------------------------------------------
// 4. The handler forwards prior failures into the prompt
// ---------------------------------------------------------------------------

#[tokio::test]
async fn handler_sends_prior_failures_to_backend() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(chat_body("handled", 7)))
        .mount(&server)
        .await;

    let svc = HttpCompletionService::new(HttpBackendConfig::new(server.uri(), "m")).unwrap();
    let handler = CompletionHandler::new().with_service("backup", Arc::new(svc));
    let request = WorkerRequest::new("Draft a reply").after_failure("primary", "timed out");

    let resp = handler.handle("backup", &request).await.unwrap();
    assert!(resp.success);
    assert_eq!(resp.content, "handled");
    assert_eq!(resp.tokens_used, 7);

    let received = server.received_requests().await.unwrap();
    assert_eq!(received.len(), 1);
    let body: serde_json::Value = serde_json::from_slice(&received[0].body).unwrap();
    let user = body["messages"][1]["content"].as_str().unwrap();
    assert!(user.contains("Previous attempts failed"));
    assert!(user.contains("primary: timed out"));
}
