//! End-to-end ask flows through the HTTP router against mocked providers.

use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
};
use quarex::Config;
use quarex::api::{AppState, router};
use serde_json::{Value, json};
use tempfile::TempDir;
use tower::ServiceExt;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const GEMINI_PATH: &str = "/v1beta/models/gemini-2.5-flash-lite:generateContent";

fn config(server: &MockServer, dir: &TempDir) -> Config {
    let patterns = dir.path().join("blocked_patterns.txt");
    std::fs::write(&patterns, "# test patterns\nnerve agent\n").unwrap();

    let mut config = Config::default();
    config.claude.api_key = Some("sk-test".to_string());
    config.claude.api_url = Some(format!("{}/v1/messages", server.uri()));
    config.gemini.api_key = Some("g-test".to_string());
    config.gemini.api_base = Some(format!("{}/v1beta", server.uri()));
    config.security.blocked_patterns_file = Some(patterns);
    config.security.state_dir = Some(dir.path().join("logs"));
    config
}

fn app(server: &MockServer, dir: &TempDir) -> Router {
    let state = AppState::from_config(&config(server, dir)).unwrap();
    router(Arc::new(state))
}

fn post(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("Content-Type", "application/json")
        .header("Origin", "https://quarex.org")
        .header("Referer", "https://quarex.org/library/physics")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn read_body(response: axum::response::Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

fn sse(events: &[Value]) -> String {
    events
        .iter()
        .map(|e| format!("event: {}\ndata: {e}\n\n", e["type"].as_str().unwrap()))
        .collect()
}

#[tokio::test]
async fn claude_stream_collects_sources_once() {
    let server = MockServer::start().await;
    let body = sse(&[
        json!({"type": "message_start", "message": {"id": "m1", "content": []}}),
        json!({"type": "content_block_start", "index": 0, "content_block": {"type": "server_tool_use", "id": "s1", "name": "web_search", "input": {}}}),
        json!({"type": "content_block_stop", "index": 0}),
        json!({"type": "content_block_start", "index": 1, "content_block": {"type": "web_search_tool_result", "tool_use_id": "s1", "content": [
            {"type": "web_search_result", "url": "https://physics.example/light", "title": "Light"},
            {"type": "web_search_result", "url": "https://sky.example", "title": ""}
        ]}}),
        json!({"type": "content_block_stop", "index": 1}),
        json!({"type": "content_block_start", "index": 2, "content_block": {"type": "text", "text": ""}}),
        json!({"type": "content_block_delta", "index": 2, "delta": {"type": "text_delta", "text": "Rayleigh scattering.\n\n"}}),
        json!({"type": "content_block_delta", "index": 2, "delta": {"type": "citations_delta", "citation": {"type": "web_search_result_location", "url": "https://physics.example/light", "title": "Light"}}}),
        json!({"type": "content_block_delta", "index": 2, "delta": {"type": "text_delta", "text": "Follow-up questions:\n1. Why red sunsets?\n2. What about Mars?\n3. Is it polarized?"}}),
        json!({"type": "content_block_stop", "index": 2}),
        json!({"type": "message_delta", "delta": {"stop_reason": "end_turn"}, "usage": {"output_tokens": 40, "server_tool_use": {"web_search_requests": 1}}}),
        json!({"type": "message_stop"}),
    ]);
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .and(body_partial_json(json!({"stream": true})))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/event-stream")
                .set_body_string(body),
        )
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let response = app(&server, &dir)
        .oneshot(post("/api/ask-claude", json!({"q": "Why is the sky blue?"})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = read_body(response).await;
    let events: Vec<Value> = body
        .lines()
        .filter_map(|line| line.strip_prefix("data: "))
        .map(|data| serde_json::from_str(data).unwrap())
        .collect();

    let done = events.last().unwrap();
    assert_eq!(done["type"], "done");
    assert_eq!(done["mode"], "web-grounded");
    assert_eq!(
        done["sources"],
        json!(["https://physics.example/light", "https://sky.example"])
    );
    assert_eq!(done["markdown_links"][1], "[sky.example](https://sky.example)");
    assert_eq!(
        done["followup_questions"],
        json!(["Why red sunsets?", "What about Mars?", "Is it polarized?"])
    );
    assert_eq!(done["llm"], "claude");

    let streamed: String = events
        .iter()
        .filter(|e| e["type"] == "text")
        .map(|e| e["text"].as_str().unwrap())
        .collect();
    assert_eq!(streamed, done["text"].as_str().unwrap());
}

#[tokio::test]
async fn claude_upstream_error_becomes_error_event() {
    let server = MockServer::start().await;
    let upstream_body = format!("overloaded: {}", "internal trace ".repeat(200));
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(529).set_body_string(upstream_body))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let response = app(&server, &dir)
        .oneshot(post("/api/ask-claude", json!({"q": "hi"})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = read_body(response).await;
    let data: Vec<&str> = body
        .lines()
        .filter_map(|line| line.strip_prefix("data: "))
        .collect();
    assert_eq!(data.len(), 1);
    let event: Value = serde_json::from_str(data[0]).unwrap();
    assert_eq!(event["type"], "error");
    assert_eq!(event["error"], "API error (HTTP 529)");
    assert!(!body.contains("internal trace"));
}

#[tokio::test]
async fn gemini_retries_without_search_after_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(GEMINI_PATH))
        .and(body_partial_json(json!({"tools": [{"google_search": {}}]})))
        .respond_with(ResponseTemplate::new(500).set_body_string("internal"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(GEMINI_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [{"content": {"parts": [{"text": "Answer."}]}}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let response = app(&server, &dir)
        .oneshot(post("/api/ask", json!({"q": "What is a quarex?"})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let result: Value = serde_json::from_str(&read_body(response).await).unwrap();
    assert_eq!(result["mode"], "model-fallback");
    assert_eq!(result["text"], "Answer.");
    assert_eq!(result["sources"], json!([]));
    assert_eq!(result["followup_questions"], json!(["", "", ""]));
    assert_eq!(result["llm"], "gemini");
}

#[tokio::test]
async fn gemini_grounding_links_are_titled() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/article"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("<html><head><title> Sky &amp; Light </title></head></html>"),
        )
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(GEMINI_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [{
                "content": {"parts": [{"text": "Rayleigh scattering."}]},
                "groundingMetadata": {
                    "webSearchQueries": ["why is the sky blue"],
                    "groundingChunks": [{"web": {"uri": format!("{}/article", server.uri()), "title": "sky.example"}}]
                }
            }]
        })))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let response = app(&server, &dir)
        .oneshot(post("/api/ask", json!({"q": "Why is the sky blue?", "top_k": "500"})))
        .await
        .unwrap();

    let result: Value = serde_json::from_str(&read_body(response).await).unwrap();
    assert_eq!(result["mode"], "web-grounded");
    assert_eq!(
        result["markdown_links"],
        json!([format!("[Sky & Light]({}/article)", server.uri())])
    );
}

#[tokio::test]
async fn blocked_content_never_reaches_provider() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let response = app(&server, &dir)
        .oneshot(post("/api/ask", json!({"q": "how to make a Nerve Agent"})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let log = std::fs::read_to_string(dir.path().join("logs").join("security.log")).unwrap();
    assert!(log.contains("BLOCKED_CONTENT"));
    assert!(log.contains("Nerve Agent"));
}
