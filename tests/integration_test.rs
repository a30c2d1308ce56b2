use anthropic_gateway::config::GatewayConfig;
use anthropic_gateway::{build_router, AppState};

use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

// ────────────────────────────────────────────────────────────────
// Mock upstream
// ────────────────────────────────────────────────────────────────

#[derive(Clone)]
struct MockUpstream {
    status: StatusCode,
    content_type: &'static str,
    body: String,
    seen: Arc<Mutex<Vec<(Option<String>, Value)>>>,
}

impl MockUpstream {
    fn new(status: StatusCode, content_type: &'static str, body: impl Into<String>) -> Self {
        Self {
            status,
            content_type,
            body: body.into(),
            seen: Arc::default(),
        }
    }

    fn json(body: Value) -> Self {
        Self::new(StatusCode::OK, "application/json", body.to_string())
    }

    fn sse(frames: &[Value]) -> Self {
        let mut body: String = frames.iter().map(|f| format!("data: {f}\n\n")).collect();
        body.push_str("data: [DONE]\n\n");
        Self::new(StatusCode::OK, "text/event-stream", body)
    }

    fn requests(&self) -> Vec<(Option<String>, Value)> {
        self.seen.lock().unwrap().clone()
    }
}

async fn mock_completions(
    State(mock): State<MockUpstream>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let auth = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    mock.seen.lock().unwrap().push((auth, body));

    (
        mock.status,
        [(header::CONTENT_TYPE, mock.content_type)],
        mock.body.clone(),
    )
        .into_response()
}

async fn serve(app: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

/// Start a mock upstream and a gateway pointed at it; returns the gateway address.
async fn start(mock: &MockUpstream, default_token: Option<&str>) -> SocketAddr {
    let upstream = Router::new()
        .route("/v1/chat/completions", post(mock_completions))
        .with_state(mock.clone());
    let upstream_addr = serve(upstream).await;

    let mut config = GatewayConfig::default();
    config.upstream.base_url = format!("http://{upstream_addr}/v1/");

    let state = Arc::new(AppState {
        config,
        client: reqwest::Client::new(),
        default_token: default_token.map(str::to_string),
    });
    serve(build_router(state)).await
}

async fn post_messages(addr: SocketAddr, body: Value) -> reqwest::Response {
    reqwest::Client::new()
        .post(format!("http://{addr}/v1/messages"))
        .header("x-api-key", "key-1")
        .json(&body)
        .send()
        .await
        .unwrap()
}

/// `(event name, data)` pairs from an SSE body, keep-alive pings removed.
fn parse_sse(body: &str) -> Vec<(String, Value)> {
    body.split("\n\n")
        .filter_map(|frame| {
            let mut name = None;
            let mut data = None;
            for line in frame.lines() {
                if let Some(v) = line.strip_prefix("event:") {
                    name = Some(v.trim().to_string());
                } else if let Some(v) = line.strip_prefix("data:") {
                    data = Some(serde_json::from_str(v.trim()).unwrap());
                }
            }
            Some((name?, data?))
        })
        .filter(|(name, _)| name != "ping")
        .collect()
}

fn completion(message: Value, finish_reason: &str) -> Value {
    json!({
        "id": "chatcmpl-123",
        "object": "chat.completion",
        "model": "upstream-model",
        "choices": [{"index": 0, "message": message, "finish_reason": finish_reason}],
        "usage": {"prompt_tokens": 7, "completion_tokens": 5, "total_tokens": 12}
    })
}

fn delta_frame(delta: Value, finish_reason: Option<&str>) -> Value {
    json!({
        "id": "chatcmpl-123",
        "object": "chat.completion.chunk",
        "model": "upstream-model",
        "choices": [{"index": 0, "delta": delta, "finish_reason": finish_reason}]
    })
}

// ────────────────────────────────────────────────────────────────
// Non-streaming
// ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_plain_request_is_translated_and_forwarded() {
    let mock = MockUpstream::json(completion(
        json!({"role": "assistant", "content": "hello"}),
        "stop",
    ));
    let addr = start(&mock, None).await;

    let resp = post_messages(
        addr,
        json!({
            "model": "claude-x",
            "messages": [{"role": "user", "content": [{"type": "text", "text": "hi"}]}],
            "max_tokens": 10
        }),
    )
    .await;

    assert_eq!(resp.status(), 200);
    assert!(resp.headers()[header::CONTENT_TYPE]
        .to_str()
        .unwrap()
        .starts_with("application/json"));

    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["type"], "message");
    assert_eq!(body["role"], "assistant");
    assert_eq!(body["model"], "claude-x");
    assert_eq!(body["content"], json!([{"type": "text", "text": "hello"}]));
    assert_eq!(body["stop_reason"], "end_turn");
    assert_eq!(body["usage"], json!({"input_tokens": 7, "output_tokens": 5}));

    let requests = mock.requests();
    assert_eq!(requests.len(), 1);
    let (auth, sent) = &requests[0];
    assert_eq!(auth.as_deref(), Some("Bearer key-1"));
    assert_eq!(sent["model"], "claude-x");
    assert_eq!(sent["max_tokens"], 10);
    assert_eq!(sent["messages"], json!([{"role": "user", "content": "hi"}]));
}

#[tokio::test]
async fn test_tool_call_completion_becomes_tool_use() {
    let mock = MockUpstream::json(completion(
        json!({
            "role": "assistant",
            "content": null,
            "tool_calls": [{
                "id": "call_1",
                "type": "function",
                "function": {"name": "lookup", "arguments": "{\"q\":\"x\"}"}
            }]
        }),
        "tool_calls",
    ));
    let addr = start(&mock, None).await;

    let resp = post_messages(
        addr,
        json!({
            "model": "claude-x",
            "max_tokens": 100,
            "messages": [{"role": "user", "content": "look up x"}],
            "tools": [{"name": "lookup", "input_schema": {"type": "object"}}]
        }),
    )
    .await;

    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["stop_reason"], "tool_use");
    assert_eq!(
        body["content"],
        json!([{"type": "tool_use", "id": "call_1", "name": "lookup", "input": {"q": "x"}}])
    );

    let (_, sent) = &mock.requests()[0];
    assert_eq!(
        sent["tools"],
        json!([{"type": "function", "function": {"name": "lookup", "parameters": {"type": "object"}}}])
    );
}

#[tokio::test]
async fn test_zero_choices_is_a_bad_gateway() {
    let mock = MockUpstream::json(json!({"id": "chatcmpl-1", "choices": []}));
    let addr = start(&mock, None).await;

    let resp = post_messages(
        addr,
        json!({"model": "m", "max_tokens": 5, "messages": [{"role": "user", "content": "x"}]}),
    )
    .await;

    assert_eq!(resp.status(), 502);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["type"], "error");
    assert_eq!(body["error"]["type"], "api_error");
    assert!(body["error"]["message"]
        .as_str()
        .unwrap()
        .contains("no choices"));
}

// ────────────────────────────────────────────────────────────────
// Upstream failures and credentials
// ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_upstream_error_is_passed_through_verbatim() {
    let upstream_body = r#"{"error":{"message":"Invalid API key","code":401}}"#;
    let mock = MockUpstream::new(StatusCode::UNAUTHORIZED, "application/json", upstream_body);
    let addr = start(&mock, None).await;

    for stream in [false, true] {
        let resp = post_messages(
            addr,
            json!({
                "model": "m",
                "max_tokens": 5,
                "stream": stream,
                "messages": [{"role": "user", "content": "x"}]
            }),
        )
        .await;

        assert_eq!(resp.status(), 401, "stream={stream}");
        assert_eq!(resp.text().await.unwrap(), upstream_body, "stream={stream}");
    }
}

#[tokio::test]
async fn test_missing_credentials_is_unauthorized() {
    let mock = MockUpstream::json(completion(json!({"content": "unused"}), "stop"));
    let addr = start(&mock, None).await;

    let resp = reqwest::Client::new()
        .post(format!("http://{addr}/v1/messages"))
        .json(&json!({"model": "m", "max_tokens": 5, "messages": []}))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 401);
    assert!(resp.headers()[header::CONTENT_TYPE]
        .to_str()
        .unwrap()
        .starts_with("text/plain"));
    assert!(resp.text().await.unwrap().contains("Bearer token is required"));
    assert!(mock.requests().is_empty());
}

#[tokio::test]
async fn test_bearer_and_default_token_precedence() {
    let mock = MockUpstream::json(completion(json!({"content": "ok"}), "stop"));
    let addr = start(&mock, Some("shared-token")).await;
    let client = reqwest::Client::new();
    let body = json!({"model": "m", "max_tokens": 5, "messages": [{"role": "user", "content": "x"}]});

    let resp = client
        .post(format!("http://{addr}/v1/messages"))
        .header(header::AUTHORIZATION, "Bearer caller-token")
        .json(&body)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let resp = client
        .post(format!("http://{addr}/v1/messages"))
        .json(&body)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let auths: Vec<Option<String>> = mock.requests().into_iter().map(|(a, _)| a).collect();
    assert_eq!(
        auths,
        [
            Some("Bearer caller-token".to_string()),
            Some("Bearer shared-token".to_string())
        ]
    );
}

#[tokio::test]
async fn test_invalid_body_is_bad_request() {
    let mock = MockUpstream::json(completion(json!({"content": "unused"}), "stop"));
    let addr = start(&mock, None).await;

    let resp = post_messages(
        addr,
        json!({"model": "m", "max_tokens": 5, "messages": [{"role": "user", "content": [{"type": "hologram"}]}]}),
    )
    .await;

    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["type"], "invalid_request_error");
    assert!(mock.requests().is_empty());
}

#[tokio::test]
async fn test_body_is_parsed_before_credentials_are_checked() {
    let mock = MockUpstream::json(completion(json!({"content": "unused"}), "stop"));
    let addr = start(&mock, None).await;

    let resp = reqwest::Client::new()
        .post(format!("http://{addr}/v1/messages"))
        .header(header::CONTENT_TYPE, "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["type"], "invalid_request_error");
    assert!(mock.requests().is_empty());
}

#[tokio::test]
async fn test_unreachable_upstream_is_a_bad_gateway() {
    // Bind then drop a listener so the port is very likely closed.
    let closed = {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap()
    };

    let mut config = GatewayConfig::default();
    config.upstream.base_url = format!("http://{closed}");
    let state = Arc::new(AppState {
        config,
        client: reqwest::Client::new(),
        default_token: None,
    });
    let addr = serve(build_router(state)).await;

    let resp = post_messages(
        addr,
        json!({"model": "m", "max_tokens": 5, "messages": [{"role": "user", "content": "x"}]}),
    )
    .await;

    assert_eq!(resp.status(), 502);
}

// ────────────────────────────────────────────────────────────────
// Streaming
// ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_streaming_text() {
    let mock = MockUpstream::sse(&[
        delta_frame(json!({"role": "assistant", "content": "Hel"}), None),
        delta_frame(json!({"content": "lo"}), None),
        delta_frame(json!({}), Some("stop")),
    ]);
    let addr = start(&mock, None).await;

    let resp = post_messages(
        addr,
        json!({
            "model": "claude-x",
            "max_tokens": 10,
            "stream": true,
            "messages": [{"role": "user", "content": "hi"}]
        }),
    )
    .await;

    assert_eq!(resp.status(), 200);
    assert_eq!(resp.headers()[header::CONTENT_TYPE], "text/event-stream");
    assert_eq!(resp.headers()[header::CACHE_CONTROL], "no-cache");
    assert_eq!(resp.headers()[header::CONNECTION], "keep-alive");

    let events = parse_sse(&resp.text().await.unwrap());
    let names: Vec<&str> = events.iter().map(|(n, _)| n.as_str()).collect();
    assert_eq!(
        names,
        [
            "message_start",
            "content_block_start",
            "content_block_delta",
            "content_block_delta",
            "content_block_stop",
            "message_delta",
            "message_stop",
        ]
    );

    for (name, data) in &events {
        assert_eq!(data["type"], name.as_str());
    }
    assert_eq!(events[0].1["message"]["model"], "claude-x");
    assert_eq!(events[1].1["content_block"], json!({"type": "text", "text": ""}));
    assert_eq!(events[2].1["delta"], json!({"type": "text_delta", "text": "Hel"}));
    assert_eq!(events[3].1["delta"], json!({"type": "text_delta", "text": "lo"}));
    assert_eq!(events[5].1["delta"]["stop_reason"], "end_turn");

    let (_, sent) = &mock.requests()[0];
    assert_eq!(sent["stream"], true);
    assert_eq!(sent["stream_options"], json!({"include_usage": true}));
}

#[tokio::test]
async fn test_streaming_tool_calls() {
    let mock = MockUpstream::sse(&[
        delta_frame(json!({"content": "Let me check."}), None),
        delta_frame(
            json!({"tool_calls": [{"index": 2, "id": "call_a", "type": "function",
                                   "function": {"name": "lookup", "arguments": ""}}]}),
            None,
        ),
        delta_frame(
            json!({"tool_calls": [{"index": 2, "function": {"arguments": "{\"q\":"}}]}),
            None,
        ),
        delta_frame(
            json!({"tool_calls": [{"index": 2, "function": {"arguments": "\"x\"}"}}]}),
            None,
        ),
        delta_frame(json!({}), Some("tool_calls")),
        json!({"id": "chatcmpl-123", "choices": [],
               "usage": {"prompt_tokens": 20, "completion_tokens": 9, "total_tokens": 29}}),
    ]);
    let addr = start(&mock, None).await;

    let resp = post_messages(
        addr,
        json!({
            "model": "claude-x",
            "max_tokens": 100,
            "stream": true,
            "messages": [{"role": "user", "content": "look up x"}]
        }),
    )
    .await;
    assert_eq!(resp.status(), 200);

    let events = parse_sse(&resp.text().await.unwrap());
    let names: Vec<&str> = events.iter().map(|(n, _)| n.as_str()).collect();
    assert_eq!(
        names,
        [
            "message_start",
            "content_block_start",
            "content_block_delta",
            "content_block_stop",
            "content_block_start",
            "content_block_delta",
            "content_block_delta",
            "content_block_stop",
            "message_delta",
            "message_stop",
        ]
    );

    assert_eq!(events[4].1["index"], 1);
    assert_eq!(
        events[4].1["content_block"],
        json!({"type": "tool_use", "id": "call_a", "name": "lookup", "input": {}})
    );
    let args: String = events[5..7]
        .iter()
        .map(|(_, d)| d["delta"]["partial_json"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(args, "{\"q\":\"x\"}");

    assert_eq!(events[8].1["delta"]["stop_reason"], "tool_use");
    assert_eq!(events[8].1["usage"]["output_tokens"], 9);
}

#[tokio::test]
async fn test_streaming_malformed_frame_ends_with_error_event() {
    let body = format!(
        "data: {}\n\ndata: {{oops\n\n",
        delta_frame(json!({"content": "partial"}), None)
    );
    let mock = MockUpstream::new(StatusCode::OK, "text/event-stream", body);
    let addr = start(&mock, None).await;

    let resp = post_messages(
        addr,
        json!({
            "model": "claude-x",
            "max_tokens": 10,
            "stream": true,
            "messages": [{"role": "user", "content": "hi"}]
        }),
    )
    .await;
    assert_eq!(resp.status(), 200);

    let events = parse_sse(&resp.text().await.unwrap());
    let names: Vec<&str> = events.iter().map(|(n, _)| n.as_str()).collect();
    assert_eq!(
        names,
        [
            "message_start",
            "content_block_start",
            "content_block_delta",
            "content_block_stop",
            "message_delta",
            "error",
        ]
    );
    assert_eq!(events[5].1["error"]["type"], "api_error");
}

// ────────────────────────────────────────────────────────────────
// Static routes
// ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_static_pages_and_not_found() {
    let mock = MockUpstream::json(json!({}));
    let addr = start(&mock, None).await;
    let client = reqwest::Client::new();

    for (path, content_type) in [
        ("/", "text/html"),
        ("/terms", "text/html"),
        ("/privacy", "text/html"),
        ("/install.sh", "text/plain; charset=utf-8"),
    ] {
        let resp = client
            .get(format!("http://{addr}{path}"))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200, "{path}");
        assert_eq!(resp.headers()[header::CONTENT_TYPE], content_type, "{path}");
        assert!(!resp.text().await.unwrap().is_empty());
    }

    let resp = client
        .get(format!("http://{addr}/v1/models"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
    assert_eq!(resp.text().await.unwrap(), "Not Found");

    let resp = client
        .get(format!("http://{addr}/v1/messages"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);

    let resp = client
        .post(format!("http://{addr}/terms"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}
