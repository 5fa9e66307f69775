mod common;

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::http::StatusCode;
use serde_json::{Value, json};

use common::{MockUpstream, TestProxy, claude_reply, gemini_reply};
use retrodrive::config::BackendKind;
use retrodrive::proxy::ProxyClient;

async fn post_generate(proxy: &TestProxy, body: Value) -> (StatusCode, Value) {
    let resp = reqwest::Client::new()
        .post(format!("{}/generate", proxy.base_url))
        .json(&body)
        .send()
        .await
        .unwrap();
    let status = StatusCode::from_u16(resp.status().as_u16()).unwrap();
    (status, resp.json().await.unwrap())
}

async fn get_json(proxy: &TestProxy, path: &str) -> (StatusCode, Value) {
    let resp = reqwest::get(format!("{}{path}", proxy.base_url)).await.unwrap();
    let status = StatusCode::from_u16(resp.status().as_u16()).unwrap();
    (status, resp.json().await.unwrap())
}

// ============================================================================
// POST /generate
// ============================================================================

#[tokio::test]
async fn claude_success_is_passed_through() {
    let upstream = MockUpstream::fixed(StatusCode::OK, claude_reply("[느끼다]\n성장했다")).await;
    let proxy = TestProxy::start(BackendKind::Claude, &upstream.base_url, Some("sk-test")).await;

    let (status, body) = post_generate(&proxy, json!({ "task": "API 연동" })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["text"], "[느끼다]\n성장했다");
    assert_eq!(body["usedFallback"], false);

    let requests = upstream.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].headers["x-api-key"], "sk-test");
    assert_eq!(requests[0].headers["anthropic-version"], "2023-06-01");
    assert_eq!(requests[0].body["max_tokens"], 2000);
    let prompt = requests[0].body["messages"][0]["content"].as_str().unwrap();
    assert!(prompt.contains("오늘 한 일:\nAPI 연동"));
}

#[tokio::test]
async fn gemini_forbidden_answers_fallback_with_task() {
    let upstream = MockUpstream::fixed(
        StatusCode::FORBIDDEN,
        json!({ "error": { "status": "PERMISSION_DENIED" } }),
    )
    .await;
    let proxy = TestProxy::start(BackendKind::Gemini, &upstream.base_url, Some("bad-key")).await;

    let (status, body) = post_generate(&proxy, json!({ "task": "14.2.0 개발 및 디자인 수정" })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["usedFallback"], true);
    let text = body["text"].as_str().unwrap();
    assert!(text.contains("14.2.0 개발 및 디자인 수정"));
    assert!(text.contains("[느끼다]") && text.contains("[깨우다]") && text.contains("[바꾸다]"));

    // The key travels in a header, never in the URL
    let requests = upstream.requests();
    assert_eq!(requests[0].headers["x-goog-api-key"], "bad-key");
    assert!(!requests[0].path.contains("key="));
}

#[tokio::test]
async fn gemini_missing_model_retries_legacy_model() {
    let upstream = MockUpstream::start(Arc::new(|path: &str| {
        if path.contains("gemini-pro") {
            (StatusCode::OK, gemini_reply("[바꾸다] 다음에는 먼저 설계한다"))
        } else {
            (StatusCode::NOT_FOUND, json!({ "error": { "code": 404 } }))
        }
    }))
    .await;
    let proxy = TestProxy::start(BackendKind::Gemini, &upstream.base_url, Some("key")).await;

    let (_, body) = post_generate(&proxy, json!({ "task": "설계" })).await;
    assert_eq!(body["usedFallback"], false);
    assert_eq!(body["text"], "[바꾸다] 다음에는 먼저 설계한다");

    let paths: Vec<String> = upstream.requests().into_iter().map(|r| r.path).collect();
    assert_eq!(paths.len(), 2);
    assert!(paths[0].ends_with("gemini-1.5-flash-latest:generateContent"));
    assert!(paths[1].ends_with("gemini-pro:generateContent"));
}

#[tokio::test]
async fn upstream_server_error_answers_fallback_with_task() {
    let upstream = MockUpstream::fixed(
        StatusCode::INTERNAL_SERVER_ERROR,
        json!({ "error": { "type": "api_error" } }),
    )
    .await;
    let proxy = TestProxy::start(BackendKind::Claude, &upstream.base_url, Some("k")).await;

    let (status, body) = post_generate(&proxy, json!({ "task": "장애 대응" })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["usedFallback"], true);
    assert!(body["text"].as_str().unwrap().contains("장애 대응"));
    assert_eq!(upstream.requests().len(), 1);
}

#[tokio::test]
async fn slow_upstream_times_out_into_fallback() {
    let upstream = MockUpstream::start_with_latency(
        Arc::new(|_: &str| (StatusCode::OK, json!({ "response": "too late" }))),
        Duration::from_secs(10),
    )
    .await;
    let proxy = TestProxy::start_with_timeout(
        BackendKind::Ollama,
        &upstream.base_url,
        None,
        Duration::from_millis(300),
    )
    .await;

    let started = Instant::now();
    let (status, body) = post_generate(&proxy, json!({ "task": "성능 측정" })).await;
    assert!(
        started.elapsed() < Duration::from_secs(5),
        "fallback took {:?}",
        started.elapsed()
    );
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["usedFallback"], true);
    assert!(body["text"].as_str().unwrap().contains("성능 측정"));
}

#[tokio::test]
async fn client_times_out_on_a_stalled_proxy() {
    let stalled = MockUpstream::start_with_latency(
        Arc::new(|_: &str| {
            (
                StatusCode::OK,
                json!({ "success": true, "text": "too late", "usedFallback": false }),
            )
        }),
        Duration::from_secs(10),
    )
    .await;
    let client = ProxyClient::new(&stalled.base_url, Duration::from_millis(300));

    let generation = client.generate_detailed("회고 작성").await;
    assert!(generation.used_fallback);
    assert!(generation.text.contains("회고 작성"));
    assert_eq!(stalled.requests().len(), 1);
}

#[tokio::test]
async fn oversized_request_is_413_with_error_body() {
    let upstream = MockUpstream::fixed(StatusCode::OK, claude_reply("unused")).await;
    let proxy = TestProxy::start(BackendKind::Claude, &upstream.base_url, Some("k")).await;

    let task = "가".repeat(1024 * 1024);
    let (status, body) = post_generate(&proxy, json!({ "task": task })).await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(body["success"], false);
    assert!(body["error"].as_str().unwrap().contains("too large"));
    assert!(upstream.requests().is_empty());
}

#[tokio::test]
async fn missing_credential_falls_back_without_calling_upstream() {
    let upstream = MockUpstream::fixed(StatusCode::OK, claude_reply("unused")).await;
    let proxy = TestProxy::start(BackendKind::Claude, &upstream.base_url, None).await;

    let (status, body) = post_generate(&proxy, json!({ "task": "테스트 정리" })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["usedFallback"], true);
    assert!(upstream.requests().is_empty());
}

#[tokio::test]
async fn request_guide_replaces_server_guide() {
    let upstream = MockUpstream::fixed(StatusCode::OK, json!({ "response": "ok" })).await;
    let proxy = TestProxy::start(BackendKind::Ollama, &upstream.base_url, None).await;

    let (_, body) = post_generate(
        &proxy,
        json!({ "task": "배포", "guide": "Summarize: {{TASK}}" }),
    )
    .await;
    assert_eq!(body["text"], "ok");

    let requests = upstream.requests();
    assert_eq!(requests[0].body["prompt"], "Summarize: 배포");
    assert_eq!(requests[0].body["stream"], false);
}

#[tokio::test]
async fn missing_task_is_bad_request() {
    let upstream = MockUpstream::fixed(StatusCode::OK, claude_reply("unused")).await;
    let proxy = TestProxy::start(BackendKind::Claude, &upstream.base_url, Some("k")).await;

    let (status, body) = post_generate(&proxy, json!({ "guide": "g" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert!(body["error"].as_str().unwrap().contains("task"));
}

// ============================================================================
// GET /health and /test-backend
// ============================================================================

#[tokio::test]
async fn health_reports_missing_credential() {
    let upstream = MockUpstream::fixed(StatusCode::OK, gemini_reply("x")).await;
    let proxy = TestProxy::start(BackendKind::Gemini, &upstream.base_url, None).await;

    let (status, body) = get_json(&proxy, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["backend"], "gemini");
    assert_eq!(body["model"], "gemini-1.5-flash-latest");
    assert_eq!(body["credentialConfigured"], false);
}

#[tokio::test]
async fn ollama_probe_lists_models() {
    let upstream = MockUpstream::fixed(
        StatusCode::OK,
        json!({ "models": [{ "name": "llama3.2:latest" }, { "name": "qwen2.5:7b" }] }),
    )
    .await;
    let proxy = TestProxy::start(BackendKind::Ollama, &upstream.base_url, None).await;

    let (status, body) = get_json(&proxy, "/test-backend").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "connected");
    assert_eq!(body["models"], json!(["llama3.2:latest", "qwen2.5:7b"]));
}

#[tokio::test]
async fn failing_probe_is_service_unavailable() {
    let upstream = MockUpstream::fixed(StatusCode::UNAUTHORIZED, json!({})).await;
    let proxy = TestProxy::start(BackendKind::Claude, &upstream.base_url, Some("k")).await;

    let (status, body) = get_json(&proxy, "/test-backend").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["status"], "disconnected");
    assert!(body["error"].as_str().unwrap().contains("401"));
}
