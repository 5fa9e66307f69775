//! Shared integration-test harness: a scripted upstream LLM server, an
//! in-process generation proxy, and helpers for running the binary.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::process::Output;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::Router;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use retrodrive::config::{BackendKind, ProxyConfig};
use retrodrive::generation::{Credential, Guide, GenerationService, StaticCredential, build_backend};
use retrodrive::observability::EventEmitter;
use retrodrive::proxy::ProxyServer;

/// A request the mock upstream received.
#[derive(Debug, Clone)]
pub struct Recorded {
    pub path: String,
    pub headers: HeaderMap,
    pub body: Value,
}

/// Decides the mock upstream's answer for a request path.
pub type Responder = Arc<dyn Fn(&str) -> (StatusCode, Value) + Send + Sync>;

#[derive(Clone)]
struct UpstreamState {
    responder: Responder,
    latency: Duration,
    requests: Arc<Mutex<Vec<Recorded>>>,
}

/// Scripted upstream serving the Anthropic, Gemini and Ollama routes (and a
/// stand-in proxy `/generate`) on an ephemeral port.
pub struct MockUpstream {
    pub base_url: String,
    requests: Arc<Mutex<Vec<Recorded>>>,
    cancel: CancellationToken,
}

impl MockUpstream {
    /// Starts an upstream answering every request with `responder(path)`.
    pub async fn start(responder: Responder) -> Self {
        Self::start_with_latency(responder, Duration::ZERO).await
    }

    /// Like [`MockUpstream::start`], but every answer is held back for
    /// `latency`.
    pub async fn start_with_latency(responder: Responder, latency: Duration) -> Self {
        let requests = Arc::new(Mutex::new(Vec::new()));
        let state = UpstreamState {
            responder,
            latency,
            requests: Arc::clone(&requests),
        };
        let router = Router::new()
            .route("/v1/messages", post(handle_post))
            .route("/v1beta/models/{*rest}", post(handle_post))
            .route("/api/generate", post(handle_post))
            .route("/generate", post(handle_post))
            .route("/api/tags", get(handle_get))
            .with_state(state);

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async move { token.cancelled().await })
                .await
                .ok();
        });

        Self {
            base_url: format!("http://{addr}"),
            requests,
            cancel,
        }
    }

    /// Answers every request with the same status and body.
    pub async fn fixed(status: StatusCode, body: Value) -> Self {
        Self::start(Arc::new(move |_: &str| (status, body.clone()))).await
    }

    /// Requests received so far.
    pub fn requests(&self) -> Vec<Recorded> {
        self.requests.lock().unwrap().clone()
    }
}

impl Drop for MockUpstream {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn handle_post(
    State(state): State<UpstreamState>,
    uri: Uri,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> Response {
    let path = uri.path().to_string();
    let body = serde_json::from_slice(&body).unwrap_or(Value::Null);
    state.requests.lock().unwrap().push(Recorded {
        path: path.clone(),
        headers,
        body,
    });
    if !state.latency.is_zero() {
        tokio::time::sleep(state.latency).await;
    }
    let (status, reply) = (state.responder)(&path);
    (status, axum::Json(reply)).into_response()
}

async fn handle_get(State(state): State<UpstreamState>, uri: Uri, headers: HeaderMap) -> Response {
    let path = uri.path().to_string();
    state.requests.lock().unwrap().push(Recorded {
        path: path.clone(),
        headers,
        body: Value::Null,
    });
    let (status, reply) = (state.responder)(&path);
    (status, axum::Json(reply)).into_response()
}

/// Anthropic Messages API success body.
pub fn claude_reply(text: &str) -> Value {
    json!({ "content": [{ "type": "text", "text": text }] })
}

/// Gemini `generateContent` success body.
pub fn gemini_reply(text: &str) -> Value {
    json!({ "candidates": [{ "content": { "parts": [{ "text": text }] } }] })
}

/// A generation proxy running in this process.
pub struct TestProxy {
    pub base_url: String,
    pub addr: SocketAddr,
    server: ProxyServer,
}

impl TestProxy {
    /// Starts a proxy for `backend` pointed at `upstream_url`.
    pub async fn start(backend: BackendKind, upstream_url: &str, api_key: Option<&str>) -> Self {
        Self::start_with_timeout(backend, upstream_url, api_key, Duration::from_secs(5)).await
    }

    /// Starts a proxy whose upstream calls give up after `timeout`.
    pub async fn start_with_timeout(
        backend: BackendKind,
        upstream_url: &str,
        api_key: Option<&str>,
        timeout: Duration,
    ) -> Self {
        let config = ProxyConfig {
            bind: "127.0.0.1:0".to_string(),
            backend,
            base_url: Some(upstream_url.to_string()),
            api_key: api_key.map(String::from),
            timeout,
            ..ProxyConfig::default()
        };
        // Never read the developer's real key from the environment
        let credential = StaticCredential::new(api_key.and_then(Credential::new));
        let backend = build_backend(&config, Arc::new(credential));
        let service = GenerationService::new(backend, Guide::builtin());
        let (server, addr) = ProxyServer::bind(
            &config,
            service,
            Arc::new(EventEmitter::noop()),
            CancellationToken::new(),
        )
        .await
        .unwrap();
        Self {
            base_url: format!("http://{addr}"),
            addr,
            server,
        }
    }
}

impl Drop for TestProxy {
    fn drop(&mut self) {
        self.server.shutdown();
    }
}

/// Runs the binary with `args` and waits for it to exit.
pub fn run_retrodrive(args: &[&str]) -> Output {
    std::process::Command::new(env!("CARGO_BIN_EXE_retrodrive"))
        .args(args)
        .env_remove("RETRODRIVE_CONFIG")
        .env_remove("RETRODRIVE_TASK")
        .env_remove("RETRODRIVE_PROXY_URL")
        .stdin(std::process::Stdio::null())
        .output()
        .expect("failed to run retrodrive")
}
