//! Axum router for the generation proxy.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::rejection::BytesRejection;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use tower_http::cors::CorsLayer;
use tracing::{debug, info};

use crate::generation::GenerationService;

use super::wire::{ErrorResponse, GenerateRequest, GenerateResponse, HealthResponse, ProbeResponse};

/// State shared by the handlers.
pub struct ProxyState {
    /// Generation with fallback
    pub service: GenerationService,
    /// Maximum accepted request body in bytes
    pub max_body_bytes: usize,
}

/// Builds the router: `POST /generate`, `GET /health`, `GET /test-backend`.
///
/// CORS is open to any origin.
pub fn build_router(state: Arc<ProxyState>) -> Router {
    let body_limit = DefaultBodyLimit::max(state.max_body_bytes);

    Router::new()
        .route("/generate", post(handle_generate))
        .route("/health", get(handle_health))
        .route("/test-backend", get(handle_test_backend))
        .layer(body_limit)
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn bad_request(message: impl Into<String>) -> Response {
    (StatusCode::BAD_REQUEST, Json(ErrorResponse::new(message))).into_response()
}

/// `POST /generate` handler.
///
/// Failures upstream still answer 200 with fallback text; only malformed
/// requests are rejected. Body rejections (including the size limit) keep
/// the `{success:false, error}` shape.
async fn handle_generate(
    State(state): State<Arc<ProxyState>>,
    body: Result<Bytes, BytesRejection>,
) -> Response {
    let body = match body {
        Ok(body) => body,
        Err(rejection) => {
            let status = rejection.status();
            debug!(%status, limit = state.max_body_bytes, "rejecting generate body");
            let message = if status == StatusCode::PAYLOAD_TOO_LARGE {
                format!("request too large (limit: {} bytes)", state.max_body_bytes)
            } else {
                rejection.body_text()
            };
            return (status, Json(ErrorResponse::new(message))).into_response();
        }
    };

    let request: GenerateRequest = match serde_json::from_slice(&body) {
        Ok(req) => req,
        Err(e) => {
            debug!(error = %e, "rejecting malformed generate request");
            return bad_request(format!("invalid JSON body: {e}"));
        }
    };

    let Some(task) = request.task.as_deref().map(str::trim).filter(|t| !t.is_empty()) else {
        return bad_request("task is required");
    };

    info!(chars = task.chars().count(), "generate request");
    let generation = state
        .service
        .generate_with(task, request.guide.as_deref())
        .await;

    Json(GenerateResponse {
        success: true,
        text: generation.text,
        used_fallback: generation.used_fallback,
    })
    .into_response()
}

/// `GET /health` handler.
async fn handle_health(State(state): State<Arc<ProxyState>>) -> Json<HealthResponse> {
    Json(state.service.health().into())
}

/// `GET /test-backend` handler. 503 when the backend is unreachable.
async fn handle_test_backend(State(state): State<Arc<ProxyState>>) -> Response {
    let backend = state.service.health().backend;
    match state.service.probe().await {
        Ok(probe) => Json(ProbeResponse::connected(backend.as_str(), probe)).into_response(),
        Err(e) => {
            info!(backend = backend.as_str(), error = %e, "backend probe failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ProbeResponse::disconnected(backend.as_str(), &e)),
            )
                .into_response()
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
