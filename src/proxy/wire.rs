//! JSON bodies exchanged with the generation proxy.
//!
//! Field names are camelCase on the wire; the browser client and
//! [`ProxyClient`](super::ProxyClient) both rely on these shapes.

use serde::{Deserialize, Serialize};

use crate::generation::{BackendHealth, Probe};

/// `POST /generate` body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerateRequest {
    /// Work summary the text is written about
    #[serde(default)]
    pub task: Option<String>,
    /// Guide replacing the server's guide for this request
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guide: Option<String>,
}

/// `POST /generate` success body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateResponse {
    /// Always `true`
    pub success: bool,
    /// Generated or fallback text
    pub text: String,
    /// Whether `text` is the fallback
    #[serde(default)]
    pub used_fallback: bool,
}

/// Body of every 4xx answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Always `false`
    pub success: bool,
    /// What was wrong with the request
    pub error: String,
}

impl ErrorResponse {
    /// Builds a failure body.
    #[must_use]
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: error.into(),
        }
    }
}

/// `GET /health` body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    /// Always `"ok"` while the server answers
    pub status: String,
    /// Configured backend name
    pub backend: String,
    /// Model used for requests
    pub model: String,
    /// Whether the backend has a credential
    pub credential_configured: bool,
}

impl From<BackendHealth> for HealthResponse {
    fn from(health: BackendHealth) -> Self {
        Self {
            status: "ok".to_string(),
            backend: health.backend.as_str().to_string(),
            model: health.model,
            credential_configured: health.credential_configured,
        }
    }
}

/// Connectivity as reported by `GET /test-backend`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeStatus {
    /// The backend answered
    Connected,
    /// The backend failed
    Disconnected,
}

/// `GET /test-backend` body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeResponse {
    /// Outcome
    pub status: ProbeStatus,
    /// Backend that was probed
    pub backend: String,
    /// Human-readable summary
    pub message: String,
    /// Beginning of a sample generation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample: Option<String>,
    /// Installed models (Ollama)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub models: Option<Vec<String>>,
    /// Failure description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ProbeResponse {
    /// Successful probe.
    #[must_use]
    pub fn connected(backend: &str, probe: Probe) -> Self {
        let (message, sample, models) = match probe {
            Probe::Sample(sample) => (format!("{backend} answered a test generation"), Some(sample), None),
            Probe::Models(models) => (
                format!("{backend} is reachable with {} model(s) installed", models.len()),
                None,
                Some(models),
            ),
        };
        Self {
            status: ProbeStatus::Connected,
            backend: backend.to_string(),
            message,
            sample,
            models,
            error: None,
        }
    }

    /// Failed probe.
    #[must_use]
    pub fn disconnected(backend: &str, error: &impl std::fmt::Display) -> Self {
        Self {
            status: ProbeStatus::Disconnected,
            backend: backend.to_string(),
            message: format!("{backend} could not be reached"),
            sample: None,
            models: None,
            error: Some(error.to_string()),
        }
    }
}
