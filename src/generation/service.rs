//! Generation with fallback.
//!
//! [`GenerationService`] is the boundary where upstream failures stop: it
//! composes the prompt, asks the backend, and answers with the fallback
//! text whenever the backend fails.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};

use crate::config::BackendKind;
use crate::error::BackendError;
use crate::observability::metrics;
use crate::observability::{Event, EventEmitter};

use super::TextGenerator;
use super::backend::{Backend, Probe};
use super::prompt::{Guide, compose_prompt, fallback_text};

/// Task used by connectivity probes.
pub const PROBE_TASK: &str = "테스트 작업";

/// Text produced for one request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Generation {
    /// Generated or fallback text; never empty
    pub text: String,
    /// Whether `text` is the fallback
    pub used_fallback: bool,
}

/// Backend identity reported by health checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendHealth {
    /// Configured backend
    pub backend: BackendKind,
    /// Model used for requests
    pub model: String,
    /// Whether a credential is available (always true for Ollama)
    pub credential_configured: bool,
}

/// Composes prompts, calls the backend and absorbs its failures.
pub struct GenerationService {
    backend: Arc<dyn Backend>,
    guide: Guide,
    events: Arc<EventEmitter>,
}

impl GenerationService {
    /// Creates a service with no event sink.
    #[must_use]
    pub fn new(backend: Arc<dyn Backend>, guide: Guide) -> Self {
        Self {
            backend,
            guide,
            events: Arc::new(EventEmitter::noop()),
        }
    }

    /// Emits a `GenerationServed` event per request.
    #[must_use]
    pub fn with_events(mut self, events: Arc<EventEmitter>) -> Self {
        self.events = events;
        self
    }

    /// Loaded guide.
    #[must_use]
    pub const fn guide(&self) -> &Guide {
        &self.guide
    }

    /// Generates text for `task` using `guide_override` when it is
    /// non-blank, the loaded guide otherwise. Never fails.
    pub async fn generate_with(&self, task: &str, guide_override: Option<&str>) -> Generation {
        let guide = guide_override
            .filter(|g| !g.trim().is_empty())
            .unwrap_or_else(|| self.guide.as_str());
        let prompt = compose_prompt(guide, task);
        let backend = self.backend.kind().as_str();

        let started = Instant::now();
        let result = self.backend.complete(&prompt).await;
        let elapsed = started.elapsed();

        let generation = match result {
            Ok(text) => {
                info!(backend, chars = text.chars().count(), elapsed_ms = elapsed.as_millis(), "generated text");
                metrics::record_generation(backend, "success", false, elapsed);
                Generation {
                    text,
                    used_fallback: false,
                }
            }
            Err(e) => {
                log_failure(backend, &e);
                metrics::record_generation(backend, e.label(), true, elapsed);
                Generation {
                    text: fallback_text(task),
                    used_fallback: true,
                }
            }
        };

        self.events.emit(Event::GenerationServed {
            timestamp: Utc::now(),
            backend: backend.to_string(),
            used_fallback: generation.used_fallback,
            duration_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
        });
        generation
    }

    /// Runs the backend's connectivity probe with the test task.
    ///
    /// # Errors
    ///
    /// Returns the backend failure; probes never fall back.
    pub async fn probe(&self) -> Result<Probe, BackendError> {
        let prompt = compose_prompt(self.guide.as_str(), PROBE_TASK);
        self.backend.probe(&prompt).await
    }

    /// Current backend identity and credential status.
    #[must_use]
    pub fn health(&self) -> BackendHealth {
        BackendHealth {
            backend: self.backend.kind(),
            model: self.backend.model().to_string(),
            credential_configured: self.backend.credential_configured(),
        }
    }
}

#[async_trait]
impl TextGenerator for GenerationService {
    async fn generate(&self, task: &str) -> String {
        self.generate_with(task, None).await.text
    }
}

fn log_failure(backend: &str, error: &BackendError) {
    match error {
        BackendError::MissingCredential { .. } => {
            warn!(backend, "no credential configured; using fallback text");
        }
        BackendError::HttpStatus { status, .. } => {
            warn!(backend, status, error = %error, "upstream rejected the request; using fallback text");
        }
        _ => warn!(backend, error = %error, "generation failed; using fallback text"),
    }
}
