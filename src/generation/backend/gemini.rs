//! Google Gemini `generateContent` backend.
//!
//! The key travels in the `x-goog-api-key` header, never in the URL. A 404
//! for the primary model is retried once with the legacy model; a 400 or
//! 403 invalidates the credential so a session source asks again.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::BackendKind;
use crate::error::BackendError;
use crate::generation::credential::{Credential, CredentialSource};

use super::{Backend, non_empty, post_json, require_credential};

/// Model retried when the primary model is not found.
pub const DEFAULT_LEGACY_MODEL: &str = "gemini-pro";

const TEMPERATURE: f32 = 0.7;
const MAX_OUTPUT_TOKENS: u32 = 2000;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: [Content<'a>; 1],
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    parts: [Part<'a>; 1],
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

impl GenerateContentResponse {
    fn into_text(self) -> Option<String> {
        self.candidates
            .into_iter()
            .next()?
            .content?
            .parts
            .into_iter()
            .next()?
            .text
    }
}

/// Gemini via `v1beta/models/{model}:generateContent`.
pub struct GeminiBackend {
    client: reqwest::Client,
    base_url: String,
    model: String,
    legacy_model: String,
    credential: Arc<dyn CredentialSource>,
    timeout: Duration,
}

impl GeminiBackend {
    /// Creates the backend. `base_url` has no trailing slash.
    #[must_use]
    pub fn new(
        client: reqwest::Client,
        base_url: String,
        model: String,
        credential: Arc<dyn CredentialSource>,
        timeout: Duration,
    ) -> Self {
        Self {
            client,
            base_url,
            model,
            legacy_model: DEFAULT_LEGACY_MODEL.to_string(),
            credential,
            timeout,
        }
    }

    /// Overrides the legacy model (`None` keeps the default).
    #[must_use]
    pub fn with_legacy_model(mut self, legacy: Option<String>) -> Self {
        if let Some(model) = legacy {
            self.legacy_model = model;
        }
        self
    }

    async fn call(&self, model: &str, key: &Credential, prompt: &str) -> Result<String, BackendError> {
        let url = format!("{}/v1beta/models/{model}:generateContent", self.base_url);
        let body = GenerateContentRequest {
            contents: [Content {
                parts: [Part { text: prompt }],
            }],
            generation_config: GenerationConfig {
                temperature: TEMPERATURE,
                max_output_tokens: MAX_OUTPUT_TOKENS,
            },
        };
        debug!(model, "calling Gemini generateContent");
        let response: GenerateContentResponse = post_json(
            &self.client,
            &url,
            &[("x-goog-api-key", key.expose())],
            &body,
            self.timeout,
        )
        .await?;
        non_empty(response.into_text(), "candidates[0].content.parts[0].text")
    }
}

#[async_trait]
impl Backend for GeminiBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Gemini
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn credential_configured(&self) -> bool {
        self.credential.is_configured()
    }

    async fn complete(&self, prompt: &str) -> Result<String, BackendError> {
        let key = require_credential(self.credential.as_ref(), BackendKind::Gemini).await?;

        let mut result = self.call(&self.model, &key, prompt).await;
        if matches!(result, Err(ref e) if e.status() == Some(404)) && self.legacy_model != self.model {
            warn!(model = %self.model, legacy = %self.legacy_model, "model not found; retrying with legacy model");
            result = self.call(&self.legacy_model, &key, prompt).await;
        }
        if matches!(result, Err(ref e) if matches!(e.status(), Some(400 | 403))) {
            self.credential.invalidate();
        }
        result
    }
}
