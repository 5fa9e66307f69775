//! Local Ollama backend. Needs no credential.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::BackendKind;
use crate::error::BackendError;

use super::{Backend, Probe, non_empty, post_json, send_json};

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<ModelTag>,
}

#[derive(Debug, Deserialize)]
struct ModelTag {
    name: String,
}

/// Ollama via `/api/generate` (non-streaming).
pub struct OllamaBackend {
    client: reqwest::Client,
    base_url: String,
    model: String,
    timeout: Duration,
}

impl OllamaBackend {
    /// Creates the backend. `base_url` has no trailing slash.
    #[must_use]
    pub const fn new(client: reqwest::Client, base_url: String, model: String, timeout: Duration) -> Self {
        Self {
            client,
            base_url,
            model,
            timeout,
        }
    }
}

#[async_trait]
impl Backend for OllamaBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Ollama
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn credential_configured(&self) -> bool {
        true
    }

    async fn complete(&self, prompt: &str) -> Result<String, BackendError> {
        let url = format!("{}/api/generate", self.base_url);
        debug!(model = %self.model, "calling Ollama generate");
        let response: GenerateResponse = post_json(
            &self.client,
            &url,
            &[],
            &GenerateRequest {
                model: &self.model,
                prompt,
                stream: false,
            },
            self.timeout,
        )
        .await?;
        non_empty(response.response, "response")
    }

    /// Lists installed models instead of generating.
    async fn probe(&self, _prompt: &str) -> Result<Probe, BackendError> {
        let url = format!("{}/api/tags", self.base_url);
        let tags: TagsResponse = send_json(self.client.get(&url), self.timeout).await?;
        Ok(Probe::Models(tags.models.into_iter().map(|m| m.name).collect()))
    }
}
