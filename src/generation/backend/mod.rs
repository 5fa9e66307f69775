//! Upstream text-generation backends.
//!
//! One [`Backend`] implementation per provider, chosen by
//! [`BackendKind`] through [`build_backend`]. Backends report failures as
//! [`BackendError`]; turning those into fallback text is the service's job.

pub mod anthropic;
pub mod gemini;
pub mod ollama;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::config::{BackendKind, ProxyConfig};
use crate::error::BackendError;

use super::credential::{Credential, CredentialSource};

pub use anthropic::AnthropicBackend;
pub use gemini::GeminiBackend;
pub use ollama::OllamaBackend;

/// Characters of a sample shown by connectivity probes.
const PROBE_SAMPLE_CHARS: usize = 100;

/// Characters of an error body kept in [`BackendError::HttpStatus`].
const ERROR_BODY_CHARS: usize = 512;

/// Result of a connectivity probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Probe {
    /// A short generation succeeded; holds the beginning of the text
    Sample(String),
    /// The backend listed its installed models
    Models(Vec<String>),
}

/// A text-generation provider.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Which provider this is.
    fn kind(&self) -> BackendKind;

    /// Model used for requests.
    fn model(&self) -> &str;

    /// Whether the backend has (or needs no) credential.
    fn credential_configured(&self) -> bool;

    /// Generates text for a fully composed prompt.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError`] for a missing credential, network failure,
    /// timeout, non-2xx status, or a response without text.
    async fn complete(&self, prompt: &str) -> Result<String, BackendError>;

    /// Checks connectivity. Defaults to a short generation.
    ///
    /// # Errors
    ///
    /// Same as [`complete`](Self::complete).
    async fn probe(&self, prompt: &str) -> Result<Probe, BackendError> {
        let text = self.complete(prompt).await?;
        let mut sample: String = text.chars().take(PROBE_SAMPLE_CHARS).collect();
        sample.push_str("...");
        Ok(Probe::Sample(sample))
    }
}

/// Builds the backend selected in `config`.
#[must_use]
pub fn build_backend(
    config: &ProxyConfig,
    credential: Arc<dyn CredentialSource>,
) -> Arc<dyn Backend> {
    let client = create_http_client();
    let model = config
        .model
        .clone()
        .unwrap_or_else(|| config.backend.default_model().to_string());
    let base_url = config
        .base_url
        .clone()
        .unwrap_or_else(|| config.backend.default_base_url().to_string());
    let base_url = base_url.trim_end_matches('/').to_string();

    match config.backend {
        BackendKind::Claude => Arc::new(AnthropicBackend::new(
            client,
            base_url,
            model,
            credential,
            config.timeout,
        )),
        BackendKind::Gemini => Arc::new(
            GeminiBackend::new(client, base_url, model, credential, config.timeout)
                .with_legacy_model(config.legacy_model.clone()),
        ),
        BackendKind::Ollama => Arc::new(OllamaBackend::new(client, base_url, model, config.timeout)),
    }
}

/// Creates the HTTP client shared by a backend's requests.
#[must_use]
pub fn create_http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .user_agent(concat!("retrodrive/", env!("CARGO_PKG_VERSION")))
        .build()
        .unwrap_or_default()
}

/// Fetches the credential or reports it missing.
pub(crate) async fn require_credential(
    source: &dyn CredentialSource,
    backend: BackendKind,
) -> Result<Credential, BackendError> {
    source
        .credential()
        .await
        .ok_or(BackendError::MissingCredential {
            backend: backend.as_str(),
        })
}

/// Sends a request with a timeout and decodes a JSON response.
pub(crate) async fn send_json<T: DeserializeOwned>(
    request: reqwest::RequestBuilder,
    timeout: Duration,
) -> Result<T, BackendError> {
    let response = tokio::time::timeout(timeout, request.send())
        .await
        .map_err(|_| BackendError::Timeout(timeout))?
        .map_err(|e| BackendError::Network(e.to_string()))?;

    let status = response.status();
    let bytes = tokio::time::timeout(timeout, response.bytes())
        .await
        .map_err(|_| BackendError::Timeout(timeout))?
        .map_err(|e| BackendError::Network(e.to_string()))?;

    if !status.is_success() {
        let body: String = String::from_utf8_lossy(&bytes)
            .chars()
            .take(ERROR_BODY_CHARS)
            .collect();
        debug!(status = status.as_u16(), "upstream returned an error status");
        return Err(BackendError::HttpStatus {
            status: status.as_u16(),
            body,
        });
    }

    serde_json::from_slice(&bytes).map_err(|e| BackendError::Malformed(e.to_string()))
}

/// POSTs `body` as JSON.
pub(crate) async fn post_json<B: Serialize + Sync, T: DeserializeOwned>(
    client: &reqwest::Client,
    url: &str,
    headers: &[(&str, &str)],
    body: &B,
    timeout: Duration,
) -> Result<T, BackendError> {
    let mut request = client.post(url).json(body);
    for (name, value) in headers {
        request = request.header(*name, *value);
    }
    send_json(request, timeout).await
}

/// Rejects blank generations.
pub(crate) fn non_empty(text: Option<String>, what: &str) -> Result<String, BackendError> {
    match text {
        Some(t) if !t.trim().is_empty() => Ok(t),
        _ => Err(BackendError::Malformed(format!("response has no {what}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::credential::StaticCredential;

    #[test]
    fn builds_configured_backend() {
        let config = ProxyConfig {
            backend: BackendKind::Gemini,
            model: Some("gemini-custom".into()),
            base_url: Some("http://127.0.0.1:9/".into()),
            ..ProxyConfig::default()
        };
        let backend = build_backend(&config, Arc::new(StaticCredential::default()));
        assert_eq!(backend.kind(), BackendKind::Gemini);
        assert_eq!(backend.model(), "gemini-custom");
        assert!(!backend.credential_configured());
    }

    #[test]
    fn ollama_default_model() {
        let config = ProxyConfig {
            backend: BackendKind::Ollama,
            ..ProxyConfig::default()
        };
        let backend = build_backend(&config, Arc::new(StaticCredential::default()));
        assert_eq!(backend.model(), "llama3.2");
        assert!(backend.credential_configured());
    }

    #[test]
    fn blank_text_is_malformed() {
        assert!(matches!(
            non_empty(Some("  ".into()), "text"),
            Err(BackendError::Malformed(_))
        ));
        assert!(non_empty(None, "text").is_err());
        assert_eq!(non_empty(Some("ok".into()), "text").unwrap(), "ok");
    }
}
