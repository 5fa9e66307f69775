//! HTTP client for a running generation proxy.

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::error::ProxyError;
use crate::generation::backend::create_http_client;
use crate::generation::{Generation, TextGenerator, fallback_text};

use super::wire::{GenerateRequest, GenerateResponse, HealthResponse};

/// Talks to a generation proxy. As a [`TextGenerator`] it never fails: an
/// unreachable proxy or an unexpected answer yields the fallback text.
#[derive(Debug, Clone)]
pub struct ProxyClient {
    client: reqwest::Client,
    base_url: String,
    guide: Option<String>,
    timeout: Duration,
}

impl ProxyClient {
    /// Creates a client for the proxy at `base_url`.
    #[must_use]
    pub fn new(base_url: &str, timeout: Duration) -> Self {
        Self {
            client: create_http_client(),
            base_url: base_url.trim_end_matches('/').to_string(),
            guide: None,
            timeout,
        }
    }

    /// Sends `guide` with every request instead of relying on the proxy's.
    #[must_use]
    pub fn with_guide(mut self, guide: Option<String>) -> Self {
        self.guide = guide;
        self
    }

    /// Proxy base URL.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Requests text for `task`, falling back locally on any failure.
    pub async fn generate_detailed(&self, task: &str) -> Generation {
        match self.request(task).await {
            Ok(response) if response.success && !response.text.trim().is_empty() => Generation {
                text: response.text,
                used_fallback: response.used_fallback,
            },
            Ok(_) => {
                warn!(url = %self.base_url, "proxy answered without text; using fallback text");
                Generation {
                    text: fallback_text(task),
                    used_fallback: true,
                }
            }
            Err(e) => {
                warn!(url = %self.base_url, error = %e, "proxy request failed; using fallback text");
                Generation {
                    text: fallback_text(task),
                    used_fallback: true,
                }
            }
        }
    }

    async fn request(&self, task: &str) -> Result<GenerateResponse, ProxyError> {
        let url = format!("{}/generate", self.base_url);
        let body = GenerateRequest {
            task: Some(task.to_string()),
            guide: self.guide.clone(),
        };
        debug!(%url, "requesting generation from proxy");
        self.send(self.client.post(&url).json(&body)).await
    }

    /// Queries `GET /health`.
    ///
    /// # Errors
    ///
    /// Returns [`ProxyError::Unreachable`] when the proxy cannot be reached
    /// or answers with an unexpected body, and [`ProxyError::Status`] for a
    /// non-2xx status.
    pub async fn health(&self) -> Result<HealthResponse, ProxyError> {
        let url = format!("{}/health", self.base_url);
        self.send(self.client.get(&url)).await
    }

    async fn send<T: serde::de::DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<T, ProxyError> {
        let unreachable = |message: String| ProxyError::Unreachable {
            url: self.base_url.clone(),
            message,
        };

        let response = tokio::time::timeout(self.timeout, request.send())
            .await
            .map_err(|_| unreachable(format!("timed out after {:?}", self.timeout)))?
            .map_err(|e| unreachable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProxyError::Status(status.as_u16()));
        }

        let bytes = tokio::time::timeout(self.timeout, response.bytes())
            .await
            .map_err(|_| unreachable(format!("timed out after {:?}", self.timeout)))?
            .map_err(|e| unreachable(e.to_string()))?;
        serde_json::from_slice(&bytes).map_err(|e| unreachable(format!("unexpected body: {e}")))
    }
}

#[async_trait]
impl TextGenerator for ProxyClient {
    async fn generate(&self, task: &str) -> String {
        self.generate_detailed(task).await.text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trailing_slash_is_trimmed() {
        let client = ProxyClient::new("http://localhost:3000/", Duration::from_secs(1));
        assert_eq!(client.base_url(), "http://localhost:3000");
    }

    #[tokio::test]
    async fn unreachable_proxy_falls_back() {
        let client = ProxyClient::new("http://127.0.0.1:9", Duration::from_secs(2));
        let generation = client.generate_detailed("회의록 정리").await;
        assert!(generation.used_fallback);
        assert!(generation.text.contains("회의록 정리"));

        assert!(matches!(
            client.health().await,
            Err(ProxyError::Unreachable { .. })
        ));
    }
}
