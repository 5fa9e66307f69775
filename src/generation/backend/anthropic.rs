//! Anthropic Messages API backend.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::BackendKind;
use crate::error::BackendError;
use crate::generation::credential::CredentialSource;

use super::{Backend, non_empty, post_json, require_credential};

/// Anthropic API version header value.
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Output token limit per request.
const MAX_TOKENS: u32 = 2000;

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: [UserMessage<'a>; 1],
}

#[derive(Debug, Serialize)]
struct UserMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: Option<String>,
}

/// Claude via the Messages API.
pub struct AnthropicBackend {
    client: reqwest::Client,
    base_url: String,
    model: String,
    credential: Arc<dyn CredentialSource>,
    timeout: Duration,
}

impl AnthropicBackend {
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
            credential,
            timeout,
        }
    }
}

#[async_trait]
impl Backend for AnthropicBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Claude
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn credential_configured(&self) -> bool {
        self.credential.is_configured()
    }

    async fn complete(&self, prompt: &str) -> Result<String, BackendError> {
        let key = require_credential(self.credential.as_ref(), BackendKind::Claude).await?;
        let url = format!("{}/v1/messages", self.base_url);
        let body = MessagesRequest {
            model: &self.model,
            max_tokens: MAX_TOKENS,
            messages: [UserMessage {
                role: "user",
                content: prompt,
            }],
        };
        debug!(model = %self.model, "calling Anthropic Messages API");

        let result: Result<MessagesResponse, BackendError> = post_json(
            &self.client,
            &url,
            &[
                ("x-api-key", key.expose()),
                ("anthropic-version", ANTHROPIC_VERSION),
            ],
            &body,
            self.timeout,
        )
        .await;

        if matches!(result, Err(ref e) if matches!(e.status(), Some(401 | 403))) {
            self.credential.invalidate();
        }
        let response = result?;
        non_empty(
            response.content.into_iter().next().and_then(|b| b.text),
            "content[0].text",
        )
    }
}
