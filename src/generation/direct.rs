//! In-process generation without a proxy.
//!
//! The backend is called directly from the engine's process. Its credential
//! comes from the environment when set; otherwise the operator is asked on
//! stdin the first time text is needed.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::config::ProxyConfig;
use crate::observability::EventEmitter;

use super::TextGenerator;
use super::backend::build_backend;
use super::credential::{CredentialSource, SessionCredential, StaticCredential};
use super::prompt::Guide;
use super::service::GenerationService;

/// [`TextGenerator`] that owns its backend.
pub struct DirectGenerator {
    service: GenerationService,
}

impl DirectGenerator {
    /// Builds the backend from `config` with a session credential that
    /// prompts on stdin.
    #[must_use]
    pub fn new(config: &ProxyConfig, guide: Guide, events: Arc<EventEmitter>) -> Self {
        let known = StaticCredential::resolve(config.backend, config.api_key.as_deref());
        let credential: Arc<dyn CredentialSource> = if config.backend.credential_env().is_some() {
            Arc::new(SessionCredential::stdin(config.backend).seeded(known.into_credential()))
        } else {
            Arc::new(known)
        };
        Self::with_credential(config, guide, events, credential)
    }

    /// Builds the backend with an explicit credential source.
    #[must_use]
    pub fn with_credential(
        config: &ProxyConfig,
        guide: Guide,
        events: Arc<EventEmitter>,
        credential: Arc<dyn CredentialSource>,
    ) -> Self {
        let backend = build_backend(config, credential);
        info!(backend = backend.kind().as_str(), model = backend.model(), "direct generation enabled");
        Self {
            service: GenerationService::new(backend, guide).with_events(events),
        }
    }

    /// Underlying service.
    #[must_use]
    pub const fn service(&self) -> &GenerationService {
        &self.service
    }
}

#[async_trait]
impl TextGenerator for DirectGenerator {
    async fn generate(&self, task: &str) -> String {
        self.service.generate(task).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BackendKind;
    use crate::generation::credential::PromptFn;

    #[tokio::test]
    async fn declined_prompt_yields_fallback() {
        let config = ProxyConfig {
            backend: BackendKind::Claude,
            base_url: Some("http://127.0.0.1:9".into()),
            ..ProxyConfig::default()
        };
        let prompt: PromptFn = Arc::new(|_| None);
        let generator = DirectGenerator::with_credential(
            &config,
            Guide::builtin(),
            Arc::new(EventEmitter::noop()),
            Arc::new(SessionCredential::with_prompt(BackendKind::Claude, prompt)),
        );

        let text = generator.generate("문서 정리").await;
        assert!(text.contains("문서 정리"));
        assert!(!generator.service().health().credential_configured);
    }
}
