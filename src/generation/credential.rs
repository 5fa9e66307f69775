//! Backend credentials.
//!
//! The proxy reads its credential once from configuration or the
//! environment ([`StaticCredential`]). Direct mode asks the operator the
//! first time a credential is needed and keeps the answer for the rest of
//! the session ([`SessionCredential`]).

use std::io::{BufRead, Write};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::config::BackendKind;

/// An API key. `Debug` never prints the value.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    /// Wraps a non-blank key; blank input yields `None`.
    #[must_use]
    pub fn new(value: &str) -> Option<Self> {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| Self(trimmed.to_string()))
    }

    /// The key, for use in an auth header.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Credential(<redacted>)")
    }
}

/// Supplies the credential a backend authenticates with.
#[async_trait]
pub trait CredentialSource: Send + Sync {
    /// Current credential, if one is available.
    async fn credential(&self) -> Option<Credential>;

    /// Forgets a credential the upstream rejected.
    fn invalidate(&self);

    /// Whether a credential is known right now (without prompting).
    fn is_configured(&self) -> bool;
}

// ============================================================================
// Static
// ============================================================================

/// Credential fixed at startup.
#[derive(Debug, Clone, Default)]
pub struct StaticCredential {
    value: Option<Credential>,
}

impl StaticCredential {
    /// A fixed credential (or none).
    #[must_use]
    pub fn new(value: Option<Credential>) -> Self {
        Self { value }
    }

    /// Resolves the credential for `kind`: the explicit override first,
    /// then the backend's environment variable.
    #[must_use]
    pub fn resolve(kind: BackendKind, explicit: Option<&str>) -> Self {
        let value = explicit.and_then(Credential::new).or_else(|| {
            kind.credential_env()
                .and_then(|var| std::env::var(var).ok())
                .and_then(|v| Credential::new(&v))
        });
        Self { value }
    }

    /// Consumes the source, returning the credential it holds.
    #[must_use]
    pub fn into_credential(self) -> Option<Credential> {
        self.value
    }
}

#[async_trait]
impl CredentialSource for StaticCredential {
    async fn credential(&self) -> Option<Credential> {
        self.value.clone()
    }

    fn invalidate(&self) {
        // A server-side key comes from configuration; rejecting it once does
        // not make a different key appear.
        warn!("upstream rejected the configured credential");
    }

    fn is_configured(&self) -> bool {
        self.value.is_some()
    }
}

// ============================================================================
// Session
// ============================================================================

/// Prompt callback: receives the backend name, returns the operator's answer.
pub type PromptFn = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

#[derive(Debug, Default)]
struct SessionSlot {
    cached: Option<Credential>,
    asked: bool,
}

/// Credential solicited from the operator once per session.
///
/// A declined prompt is remembered, so later requests fall back without
/// asking again. [`invalidate`](CredentialSource::invalidate) clears both
/// the cached key and the "asked" flag.
pub struct SessionCredential {
    backend: BackendKind,
    slot: Mutex<SessionSlot>,
    prompt: PromptFn,
}

impl SessionCredential {
    /// Prompts on standard input.
    #[must_use]
    pub fn stdin(backend: BackendKind) -> Self {
        Self::with_prompt(backend, Arc::new(prompt_stdin))
    }

    /// Uses a custom prompt.
    #[must_use]
    pub fn with_prompt(backend: BackendKind, prompt: PromptFn) -> Self {
        Self {
            backend,
            slot: Mutex::new(SessionSlot::default()),
            prompt,
        }
    }

    /// Starts with a known key (e.g. from the environment) but still
    /// prompts after an invalidation.
    #[must_use]
    pub fn seeded(self, value: Option<Credential>) -> Self {
        self.lock().cached = value;
        self
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SessionSlot> {
        self.slot
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl std::fmt::Debug for SessionCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let slot = self.lock();
        f.debug_struct("SessionCredential")
            .field("backend", &self.backend)
            .field("cached", &slot.cached.is_some())
            .field("asked", &slot.asked)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl CredentialSource for SessionCredential {
    async fn credential(&self) -> Option<Credential> {
        {
            let mut slot = self.lock();
            if slot.cached.is_some() || slot.asked {
                return slot.cached.clone();
            }
            slot.asked = true;
        }

        let prompt = Arc::clone(&self.prompt);
        let name = self.backend.as_str();
        let answer = tokio::task::spawn_blocking(move || prompt(name))
            .await
            .ok()
            .flatten()
            .and_then(|raw| Credential::new(&raw));

        if answer.is_none() {
            debug!(backend = name, "no credential provided; generation will use fallback text");
        }
        self.lock().cached.clone_from(&answer);
        answer
    }

    fn invalidate(&self) {
        let mut slot = self.lock();
        if slot.cached.take().is_some() {
            warn!(backend = self.backend.as_str(), "upstream rejected the credential; it will be requested again");
        }
        slot.asked = false;
    }

    fn is_configured(&self) -> bool {
        self.lock().cached.is_some()
    }
}

/// Reads one line from stdin after printing a prompt to stderr.
fn prompt_stdin(backend: &str) -> Option<String> {
    let mut stderr = std::io::stderr();
    let _ = write!(stderr, "Enter the {backend} API key (kept for this session only): ");
    let _ = stderr.flush();
    let mut line = String::new();
    std::io::stdin().lock().read_line(&mut line).ok()?;
    Some(line)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_prompt(answer: Option<&'static str>) -> (PromptFn, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let prompt: PromptFn = Arc::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            answer.map(String::from)
        });
        (prompt, calls)
    }

    #[test]
    fn blank_credential_is_rejected() {
        assert!(Credential::new("   ").is_none());
        assert_eq!(Credential::new(" k ").unwrap().expose(), "k");
    }

    #[test]
    fn debug_redacts_value() {
        let cred = Credential::new("secret-key").unwrap();
        assert!(!format!("{cred:?}").contains("secret"));
    }

    #[test]
    fn explicit_override_wins() {
        let source = StaticCredential::resolve(BackendKind::Claude, Some("from-config"));
        assert!(source.is_configured());
    }

    #[test]
    fn ollama_needs_no_credential() {
        let source = StaticCredential::resolve(BackendKind::Ollama, None);
        assert!(!source.is_configured());
    }

    #[tokio::test]
    async fn session_prompts_once_and_caches() {
        let (prompt, calls) = counting_prompt(Some("key-1\n"));
        let source = SessionCredential::with_prompt(BackendKind::Gemini, prompt);

        assert_eq!(source.credential().await.unwrap().expose(), "key-1");
        assert_eq!(source.credential().await.unwrap().expose(), "key-1");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(source.is_configured());
    }

    #[tokio::test]
    async fn declined_prompt_is_not_repeated() {
        let (prompt, calls) = counting_prompt(Some(""));
        let source = SessionCredential::with_prompt(BackendKind::Gemini, prompt);

        assert!(source.credential().await.is_none());
        assert!(source.credential().await.is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn invalidation_prompts_again() {
        let (prompt, calls) = counting_prompt(Some("key-2"));
        let source = SessionCredential::with_prompt(BackendKind::Gemini, prompt)
            .seeded(Credential::new("stale"));

        assert_eq!(source.credential().await.unwrap().expose(), "stale");
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        source.invalidate();
        assert!(!source.is_configured());
        assert_eq!(source.credential().await.unwrap().expose(), "key-2");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
