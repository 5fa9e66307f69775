//! Text generation
//!
//! Prompt composition, upstream backends, credentials and the fallback
//! policy. Everything the phase engine sees is the [`TextGenerator`] trait,
//! whose single operation cannot fail.

pub mod backend;
pub mod credential;
pub mod direct;
pub mod prompt;
pub mod service;

use async_trait::async_trait;

pub use backend::{Backend, Probe, build_backend};
pub use credential::{Credential, CredentialSource, SessionCredential, StaticCredential};
pub use direct::DirectGenerator;
pub use prompt::{Guide, compose_prompt, fallback_text};
pub use service::{BackendHealth, Generation, GenerationService};

/// Produces retrospective text for a task.
///
/// Implementations absorb every failure and answer with fallback text, so
/// the returned string is never empty.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Generates text for `task`.
    async fn generate(&self, task: &str) -> String;
}
