//! `serve` command handler.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::cli::args::ServeArgs;
use crate::config::{AppConfig, ProxyConfig};
use crate::error::RetroDriveError;
use crate::generation::{Guide, GenerationService, StaticCredential, build_backend};
use crate::observability::EventEmitter;
use crate::proxy::ProxyServer;

use super::apply_backend_args;

/// Runs the generation proxy until `cancel` fires.
///
/// # Errors
///
/// Returns a proxy error if the bind address is invalid or cannot be bound.
pub async fn run(
    args: &ServeArgs,
    config: AppConfig,
    events: Arc<EventEmitter>,
    cancel: CancellationToken,
) -> Result<(), RetroDriveError> {
    let proxy = resolve(args, config.proxy);

    let credential = StaticCredential::resolve(proxy.backend, proxy.api_key.as_deref());
    let backend = build_backend(&proxy, Arc::new(credential));
    let guide = Guide::load(&proxy.guide_path);
    let service = GenerationService::new(backend, guide).with_events(Arc::clone(&events));

    let (server, bound_addr) = ProxyServer::bind(&proxy, service, events, cancel).await?;
    tracing::info!(%bound_addr, backend = proxy.backend.as_str(), "listening for generation requests");
    server.wait().await;
    Ok(())
}

fn resolve(args: &ServeArgs, mut proxy: ProxyConfig) -> ProxyConfig {
    apply_backend_args(&mut proxy, &args.backend);
    if let Some(ref bind) = args.bind {
        proxy.bind.clone_from(bind);
    }
    if let Some(ref guide) = args.guide {
        proxy.guide_path.clone_from(guide);
    }
    if let Some(timeout) = args.timeout {
        proxy.timeout = timeout;
    }
    proxy
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::time::Duration;

    #[test]
    fn flags_override_file_values() {
        let args = ServeArgs {
            bind: Some(":4000".into()),
            guide: Some(PathBuf::from("team-guide.md")),
            timeout: Some(Duration::from_secs(5)),
            ..ServeArgs::default()
        };
        let proxy = resolve(&args, ProxyConfig::default());
        assert_eq!(proxy.bind, ":4000");
        assert_eq!(proxy.guide_path, PathBuf::from("team-guide.md"));
        assert_eq!(proxy.timeout, Duration::from_secs(5));
    }

    #[test]
    fn unset_flags_keep_file_values() {
        let file = ProxyConfig {
            bind: "0.0.0.0:3001".into(),
            ..ProxyConfig::default()
        };
        let proxy = resolve(&ServeArgs::default(), file.clone());
        assert_eq!(proxy, file);
    }
}
