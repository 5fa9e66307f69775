//! CLI command dispatch and handlers
//!
//! Routes parsed CLI arguments to the appropriate command handler.

pub mod completions;
pub mod generate;
pub mod health;
pub mod run;
pub mod serve;
pub mod version;

use std::path::Path;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::cli::args::{BackendArgs, Cli, Commands, SourceArgs};
use crate::config::{AppConfig, ConfigLoader, GenerationMode, ProxyConfig};
use crate::error::RetroDriveError;
use crate::generation::{DirectGenerator, Guide, TextGenerator};
use crate::observability::EventEmitter;
use crate::proxy::ProxyClient;

/// Dispatch a parsed CLI invocation to the appropriate command handler.
///
/// # Errors
///
/// Returns an error if the dispatched command handler fails.
pub async fn dispatch(cli: Cli, cancel: CancellationToken) -> Result<(), RetroDriveError> {
    if let Some(port) = cli.metrics_port {
        crate::observability::init_metrics(Some(port))?;
        tracing::info!(port, "Prometheus metrics endpoint started");
    }

    match cli.command {
        Commands::Serve(ref args) => {
            let config = load_config(cli.config.as_deref())?;
            let events = open_events(cli.events_file.as_deref())?;
            serve::run(args, config, events, cancel).await
        }
        Commands::Run(ref args) => {
            let config = load_config(cli.config.as_deref())?;
            let events = open_events(cli.events_file.as_deref())?;
            run::run(args, config, events, cancel).await
        }
        Commands::Generate(ref args) => {
            let config = load_config(cli.config.as_deref())?;
            let events = open_events(cli.events_file.as_deref())?;
            generate::run(args, &config, events).await
        }
        Commands::Health(ref args) => {
            let config = load_config(cli.config.as_deref())?;
            health::run(args, &config).await
        }
        Commands::Completions(ref args) => {
            completions::run(args);
            Ok(())
        }
        Commands::Version(ref args) => {
            version::run(args);
            Ok(())
        }
    }
}

/// Loads the configuration file (defaults when none is given) and logs
/// its warnings.
fn load_config(path: Option<&Path>) -> Result<AppConfig, RetroDriveError> {
    if let Some(p) = path {
        tracing::info!(config = %p.display(), "loading configuration");
    }
    let result = ConfigLoader::new().load_optional(path)?;
    for warning in &result.warnings {
        tracing::warn!(
            location = warning.location.as_deref().unwrap_or("<unknown>"),
            "{}",
            warning.message
        );
    }
    Ok(result.config)
}

fn open_events(path: Option<&Path>) -> Result<Arc<EventEmitter>, RetroDriveError> {
    Ok(Arc::new(EventEmitter::from_optional_file(path)?))
}

/// Applies backend flags on top of the proxy section.
fn apply_backend_args(proxy: &mut ProxyConfig, args: &BackendArgs) {
    if let Some(backend) = args.backend {
        if backend != proxy.backend {
            // A model or URL chosen for another backend does not carry over
            proxy.model = None;
            proxy.base_url = None;
        }
        proxy.backend = backend;
    }
    if let Some(ref model) = args.model {
        proxy.model = Some(model.clone());
    }
    if let Some(ref url) = args.base_url {
        proxy.base_url = Some(url.clone());
    }
}

/// Builds the text source selected by `args` and the configuration.
fn build_generator(
    args: &SourceArgs,
    config: &AppConfig,
    events: Arc<EventEmitter>,
) -> Arc<dyn TextGenerator> {
    let mode = args.mode.unwrap_or(config.client.mode);
    let guide_path = args.guide.clone().or_else(|| config.client.guide_path.clone());

    match mode {
        GenerationMode::Proxy => {
            let url = args
                .proxy_url
                .clone()
                .unwrap_or_else(|| config.client.proxy_url.clone());
            tracing::info!(%url, "using generation proxy");
            let guide = guide_path.map(|p| Guide::load(&p).as_str().to_string());
            Arc::new(ProxyClient::new(&url, config.client.timeout).with_guide(guide))
        }
        GenerationMode::Direct => {
            let mut proxy = config.proxy.clone();
            apply_backend_args(&mut proxy, &args.backend);
            let guide = Guide::load(guide_path.as_deref().unwrap_or(&proxy.guide_path));
            Arc::new(DirectGenerator::new(&proxy, guide, events))
        }
    }
}
