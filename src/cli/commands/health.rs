//! `health` command handler.

use crate::cli::args::{HealthArgs, OutputFormat};
use crate::config::AppConfig;
use crate::error::RetroDriveError;
use crate::proxy::ProxyClient;

/// Queries a running proxy and prints its health.
///
/// # Errors
///
/// Returns a proxy error when the proxy is unreachable or answers with a
/// non-2xx status.
pub async fn run(args: &HealthArgs, config: &AppConfig) -> Result<(), RetroDriveError> {
    let url = args
        .proxy_url
        .clone()
        .unwrap_or_else(|| config.client.proxy_url.clone());
    let health = ProxyClient::new(&url, config.client.timeout).health().await?;

    match args.format {
        OutputFormat::Human => {
            println!("status:     {}", health.status);
            println!("backend:    {} ({})", health.backend, health.model);
            println!(
                "credential: {}",
                if health.credential_configured { "configured" } else { "missing" }
            );
        }
        OutputFormat::Json => println!("{}", serde_json::to_string(&health)?),
    }
    Ok(())
}
