//! Generation proxy
//!
//! An HTTP server that keeps the backend credential on the server side and
//! answers every well-formed generation request with text, falling back to
//! the template when the backend fails. [`ProxyClient`] is the engine-side
//! counterpart.

pub mod client;
pub mod routes;
pub mod wire;

use std::net::SocketAddr;
use std::sync::Arc;

use chrono::Utc;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::config::ProxyConfig;
use crate::error::ProxyError;
use crate::generation::GenerationService;
use crate::observability::{Event, EventEmitter};

pub use client::ProxyClient;
pub use routes::{ProxyState, build_router};

/// A bound, running proxy server.
pub struct ProxyServer {
    handle: JoinHandle<()>,
    cancel: CancellationToken,
}

impl ProxyServer {
    /// Binds the listener and starts serving in the background.
    ///
    /// Returns the server and the actual bound address (useful when
    /// binding to port 0).
    ///
    /// # Errors
    ///
    /// Returns [`ProxyError::InvalidAddress`] for an unparsable bind
    /// address and [`ProxyError::Bind`] when the listener cannot bind.
    pub async fn bind(
        config: &ProxyConfig,
        service: GenerationService,
        events: Arc<EventEmitter>,
        cancel: CancellationToken,
    ) -> Result<(Self, SocketAddr), ProxyError> {
        let addr = parse_bind_addr(&config.bind)?;
        let listener = TcpListener::bind(&addr).await.map_err(|e| ProxyError::Bind {
            addr: addr.clone(),
            message: e.to_string(),
        })?;
        let bound_addr = listener.local_addr().map_err(|e| ProxyError::Bind {
            addr,
            message: e.to_string(),
        })?;

        let health = service.health();
        if health.credential_configured {
            info!(backend = health.backend.as_str(), model = %health.model, "backend credential configured");
        } else {
            error!(
                backend = health.backend.as_str(),
                env = health.backend.credential_env().unwrap_or("-"),
                "backend credential is not set; every request will receive fallback text"
            );
        }

        let router = build_router(Arc::new(ProxyState {
            service,
            max_body_bytes: config.max_body_bytes,
        }));

        events.emit(Event::ProxyStarted {
            timestamp: Utc::now(),
            bind_addr: bound_addr.to_string(),
            backend: health.backend.as_str().to_string(),
        });

        let server_cancel = cancel.clone();
        let handle = tokio::spawn(async move {
            info!(%bound_addr, "generation proxy started");
            let result = axum::serve(listener, router)
                .with_graceful_shutdown(async move {
                    server_cancel.cancelled().await;
                })
                .await;
            let reason = match result {
                Ok(()) => "shutdown".to_string(),
                Err(e) => {
                    error!(error = %e, "generation proxy failed");
                    e.to_string()
                }
            };
            events.emit(Event::ProxyStopped {
                timestamp: Utc::now(),
                reason,
            });
            debug!("generation proxy shut down");
        });

        Ok((Self { handle, cancel }, bound_addr))
    }

    /// Requests a graceful shutdown.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Waits until the server has stopped.
    pub async fn wait(self) {
        let _ = self.handle.await;
    }
}

impl std::fmt::Debug for ProxyServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyServer")
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

/// Normalizes a bind address: `":3000"` and `"3000"` bind all interfaces.
///
/// # Errors
///
/// Returns [`ProxyError::InvalidAddress`] if the result is not a socket
/// address.
pub fn parse_bind_addr(input: &str) -> Result<String, ProxyError> {
    let addr = if input.starts_with(':') {
        format!("0.0.0.0{input}")
    } else if input.parse::<u16>().is_ok() {
        format!("0.0.0.0:{input}")
    } else {
        input.to_string()
    };
    addr.parse::<SocketAddr>()
        .map_err(|_| ProxyError::InvalidAddress(input.to_string()))?;
    Ok(addr)
}
