//! Listener setup and shutdown

use anyhow::{Context, Result};
use axum::Router;
use axum_server::{Handle, tls_rustls::RustlsConfig};
use common::{
    config::{optional, parse_or},
    error::{ConfigError, ConfigResult},
};
use std::{net::SocketAddr, path::PathBuf, time::Duration};
use tracing::info;

/// Time given to in-flight requests once shutdown starts
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// Where failed login counters are kept
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptStoreKind {
    Memory,
    Redis,
}

/// Certificate and key for serving HTTPS directly
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsPaths {
    pub cert: PathBuf,
    pub key: PathBuf,
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    pub tls: Option<TlsPaths>,
    pub attempt_store: AttemptStoreKind,
}

impl ServerConfig {
    /// Create a new ServerConfig from environment variables
    ///
    /// # Environment Variables
    /// - `PANEL_BIND_ADDR`: listen address (default: 0.0.0.0:3000)
    /// - `TLS_CERT_PATH`, `TLS_KEY_PATH`: PEM files; both or neither
    /// - `LOGIN_ATTEMPT_STORE`: `memory` (default) or `redis`
    pub fn from_env() -> ConfigResult<Self> {
        let bind_addr = parse_or("PANEL_BIND_ADDR", SocketAddr::from(([0, 0, 0, 0], 3000)))?;

        let tls = match (optional("TLS_CERT_PATH"), optional("TLS_KEY_PATH")) {
            (Some(cert), Some(key)) => Some(TlsPaths {
                cert: cert.into(),
                key: key.into(),
            }),
            (None, None) => None,
            (Some(_), None) => return Err(ConfigError::Missing("TLS_KEY_PATH")),
            (None, Some(_)) => return Err(ConfigError::Missing("TLS_CERT_PATH")),
        };

        let attempt_store = match optional("LOGIN_ATTEMPT_STORE").as_deref() {
            None | Some("memory") => AttemptStoreKind::Memory,
            Some("redis") => AttemptStoreKind::Redis,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    name: "LOGIN_ATTEMPT_STORE",
                    reason: format!("unknown store '{}', expected memory or redis", other),
                });
            }
        };

        Ok(Self {
            bind_addr,
            tls,
            attempt_store,
        })
    }
}

/// Serve `app` until a shutdown signal arrives
///
/// Handlers see the TCP peer through `ConnectInfo<SocketAddr>`.
pub async fn serve(app: Router, config: &ServerConfig) -> Result<()> {
    let service = app.into_make_service_with_connect_info::<SocketAddr>();

    match &config.tls {
        Some(paths) => {
            let tls_config = RustlsConfig::from_pem_file(&paths.cert, &paths.key)
                .await
                .with_context(|| format!("Failed to load TLS certificate {:?}", paths.cert))?;

            let handle = Handle::new();
            let shutdown_handle = handle.clone();
            tokio::spawn(async move {
                shutdown_signal().await;
                shutdown_handle.graceful_shutdown(Some(SHUTDOWN_GRACE));
            });

            info!("Panel listening on https://{}", config.bind_addr);
            axum_server::bind_rustls(config.bind_addr, tls_config)
                .handle(handle)
                .serve(service)
                .await?;
        }
        None => {
            let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
            info!("Panel listening on http://{}", config.bind_addr);
            axum::serve(listener, service)
                .with_graceful_shutdown(shutdown_signal())
                .await?;
        }
    }

    info!("Panel stopped");
    Ok(())
}

/// Resolves on Ctrl+C or, on Unix, SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
