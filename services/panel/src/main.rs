use anyhow::Result;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

mod credentials;
mod error;
mod middleware;
mod models;
mod origin;
mod rate_limiter;
mod routes;
mod server;
mod session;
mod state;
mod validation;

use common::cache::{RedisConfig, RedisPool};
use ilo::{IloClient, IloConfig};

use crate::{
    credentials::AuthConfig,
    rate_limiter::{AttemptStore, LoginLimiter, MemoryAttemptStore, RateLimiterConfig, RedisAttemptStore},
    server::{AttemptStoreKind, ServerConfig},
    session::{SessionConfig, SessionManager},
    state::AppState,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting iLO fan panel");

    // Startup refuses to continue without operator credentials or a usable secret
    let credentials = AuthConfig::from_env()?;
    let session_config = SessionConfig::from_env()?;
    let server_config = ServerConfig::from_env()?;

    let ilo_config = IloConfig::from_env()?;
    if let Err(e) = ilo_config.credentials() {
        warn!("{}; device requests will fail until it is set", e);
    }
    let fans = IloClient::new(ilo_config)?;

    let store: Arc<dyn AttemptStore> = match server_config.attempt_store {
        AttemptStoreKind::Memory => {
            info!("Counting login attempts in memory");
            Arc::new(MemoryAttemptStore::new())
        }
        AttemptStoreKind::Redis => {
            let redis_config = RedisConfig::from_env();
            let redis_pool = RedisPool::new(&redis_config)?;

            if redis_pool.health_check().await? {
                info!("Redis connection successful");
            } else {
                anyhow::bail!("Failed to connect to Redis");
            }
            Arc::new(RedisAttemptStore::new(redis_pool))
        }
    };

    let app_state = AppState {
        credentials: Arc::new(credentials),
        sessions: SessionManager::new(&session_config),
        login_limiter: LoginLimiter::new(RateLimiterConfig::default(), store),
        fans: Arc::new(fans),
        connection_encrypted: server_config.tls.is_some(),
    };

    // Start the web server
    let app = routes::create_router(app_state);
    server::serve(app, &server_config).await
}
