//! Admin HTTP server lifecycle.
//!
//! [`start_server`] binds a TCP listener and serves the admin router until
//! the given shutdown future resolves. [`bind`] and [`serve`] split the two
//! steps for callers that must fail fast on a taken port.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::info;

use crate::router::build_router;
use crate::state::AppState;

/// Where the admin server listens.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Host address to bind (e.g. `0.0.0.0`).
    pub host: String,
    /// TCP port to listen on.
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: String::from("0.0.0.0"),
            port: 8080,
        }
    }
}

/// Errors that can occur when starting or running the admin server.
#[derive(Debug, thiserror::Error)]
pub enum ServeError {
    /// Failed to bind to the network address.
    #[error("bind error: {0}")]
    Bind(String),

    /// The server hit a fatal error while serving.
    #[error("serve error: {0}")]
    Serve(String),
}

/// Bind the admin listener.
///
/// Separate from [`serve`] so startup can fail before the tick loop runs.
pub async fn bind(config: &ServerConfig) -> Result<TcpListener, ServeError> {
    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .map_err(|e| ServeError::Bind(format!("invalid address: {e}")))?;

    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| ServeError::Bind(format!("bind failed on {addr}: {e}")))?;

    info!(%addr, "admin server listening");
    Ok(listener)
}

/// Serve the admin API on `listener` until `shutdown` resolves.
///
/// In-flight requests are allowed to finish before this returns.
pub async fn serve<F>(listener: TcpListener, state: Arc<AppState>, shutdown: F) -> Result<(), ServeError>
where
    F: Future<Output = ()> + Send + 'static,
{
    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| ServeError::Serve(format!("serve error: {e}")))?;

    info!("admin server stopped");
    Ok(())
}

/// Bind and serve the admin API until `shutdown` resolves.
pub async fn start_server<F>(
    config: &ServerConfig,
    state: Arc<AppState>,
    shutdown: F,
) -> Result<(), ServeError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = bind(config).await?;
    serve(listener, state, shutdown).await
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use daphnia_core::SimulationControl;
    use daphnia_ether::Ether;
    use daphnia_types::Vec3;

    use super::*;

    #[tokio::test]
    async fn serves_until_shutdown_resolves() {
        let ether = Arc::new(Ether::new(Vec3::splat(2)).unwrap());
        let control = Arc::new(SimulationControl::new(0));
        let state = Arc::new(AppState::new(control, ether, 1));
        let config = ServerConfig {
            host: "127.0.0.1".to_owned(),
            port: 0,
        };
        start_server(&config, state, async {}).await.unwrap();
    }

    #[tokio::test]
    async fn bad_host_is_a_bind_error() {
        let config = ServerConfig {
            host: "not an address".to_owned(),
            port: 0,
        };
        assert!(matches!(bind(&config).await, Err(ServeError::Bind(_))));
    }
}
