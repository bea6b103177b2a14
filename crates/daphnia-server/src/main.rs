//! Universe server binary for Daphnia.
//!
//! Wires the tick loop, client sessions, and the admin API together and
//! runs until the tick limit, an operator stop, or `Ctrl-C`.
//!
//! # Startup Sequence
//!
//! 1. Load configuration from `daphnia-config.yaml` (or `DAPHNIA_CONFIG`)
//! 2. Initialize structured logging (tracing)
//! 3. Build the universe, loading `universe.file` when set
//! 4. Bind the handshake endpoint
//! 5. Start the admin API server
//! 6. Run the scheduler on a blocking thread
//! 7. Stop the admin API and save the universe when configured

mod error;
mod hook;
mod universe;

use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;

use daphnia_admin::{AppState, ServerConfig};
use daphnia_core::{
    DaphniaConfig, LogFormat, LoggingConfig, Scheduler, SimulationControl, SimulationState,
};
use daphnia_session::SessionRouter;
use tokio::sync::oneshot;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::error::ServerError;
use crate::hook::ServerHook;

const DEFAULT_CONFIG_PATH: &str = "daphnia-config.yaml";

#[tokio::main]
async fn main() -> Result<(), ServerError> {
    // 1. Load configuration.
    let config_path = std::env::var("DAPHNIA_CONFIG")
        .map_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH), PathBuf::from);
    let config = DaphniaConfig::load_or_default(&config_path)?;

    // 2. Initialize structured logging.
    init_tracing(&config.logging);
    info!(
        config = %config_path.display(),
        size = %config.logical_size(),
        scale = config.universe.scale,
        threads = config.simulation.threads,
        max_ticks = config.simulation.max_ticks,
        "daphnia-server starting"
    );

    // 3. Build the universe.
    let ether = universe::build_universe(&config)?;
    let control = Arc::new(SimulationControl::new(config.simulation.max_ticks));
    let state = SimulationState::new(Arc::clone(&ether), Arc::clone(&control), &config);

    // 4. Bind the handshake endpoint. Bind failures abort startup.
    let host: IpAddr = config
        .network
        .host
        .parse()
        .map_err(|source| ServerError::InvalidHost {
            host: config.network.host.clone(),
            source,
        })?;
    let router = SessionRouter::bind_udp(host, config.network.client_port)?;

    // 5. Start the admin API.
    let admin_state = Arc::new(AppState::new(
        Arc::clone(&control),
        Arc::clone(&ether),
        config.universe.scale,
    ));
    let admin_config = ServerConfig {
        host: config.network.host.clone(),
        port: config.network.admin_port,
    };
    let listener = daphnia_admin::bind(&admin_config).await?;
    let (admin_stop, admin_stopped) = oneshot::channel::<()>();
    let admin_task = tokio::spawn(daphnia_admin::serve(
        listener,
        Arc::clone(&admin_state),
        admin_shutdown(admin_stopped),
    ));

    // Ctrl-C clears the running flag; the scheduler stops within a tick.
    {
        let control = Arc::clone(&control);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("interrupt received, stopping");
                control.request_stop();
            }
        });
    }

    // 6. Run the tick loop on a blocking thread.
    let simulation = config.simulation.clone();
    let (summary, state) = tokio::task::spawn_blocking(move || {
        let mut hook = ServerHook::new(router, admin_state);
        let mut scheduler = Scheduler::new(state, &simulation);
        let summary = scheduler.run(&mut hook)?;
        Ok::<_, ServerError>((summary, scheduler.into_state()))
    })
    .await??;

    info!(
        reason = ?summary.reason,
        ticks = summary.ticks,
        final_tick = summary.final_tick,
        "tick loop finished"
    );

    // 7. Shut down the admin API and persist.
    if admin_stop.send(()).is_err() {
        warn!("admin server already stopped");
    }
    admin_task.await??;

    if let Some(path) = &config.universe.save_on_exit {
        universe::save(state.ether(), &config, path)?;
    }

    info!("daphnia-server shutdown complete");
    Ok(())
}

/// Install the global subscriber. `RUST_LOG` wins over the configured level.
fn init_tracing(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);
    match logging.format {
        LogFormat::Pretty => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

/// Resolves when the admin server should stop: on an explicit signal, or
/// when the sending side is gone.
async fn admin_shutdown(stopped: oneshot::Receiver<()>) {
    if stopped.await.is_err() {
        warn!("admin stop sender dropped, shutting down admin server");
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn admin_shutdown_resolves_on_signal_or_dropped_sender() {
        let (stop, stopped) = oneshot::channel::<()>();
        assert!(stop.send(()).is_ok());
        let signalled = tokio::time::timeout(Duration::from_secs(1), admin_shutdown(stopped)).await;
        assert!(signalled.is_ok());

        let (stop, stopped) = oneshot::channel::<()>();
        drop(stop);
        let dropped = tokio::time::timeout(Duration::from_secs(1), admin_shutdown(stopped)).await;
        assert!(dropped.is_ok());
    }
}
