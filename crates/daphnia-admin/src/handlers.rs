//! REST endpoint handlers for the admin API.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET` | `/api/version` | Protocol versions and universe scale |
//! | `GET` | `/api/crumbs/next` | Next crumb from the scan cursor |
//! | `POST` | `/api/admin-observer` | Register the admin observer |
//! | `GET` | `/api/observers` | Attached observers |
//! | `GET` | `/api/statistics` | Last statistics window |
//! | `POST` | `/api/operator/stop` | Stop the tick loop |

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::Uri;
use axum::response::IntoResponse;
use chrono::Utc;
use daphnia_core::TickStatistics;
use daphnia_observer::ObserverSummary;
use daphnia_types::{ADMIN_PROTOCOL_VERSION, CLIENT_PROTOCOL_VERSION, Rgba, SessionToken, Vec3};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::AdminError;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

/// Response of `GET /api/version`.
#[derive(Debug, Serialize, Deserialize)]
pub struct VersionResponse {
    /// Client protocol version spoken on the datagram endpoints.
    pub server_version: u64,
    /// Version of this API.
    pub admin_protocol_version: u64,
    /// Physical cells per logical voxel.
    pub universe_scale: i32,
}

/// Response of `GET /api/crumbs/next`.
#[derive(Debug, Serialize, Deserialize)]
pub struct NextCrumbResponse {
    /// Whether a crumb was found before the end of the grid.
    pub found: bool,
    /// Crumb cell, when found.
    pub position: Option<Vec3>,
    /// Crumb color, when found.
    pub color: Option<Rgba>,
}

/// Body of `POST /api/admin-observer`.
#[derive(Debug, Serialize, Deserialize)]
pub struct AdminObserverRequest {
    /// Session token of the observer that should receive position updates.
    pub observer_id: SessionToken,
}

/// Response of `GET /api/observers`.
#[derive(Debug, Serialize)]
pub struct ObserversResponse {
    /// Tick of the snapshot.
    pub tick: Option<u64>,
    /// Attached observers.
    pub observers: Vec<ObserverSummary>,
}

/// Response of `GET /api/statistics`.
#[derive(Debug, Serialize)]
pub struct StatisticsResponse {
    /// Tick of the snapshot.
    pub tick: u64,
    /// Whether the tick loop is still running.
    pub running: bool,
    /// Seconds since the server started.
    pub uptime_seconds: i64,
    /// Last closed statistics window.
    pub statistics: TickStatistics,
}

/// Generic acknowledgement.
#[derive(Debug, Serialize, Deserialize)]
pub struct OperatorResponse {
    /// Whether the operation succeeded.
    pub ok: bool,
    /// Human-readable message.
    pub message: String,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// Report protocol versions and the universe scale.
pub async fn version(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(VersionResponse {
        server_version: CLIENT_PROTOCOL_VERSION,
        admin_protocol_version: ADMIN_PROTOCOL_VERSION,
        universe_scale: state.universe_scale,
    })
}

/// Advance the crumb cursor to the next crumb cell.
///
/// Once the cursor passes the last cell every call reports `found: false`.
pub async fn next_crumb(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let crumb = state.crumbs.lock().await.next_crumb(&state.ether);
    Json(NextCrumbResponse {
        found: crumb.is_some(),
        position: crumb.map(|c| c.position),
        color: crumb.map(|c| c.color),
    })
}

/// Register the observer whose client receives everyone's positions.
pub async fn set_admin_observer(
    State(state): State<Arc<AppState>>,
    Json(request): Json<AdminObserverRequest>,
) -> Result<impl IntoResponse, AdminError> {
    if !request.observer_id.is_valid() {
        return Err(AdminError::InvalidRequest(
            "observer_id 0 is not a session".to_owned(),
        ));
    }
    state.control.set_admin_observer(request.observer_id);
    info!(token = %request.observer_id, "admin observer registered");

    Ok(Json(OperatorResponse {
        ok: true,
        message: format!("observer {} receives position updates", request.observer_id),
    }))
}

/// List attached observers as of the last barrier.
pub async fn list_observers(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let snapshot = state.snapshot.read().await;
    Json(ObserversResponse {
        tick: snapshot.tick,
        observers: snapshot.observers.clone(),
    })
}

/// Serve the last closed statistics window.
pub async fn statistics(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, AdminError> {
    let snapshot = state.snapshot.read().await;
    let tick = snapshot
        .tick
        .ok_or_else(|| AdminError::Unavailable("no tick has completed yet".to_owned()))?;
    let uptime_seconds = Utc::now()
        .signed_duration_since(state.control.started_at())
        .num_seconds();

    Ok(Json(StatisticsResponse {
        tick,
        running: state.control.is_running(),
        uptime_seconds,
        statistics: snapshot.statistics.clone(),
    }))
}

/// Ask the tick loop to stop after the current tick.
pub async fn stop(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    state.control.request_stop();
    info!("stop requested through the admin API");
    Json(OperatorResponse {
        ok: true,
        message: "Stop requested -- simulation will end after current tick".to_owned(),
    })
}

/// Unknown route.
pub async fn not_found(uri: Uri) -> AdminError {
    AdminError::NotFound(format!("no route for {uri}"))
}
