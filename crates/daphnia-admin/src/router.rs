//! Axum router construction for the admin API.

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::state::AppState;

/// Build the admin router.
///
/// CORS allows any origin so a browser dashboard on another port can call
/// the API.
pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/version", get(handlers::version))
        .route("/api/crumbs/next", get(handlers::next_crumb))
        .route("/api/admin-observer", post(handlers::set_admin_observer))
        .route("/api/observers", get(handlers::list_observers))
        .route("/api/statistics", get(handlers::statistics))
        .route("/api/operator/stop", post(handlers::stop))
        .fallback(handlers::not_found)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
