//! Admin HTTP API for the Daphnia universe server.
//!
//! A small Axum service next to the tick loop. It reports versions and
//! statistics, lists observers, walks the universe for crumbs, registers
//! the admin observer, and can stop the simulation.
//!
//! # Modules
//!
//! - [`router`] -- Route table with CORS and request tracing.
//! - [`handlers`] -- Endpoint handlers and their JSON bodies.
//! - [`state`] -- [`AppState`] and the per-barrier [`UniverseSnapshot`].
//! - [`server`] -- Listener lifecycle with graceful shutdown.
//! - [`error`] -- [`AdminError`] and its JSON rendering.

pub mod error;
pub mod handlers;
pub mod router;
pub mod server;
pub mod state;

pub use error::AdminError;
pub use router::build_router;
pub use server::{ServeError, ServerConfig, bind, serve, start_server};
pub use state::{AppState, UniverseSnapshot};
