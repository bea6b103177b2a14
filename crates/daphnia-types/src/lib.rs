//! Shared type definitions for the Daphnia universe server.
//!
//! This crate is the single source of truth for the value types that flow
//! between the ether (voxel grid), the observers, the tick scheduler, and
//! the network-facing session router. It has no knowledge of threads or
//! sockets.
//!
//! # Modules
//!
//! - [`geometry`] -- Integer lattice vectors, quantized orientation vectors,
//!   and half-open simulation boxes.
//! - [`color`] -- RGBA8 colors; alpha doubles as photon energy.
//! - [`kinds`] -- Closed enumerations for cell kinds and observer kinds.
//! - [`ids`] -- Engine-side observer slots and wire-visible session tokens.
//! - [`protocol`] -- Binary datagram codec for the client protocol.

pub mod color;
pub mod geometry;
pub mod ids;
pub mod kinds;
pub mod protocol;

// Re-export all public types at crate root for convenience.
pub use color::Rgba;
pub use geometry::{Axis, OrientationVector, SimulationBox, Vec3};
pub use ids::{ObserverSlot, SessionToken};
pub use kinds::{EtherKind, ObserverKind};
pub use protocol::{
    ADMIN_PROTOCOL_VERSION, CLIENT_PROTOCOL_VERSION, ClientMessage, ProtocolError, ServerMessage,
};
