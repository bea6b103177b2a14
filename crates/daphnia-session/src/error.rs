//! Error types for the session layer.
//!
//! Only endpoint setup failures reach the caller. Per-datagram problems
//! (hijack attempts, malformed messages, failed sends) are logged and the
//! datagram is dropped; the variants below still name them so logs and
//! tests share one vocabulary.

use std::net::SocketAddr;

use daphnia_core::SpawnError;
use daphnia_types::ProtocolError;

/// Errors that can occur in the session layer.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// An endpoint could not be bound.
    #[error("failed to bind datagram endpoint {addr}: {source}")]
    Bind {
        /// Address that was requested.
        addr: SocketAddr,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// A datagram arrived from an address other than the session's client.
    #[error("datagram from {actual} refused: endpoint belongs to {expected}")]
    Hijack {
        /// Client the endpoint is bound to.
        expected: SocketAddr,
        /// Address the datagram came from.
        actual: SocketAddr,
    },

    /// Every observer slot is taken.
    #[error("observer capacity of {capacity} reached")]
    CapacityExceeded {
        /// Configured maximum number of observers.
        capacity: usize,
    },

    /// A datagram could not be decoded.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// A new observer could not be attached.
    #[error("spawn error: {0}")]
    Spawn(#[from] SpawnError),

    /// Endpoint I/O failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
