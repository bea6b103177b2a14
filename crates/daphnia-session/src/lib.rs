//! Client sessions for the Daphnia universe.
//!
//! Observers are steered by remote clients over datagrams. This crate owns
//! the endpoints, binds each endpoint to the client that opened it, and
//! feeds decoded messages to observers once per tick.
//!
//! # Modules
//!
//! - [`router`] -- [`SessionRouter`]: handshakes, per-session intake,
//!   admin broadcasts.
//! - [`dispatch`] -- One message in, observer updated, replies out.
//! - [`transport`] -- The [`DatagramEndpoint`] seam and its UDP
//!   implementation.
//! - [`memory`] -- In-process endpoints for tests and embedding.
//! - [`error`] -- Error types for the session layer.

pub mod dispatch;
pub mod error;
pub mod memory;
pub mod router;
pub mod transport;

pub use dispatch::{DispatchContext, dispatch, version_response};
pub use error::SessionError;
pub use memory::{MemoryEndpoint, MemoryNetwork};
pub use router::{MAX_DATAGRAMS_PER_TICK, Session, SessionRouter};
pub use transport::{DatagramEndpoint, EndpointFactory, MAX_DATAGRAM, UdpEndpoint, UdpEndpointFactory};
