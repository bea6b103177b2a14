//! The session router.
//!
//! New clients talk to one well-known handshake endpoint. Each accepted
//! client gets a dedicated endpoint, and the handshake reply is sent from
//! it so the client learns where to send from then on. A dedicated
//! endpoint belongs to the address that performed the handshake; anyone
//! else gets a `SocketBusy` notice and is otherwise ignored.
//!
//! The router plugs into the scheduler as a [`TickHook`]:
//!
//! - During intake it drains every endpoint without blocking, applying
//!   motion commands and answering queries. Handshakes are only queued.
//! - After the barrier, when the grid may be modified, it attaches the
//!   queued observers and sends admin position broadcasts.

use std::net::{IpAddr, SocketAddr};

use daphnia_core::{SimulationState, TickHook};
use daphnia_types::protocol::check_client_version;
use daphnia_types::{ClientMessage, ObserverKind, ObserverSlot, ServerMessage, SessionToken};
use tracing::{debug, error, info, warn};

use crate::dispatch::{DispatchContext, dispatch, version_response};
use crate::error::SessionError;
use crate::transport::{
    DatagramEndpoint, EndpointFactory, MAX_DATAGRAM, UdpEndpoint, UdpEndpointFactory,
};

/// Most datagrams read from one endpoint per tick.
pub const MAX_DATAGRAMS_PER_TICK: usize = 64;

/// One attached client.
pub struct Session {
    slot: ObserverSlot,
    token: SessionToken,
    client: SocketAddr,
    endpoint: Box<dyn DatagramEndpoint>,
}

impl Session {
    /// Engine slot of the session's observer.
    pub const fn slot(&self) -> ObserverSlot {
        self.slot
    }

    /// Token handed to the client.
    pub const fn token(&self) -> SessionToken {
        self.token
    }

    /// Address the session is bound to.
    pub const fn client(&self) -> SocketAddr {
        self.client
    }

    /// Address of the dedicated endpoint.
    pub fn endpoint_addr(&self) -> SocketAddr {
        self.endpoint.local_addr()
    }

    fn send(&mut self, message: &ServerMessage) {
        send_logged(self.endpoint.as_mut(), message, self.client);
    }
}

#[derive(Debug, Clone, Copy)]
struct PendingHandshake {
    client: SocketAddr,
    kind: ObserverKind,
}

/// Routes client datagrams to observers.
pub struct SessionRouter {
    handshake: Box<dyn DatagramEndpoint>,
    factory: Box<dyn EndpointFactory>,
    sessions: Vec<Session>,
    pending: Vec<PendingHandshake>,
    buf: Vec<u8>,
    at_capacity: bool,
}

impl SessionRouter {
    /// A router listening for handshakes on `handshake`.
    pub fn new(handshake: Box<dyn DatagramEndpoint>, factory: Box<dyn EndpointFactory>) -> Self {
        info!(addr = %handshake.local_addr(), "handshake endpoint ready");
        Self {
            handshake,
            factory,
            sessions: Vec::new(),
            pending: Vec::new(),
            buf: vec![0; MAX_DATAGRAM],
            at_capacity: false,
        }
    }

    /// A UDP router with its handshake endpoint on `host:port`.
    pub fn bind_udp(host: IpAddr, port: u16) -> Result<Self, SessionError> {
        let handshake = UdpEndpoint::bind(SocketAddr::new(host, port))?;
        Ok(Self::new(
            Box::new(handshake),
            Box::new(UdpEndpointFactory::new(host)),
        ))
    }

    /// Where new clients send their handshake.
    pub fn handshake_addr(&self) -> SocketAddr {
        self.handshake.local_addr()
    }

    /// Attached sessions in attach order.
    pub fn sessions(&self) -> &[Session] {
        &self.sessions
    }

    /// Handshakes waiting for the next barrier.
    pub fn pending_handshakes(&self) -> usize {
        self.pending.len()
    }

    fn drain_handshakes(&mut self, state: &SimulationState) {
        let table = state.observers();
        let free = table
            .capacity()
            .saturating_sub(table.len())
            .saturating_sub(self.pending.len());
        if free == 0 {
            if !self.at_capacity {
                let err = SessionError::CapacityExceeded {
                    capacity: table.capacity(),
                };
                warn!(error = %err, "handshake endpoint paused");
                self.at_capacity = true;
            }
            return;
        }
        self.at_capacity = false;

        let mut queued = 0_usize;
        for _ in 0..MAX_DATAGRAMS_PER_TICK {
            if queued >= free {
                break;
            }
            let (len, from) = match self.handshake.try_recv(&mut self.buf) {
                Ok(Some(received)) => received,
                Ok(None) => break,
                Err(err) => {
                    warn!(error = %err, "handshake receive failed");
                    break;
                }
            };
            let message = match ClientMessage::decode(self.buf.get(..len).unwrap_or_default()) {
                Ok(message) => message,
                Err(err) => {
                    debug!(%from, error = %SessionError::from(err), "malformed handshake dropped");
                    continue;
                }
            };
            let ClientMessage::Handshake {
                client_version,
                observer_kind,
            } = message
            else {
                debug!(%from, kind = message.type_byte(), "non-handshake message on handshake endpoint");
                continue;
            };
            if let Err(err) = check_client_version(client_version) {
                info!(%from, error = %err, "handshake rejected");
                send_logged(self.handshake.as_mut(), &version_response(None), from);
                continue;
            }
            if let Some(session) = self.sessions.iter_mut().find(|s| s.client == from) {
                debug!(%from, token = %session.token, "repeated handshake answered");
                let reply = version_response(Some(session.token));
                session.send(&reply);
                continue;
            }
            if self.pending.iter().any(|p| p.client == from) {
                continue;
            }
            self.pending.push(PendingHandshake {
                client: from,
                kind: observer_kind,
            });
            queued = queued.saturating_add(1);
        }
    }

    fn drain_sessions(&mut self, state: &mut SimulationState) {
        let stats = state.stats().current().clone();
        let ctx = DispatchContext {
            tick: state.tick(),
            stats: &stats,
        };
        for session in &mut self.sessions {
            for _ in 0..MAX_DATAGRAMS_PER_TICK {
                let (len, from) = match session.endpoint.try_recv(&mut self.buf) {
                    Ok(Some(received)) => received,
                    Ok(None) => break,
                    Err(err) => {
                        warn!(token = %session.token, error = %err, "session receive failed");
                        break;
                    }
                };
                if from != session.client {
                    let err = SessionError::Hijack {
                        expected: session.client,
                        actual: from,
                    };
                    warn!(token = %session.token, error = %err, "foreign datagram refused");
                    send_logged(session.endpoint.as_mut(), &ServerMessage::SocketBusy, from);
                    continue;
                }
                let message = match ClientMessage::decode(self.buf.get(..len).unwrap_or_default()) {
                    Ok(message) => message,
                    Err(err) => {
                        debug!(token = %session.token, error = %SessionError::from(err), "malformed datagram dropped");
                        continue;
                    }
                };
                let Some(observer) = state.observers_mut().get_mut(session.slot) else {
                    break;
                };
                for reply in dispatch(observer, message, ctx) {
                    session.send(&reply);
                }
            }
        }
    }

    fn admit_pending(&mut self, state: &mut SimulationState) {
        for pending in std::mem::take(&mut self.pending) {
            let endpoint = match self.factory.open() {
                Ok(endpoint) => endpoint,
                Err(err) => {
                    error!(client = %pending.client, error = %err, "failed to open session endpoint");
                    continue;
                }
            };
            match state.spawn_observer(pending.kind) {
                Ok(spawned) => {
                    let mut session = Session {
                        slot: spawned.slot,
                        token: spawned.token,
                        client: pending.client,
                        endpoint,
                    };
                    info!(
                        client = %session.client,
                        endpoint = %session.endpoint_addr(),
                        token = %session.token,
                        "session opened"
                    );
                    session.send(&version_response(Some(spawned.token)));
                    self.sessions.push(session);
                }
                Err(err) => {
                    let err = SessionError::from(err);
                    warn!(client = %pending.client, error = %err, "handshake refused");
                    send_logged(self.handshake.as_mut(), &version_response(None), pending.client);
                }
            }
        }
    }

    fn broadcast_to_admin(&mut self, state: &mut SimulationState) {
        let Some(admin) = state.control().admin_observer() else {
            return;
        };
        let Some(session) = self.sessions.iter_mut().find(|s| s.token == admin) else {
            return;
        };
        let updates: Vec<ServerMessage> = state
            .observers_mut()
            .iter_mut()
            .filter_map(|obs| {
                if obs.take_admin_update() {
                    Some(obs.position_message())
                } else {
                    None
                }
            })
            .collect();
        for update in &updates {
            session.send(update);
        }
    }
}

impl TickHook for SessionRouter {
    fn on_intake(&mut self, state: &mut SimulationState) {
        self.drain_handshakes(state);
        self.drain_sessions(state);
    }

    fn on_barrier(&mut self, state: &mut SimulationState) {
        self.admit_pending(state);
        self.broadcast_to_admin(state);
    }
}

fn send_logged(endpoint: &mut dyn DatagramEndpoint, message: &ServerMessage, to: SocketAddr) {
    if let Err(err) = endpoint.send_to(&message.encode(), to) {
        warn!(%to, kind = message.type_byte(), error = %err, "send failed");
    }
}
