//! An in-process datagram network.
//!
//! Endpoints on one [`MemoryNetwork`] exchange datagrams through shared
//! queues. Delivery is immediate and ordered; a datagram sent to an
//! address nobody bound is dropped, as UDP would.

use std::collections::{HashMap, VecDeque};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::{Arc, Mutex, PoisonError};

use crate::error::SessionError;
use crate::transport::{DatagramEndpoint, EndpointFactory};

const FIRST_EPHEMERAL_PORT: u16 = 40_000;

type Datagram = (SocketAddr, Vec<u8>);

#[derive(Debug)]
struct Queues {
    inboxes: HashMap<SocketAddr, VecDeque<Datagram>>,
    next_port: u16,
}

/// A set of in-process endpoints that can reach each other.
#[derive(Debug, Clone)]
pub struct MemoryNetwork {
    queues: Arc<Mutex<Queues>>,
}

impl Default for MemoryNetwork {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryNetwork {
    /// An empty network.
    pub fn new() -> Self {
        Self {
            queues: Arc::new(Mutex::new(Queues {
                inboxes: HashMap::new(),
                next_port: FIRST_EPHEMERAL_PORT,
            })),
        }
    }

    /// Bind `port` on the loopback address, or the next free port when
    /// `port` is 0.
    pub fn endpoint(&self, port: u16) -> MemoryEndpoint {
        let mut queues = self.lock();
        let port = if port == 0 {
            loop {
                let candidate = queues.next_port;
                queues.next_port = candidate.checked_add(1).unwrap_or(FIRST_EPHEMERAL_PORT);
                if !queues.inboxes.contains_key(&loopback(candidate)) {
                    break candidate;
                }
            }
        } else {
            port
        };
        let local = loopback(port);
        queues.inboxes.entry(local).or_default();
        MemoryEndpoint {
            network: self.clone(),
            local,
        }
    }

    /// Datagrams waiting at `addr`.
    pub fn queued(&self, addr: SocketAddr) -> usize {
        self.lock().inboxes.get(&addr).map_or(0, VecDeque::len)
    }

    fn deliver(&self, from: SocketAddr, to: SocketAddr, bytes: &[u8]) {
        if let Some(inbox) = self.lock().inboxes.get_mut(&to) {
            inbox.push_back((from, bytes.to_vec()));
        }
    }

    fn pop(&self, at: SocketAddr) -> Option<Datagram> {
        self.lock().inboxes.get_mut(&at)?.pop_front()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Queues> {
        self.queues.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl EndpointFactory for MemoryNetwork {
    fn open(&mut self) -> Result<Box<dyn DatagramEndpoint>, SessionError> {
        Ok(Box::new(self.endpoint(0)))
    }
}

/// One bound address on a [`MemoryNetwork`].
#[derive(Debug)]
pub struct MemoryEndpoint {
    network: MemoryNetwork,
    local: SocketAddr,
}

impl DatagramEndpoint for MemoryEndpoint {
    fn local_addr(&self) -> SocketAddr {
        self.local
    }

    fn try_recv(&mut self, buf: &mut [u8]) -> Result<Option<(usize, SocketAddr)>, SessionError> {
        let Some((from, bytes)) = self.network.pop(self.local) else {
            return Ok(None);
        };
        // Oversized datagrams are truncated, like a short UDP read.
        let len = bytes.len().min(buf.len());
        if let (Some(dst), Some(src)) = (buf.get_mut(..len), bytes.get(..len)) {
            dst.copy_from_slice(src);
        }
        Ok(Some((len, from)))
    }

    fn send_to(&mut self, bytes: &[u8], to: SocketAddr) -> Result<(), SessionError> {
        self.network.deliver(self.local, to, bytes);
        Ok(())
    }
}

const fn loopback(port: u16) -> SocketAddr {
    SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    #[test]
    fn datagrams_flow_between_endpoints() {
        let network = MemoryNetwork::new();
        let mut server = network.endpoint(50_000);
        let mut client = network.endpoint(0);
        client.send_to(&[9, 8], server.local_addr()).unwrap();
        assert_eq!(network.queued(server.local_addr()), 1);

        let mut buf = [0_u8; 16];
        let (len, from) = server.try_recv(&mut buf).unwrap().unwrap();
        assert_eq!(&buf[..len], &[9, 8]);
        assert_eq!(from, client.local_addr());
        assert!(server.try_recv(&mut buf).unwrap().is_none());
    }

    #[test]
    fn unbound_destination_drops_datagram() {
        let network = MemoryNetwork::new();
        let mut client = network.endpoint(0);
        client.send_to(&[1], loopback(1)).unwrap();
        assert_eq!(network.queued(loopback(1)), 0);
    }

    #[test]
    fn ephemeral_ports_are_unique() {
        let mut network = MemoryNetwork::new();
        let a = network.open().unwrap();
        let b = network.open().unwrap();
        assert_ne!(a.local_addr(), b.local_addr());
    }
}
