//! Datagram endpoints.
//!
//! The router only needs three things from a socket: its address, a
//! receive that never blocks, and a best-effort send. [`UdpEndpoint`] is
//! the production implementation; [`crate::memory`] provides an
//! in-process one for tests.

use std::io::ErrorKind;
use std::net::{IpAddr, SocketAddr, UdpSocket};

use tracing::debug;

use crate::error::SessionError;

/// Largest datagram the protocol produces, with headroom.
pub const MAX_DATAGRAM: usize = 2048;

/// A bound, non-blocking datagram socket.
pub trait DatagramEndpoint: Send {
    /// Address clients send to.
    fn local_addr(&self) -> SocketAddr;

    /// Receive one queued datagram into `buf`.
    ///
    /// Returns `Ok(None)` when nothing is queued.
    fn try_recv(&mut self, buf: &mut [u8]) -> Result<Option<(usize, SocketAddr)>, SessionError>;

    /// Send one datagram to `to`.
    fn send_to(&mut self, bytes: &[u8], to: SocketAddr) -> Result<(), SessionError>;
}

/// Opens the dedicated endpoint for each new session.
pub trait EndpointFactory: Send {
    /// Bind a fresh endpoint on an unused port.
    fn open(&mut self) -> Result<Box<dyn DatagramEndpoint>, SessionError>;
}

/// A UDP socket in non-blocking mode.
#[derive(Debug)]
pub struct UdpEndpoint {
    socket: UdpSocket,
    local: SocketAddr,
}

impl UdpEndpoint {
    /// Bind to `addr` and switch the socket to non-blocking mode.
    pub fn bind(addr: SocketAddr) -> Result<Self, SessionError> {
        let socket = UdpSocket::bind(addr).map_err(|source| SessionError::Bind { addr, source })?;
        socket
            .set_nonblocking(true)
            .map_err(|source| SessionError::Bind { addr, source })?;
        let local = socket.local_addr()?;
        debug!(%local, "udp endpoint bound");
        Ok(Self { socket, local })
    }
}

impl DatagramEndpoint for UdpEndpoint {
    fn local_addr(&self) -> SocketAddr {
        self.local
    }

    fn try_recv(&mut self, buf: &mut [u8]) -> Result<Option<(usize, SocketAddr)>, SessionError> {
        match self.socket.recv_from(buf) {
            Ok(received) => Ok(Some(received)),
            Err(err) if err.kind() == ErrorKind::WouldBlock => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn send_to(&mut self, bytes: &[u8], to: SocketAddr) -> Result<(), SessionError> {
        self.socket.send_to(bytes, to)?;
        Ok(())
    }
}

/// Binds per-session UDP endpoints on one host.
#[derive(Debug, Clone, Copy)]
pub struct UdpEndpointFactory {
    host: IpAddr,
}

impl UdpEndpointFactory {
    /// A factory binding ephemeral ports on `host`.
    pub const fn new(host: IpAddr) -> Self {
        Self { host }
    }
}

impl EndpointFactory for UdpEndpointFactory {
    fn open(&mut self) -> Result<Box<dyn DatagramEndpoint>, SessionError> {
        let endpoint = UdpEndpoint::bind(SocketAddr::new(self.host, 0))?;
        Ok(Box::new(endpoint))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use std::net::Ipv4Addr;

    use super::*;

    #[test]
    fn empty_socket_does_not_block() {
        let mut endpoint = UdpEndpoint::bind(SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0)).unwrap();
        let mut buf = [0_u8; MAX_DATAGRAM];
        assert!(endpoint.try_recv(&mut buf).unwrap().is_none());
    }

    #[test]
    fn loopback_datagram_arrives() {
        let mut factory = UdpEndpointFactory::new(IpAddr::V4(Ipv4Addr::LOCALHOST));
        let mut a = factory.open().unwrap();
        let mut b = factory.open().unwrap();
        a.send_to(&[1, 2, 3], b.local_addr()).unwrap();

        let mut buf = [0_u8; MAX_DATAGRAM];
        let mut received = None;
        for _ in 0..1000 {
            received = b.try_recv(&mut buf).unwrap();
            if received.is_some() {
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(1));
        }
        let (len, from) = received.unwrap();
        assert_eq!(&buf[..len], &[1, 2, 3]);
        assert_eq!(from, a.local_addr());
    }
}
