//! Client sessions driven through the real scheduler over in-memory
//! endpoints.

#![allow(clippy::unwrap_used, clippy::indexing_slicing, clippy::unreachable)]

use std::net::SocketAddr;
use std::sync::Arc;

use daphnia_core::{DaphniaConfig, Scheduler, SimulationControl, SimulationState};
use daphnia_ether::Ether;
use daphnia_session::{DatagramEndpoint, MAX_DATAGRAM, MemoryEndpoint, MemoryNetwork, SessionRouter};
use daphnia_types::{
    CLIENT_PROTOCOL_VERSION, ClientMessage, EtherKind, ObserverKind, Rgba, ServerMessage, SessionToken, Vec3,
};

const HANDSHAKE_PORT: u16 = 50_000;

struct Harness {
    network: MemoryNetwork,
    scheduler: Scheduler,
    router: SessionRouter,
}

impl Harness {
    fn new(size: Vec3, max_observers: usize) -> Self {
        let mut config = DaphniaConfig::default();
        config.simulation.threads = 1;
        config.simulation.max_ticks = 1;
        config.network.max_observers = max_observers;
        config.observer.eye_size = 2;

        let ether = Arc::new(Ether::new(size).unwrap().with_seed(11));
        let control = Arc::new(SimulationControl::new(config.simulation.max_ticks));
        let state = SimulationState::new(ether, control, &config);
        let network = MemoryNetwork::new();
        let router = SessionRouter::new(
            Box::new(network.endpoint(HANDSHAKE_PORT)),
            Box::new(network.clone()),
        );
        Self {
            network,
            scheduler: Scheduler::new(state, &config.simulation),
            router,
        }
    }

    fn tick(&mut self) {
        self.scheduler.run(&mut self.router).unwrap();
    }

    fn client(&self) -> MemoryEndpoint {
        self.network.endpoint(0)
    }

    fn handshake_addr(&self) -> SocketAddr {
        self.router.handshake_addr()
    }

    fn state(&self) -> &SimulationState {
        self.scheduler.state()
    }
}

fn send(client: &mut MemoryEndpoint, to: SocketAddr, message: ClientMessage) {
    client.send_to(&message.encode(), to).unwrap();
}

fn receive_all(client: &mut MemoryEndpoint) -> Vec<(SocketAddr, ServerMessage)> {
    let mut buf = vec![0_u8; MAX_DATAGRAM];
    let mut received = Vec::new();
    while let Some((len, from)) = client.try_recv(&mut buf).unwrap() {
        received.push((from, ServerMessage::decode(&buf[..len]).unwrap()));
    }
    received
}

fn handshake(client_version: u64) -> ClientMessage {
    ClientMessage::Handshake {
        client_version,
        observer_kind: ObserverKind::Small,
    }
}

/// Perform a handshake and return the session endpoint and token.
fn attach(harness: &mut Harness, client: &mut MemoryEndpoint) -> (SocketAddr, SessionToken) {
    send(client, harness.handshake_addr(), handshake(CLIENT_PROTOCOL_VERSION));
    harness.tick();
    let replies = receive_all(client);
    assert_eq!(replies.len(), 1);
    let (from, ServerMessage::CheckVersionResponse { server_version, observer_id }) = replies[0].clone()
    else {
        unreachable!("expected a version response, got {:?}", replies[0]);
    };
    assert_eq!(server_version, CLIENT_PROTOCOL_VERSION);
    assert!(observer_id.is_valid());
    assert_ne!(from, harness.handshake_addr());
    (from, observer_id)
}

#[test]
fn handshake_then_moving_forward_twice() {
    let mut harness = Harness::new(Vec3::new(8, 3, 3), 2);
    for pos in harness.state().ether().positions().collect::<Vec<_>>() {
        harness.state().ether().init_cell(pos, EtherKind::Block, Rgba::gray(50)).unwrap();
    }
    let start = Vec3::new(0, 1, 1);
    harness.state().ether().init_cell(start, EtherKind::Space, Rgba::TRANSPARENT).unwrap();

    let mut client = harness.client();
    let (session, token) = attach(&mut harness, &mut client);
    let observer = harness.state().observers().by_token(token).unwrap();
    assert_eq!(observer.position(), start);

    for x in 1..=6 {
        harness
            .state()
            .ether()
            .init_cell(Vec3::new(x, 1, 1), EtherKind::Space, Rgba::TRANSPARENT)
            .unwrap();
    }

    // 0 -> 200 -> 144 (wrap) -> 88 (wrap): two voxel steps along +X.
    for _ in 0..3 {
        send(&mut client, session, ClientMessage::MoveForward(200));
        harness.tick();
    }
    let observer = harness.state().observers().by_token(token).unwrap();
    assert_eq!(observer.position(), Vec3::new(2, 1, 1));
    assert_eq!(harness.state().ether().kind_at(start), Some(EtherKind::Space));
    assert_eq!(harness.state().ether().kind_at(Vec3::new(2, 1, 1)), Some(EtherKind::Observer));

    send(&mut client, session, ClientMessage::GetStateExt);
    harness.tick();
    let replies = receive_all(&mut client);
    assert!(replies.iter().any(|(_, reply)| matches!(
        reply,
        ServerMessage::GetStateExtResponse { position, moving_progress: 88, .. }
            if *position == Vec3::new(2, 1, 1)
    )));
}

#[test]
fn version_mismatch_gets_a_zero_id() {
    let mut harness = Harness::new(Vec3::splat(6), 2);
    let mut client = harness.client();
    send(&mut client, harness.handshake_addr(), handshake(CLIENT_PROTOCOL_VERSION.wrapping_add(1)));
    harness.tick();

    let replies = receive_all(&mut client);
    assert_eq!(
        replies,
        vec![(
            harness.handshake_addr(),
            ServerMessage::CheckVersionResponse {
                server_version: CLIENT_PROTOCOL_VERSION,
                observer_id: SessionToken::REJECTED,
            }
        )]
    );
    assert!(harness.state().observers().is_empty());
}

#[test]
fn foreign_sender_is_told_the_socket_is_busy() {
    let mut harness = Harness::new(Vec3::splat(6), 2);
    let mut client = harness.client();
    let (session, _) = attach(&mut harness, &mut client);

    let mut intruder = harness.client();
    send(&mut intruder, session, ClientMessage::GetState);
    send(&mut client, session, ClientMessage::GetState);
    harness.tick();

    assert_eq!(receive_all(&mut intruder), vec![(session, ServerMessage::SocketBusy)]);
    let replies = receive_all(&mut client);
    assert!(matches!(
        replies.last(),
        Some((_, ServerMessage::GetStateResponse { .. }))
    ));
}

#[test]
fn repeated_handshake_returns_the_same_session() {
    let mut harness = Harness::new(Vec3::splat(6), 2);
    let mut client = harness.client();
    let (session, token) = attach(&mut harness, &mut client);

    send(&mut client, harness.handshake_addr(), handshake(CLIENT_PROTOCOL_VERSION));
    harness.tick();
    let replies = receive_all(&mut client);
    assert_eq!(
        replies,
        vec![(
            session,
            ServerMessage::CheckVersionResponse {
                server_version: CLIENT_PROTOCOL_VERSION,
                observer_id: token,
            }
        )]
    );
    assert_eq!(harness.state().observers().len(), 1);
}

#[test]
fn handshakes_wait_while_at_capacity() {
    let mut harness = Harness::new(Vec3::splat(6), 1);
    let mut first = harness.client();
    let mut second = harness.client();
    send(&mut first, harness.handshake_addr(), handshake(CLIENT_PROTOCOL_VERSION));
    send(&mut second, harness.handshake_addr(), handshake(CLIENT_PROTOCOL_VERSION));
    harness.tick();

    assert_eq!(receive_all(&mut first).len(), 1);
    assert!(receive_all(&mut second).is_empty());
    assert_eq!(harness.network.queued(harness.handshake_addr()), 1);
    assert_eq!(harness.router.pending_handshakes(), 0);
}

#[test]
fn admin_observer_receives_positions() {
    let mut harness = Harness::new(Vec3::splat(6), 2);
    let mut admin = harness.client();
    let (_, admin_token) = attach(&mut harness, &mut admin);
    let mut other = harness.client();
    let (_, other_token) = attach(&mut harness, &mut other);

    harness.state().control().set_admin_observer(admin_token);
    harness.tick();

    let mut reported: Vec<SessionToken> = receive_all(&mut admin)
        .into_iter()
        .filter_map(|(_, message)| match message {
            ServerMessage::ObserverPosition { observer_id, .. } => Some(observer_id),
            _ => None,
        })
        .collect();
    reported.sort_by_key(|token| token.0);
    let mut expected = vec![admin_token, other_token];
    expected.sort_by_key(|token| token.0);
    assert_eq!(reported, expected);

    // Nothing moved since: no further broadcasts.
    harness.tick();
    assert!(receive_all(&mut admin).is_empty());
}
