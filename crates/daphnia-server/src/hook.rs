//! The tick hook the server runs the scheduler with.
//!
//! Client sessions are served first. After the barrier the admin snapshot
//! is republished so HTTP readers see the settled tick.

use std::sync::Arc;

use daphnia_admin::AppState;
use daphnia_core::{SimulationState, TickHook};
use daphnia_session::SessionRouter;

/// Sessions plus admin publishing.
pub struct ServerHook {
    router: SessionRouter,
    admin: Arc<AppState>,
}

impl ServerHook {
    /// Hook over `router` publishing into `admin`.
    pub const fn new(router: SessionRouter, admin: Arc<AppState>) -> Self {
        Self { router, admin }
    }
}

impl TickHook for ServerHook {
    fn on_intake(&mut self, state: &mut SimulationState) {
        self.router.on_intake(state);
    }

    fn on_barrier(&mut self, state: &mut SimulationState) {
        self.router.on_barrier(state);
        self.admin.publish(state);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use daphnia_core::{DaphniaConfig, Scheduler, SimulationControl};
    use daphnia_ether::Ether;
    use daphnia_session::{DatagramEndpoint, MemoryNetwork};
    use daphnia_types::{CLIENT_PROTOCOL_VERSION, ClientMessage, ObserverKind, Vec3};

    use super::*;

    #[tokio::test]
    async fn barrier_publishes_sessions_to_the_admin_snapshot() {
        let mut config = DaphniaConfig::default();
        config.simulation.threads = 1;
        config.simulation.max_ticks = 1;
        config.observer.eye_size = 2;

        let ether = Arc::new(Ether::new(Vec3::splat(6)).unwrap());
        let control = Arc::new(SimulationControl::new(config.simulation.max_ticks));
        let admin = Arc::new(AppState::new(Arc::clone(&control), Arc::clone(&ether), 1));
        let state = SimulationState::new(ether, control, &config);

        let network = MemoryNetwork::new();
        let router = SessionRouter::new(Box::new(network.endpoint(50_000)), Box::new(network.clone()));
        let handshake_addr = router.handshake_addr();
        let mut client = network.endpoint(0);
        let hello = ClientMessage::Handshake {
            client_version: CLIENT_PROTOCOL_VERSION,
            observer_kind: ObserverKind::Small,
        };
        client.send_to(&hello.encode(), handshake_addr).unwrap();

        let mut hook = ServerHook::new(router, Arc::clone(&admin));
        let mut scheduler = Scheduler::new(state, &config.simulation);
        scheduler.run(&mut hook).unwrap();

        let snapshot = admin.snapshot.read().await;
        assert_eq!(snapshot.tick, Some(0));
        assert_eq!(snapshot.observers.len(), 1);
    }
}
