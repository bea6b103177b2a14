//! Turning one decoded client message into observer updates and replies.

use daphnia_core::TickStatistics;
use daphnia_observer::{Observer, ReceivedPhoton};
use daphnia_types::protocol::{MAX_REPORTED_WORKERS, check_client_version};
use daphnia_types::{CLIENT_PROTOCOL_VERSION, ClientMessage, ServerMessage, SessionToken};
use tracing::{debug, trace};

/// What the handler may read besides the observer itself.
#[derive(Debug, Clone, Copy)]
pub struct DispatchContext<'a> {
    /// Tick being taken in.
    pub tick: u64,
    /// Last published statistics.
    pub stats: &'a TickStatistics,
}

/// Apply `message` to `observer` and collect the replies.
///
/// A second message of the same kind within one tick is skipped and
/// produces no reply.
pub fn dispatch(
    observer: &mut Observer,
    message: ClientMessage,
    ctx: DispatchContext<'_>,
) -> Vec<ServerMessage> {
    if !observer.accept(message.type_byte()) {
        trace!(slot = %observer.slot(), kind = message.type_byte(), "duplicate message skipped");
        return Vec::new();
    }
    match message {
        ClientMessage::GetState => {
            let mut replies: Vec<ServerMessage> = observer
                .drain_received()
                .into_iter()
                .map(ReceivedPhoton::to_message)
                .collect();
            replies.push(ServerMessage::GetStateResponse { time: ctx.tick });
            replies
        }
        ClientMessage::GetStateExt => vec![observer.state_ext()],
        ClientMessage::GetStatistics => vec![statistics(observer, ctx)],
        ClientMessage::MoveForward(value) => {
            observer.move_forward(value);
            Vec::new()
        }
        ClientMessage::MoveBackward(value) => {
            observer.move_backward(value);
            Vec::new()
        }
        ClientMessage::RotateLeft(value) => {
            observer.rotate_left(value);
            Vec::new()
        }
        ClientMessage::RotateRight(value) => {
            observer.rotate_right(value);
            Vec::new()
        }
        ClientMessage::RotateUp(value) => {
            observer.rotate_up(value);
            Vec::new()
        }
        ClientMessage::RotateDown(value) => {
            observer.rotate_down(value);
            Vec::new()
        }
        ClientMessage::CheckVersion {
            client_version,
            observer_id,
        } => {
            let accepted =
                check_client_version(client_version).is_ok() && observer_id == observer.token();
            vec![version_response(accepted.then_some(observer.token()))]
        }
        ClientMessage::Handshake { client_version, .. } => {
            let accepted = check_client_version(client_version).is_ok();
            if !accepted {
                debug!(client_version, "version mismatch on session endpoint");
            }
            vec![version_response(accepted.then_some(observer.token()))]
        }
    }
}

/// Answer to a version check: the session token, or the rejection id.
pub const fn version_response(token: Option<SessionToken>) -> ServerMessage {
    ServerMessage::CheckVersionResponse {
        server_version: CLIENT_PROTOCOL_VERSION,
        observer_id: match token {
            Some(token) => token,
            None => SessionToken::REJECTED,
        },
    }
}

fn statistics(observer: &mut Observer, ctx: DispatchContext<'_>) -> ServerMessage {
    let ratios = observer.take_rate_ratios(ctx.tick);
    ServerMessage::GetStatisticsResponse {
        fps: ctx.stats.fps,
        driver_tick_ns: ctx.stats.driver_tick_ns,
        worker_tick_ns: ctx
            .stats
            .worker_tick_ns
            .iter()
            .copied()
            .take(MAX_REPORTED_WORKERS)
            .collect(),
        client_server_ratio: ratios.client_server,
        server_client_ratio: ratios.server_client,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use daphnia_types::{ObserverKind, ObserverSlot, Vec3};

    use super::*;

    fn observer() -> Observer {
        Observer::new(ObserverSlot(0), SessionToken(77), ObserverKind::Small, Vec3::splat(2), 4, 1)
            .unwrap()
    }

    fn ctx(stats: &TickStatistics, tick: u64) -> DispatchContext<'_> {
        DispatchContext { tick, stats }
    }

    #[test]
    fn get_state_ends_with_the_time() {
        let stats = TickStatistics::default();
        let mut obs = observer();
        let replies = dispatch(&mut obs, ClientMessage::GetState, ctx(&stats, 12));
        assert_eq!(replies, vec![ServerMessage::GetStateResponse { time: 12 }]);
    }

    #[test]
    fn duplicates_within_a_tick_are_skipped() {
        let stats = TickStatistics::default();
        let mut obs = observer();
        assert!(!dispatch(&mut obs, ClientMessage::GetStateExt, ctx(&stats, 0)).is_empty());
        assert!(dispatch(&mut obs, ClientMessage::GetStateExt, ctx(&stats, 0)).is_empty());
        obs.begin_intake();
        assert!(!dispatch(&mut obs, ClientMessage::GetStateExt, ctx(&stats, 1)).is_empty());
    }

    #[test]
    fn version_check_echoes_the_token_only_when_it_matches() {
        let stats = TickStatistics::default();
        let mut obs = observer();
        let good = ClientMessage::CheckVersion {
            client_version: CLIENT_PROTOCOL_VERSION,
            observer_id: SessionToken(77),
        };
        assert_eq!(
            dispatch(&mut obs, good, ctx(&stats, 0)),
            vec![version_response(Some(SessionToken(77)))]
        );
        obs.begin_intake();
        let stale = ClientMessage::CheckVersion {
            client_version: CLIENT_PROTOCOL_VERSION,
            observer_id: SessionToken(5),
        };
        assert_eq!(
            dispatch(&mut obs, stale, ctx(&stats, 1)),
            vec![version_response(None)]
        );
    }

    #[test]
    fn statistics_carry_timings_and_ratios() {
        let stats = TickStatistics {
            fps: 240,
            driver_tick_ns: 900,
            worker_tick_ns: vec![100, 200],
            ..TickStatistics::default()
        };
        let mut obs = observer();
        dispatch(&mut obs, ClientMessage::GetState, ctx(&stats, 0));
        let replies = dispatch(&mut obs, ClientMessage::GetStatistics, ctx(&stats, 1));
        assert_eq!(
            replies,
            vec![ServerMessage::GetStatisticsResponse {
                fps: 240,
                driver_tick_ns: 900,
                worker_tick_ns: vec![100, 200],
                client_server_ratio: 1000,
                server_client_ratio: 0,
            }]
        );
    }
}
