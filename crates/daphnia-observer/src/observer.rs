//! Per-connection observer state.
//!
//! An [`Observer`] is driven from two places in a tick. During intake the
//! session router feeds it client commands, which only touch its own
//! accumulators, facing, and request flags. After the tick barrier the
//! driver lets it absorb arriving photons, commits any requested move on
//! the grid, and has it echolocate. Nothing in this type writes the grid
//! except [`Observer::echolocate`], and that only runs after the barrier.

use daphnia_ether::{Ether, Photon};
use daphnia_types::{
    ObserverKind, ObserverSlot, OrientationVector, Rgba, ServerMessage, SessionToken, Vec3,
    protocol::client_type,
};
use rand::SeedableRng;
use rand::rngs::SmallRng;
use rand::seq::SliceRandom;
use serde::Serialize;

use crate::commands::HandledKinds;
use crate::error::ObserverError;
use crate::eye::{Eye, facing, wrap_longitude};
use crate::progress::Accumulator;

/// Alpha of a freshly emitted echolocation photon.
pub const ECHO_ALPHA: u8 = 255;

/// Received photons kept for a client that is not polling.
pub const MAX_PENDING_PHOTONS: usize = 4096;

/// A photon that reached the observer's eye.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReceivedPhoton {
    /// Color after all reflections.
    pub color: Rgba,
    /// Eye column.
    pub pixel_x: u8,
    /// Eye row.
    pub pixel_y: u8,
}

impl ReceivedPhoton {
    /// The datagram that carries this photon to the client.
    pub const fn to_message(self) -> ServerMessage {
        ServerMessage::SendPhoton {
            color: self.color,
            pixel_x: self.pixel_x,
            pixel_y: self.pixel_y,
        }
    }
}

/// Client rate ratios, each scaled by 1000.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RateRatios {
    /// `GetState` requests per tick.
    pub client_server: u32,
    /// Skipped duplicate messages per honored message.
    pub server_client: u32,
}

/// Public view of an observer for admin listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ObserverSummary {
    /// Wire-visible id.
    pub id: SessionToken,
    /// Engine slot.
    pub slot: ObserverSlot,
    /// Body kind.
    pub kind: ObserverKind,
    /// Current position.
    pub position: Vec3,
    /// Latitude in degrees.
    pub latitude: i16,
    /// Longitude in degrees.
    pub longitude: i16,
    /// Number of crumb clusters eaten.
    pub eaten_crumbs: u32,
}

/// One attached client's organism.
#[derive(Debug)]
pub struct Observer {
    slot: ObserverSlot,
    token: SessionToken,
    kind: ObserverKind,
    color: Rgba,
    position: Vec3,
    latitude: i16,
    longitude: i16,
    moving: Accumulator,
    latitude_progress: Accumulator,
    longitude_progress: Accumulator,
    eye: Eye,
    requested_move: Option<Vec3>,
    eaten_crumbs: u32,
    last_eaten_crumb: Vec3,
    handled: HandledKinds,
    received: Vec<ReceivedPhoton>,
    view_changed: bool,
    admin_dirty: bool,
    first_send_to_admin: bool,
    get_state_calls: u32,
    honored_messages: u32,
    skipped_messages: u32,
    last_statistics_tick: u64,
    rng: SmallRng,
}

impl Observer {
    /// Create an observer facing latitude 0, longitude 0.
    pub fn new(
        slot: ObserverSlot,
        token: SessionToken,
        kind: ObserverKind,
        position: Vec3,
        eye_size: u8,
        seed: u64,
    ) -> Result<Self, ObserverError> {
        Ok(Self {
            slot,
            token,
            kind,
            color: Rgba::WHITE,
            position,
            latitude: 0,
            longitude: 0,
            moving: Accumulator::default(),
            latitude_progress: Accumulator::default(),
            longitude_progress: Accumulator::default(),
            eye: Eye::new(eye_size, 0, 0)?,
            requested_move: None,
            eaten_crumbs: 0,
            last_eaten_crumb: Vec3::ZERO,
            handled: HandledKinds::default(),
            received: Vec::new(),
            view_changed: true,
            admin_dirty: true,
            first_send_to_admin: true,
            get_state_calls: 0,
            honored_messages: 0,
            skipped_messages: 0,
            last_statistics_tick: 0,
            rng: SmallRng::seed_from_u64(seed),
        })
    }

    /// Use `color` for the body (what other observers see).
    #[must_use]
    pub const fn with_color(mut self, color: Rgba) -> Self {
        self.color = color;
        self
    }

    /// Engine slot.
    pub const fn slot(&self) -> ObserverSlot {
        self.slot
    }

    /// Wire-visible id.
    pub const fn token(&self) -> SessionToken {
        self.token
    }

    /// Body kind.
    pub const fn kind(&self) -> ObserverKind {
        self.kind
    }

    /// Body color.
    pub const fn color(&self) -> Rgba {
        self.color
    }

    /// Current position.
    pub const fn position(&self) -> Vec3 {
        self.position
    }

    /// Latitude in degrees, `-90..=90`.
    pub const fn latitude(&self) -> i16 {
        self.latitude
    }

    /// Longitude in degrees, `-179..=180`.
    pub const fn longitude(&self) -> i16 {
        self.longitude
    }

    /// Movement accumulator value.
    pub const fn moving_progress(&self) -> u8 {
        self.moving.value()
    }

    /// Crumb clusters eaten so far.
    pub const fn eaten_crumbs(&self) -> u32 {
        self.eaten_crumbs
    }

    /// Minimum corner of the last eaten cluster.
    pub const fn last_eaten_crumb(&self) -> Vec3 {
        self.last_eaten_crumb
    }

    /// The compound eye.
    pub const fn eye(&self) -> &Eye {
        &self.eye
    }

    /// Quantized facing direction.
    pub fn orientation(&self) -> OrientationVector {
        facing(self.latitude, self.longitude)
    }

    /// Admin listing view.
    pub const fn summary(&self) -> ObserverSummary {
        ObserverSummary {
            id: self.token,
            slot: self.slot,
            kind: self.kind,
            position: self.position,
            latitude: self.latitude,
            longitude: self.longitude,
            eaten_crumbs: self.eaten_crumbs,
        }
    }

    /// Forget which message kinds were handled (start of a tick's intake).
    pub const fn begin_intake(&mut self) {
        self.handled.clear();
    }

    /// Claim the right to handle a message of `type_byte` this tick.
    ///
    /// Returns `false` for a duplicate, which is counted as skipped.
    pub fn accept(&mut self, type_byte: u8) -> bool {
        if !self.handled.claim(type_byte) {
            self.skipped_messages = self.skipped_messages.saturating_add(1);
            return false;
        }
        self.honored_messages = self.honored_messages.saturating_add(1);
        if type_byte == client_type::GET_STATE {
            self.get_state_calls = self.get_state_calls.saturating_add(1);
        }
        true
    }

    /// Accumulate forward motion; a wrap requests one voxel step.
    pub fn move_forward(&mut self, value: u8) {
        if self.moving.advance(value) {
            let step = daphnia_ether::quantized_step(self.orientation(), &mut self.rng);
            self.request_move(self.position.saturating_add(step));
        }
    }

    /// Accumulate backward motion; a wrap requests one voxel step back.
    pub fn move_backward(&mut self, value: u8) {
        if self.moving.retreat(value) {
            let step = daphnia_ether::quantized_step(self.orientation(), &mut self.rng);
            self.request_move(self.position.saturating_sub(step));
        }
    }

    fn request_move(&mut self, destination: Vec3) {
        if destination == self.position {
            return;
        }
        tracing::debug!(slot = %self.slot, from = %self.position, to = %destination, "move requested");
        self.requested_move = Some(destination);
    }

    /// Accumulate leftward rotation; a wrap turns one degree.
    pub fn rotate_left(&mut self, value: u8) {
        if self.longitude_progress.retreat(value) {
            let lon = wrap_longitude(i32::from(self.longitude).saturating_sub(1));
            self.set_facing(self.latitude, i16::try_from(lon).unwrap_or(self.longitude));
        }
    }

    /// Accumulate rightward rotation; a wrap turns one degree.
    pub fn rotate_right(&mut self, value: u8) {
        if self.longitude_progress.advance(value) {
            let lon = wrap_longitude(i32::from(self.longitude).saturating_add(1));
            self.set_facing(self.latitude, i16::try_from(lon).unwrap_or(self.longitude));
        }
    }

    /// Accumulate upward rotation; a wrap tilts one degree, up to 90.
    pub fn rotate_up(&mut self, value: u8) {
        if self.latitude_progress.advance(value) && self.latitude < 90 {
            self.set_facing(self.latitude.saturating_add(1), self.longitude);
        }
    }

    /// Accumulate downward rotation; a wrap tilts one degree, down to -90.
    pub fn rotate_down(&mut self, value: u8) {
        if self.latitude_progress.retreat(value) && self.latitude > -90 {
            self.set_facing(self.latitude.saturating_sub(1), self.longitude);
        }
    }

    /// Point the observer at `(latitude, longitude)` and resample the eye.
    pub fn set_facing(&mut self, latitude: i16, longitude: i16) {
        self.latitude = latitude.clamp(-90, 90);
        self.longitude = i16::try_from(wrap_longitude(i32::from(longitude))).unwrap_or(0);
        self.eye.recompute(self.latitude, self.longitude);
        self.view_changed = true;
        self.admin_dirty = true;
    }

    /// Take the destination of a requested move, if any.
    pub const fn take_requested_move(&mut self) -> Option<Vec3> {
        self.requested_move.take()
    }

    /// Record that the driver moved the observer to `position`.
    pub const fn commit_move(&mut self, position: Vec3) {
        self.position = position;
        self.view_changed = true;
        self.admin_dirty = true;
    }

    /// Record an eaten crumb cluster with minimum corner `min_corner`.
    pub const fn record_eaten(&mut self, min_corner: Vec3) {
        self.eaten_crumbs = self.eaten_crumbs.saturating_add(1);
        self.last_eaten_crumb = min_corner;
    }

    /// Whether the visible volume may have changed since the last call.
    pub const fn take_view_changed(&mut self) -> bool {
        std::mem::replace(&mut self.view_changed, false)
    }

    /// Whether the admin observer should be told about this observer.
    pub const fn take_admin_update(&mut self) -> bool {
        let send = self.admin_dirty || self.first_send_to_admin;
        self.admin_dirty = false;
        self.first_send_to_admin = false;
        send
    }

    /// Force the next admin update (a new admin was registered).
    pub const fn mark_for_admin(&mut self) {
        self.first_send_to_admin = true;
    }

    /// Sort arriving photons: own echoes become pixels, the rest are returned.
    pub fn absorb(&mut self, arrivals: Vec<Photon>) -> Vec<Photon> {
        let size = u32::from(self.eye.size());
        let mut foreign = Vec::new();
        for photon in arrivals {
            if photon.origin != Some(self.slot) {
                foreign.push(photon);
                continue;
            }
            let (Some(y), Some(x)) = (photon.param.checked_div(size), photon.param.checked_rem(size))
            else {
                continue;
            };
            let (Ok(pixel_x), Ok(pixel_y)) = (u8::try_from(x), u8::try_from(y)) else {
                continue;
            };
            if pixel_y >= self.eye.size() || self.received.len() >= MAX_PENDING_PHOTONS {
                continue;
            }
            self.received.push(ReceivedPhoton {
                color: photon.color,
                pixel_x,
                pixel_y,
            });
        }
        foreign
    }

    /// Drain photons received since the last `GetState`.
    pub fn drain_received(&mut self) -> Vec<ReceivedPhoton> {
        std::mem::take(&mut self.received)
    }

    /// Photons waiting for the next `GetState`.
    pub fn pending_photons(&self) -> usize {
        self.received.len()
    }

    /// Emit one echolocation photon per eye pixel.
    ///
    /// Rows and columns are visited in independently shuffled orders so no
    /// pixel is systematically favored when emissions collide.
    pub fn echolocate(&mut self, ether: &Ether, tick: u64) -> usize {
        let size = self.eye.size();
        let mut rows: Vec<u8> = (0..size).collect();
        let mut cols: Vec<u8> = (0..size).collect();
        rows.shuffle(&mut self.rng);
        cols.shuffle(&mut self.rng);
        let mut emitted = 0_usize;
        for &y in &rows {
            for &x in &cols {
                let Some(direction) = self.eye.direction(x, y) else {
                    continue;
                };
                let param = u32::from(y)
                    .saturating_mul(u32::from(size))
                    .saturating_add(u32::from(x));
                let photon = Photon::new(Rgba::BLACK.with_alpha(ECHO_ALPHA), direction)
                    .from_observer(self.slot, param);
                ether.emit_photon(self.position, &photon, tick, &mut self.rng);
                emitted = emitted.saturating_add(1);
            }
        }
        emitted
    }

    /// Extended state for `GetStateExt`.
    pub const fn state_ext(&self) -> ServerMessage {
        ServerMessage::GetStateExtResponse {
            latitude: self.latitude,
            longitude: self.longitude,
            position: self.position,
            moving_progress: self.moving.value(),
            eaten_crumbs: self.eaten_crumbs,
            last_eaten_crumb: self.last_eaten_crumb,
        }
    }

    /// Position broadcast for the admin observer.
    pub const fn position_message(&self) -> ServerMessage {
        ServerMessage::ObserverPosition {
            observer_id: self.token,
            position: self.position,
            latitude: self.latitude,
            longitude: self.longitude,
        }
    }

    /// Rate ratios since the last call, which resets the window.
    pub fn take_rate_ratios(&mut self, tick: u64) -> RateRatios {
        let ticks = tick.saturating_sub(self.last_statistics_tick).max(1);
        let per_tick = u64::from(self.get_state_calls)
            .saturating_mul(1000)
            .checked_div(ticks)
            .unwrap_or(0);
        let skipped = u64::from(self.skipped_messages)
            .saturating_mul(1000)
            .checked_div(u64::from(self.honored_messages.max(1)))
            .unwrap_or(0);
        self.get_state_calls = 0;
        self.honored_messages = 0;
        self.skipped_messages = 0;
        self.last_statistics_tick = tick;
        RateRatios {
            client_server: u32::try_from(per_tick).unwrap_or(u32::MAX),
            server_client: u32::try_from(skipped).unwrap_or(u32::MAX),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use daphnia_ether::Bank;
    use daphnia_types::EtherKind;

    use super::*;

    fn observer(position: Vec3) -> Observer {
        Observer::new(
            ObserverSlot(0),
            SessionToken(77),
            ObserverKind::Small,
            position,
            4,
            1,
        )
        .unwrap()
    }

    #[test]
    fn forward_wrap_requests_step_along_facing() {
        let mut obs = observer(Vec3::new(2, 2, 2));
        obs.move_forward(200);
        assert_eq!(obs.take_requested_move(), None);
        obs.move_forward(200);
        assert_eq!(obs.take_requested_move(), Some(Vec3::new(3, 2, 2)));
        assert_eq!(obs.take_requested_move(), None);
    }

    #[test]
    fn backward_wrap_requests_step_against_facing() {
        let mut obs = observer(Vec3::new(2, 2, 2));
        obs.move_backward(1);
        assert_eq!(obs.take_requested_move(), Some(Vec3::new(1, 2, 2)));
        assert_eq!(obs.moving_progress(), 255);
    }

    #[test]
    fn latitude_is_clamped_at_the_pole() {
        let mut obs = observer(Vec3::ZERO);
        obs.set_facing(90, 0);
        obs.rotate_up(255);
        obs.rotate_up(255);
        assert_eq!(obs.latitude(), 90);
        obs.rotate_down(255);
        assert_eq!(obs.latitude(), 89);
    }

    #[test]
    fn longitude_wraps_around() {
        let mut obs = observer(Vec3::ZERO);
        obs.set_facing(0, -179);
        obs.rotate_left(1);
        assert_eq!(obs.longitude(), 180);
        obs.rotate_right(255);
        assert_eq!(obs.longitude(), -179);
    }

    #[test]
    fn duplicates_are_skipped_and_counted() {
        let mut obs = observer(Vec3::ZERO);
        obs.begin_intake();
        assert!(obs.accept(client_type::GET_STATE));
        assert!(!obs.accept(client_type::GET_STATE));
        assert!(!obs.accept(client_type::GET_STATE));
        assert!(obs.accept(client_type::MOVE_FORWARD));
        obs.begin_intake();
        assert!(obs.accept(client_type::GET_STATE));
        let ratios = obs.take_rate_ratios(2);
        assert_eq!(ratios.client_server, 1000);
        assert_eq!(ratios.server_client, 666);
        assert_eq!(obs.take_rate_ratios(3), RateRatios::default());
    }

    #[test]
    fn own_echoes_become_pixels_and_others_are_returned() {
        let mut obs = observer(Vec3::ZERO);
        let own = Photon::new(Rgba::RED, OrientationVector::default())
            .from_observer(ObserverSlot(0), 6);
        let other = Photon::new(Rgba::BLUE, OrientationVector::default())
            .from_observer(ObserverSlot(1), 6);
        let stray = Photon::new(Rgba::GREEN, OrientationVector::default());
        let foreign = obs.absorb(vec![own, other, stray]);
        assert_eq!(foreign, vec![other, stray]);
        let pixels = obs.drain_received();
        assert_eq!(
            pixels,
            vec![ReceivedPhoton {
                color: Rgba::RED,
                pixel_x: 2,
                pixel_y: 1
            }]
        );
        assert!(obs.drain_received().is_empty());
    }

    #[test]
    fn echolocation_emits_one_photon_per_pixel() {
        let ether = Ether::new(Vec3::splat(9)).unwrap();
        let mut obs = observer(Vec3::splat(4));
        ether
            .init_cell(obs.position(), EtherKind::Observer, obs.color())
            .unwrap();
        let emitted = obs.echolocate(&ether, 0);
        assert_eq!(emitted, 16);
        let landed = ether.photon_snapshot(Bank::next(0));
        assert!(!landed.is_empty());
        assert!(landed.len() <= 16);
        for (_, _, photon) in landed {
            assert_eq!(photon.origin, Some(ObserverSlot(0)));
            assert!(photon.param < 16);
            assert_eq!(photon.color.a, ECHO_ALPHA);
        }
    }

    #[test]
    fn admin_update_fires_once_then_on_change() {
        let mut obs = observer(Vec3::ZERO);
        assert!(obs.take_admin_update());
        assert!(!obs.take_admin_update());
        obs.commit_move(Vec3::new(1, 0, 0));
        assert!(obs.take_admin_update());
        obs.mark_for_admin();
        assert!(obs.take_admin_update());
    }
}
