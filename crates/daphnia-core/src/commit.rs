//! Applying requested observer moves to the grid.
//!
//! Runs on the driver after the tick barrier, when no worker is touching
//! the grid. Observers are processed in slot order and each commit sees
//! the positions left by earlier ones.

use daphnia_ether::{Ether, consume_crumb_cluster};
use daphnia_types::{EtherKind, ObserverSlot, Rgba, SessionToken, Vec3};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::observers::ObserverTable;

/// Why a requested move was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveRejection {
    /// Destination lies outside the universe.
    OutOfBounds,
    /// Destination cell is neither space nor a crumb.
    Blocked(EtherKind),
    /// Destination would overlap another observer's body.
    Crowded(SessionToken),
}

/// Outcome of one commit pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CommitSummary {
    /// Observers that changed cell.
    pub moved: u32,
    /// Moves refused.
    pub rejected: u32,
    /// Crumb clusters eaten.
    pub crumbs_eaten: u32,
}

/// Check whether an observer of the given slot and body radius may enter `destination`.
pub fn check_destination(
    ether: &Ether,
    observers: &ObserverTable,
    slot: ObserverSlot,
    radius: u32,
    destination: Vec3,
) -> Result<EtherKind, MoveRejection> {
    let kind = ether.kind_at(destination).ok_or(MoveRejection::OutOfBounds)?;
    if !kind.is_passable() {
        return Err(MoveRejection::Blocked(kind));
    }
    if let Some(other) = observers.crowds(destination, radius, Some(slot)) {
        return Err(MoveRejection::Crowded(other));
    }
    Ok(kind)
}

/// Apply every pending move request.
pub fn commit_moves(ether: &Ether, observers: &mut ObserverTable) -> CommitSummary {
    let mut summary = CommitSummary::default();
    for slot in observers.occupied_slots() {
        let Some(destination) = observers.get_mut(slot).and_then(|obs| obs.take_requested_move())
        else {
            continue;
        };
        let Some((from, radius, color)) = observers
            .get(slot)
            .map(|obs| (obs.position(), obs.kind().radius(), obs.color()))
        else {
            continue;
        };

        let kind = match check_destination(ether, observers, slot, radius, destination) {
            Ok(kind) => kind,
            Err(reason) => {
                debug!(%slot, %from, to = %destination, ?reason, "move rejected");
                summary.rejected = summary.rejected.saturating_add(1);
                continue;
            }
        };

        let eaten = if kind == EtherKind::Crumb {
            consume_crumb_cluster(ether, destination)
        } else {
            None
        };

        if let Err(err) = ether
            .retype_cell(from, EtherKind::Space, Rgba::TRANSPARENT)
            .and_then(|()| ether.retype_cell(destination, EtherKind::Observer, color))
        {
            warn!(%slot, error = %err, "failed to move observer cell");
            continue;
        }

        if let Some(obs) = observers.get_mut(slot) {
            obs.commit_move(destination);
            if let Some(cluster) = eaten {
                obs.record_eaten(cluster.min_corner);
                summary.crumbs_eaten = summary.crumbs_eaten.saturating_add(1);
                info!(
                    %slot,
                    cells = cluster.cells,
                    corner = %cluster.min_corner,
                    total = obs.eaten_crumbs(),
                    "crumb cluster eaten"
                );
            }
        }
        summary.moved = summary.moved.saturating_add(1);
    }
    summary
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use daphnia_ether::{Bank, Photon};
    use daphnia_observer::Observer;
    use daphnia_types::{ObserverKind, OrientationVector};

    use super::*;

    fn attach(ether: &Ether, table: &mut ObserverTable, slot: u32, kind: ObserverKind, at: Vec3) {
        let obs = Observer::new(ObserverSlot(slot), SessionToken(u64::from(slot).saturating_add(1)), kind, at, 2, 0)
            .unwrap();
        ether.init_cell(at, EtherKind::Observer, obs.color()).unwrap();
        assert!(table.insert(obs));
    }

    fn request_forward(table: &mut ObserverTable, slot: u32) {
        let obs = table.get_mut(ObserverSlot(slot)).unwrap();
        obs.move_forward(255);
        obs.move_forward(1);
    }

    #[test]
    fn move_into_space_swaps_cells() {
        let ether = Ether::new(Vec3::new(5, 3, 3)).unwrap();
        let mut table = ObserverTable::new(1);
        attach(&ether, &mut table, 0, ObserverKind::Small, Vec3::new(1, 1, 1));
        request_forward(&mut table, 0);

        let summary = commit_moves(&ether, &mut table);
        assert_eq!(summary.moved, 1);
        assert_eq!(ether.kind_at(Vec3::new(1, 1, 1)), Some(EtherKind::Space));
        assert_eq!(ether.kind_at(Vec3::new(2, 1, 1)), Some(EtherKind::Observer));
        assert_eq!(table.get(ObserverSlot(0)).unwrap().position(), Vec3::new(2, 1, 1));
    }

    #[test]
    fn photons_in_transit_survive_a_move() {
        let ether = Ether::new(Vec3::new(5, 3, 3)).unwrap();
        let mut table = ObserverTable::new(1);
        attach(&ether, &mut table, 0, ObserverKind::Small, Vec3::new(1, 1, 1));
        let photon = Photon::new(Rgba::RED, OrientationVector::new(-1, 0, 0));
        assert!(ether.place_photon(Vec3::new(2, 1, 1), Bank::Odd, 3, &photon));
        request_forward(&mut table, 0);

        assert_eq!(commit_moves(&ether, &mut table).moved, 1);
        assert_eq!(ether.kind_at(Vec3::new(2, 1, 1)), Some(EtherKind::Observer));
        let arrived = ether.take_photons(Vec3::new(2, 1, 1), Bank::Odd);
        assert_eq!(arrived.len(), 1);
        assert_eq!(arrived[0].color, Rgba::RED);
    }

    #[test]
    fn blocks_and_edges_refuse_moves() {
        let ether = Ether::new(Vec3::new(3, 3, 3)).unwrap();
        let mut table = ObserverTable::new(1);
        attach(&ether, &mut table, 0, ObserverKind::Small, Vec3::new(1, 1, 1));
        ether.init_cell(Vec3::new(2, 1, 1), EtherKind::Block, Rgba::gray(50)).unwrap();
        request_forward(&mut table, 0);
        assert_eq!(commit_moves(&ether, &mut table).rejected, 1);

        table.get_mut(ObserverSlot(0)).unwrap().set_facing(0, 180);
        ether.init_cell(Vec3::new(1, 1, 1), EtherKind::Space, Rgba::TRANSPARENT).unwrap();
        ether.init_cell(Vec3::new(0, 1, 1), EtherKind::Observer, Rgba::WHITE).unwrap();
        table.get_mut(ObserverSlot(0)).unwrap().commit_move(Vec3::new(0, 1, 1));
        request_forward(&mut table, 0);
        let summary = commit_moves(&ether, &mut table);
        assert_eq!(summary.rejected, 1);
        assert_eq!(table.get(ObserverSlot(0)).unwrap().position(), Vec3::new(0, 1, 1));
    }

    #[test]
    fn big_observers_keep_their_distance() {
        let ether = Ether::new(Vec3::new(9, 5, 5)).unwrap();
        let mut table = ObserverTable::new(2);
        attach(&ether, &mut table, 0, ObserverKind::Small, Vec3::new(2, 2, 2));
        attach(&ether, &mut table, 1, ObserverKind::Big, Vec3::new(5, 2, 2));
        request_forward(&mut table, 0);
        let summary = commit_moves(&ether, &mut table);
        assert_eq!(summary.rejected, 0);
        request_forward(&mut table, 0);
        let summary = commit_moves(&ether, &mut table);
        assert_eq!(summary.rejected, 1);
        assert_eq!(table.get(ObserverSlot(0)).unwrap().position(), Vec3::new(3, 2, 2));
    }

    #[test]
    fn entering_a_crumb_eats_its_cluster() {
        let ether = Ether::new(Vec3::new(6, 3, 3)).unwrap();
        let mut table = ObserverTable::new(1);
        attach(&ether, &mut table, 0, ObserverKind::Small, Vec3::new(1, 1, 1));
        for pos in [Vec3::new(2, 1, 1), Vec3::new(3, 1, 1), Vec3::new(3, 0, 1)] {
            ether.init_cell(pos, EtherKind::Crumb, Rgba::GREEN).unwrap();
        }
        request_forward(&mut table, 0);
        let summary = commit_moves(&ether, &mut table);
        assert_eq!(summary.crumbs_eaten, 1);
        let obs = table.get(ObserverSlot(0)).unwrap();
        assert_eq!(obs.eaten_crumbs(), 1);
        assert_eq!(obs.last_eaten_crumb(), Vec3::new(2, 0, 1));
        assert_eq!(ether.kind_at(Vec3::new(3, 0, 1)), Some(EtherKind::Space));
        assert_eq!(ether.kind_at(Vec3::new(2, 1, 1)), Some(EtherKind::Observer));
    }
}
