//! Crumb clusters: consumption by flood fill and the admin scan cursor.

use std::collections::VecDeque;

use daphnia_types::{EtherKind, Rgba, Vec3};
use serde::{Deserialize, Serialize};

use crate::ether::Ether;

/// The six face neighbors of a cell.
const FACE_NEIGHBORS: [Vec3; 6] = [
    Vec3::new(1, 0, 0),
    Vec3::new(-1, 0, 0),
    Vec3::new(0, 1, 0),
    Vec3::new(0, -1, 0),
    Vec3::new(0, 0, 1),
    Vec3::new(0, 0, -1),
];

/// A crumb cluster that was eaten.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EatenCluster {
    /// Number of crumb cells turned into space.
    pub cells: usize,
    /// Component-wise minimum over the cluster's cells.
    pub min_corner: Vec3,
}

/// Clear the 6-connected crumb cluster containing `start`.
///
/// Every reached crumb becomes [`EtherKind::Space`]. Returns `None` when
/// `start` is not a crumb, which makes a second call on the same spot a
/// no-op.
pub fn consume_crumb_cluster(ether: &Ether, start: Vec3) -> Option<EatenCluster> {
    if ether.kind_at(start)? != EtherKind::Crumb {
        return None;
    }
    let mut queue = VecDeque::from([start]);
    clear(ether, start);
    let mut cluster = EatenCluster {
        cells: 0,
        min_corner: start,
    };
    while let Some(pos) = queue.pop_front() {
        cluster.cells = cluster.cells.saturating_add(1);
        cluster.min_corner = cluster.min_corner.min_each(pos);
        for offset in FACE_NEIGHBORS {
            let next = pos.saturating_add(offset);
            if ether.kind_at(next) == Some(EtherKind::Crumb) {
                clear(ether, next);
                queue.push_back(next);
            }
        }
    }
    Some(cluster)
}

fn clear(ether: &Ether, pos: Vec3) {
    if let Some(cell) = ether.cell(pos) {
        cell.reset(EtherKind::Space, Rgba::TRANSPARENT);
    }
}

/// A found crumb.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrumbLocation {
    /// Cell position.
    pub position: Vec3,
    /// Crumb color.
    pub color: Rgba,
}

/// Persistent scan over the universe for crumbs, in storage order.
///
/// Each call to [`CrumbCursor::next_crumb`] resumes after the previously
/// returned cell. At the end of the universe the cursor stays exhausted.
#[derive(Debug, Clone, Copy, Default)]
pub struct CrumbCursor {
    next_index: usize,
}

impl CrumbCursor {
    /// A cursor at the start of the universe.
    pub const fn new() -> Self {
        Self { next_index: 0 }
    }

    /// Find the next crumb.
    pub fn next_crumb(&mut self, ether: &Ether) -> Option<CrumbLocation> {
        while self.next_index < ether.cell_count() {
            let index = self.next_index;
            self.next_index = index.saturating_add(1);
            let Some(cell) = ether.cell_at_index(index) else {
                break;
            };
            if cell.kind() == EtherKind::Crumb {
                return Some(CrumbLocation {
                    position: ether.position_of(index)?,
                    color: cell.color(),
                });
            }
        }
        None
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn crumb(ether: &Ether, pos: Vec3) {
        ether.init_cell(pos, EtherKind::Crumb, Rgba::RED).unwrap();
    }

    #[test]
    fn clears_connected_component_only() {
        let ether = Ether::new(Vec3::splat(5)).unwrap();
        crumb(&ether, Vec3::new(1, 1, 1));
        crumb(&ether, Vec3::new(2, 1, 1));
        crumb(&ether, Vec3::new(2, 2, 1));
        crumb(&ether, Vec3::new(2, 2, 0));
        // Diagonal only: not 6-connected.
        crumb(&ether, Vec3::new(3, 3, 3));

        let eaten = consume_crumb_cluster(&ether, Vec3::new(2, 2, 1)).unwrap();
        assert_eq!(eaten.cells, 4);
        assert_eq!(eaten.min_corner, Vec3::new(1, 1, 0));
        assert_eq!(ether.kind_at(Vec3::new(1, 1, 1)), Some(EtherKind::Space));
        assert_eq!(ether.kind_at(Vec3::new(3, 3, 3)), Some(EtherKind::Crumb));
    }

    #[test]
    fn second_fill_is_a_no_op() {
        let ether = Ether::new(Vec3::splat(3)).unwrap();
        crumb(&ether, Vec3::new(0, 0, 0));
        crumb(&ether, Vec3::new(0, 0, 1));
        assert!(consume_crumb_cluster(&ether, Vec3::ZERO).is_some());
        assert_eq!(consume_crumb_cluster(&ether, Vec3::ZERO), None);
        assert_eq!(consume_crumb_cluster(&ether, Vec3::new(0, 0, 1)), None);
    }

    #[test]
    fn out_of_bounds_start_is_none() {
        let ether = Ether::new(Vec3::splat(3)).unwrap();
        assert_eq!(consume_crumb_cluster(&ether, Vec3::new(-1, 0, 0)), None);
    }

    #[test]
    fn cursor_walks_crumbs_in_storage_order() {
        let ether = Ether::new(Vec3::splat(3)).unwrap();
        crumb(&ether, Vec3::new(2, 0, 0));
        ether
            .init_cell(Vec3::new(0, 1, 2), EtherKind::Crumb, Rgba::BLUE)
            .unwrap();
        let mut cursor = CrumbCursor::new();
        let first = cursor.next_crumb(&ether).unwrap();
        assert_eq!(first.position, Vec3::new(0, 1, 2));
        assert_eq!(first.color, Rgba::BLUE);
        assert_eq!(cursor.next_crumb(&ether).unwrap().position, Vec3::new(2, 0, 0));
        assert_eq!(cursor.next_crumb(&ether), None);
        assert_eq!(cursor.next_crumb(&ether), None);
    }
}
