//! Universe persistence.
//!
//! A universe file holds one byte per logical voxel, the [`EtherKind`]
//! byte, in x-major then y then z order. Nothing else is stored: colors
//! are regenerated on load (crumbs get a random palette color, blocks a
//! fixed gray) and photon state is discarded.
//!
//! The physical grid is the logical grid multiplied by an integer scale,
//! so one logical voxel fills a `scale^3` block of cells. Saving samples
//! the lowest corner of each block. Observers are not persisted; their
//! cells are written as space.

use std::path::Path;

use daphnia_types::{EtherKind, Rgba, Vec3};
use rand::Rng;
use rand::seq::IndexedRandom;
use tracing::info;

use crate::error::EtherError;
use crate::ether::Ether;

/// Gray level of loaded blocks.
pub const BLOCK_GRAY: u8 = 50;

/// What a load produced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadSummary {
    /// Logical voxels read.
    pub voxels: usize,
    /// Logical crumb voxels.
    pub crumbs: usize,
    /// Logical block voxels.
    pub blocks: usize,
}

/// Logical extents of `ether` at `scale`.
pub fn logical_size(ether: &Ether, scale: i32) -> Result<Vec3, EtherError> {
    let size = ether.size();
    let invalid = EtherError::InvalidScale { scale, size };
    if scale < 1 {
        return Err(invalid);
    }
    let divide = |extent: i32| -> Option<i32> {
        (extent.checked_rem(scale)? == 0).then(|| extent.checked_div(scale))?
    };
    match (divide(size.x), divide(size.y), divide(size.z)) {
        (Some(x), Some(y), Some(z)) => Ok(Vec3::new(x, y, z)),
        _ => Err(invalid),
    }
}

/// Serialize the universe at `scale`.
pub fn encode_universe(ether: &Ether, scale: i32) -> Result<Vec<u8>, EtherError> {
    let logical = logical_size(ether, scale)?;
    let mut bytes = Vec::with_capacity(logical.volume().unwrap_or(0));
    for x in 0..logical.x {
        for y in 0..logical.y {
            for z in 0..logical.z {
                let physical = Vec3::new(x, y, z).saturating_scale(scale);
                let kind = match ether.kind_at(physical).unwrap_or_default() {
                    EtherKind::Observer => EtherKind::Space,
                    other => other,
                };
                bytes.push(kind.as_byte());
            }
        }
    }
    Ok(bytes)
}

/// Populate the universe from serialized bytes at `scale`.
pub fn decode_universe<R: Rng + ?Sized>(
    ether: &Ether,
    scale: i32,
    bytes: &[u8],
    rng: &mut R,
) -> Result<LoadSummary, EtherError> {
    let logical = logical_size(ether, scale)?;
    let expected = logical.volume().unwrap_or(0);
    if bytes.len() != expected {
        return Err(EtherError::SizeMismatch {
            expected,
            actual: bytes.len(),
        });
    }

    let mut summary = LoadSummary::default();
    let mut offset = 0_usize;
    for x in 0..logical.x {
        for y in 0..logical.y {
            for z in 0..logical.z {
                let byte = bytes.get(offset).copied().unwrap_or_default();
                let kind = EtherKind::from_byte(byte)
                    .ok_or(EtherError::UnknownKind { byte, offset })?;
                offset = offset.saturating_add(1);
                let (kind, color) = match kind {
                    EtherKind::Crumb => {
                        summary.crumbs = summary.crumbs.saturating_add(1);
                        let color = Rgba::CRUMB_PALETTE
                            .choose(rng)
                            .copied()
                            .unwrap_or(Rgba::RED);
                        (EtherKind::Crumb, color)
                    }
                    EtherKind::Block => {
                        summary.blocks = summary.blocks.saturating_add(1);
                        (EtherKind::Block, Rgba::gray(BLOCK_GRAY))
                    }
                    EtherKind::Space | EtherKind::Observer => (EtherKind::Space, Rgba::TRANSPARENT),
                };
                fill_block(ether, Vec3::new(x, y, z), scale, kind, color)?;
            }
        }
    }
    summary.voxels = offset;
    Ok(summary)
}

fn fill_block(
    ether: &Ether,
    logical: Vec3,
    scale: i32,
    kind: EtherKind,
    color: Rgba,
) -> Result<(), EtherError> {
    let base = logical.saturating_scale(scale);
    for dx in 0..scale {
        for dy in 0..scale {
            for dz in 0..scale {
                ether.init_cell(base.saturating_add(Vec3::new(dx, dy, dz)), kind, color)?;
            }
        }
    }
    Ok(())
}

/// Write the universe to `path`.
pub fn save_universe(ether: &Ether, scale: i32, path: &Path) -> Result<(), EtherError> {
    let bytes = encode_universe(ether, scale)?;
    std::fs::write(path, &bytes).map_err(|source| EtherError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    info!(path = %path.display(), voxels = bytes.len(), "universe saved");
    Ok(())
}

/// Read the universe from `path`.
pub fn load_universe<R: Rng + ?Sized>(
    ether: &Ether,
    scale: i32,
    path: &Path,
    rng: &mut R,
) -> Result<LoadSummary, EtherError> {
    let bytes = std::fs::read(path).map_err(|source| EtherError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let summary = decode_universe(ether, scale, &bytes, rng)?;
    info!(
        path = %path.display(),
        voxels = summary.voxels,
        crumbs = summary.crumbs,
        blocks = summary.blocks,
        "universe loaded"
    );
    Ok(summary)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    use super::*;

    #[test]
    fn scale_must_divide_extents() {
        let ether = Ether::new(Vec3::new(4, 4, 6)).unwrap();
        assert_eq!(logical_size(&ether, 2).unwrap(), Vec3::new(2, 2, 3));
        assert!(logical_size(&ether, 3).is_err());
        assert!(logical_size(&ether, 0).is_err());
    }

    #[test]
    fn load_replicates_each_voxel_by_scale() {
        let ether = Ether::new(Vec3::new(4, 2, 2)).unwrap();
        let mut rng = SmallRng::seed_from_u64(1);
        // Logical 2x1x1: block then crumb.
        let summary = decode_universe(&ether, 2, &[2, 1], &mut rng).unwrap();
        assert_eq!(summary.blocks, 1);
        assert_eq!(summary.crumbs, 1);
        for pos in ether.positions() {
            let expected = if pos.x < 2 {
                EtherKind::Block
            } else {
                EtherKind::Crumb
            };
            assert_eq!(ether.kind_at(pos), Some(expected));
        }
        assert_eq!(ether.color_at(Vec3::ZERO), Some(Rgba::gray(BLOCK_GRAY)));
        let crumb_color = ether.color_at(Vec3::new(3, 1, 1)).unwrap();
        assert!(Rgba::CRUMB_PALETTE.contains(&crumb_color));
    }

    #[test]
    fn save_then_load_preserves_kinds_and_drops_observers() {
        let ether = Ether::new(Vec3::new(2, 2, 2)).unwrap();
        ether.init_cell(Vec3::new(1, 0, 1), EtherKind::Block, Rgba::gray(50)).unwrap();
        ether.init_cell(Vec3::new(0, 1, 0), EtherKind::Observer, Rgba::WHITE).unwrap();
        let bytes = encode_universe(&ether, 1).unwrap();
        assert_eq!(bytes, vec![0, 0, 0, 0, 0, 2, 0, 0]);

        let path = std::env::temp_dir().join(format!("daphnia-persist-{}.bin", std::process::id()));
        save_universe(&ether, 1, &path).unwrap();
        let reloaded = Ether::new(Vec3::new(2, 2, 2)).unwrap();
        let mut rng = SmallRng::seed_from_u64(2);
        load_universe(&reloaded, 1, &path, &mut rng).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(reloaded.kind_at(Vec3::new(1, 0, 1)), Some(EtherKind::Block));
        assert_eq!(reloaded.kind_at(Vec3::new(0, 1, 0)), Some(EtherKind::Space));
    }

    #[test]
    fn rejects_bad_bytes_and_lengths() {
        let ether = Ether::new(Vec3::splat(1)).unwrap();
        let mut rng = SmallRng::seed_from_u64(3);
        assert!(matches!(
            decode_universe(&ether, 1, &[9], &mut rng),
            Err(EtherError::UnknownKind { byte: 9, offset: 0 })
        ));
        assert!(matches!(
            decode_universe(&ether, 1, &[], &mut rng),
            Err(EtherError::SizeMismatch { expected: 1, actual: 0 })
        ));
    }

    #[test]
    fn missing_file_is_io_error() {
        let ether = Ether::new(Vec3::splat(1)).unwrap();
        let mut rng = SmallRng::seed_from_u64(3);
        let path = Path::new("/nonexistent/daphnia/universe.bin");
        assert!(matches!(
            load_universe(&ether, 1, path, &mut rng),
            Err(EtherError::Io { .. })
        ));
    }
}
