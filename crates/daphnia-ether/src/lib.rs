//! The voxel grid ("ether") and photon propagation for the Daphnia universe.
//!
//! The ether is a dense 3D array of cells. Each cell has a kind, a body
//! color, and two banks of 26 directional photon slots; the bank selected
//! by the tick's parity is read while the other is written. Worker threads
//! share the grid by reference and only touch atomics, so no cell is ever
//! locked.
//!
//! # Modules
//!
//! - [`cell`] -- [`Cell`], its photon banks, and the [`Photon`] value.
//! - [`direction`] -- Quantized lattice steps and the 26-slot index.
//! - [`ether`] -- The grid: bounds checks, cell access, snapshots.
//! - [`propagation`] -- Emission, reflection, weakening, and the per-box
//!   worker pass.
//! - [`crumbs`] -- Crumb-cluster flood fill and the admin crumb cursor.
//! - [`persist`] -- One-byte-per-voxel universe files with scale
//!   replication.
//! - [`random`] -- Deterministic per-cell random streams.
//! - [`error`] -- Error types for grid operations.

pub mod cell;
pub mod crumbs;
pub mod direction;
pub mod error;
pub mod ether;
pub mod persist;
pub mod propagation;
pub mod random;

// Re-export primary types at crate root.
pub use cell::{Bank, Cell, Photon, PhotonSlot};
pub use crumbs::{CrumbCursor, CrumbLocation, EatenCluster, consume_crumb_cluster};
pub use direction::{SLOT_COUNT, photon_slot_index, quantized_step, unit_vector_from_index};
pub use error::EtherError;
pub use ether::{DEFAULT_WEAKENING, Ether};
pub use persist::{LoadSummary, load_universe, save_universe};
pub use propagation::{EmitOutcome, PropagationStats, StepOutcome};
