//! Error types for the `daphnia-ether` crate.

use std::path::PathBuf;

use daphnia_types::Vec3;

/// Errors that can occur during grid operations.
#[derive(Debug, thiserror::Error)]
pub enum EtherError {
    /// A coordinate lies outside the universe.
    #[error("position {position} is outside universe of size {size}")]
    OutOfBounds {
        /// The rejected position.
        position: Vec3,
        /// Universe extents.
        size: Vec3,
    },

    /// Universe extents must be strictly positive and addressable.
    #[error("invalid universe size {size}")]
    InvalidSize {
        /// The rejected extents.
        size: Vec3,
    },

    /// The universe scale must be at least 1 and divide every extent.
    #[error("invalid universe scale {scale} for size {size}")]
    InvalidScale {
        /// The rejected scale.
        scale: i32,
        /// Physical universe extents.
        size: Vec3,
    },

    /// Reading or writing a universe file failed.
    #[error("universe file {path:?}: {source}")]
    Io {
        /// File path.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// A universe file contained a byte that is not a cell kind.
    #[error("unknown cell kind byte {byte} at offset {offset}")]
    UnknownKind {
        /// The offending byte.
        byte: u8,
        /// Byte offset in the file.
        offset: usize,
    },

    /// A universe file does not match the logical universe size.
    #[error("universe data has {actual} bytes, expected {expected}")]
    SizeMismatch {
        /// Logical voxel count.
        expected: usize,
        /// Bytes provided.
        actual: usize,
    },
}
