//! Error types for the daphnia-observer crate.

/// Errors that can occur while creating or driving an observer.
#[derive(Debug, thiserror::Error)]
pub enum ObserverError {
    /// The requested eye resolution is outside `1..=16`.
    #[error("eye size {eye_size} is outside 1..={max}")]
    InvalidEyeSize {
        /// The rejected eye size.
        eye_size: u8,
        /// Largest supported eye size.
        max: u8,
    },
}
