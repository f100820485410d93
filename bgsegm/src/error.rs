//! Error types for the background segmentation crate

use thiserror::Error;

/// Result type alias for background segmentation operations
pub type Result<T> = std::result::Result<T, BgSegmError>;

/// Errors that can occur during background model operations
///
/// All of these are precondition failures; the model has no recoverable
/// error states.
#[derive(Error, Debug)]
pub enum BgSegmError {
    #[error("{what} dimensions do not match the model: expected {expected:?}, got {actual:?}")]
    DimensionMismatch {
        what: &'static str,
        expected: (u32, u32),
        actual: (u32, u32),
    },

    #[error("background model is not initialized; segment a seed frame first")]
    NotInitialized,
}
