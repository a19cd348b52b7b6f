// =============================================================================
// Error Types
// =============================================================================
//
// One error enum for the whole library. Statistic requests fail with a
// `DifError` instead of panicking or silently returning zero; the engine's
// accumulated counts are never affected by a failed request.
//
// =============================================================================

use thiserror::Error;

/// Result alias used throughout `difstats-core`.
pub type Result<T> = std::result::Result<T, DifError>;

/// Errors produced by the DIF engine and the item-level analysis.
///
/// Errors are `Clone` so that per-item analysis results can carry them.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DifError {
    /// An increment named a group that is neither the focal nor the
    /// reference label the engine was built with.
    #[error("unknown group '{group}': expected '{focal}' (focal) or '{reference}' (reference)")]
    UnknownGroup {
        group: String,
        focal: String,
        reference: String,
    },

    /// No usable strata: every stratum is degenerate, or the engine is empty.
    #[error("insufficient data: {0}")]
    InsufficientData(String),

    /// A negative or non-finite frequency, a non-finite score, or an
    /// out-of-range configuration value.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// An exported frequency record could not be replayed.
    #[error("invalid frequency record: {0}")]
    InvalidRecord(String),

    /// Input arrays have incompatible shapes.
    #[error("dimension mismatch: {0}")]
    DimensionMismatch(String),

    /// Input arrays are empty.
    #[error("empty input: {0}")]
    EmptyInput(String),
}
