//! Error types for chie-leveling.

use thiserror::Error;

/// Result type for leveling operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by curve construction and checked lookups.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// Negative XP passed to a checked lookup.
    #[error("invalid argument: XP must be non-negative, got {0}")]
    InvalidArgument(i64),

    /// Curve parameters that cannot produce a strictly increasing threshold sequence.
    #[error("invalid level curve: {0}")]
    InvalidCurve(String),
}
