//! Error types for the experience engine.

use crate::models::UserId;
use thiserror::Error;

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in engine operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Action kind missing from the XP policy table
    #[error("unknown action kind: {0}")]
    UnknownActionKind(String),

    /// Grant targets a user with no aggregate and implicit creation was off
    #[error("user not found: {0}")]
    UserNotFound(UserId),

    /// Invalid input
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// XP total would leave the representable range
    #[error("XP overflow for {user}: {total} + {amount}")]
    Overflow {
        user: UserId,
        total: u64,
        amount: i64,
    },

    /// Persistence collaborator failed
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    /// Ledger and aggregate disagree
    #[error("inconsistent aggregate for {user}: ledger sum {ledger_xp}, aggregate {aggregate_xp}")]
    Inconsistent {
        user: UserId,
        ledger_xp: i64,
        aggregate_xp: u64,
    },

    /// Compare-and-swap retries exhausted
    #[error("concurrent update conflict for {user} after {attempts} attempts")]
    Conflict { user: UserId, attempts: u32 },

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether the caller may retry the same call.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::StorageUnavailable(_) | Error::Conflict { .. })
    }
}

impl From<rocksdb::Error> for Error {
    fn from(e: rocksdb::Error) -> Self {
        Error::StorageUnavailable(e.to_string())
    }
}

impl From<chie_leveling::Error> for Error {
    fn from(e: chie_leveling::Error) -> Self {
        Error::InvalidArgument(e.to_string())
    }
}
