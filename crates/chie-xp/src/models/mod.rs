//! Data model for the experience engine.
//!
//! # Persisted
//!
//! - [`UserAggregate`] - cached per-user XP and level, one per user
//! - [`ActivityEntry`] - immutable ledger fact, many per user
//!
//! # Derived
//!
//! - [`LeaderboardRow`] - positional ranking row, computed on demand
//!
//! # Identifiers
//!
//! - [`UserId`] - validated user identifier (owned by the account service)
//! - [`EntryId`] - globally monotonic ledger sequence number
//! - [`ActionKind`] - closed set of XP-granting actions

mod activity;
mod leaderboard;
mod user;

pub use activity::{ActionKind, ActivityEntry, EntryId, PendingEntry};
pub use leaderboard::{LeaderboardRow, RankMode};
pub use user::{UserAggregate, UserId};

/// Milliseconds since the Unix epoch.
pub fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
