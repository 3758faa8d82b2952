//! User identity and the cached XP aggregate.

use crate::error::{Error, Result};
use chie_leveling::{LevelCurve, LevelProgress};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Maximum length of a user identifier in characters.
pub const MAX_USER_ID_LEN: usize = 128;

/// Stable user identifier issued by the account service.
///
/// Non-empty, at most [`MAX_USER_ID_LEN`] characters, no `:`, whitespace or
/// control characters. Ordering is byte-lexicographic and is the
/// leaderboard tie-break.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct UserId(String);

impl UserId {
    /// Validate and wrap an identifier.
    pub fn parse(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        let len = id.chars().count();
        if len == 0 || len > MAX_USER_ID_LEN {
            return Err(Error::InvalidArgument(format!(
                "user id must be 1..={} characters, got {}",
                MAX_USER_ID_LEN, len
            )));
        }
        if let Some(c) = id
            .chars()
            .find(|c| *c == ':' || c.is_whitespace() || c.is_control())
        {
            return Err(Error::InvalidArgument(format!(
                "user id contains forbidden character {:?}",
                c
            )));
        }
        Ok(Self(id))
    }

    /// Borrow the raw identifier.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for UserId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for UserId {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(value)
    }
}

impl From<UserId> for String {
    fn from(value: UserId) -> Self {
        value.0
    }
}

/// Cached per-user XP summary, a materialized view over the ledger.
///
/// `level`, `current_level_xp` and `xp_to_next_level` are always derived
/// from `total_xp` through the engine's [`LevelCurve`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserAggregate {
    /// Owner of the aggregate
    pub user_id: UserId,

    /// Cumulative XP
    pub total_xp: u64,

    /// Derived level (>= 1)
    pub level: u64,

    /// XP earned inside the current level
    pub current_level_xp: u64,

    /// XP still needed for the next level
    pub xp_to_next_level: u64,

    /// Number of ledger entries applied; compare-and-swap version
    #[serde(default)]
    pub entry_count: u64,

    /// Creation time (ms since epoch)
    pub created_at: u64,

    /// Last grant time (ms since epoch)
    pub updated_at: u64,
}

impl UserAggregate {
    /// Fresh aggregate at 0 XP.
    pub fn new(user_id: UserId, curve: &LevelCurve, now: u64) -> Self {
        let mut aggregate = Self {
            user_id,
            total_xp: 0,
            level: 1,
            current_level_xp: 0,
            xp_to_next_level: 0,
            entry_count: 0,
            created_at: now,
            updated_at: now,
        };
        aggregate.refresh(curve);
        aggregate
    }

    /// Successor state after one more ledger entry bringing the total to `total_xp`.
    pub fn advanced(&self, total_xp: u64, curve: &LevelCurve, now: u64) -> Self {
        let mut next = self.clone();
        next.total_xp = total_xp;
        next.entry_count = self.entry_count + 1;
        next.updated_at = now;
        next.refresh(curve);
        next
    }

    /// Recompute the cached level fields from `total_xp`.
    pub fn refresh(&mut self, curve: &LevelCurve) {
        let progress = curve.progress(self.total_xp);
        self.level = progress.level;
        self.current_level_xp = progress.current_level_xp;
        self.xp_to_next_level = progress.xp_to_next_level;
    }

    /// Full progress view for `total_xp`.
    pub fn progress(&self, curve: &LevelCurve) -> LevelProgress {
        curve.progress(self.total_xp)
    }

    /// True when the cached level fields agree with `curve`.
    pub fn is_fresh(&self, curve: &LevelCurve) -> bool {
        let p = curve.progress(self.total_xp);
        p.level == self.level
            && p.current_level_xp == self.current_level_xp
            && p.xp_to_next_level == self.xp_to_next_level
    }
}
