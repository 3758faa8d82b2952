//! Leaderboard view types.

use crate::error::{Error, Result};
use crate::models::UserId;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// One ranked leaderboard line. Derived, never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardRow {
    pub rank: u64,
    pub user_id: UserId,
    pub total_xp: u64,
    pub level: u64,
}

/// How equal XP totals are ranked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RankMode {
    /// Every row gets its own position; ties broken by user id
    #[default]
    Distinct,
    /// Equal XP shares `1 + users with strictly more XP`
    Shared,
}

impl FromStr for RankMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "distinct" => Ok(RankMode::Distinct),
            "shared" => Ok(RankMode::Shared),
            other => Err(Error::InvalidArgument(format!("unknown rank mode: {}", other))),
        }
    }
}
