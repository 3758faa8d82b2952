//! Ranking aggregator: paginated leaderboard over user aggregates.
//!
//! Order is `total_xp` descending, then `user_id` ascending, so pages are
//! reproducible even when many users share a score. Reads never touch the
//! ledger and never write.

use crate::error::{Error, Result};
use crate::models::{LeaderboardRow, RankMode, UserAggregate, UserId};
use crate::store::{AggregateStore, ExperienceStore};
use std::sync::Arc;

/// Read-only leaderboard view.
pub struct RankingAggregator {
    store: Arc<dyn ExperienceStore>,
}

impl RankingAggregator {
    pub fn new(store: Arc<dyn ExperienceStore>) -> Self {
        Self { store }
    }

    /// One page of the leaderboard with distinct positional ranks.
    pub fn leaderboard(&self, limit: usize, offset: usize) -> Result<Vec<LeaderboardRow>> {
        self.leaderboard_with(limit, offset, RankMode::Distinct)
    }

    /// One page of the leaderboard.
    ///
    /// In `Shared` mode equal totals share `1 + (users with more XP)`.
    pub fn leaderboard_with(
        &self,
        limit: usize,
        offset: usize,
        mode: RankMode,
    ) -> Result<Vec<LeaderboardRow>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let page = self.store.ranked(limit, offset)?;

        let mut rows = Vec::with_capacity(page.len());
        let mut previous: Option<(u64, u64)> = None;
        for (index, aggregate) in page.into_iter().enumerate() {
            let position = (offset + index) as u64 + 1;
            let rank = match mode {
                RankMode::Distinct => position,
                RankMode::Shared => match previous {
                    Some((total, rank)) if total == aggregate.total_xp => rank,
                    // Every earlier row has strictly more XP once the total changes
                    Some(_) => position,
                    None => self.store.count_greater(aggregate.total_xp)? + 1,
                },
            };
            previous = Some((aggregate.total_xp, rank));
            rows.push(row(rank, aggregate));
        }

        Ok(rows)
    }

    /// Position of `user` in the distinct leaderboard order.
    pub fn rank_of(&self, user: &UserId) -> Result<u64> {
        self.rank_of_with(user, RankMode::Distinct)
    }

    /// Rank of `user` under `mode`.
    pub fn rank_of_with(&self, user: &UserId, mode: RankMode) -> Result<u64> {
        let aggregate = self
            .store
            .load(user)?
            .ok_or_else(|| Error::UserNotFound(user.clone()))?;
        let ahead = match mode {
            RankMode::Distinct => self.store.count_ahead(&aggregate)?,
            RankMode::Shared => self.store.count_greater(aggregate.total_xp)?,
        };
        Ok(ahead + 1)
    }
}

fn row(rank: u64, aggregate: UserAggregate) -> LeaderboardRow {
    LeaderboardRow {
        rank,
        user_id: aggregate.user_id,
        total_xp: aggregate.total_xp,
        level: aggregate.level,
    }
}
