//! Persistence contracts and backends.
//!
//! The engine talks to storage only through [`ExperienceStore`], which
//! combines the append-only [`ActivityLedger`] with the
//! [`AggregateStore`] and adds the atomic grant commit.
//!
//! # Atomicity
//!
//! [`ExperienceStore::commit`] is a compare-and-swap keyed on the
//! aggregate's `entry_count`: the ledger entry, the aggregate and its
//! ranking index are written together or not at all. A stale expectation
//! yields [`CommitOutcome::Conflict`] and nothing is written.
//!
//! # Backends
//!
//! - [`RocksStore`] - RocksDB, one `WriteBatch` per commit
//! - [`MemoryStore`] - in-process maps behind a lock

mod locks;
mod memory;
mod rocks;

pub use memory::MemoryStore;
pub use rocks::RocksStore;

use crate::error::Result;
use crate::models::{ActivityEntry, EntryId, PendingEntry, UserAggregate, UserId};

/// Append-only record of XP events.
pub trait ActivityLedger: Send + Sync {
    /// Append an entry without touching the aggregate.
    ///
    /// The engine never calls this on the grant path; it exists for
    /// imports, after which the repair pass rebuilds the aggregate.
    fn append(&self, entry: PendingEntry) -> Result<EntryId>;

    /// Entries for `user`, newest first.
    fn list_for_user(&self, user: &UserId, limit: usize, offset: usize)
        -> Result<Vec<ActivityEntry>>;

    /// Every entry for `user`, oldest first.
    fn chain(&self, user: &UserId) -> Result<Vec<ActivityEntry>>;

    /// Sum of `xp_amount` over the user's entries. Audit path only.
    fn sum_xp(&self, user: &UserId) -> Result<i64> {
        Ok(self
            .chain(user)?
            .iter()
            .fold(0i64, |acc, e| acc.saturating_add(e.xp_amount)))
    }

    /// First of the user's entries whose digest does not chain, if any.
    fn verify_chain(&self, user: &UserId) -> Result<Option<EntryId>> {
        Ok(first_broken(&self.chain(user)?))
    }
}

/// Durable per-user XP aggregates plus the ranking order over them.
///
/// Ranking order is `total_xp` descending, then `user_id` ascending.
pub trait AggregateStore: Send + Sync {
    /// Load one aggregate.
    fn load(&self, user: &UserId) -> Result<Option<UserAggregate>>;

    /// Insert a new aggregate. Returns `false` if one already exists.
    fn create(&self, aggregate: &UserAggregate) -> Result<bool>;

    /// Aggregates in ranking order.
    fn ranked(&self, limit: usize, offset: usize) -> Result<Vec<UserAggregate>>;

    /// Number of aggregates ordered strictly before `aggregate`.
    fn count_ahead(&self, aggregate: &UserAggregate) -> Result<u64>;

    /// Number of aggregates with strictly more than `total_xp`.
    fn count_greater(&self, total_xp: u64) -> Result<u64>;

    /// All user ids with an aggregate, ascending.
    fn user_ids(&self) -> Result<Vec<UserId>>;
}

/// A grant ready to be made durable.
#[derive(Debug, Clone)]
pub struct GrantCommit {
    /// Entry to append
    pub entry: PendingEntry,

    /// `entry_count` the stored aggregate must still have; `None` means
    /// the aggregate must not exist yet
    pub expected: Option<u64>,

    /// Aggregate to store on success
    pub aggregate: UserAggregate,
}

/// Result of a compare-and-swap commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    /// Entry and aggregate were written
    Committed(ActivityEntry),
    /// The stored aggregate moved on; nothing was written
    Conflict,
}

/// Ledger and aggregates with atomic grant commits.
pub trait ExperienceStore: ActivityLedger + AggregateStore {
    /// Append `commit.entry` and store `commit.aggregate` as one unit.
    fn commit(&self, commit: GrantCommit) -> Result<CommitOutcome>;

    /// Overwrite an aggregate if its `entry_count` still equals `expected`
    /// (`None`: must not exist). Returns `false` on a lost race.
    fn replace_aggregate(&self, expected: Option<u64>, aggregate: &UserAggregate) -> Result<bool>;
}

/// First entry in `chain` (oldest first) that fails digest verification.
pub(crate) fn first_broken(chain: &[ActivityEntry]) -> Option<EntryId> {
    let mut prev: Option<&str> = None;
    for entry in chain {
        if !entry.verify(prev) {
            return Some(entry.entry_id);
        }
        prev = Some(entry.digest.as_str());
    }
    None
}

/// True when `current` matches the commit expectation.
pub(crate) fn expectation_holds(expected: Option<u64>, current: Option<&UserAggregate>) -> bool {
    match (expected, current) {
        (None, None) => true,
        (Some(count), Some(agg)) => agg.entry_count == count,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ActionKind;
    use chie_leveling::LevelCurve;

    #[test]
    fn expectation_matching() {
        let curve = LevelCurve::default();
        let agg = UserAggregate::new(UserId::parse("a").unwrap(), &curve, 0);
        assert!(expectation_holds(None, None));
        assert!(expectation_holds(Some(0), Some(&agg)));
        assert!(!expectation_holds(Some(1), Some(&agg)));
        assert!(!expectation_holds(None, Some(&agg)));
        assert!(!expectation_holds(Some(0), None));
    }

    #[test]
    fn tampered_entry_breaks_chain() {
        let store = MemoryStore::new();
        let user = UserId::parse("alice").unwrap();
        for amount in [10, 10, 10] {
            store
                .append(PendingEntry {
                    user_id: user.clone(),
                    action: ActionKind::CreateComment,
                    xp_amount: amount,
                    timestamp: 1,
                    note: None,
                })
                .unwrap();
        }
        assert_eq!(store.verify_chain(&user).unwrap(), None);

        let mut chain = store.chain(&user).unwrap();
        chain[1].xp_amount = 1000;
        assert_eq!(first_broken(&chain), Some(chain[1].entry_id));
    }
}
