//! In-process store with the same semantics as the RocksDB backend.

use super::{
    expectation_holds, ActivityLedger, AggregateStore, CommitOutcome, ExperienceStore,
    GrantCommit,
};
use crate::error::Result;
use crate::models::{ActivityEntry, EntryId, PendingEntry, UserAggregate, UserId};
use std::cmp::Reverse;
use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Default)]
struct Inner {
    aggregates: BTreeMap<UserId, UserAggregate>,
    entries: BTreeMap<UserId, Vec<ActivityEntry>>,
    last_seq: u64,
}

impl Inner {
    fn stage_entry(&mut self, pending: PendingEntry) -> ActivityEntry {
        self.last_seq += 1;
        let chain = self.entries.entry(pending.user_id.clone()).or_default();
        let prev = chain.last().map(|e| e.digest.clone());
        let entry = ActivityEntry::seal(EntryId(self.last_seq), pending, prev.as_deref());
        chain.push(entry.clone());
        entry
    }

    fn sorted(&self) -> Vec<&UserAggregate> {
        let mut all: Vec<&UserAggregate> = self.aggregates.values().collect();
        all.sort_by_key(|a| (Reverse(a.total_xp), a.user_id.clone()));
        all
    }
}

/// Store backed by in-memory maps.
///
/// A single lock covers ledger and aggregates, so every commit is atomic.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ActivityLedger for MemoryStore {
    fn append(&self, entry: PendingEntry) -> Result<EntryId> {
        Ok(self.write().stage_entry(entry).entry_id)
    }

    fn list_for_user(
        &self,
        user: &UserId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<ActivityEntry>> {
        let inner = self.read();
        Ok(inner
            .entries
            .get(user)
            .map(|chain| chain.iter().rev().skip(offset).take(limit).cloned().collect())
            .unwrap_or_default())
    }

    fn chain(&self, user: &UserId) -> Result<Vec<ActivityEntry>> {
        Ok(self.read().entries.get(user).cloned().unwrap_or_default())
    }
}

impl AggregateStore for MemoryStore {
    fn load(&self, user: &UserId) -> Result<Option<UserAggregate>> {
        Ok(self.read().aggregates.get(user).cloned())
    }

    fn create(&self, aggregate: &UserAggregate) -> Result<bool> {
        let mut inner = self.write();
        if inner.aggregates.contains_key(&aggregate.user_id) {
            return Ok(false);
        }
        inner
            .aggregates
            .insert(aggregate.user_id.clone(), aggregate.clone());
        Ok(true)
    }

    fn ranked(&self, limit: usize, offset: usize) -> Result<Vec<UserAggregate>> {
        let inner = self.read();
        Ok(inner
            .sorted()
            .into_iter()
            .skip(offset)
            .take(limit)
            .cloned()
            .collect())
    }

    fn count_ahead(&self, aggregate: &UserAggregate) -> Result<u64> {
        let key = (Reverse(aggregate.total_xp), &aggregate.user_id);
        Ok(self
            .read()
            .aggregates
            .values()
            .filter(|a| (Reverse(a.total_xp), &a.user_id) < key)
            .count() as u64)
    }

    fn count_greater(&self, total_xp: u64) -> Result<u64> {
        Ok(self
            .read()
            .aggregates
            .values()
            .filter(|a| a.total_xp > total_xp)
            .count() as u64)
    }

    fn user_ids(&self) -> Result<Vec<UserId>> {
        Ok(self.read().aggregates.keys().cloned().collect())
    }
}

impl ExperienceStore for MemoryStore {
    fn commit(&self, commit: GrantCommit) -> Result<CommitOutcome> {
        let mut inner = self.write();
        let current = inner.aggregates.get(&commit.aggregate.user_id);
        if !expectation_holds(commit.expected, current) {
            return Ok(CommitOutcome::Conflict);
        }

        let entry = inner.stage_entry(commit.entry);
        inner
            .aggregates
            .insert(commit.aggregate.user_id.clone(), commit.aggregate);
        Ok(CommitOutcome::Committed(entry))
    }

    fn replace_aggregate(&self, expected: Option<u64>, aggregate: &UserAggregate) -> Result<bool> {
        let mut inner = self.write();
        if !expectation_holds(expected, inner.aggregates.get(&aggregate.user_id)) {
            return Ok(false);
        }
        inner
            .aggregates
            .insert(aggregate.user_id.clone(), aggregate.clone());
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ActionKind;
    use chie_leveling::LevelCurve;

    fn uid(s: &str) -> UserId {
        UserId::parse(s).unwrap()
    }

    fn seeded(store: &MemoryStore, user: &str, total: u64) {
        let curve = LevelCurve::default();
        let mut agg = UserAggregate::new(uid(user), &curve, 0);
        agg.total_xp = total;
        agg.refresh(&curve);
        store.create(&agg).unwrap();
    }

    #[test]
    fn ranking_matches_rocks_order() {
        let store = MemoryStore::new();
        seeded(&store, "C", 150);
        seeded(&store, "B", 300);
        seeded(&store, "A", 300);

        let ids: Vec<String> = store
            .ranked(10, 0)
            .unwrap()
            .into_iter()
            .map(|a| a.user_id.to_string())
            .collect();
        assert_eq!(ids, vec!["A", "B", "C"]);

        let c = store.load(&uid("C")).unwrap().unwrap();
        assert_eq!(store.count_ahead(&c).unwrap(), 2);
        assert_eq!(store.count_greater(150).unwrap(), 2);
    }

    #[test]
    fn ledger_pages_newest_first() {
        let store = MemoryStore::new();
        for amount in 1..=3 {
            store
                .append(PendingEntry {
                    user_id: uid("alice"),
                    action: ActionKind::CreateComment,
                    xp_amount: amount,
                    timestamp: 0,
                    note: None,
                })
                .unwrap();
        }
        let page = store.list_for_user(&uid("alice"), 2, 1).unwrap();
        assert_eq!(
            page.iter().map(|e| e.xp_amount).collect::<Vec<_>>(),
            vec![2, 1]
        );
        assert_eq!(store.sum_xp(&uid("alice")).unwrap(), 6);
        assert!(store.list_for_user(&uid("nobody"), 5, 0).unwrap().is_empty());
    }
}
