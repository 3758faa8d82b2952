//! Persistent storage using RocksDB.
//!
//! # Key layout
//!
//! | key | value |
//! |-----|-------|
//! | `user:{id}` | aggregate (JSON) |
//! | `activity:{id}:{seq:be64}` | ledger entry (JSON) |
//! | `ledger:{seq:be64}` | user id, global append order |
//! | `rank:{!total_xp:be64}{id}` | empty, ranking index |
//!
//! Inverting `total_xp` makes a plain forward scan of `rank:` yield XP
//! descending with user id ascending inside equal totals.

use super::locks::{LockStripes, DEFAULT_STRIPES};
use super::{
    expectation_holds, ActivityLedger, AggregateStore, CommitOutcome, ExperienceStore,
    GrantCommit,
};
use crate::error::{Error, Result};
use crate::models::{ActivityEntry, EntryId, PendingEntry, UserAggregate, UserId};
use rocksdb::{Direction, IteratorMode, Options, WriteBatch, DB};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

const USER_PREFIX: &[u8] = b"user:";
const ACTIVITY_PREFIX: &[u8] = b"activity:";
const LEDGER_PREFIX: &[u8] = b"ledger:";
const RANK_PREFIX: &[u8] = b"rank:";

/// RocksDB-backed experience store.
pub struct RocksStore {
    db: DB,
    locks: LockStripes,
    last_seq: AtomicU64,
}

impl RocksStore {
    /// Open or create storage at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        let db = DB::open(&opts, path)?;

        let last_seq = last_ledger_seq(&db)?;
        tracing::debug!(last_seq, "Opened experience store");

        Ok(Self {
            db,
            locks: LockStripes::new(DEFAULT_STRIPES),
            last_seq: AtomicU64::new(last_seq),
        })
    }

    fn next_id(&self) -> EntryId {
        EntryId(self.last_seq.fetch_add(1, Ordering::SeqCst) + 1)
    }

    fn latest_digest(&self, user: &UserId) -> Result<Option<String>> {
        let prefix = activity_prefix(user);
        let mut upper = prefix.clone();
        upper.extend_from_slice(&[0xff; 8]);

        let mut iter = self
            .db
            .iterator(IteratorMode::From(&upper, Direction::Reverse));
        match iter.next() {
            Some(item) => {
                let (key, value) = item?;
                if key.starts_with(&prefix) {
                    let entry: ActivityEntry = serde_json::from_slice(&value)?;
                    Ok(Some(entry.digest))
                } else {
                    Ok(None)
                }
            }
            None => Ok(None),
        }
    }

    /// Seal `pending` onto the user's chain and stage it in `batch`.
    fn stage_entry(&self, batch: &mut WriteBatch, pending: PendingEntry) -> Result<ActivityEntry> {
        let prev = self.latest_digest(&pending.user_id)?;
        let id = self.next_id();
        let entry = ActivityEntry::seal(id, pending, prev.as_deref());

        batch.put(activity_key(&entry.user_id, id), serde_json::to_vec(&entry)?);
        batch.put(ledger_key(id), entry.user_id.as_str().as_bytes());
        Ok(entry)
    }

    /// Stage an aggregate write plus its ranking index move.
    fn stage_aggregate(
        &self,
        batch: &mut WriteBatch,
        previous: Option<&UserAggregate>,
        aggregate: &UserAggregate,
    ) -> Result<()> {
        if let Some(prev) = previous {
            batch.delete(rank_key(prev.total_xp, &prev.user_id));
        }
        batch.put(rank_key(aggregate.total_xp, &aggregate.user_id), b"");
        batch.put(user_key(&aggregate.user_id), serde_json::to_vec(aggregate)?);
        Ok(())
    }
}

impl ActivityLedger for RocksStore {
    fn append(&self, entry: PendingEntry) -> Result<EntryId> {
        let _guard = self.locks.lock(&entry.user_id);

        let mut batch = WriteBatch::default();
        let entry = self.stage_entry(&mut batch, entry)?;
        self.db.write(batch)?;
        Ok(entry.entry_id)
    }

    fn list_for_user(
        &self,
        user: &UserId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<ActivityEntry>> {
        let prefix = activity_prefix(user);
        let mut upper = prefix.clone();
        upper.extend_from_slice(&[0xff; 8]);

        let mut entries = Vec::new();
        let iter = self
            .db
            .iterator(IteratorMode::From(&upper, Direction::Reverse));
        for item in iter.skip(offset) {
            if entries.len() >= limit {
                break;
            }
            let (key, value) = item?;
            if key.starts_with(&prefix) {
                entries.push(serde_json::from_slice(&value)?);
            } else {
                break;
            }
        }

        Ok(entries)
    }

    fn chain(&self, user: &UserId) -> Result<Vec<ActivityEntry>> {
        let prefix = activity_prefix(user);
        let mut entries = Vec::new();

        let iter = self.db.prefix_iterator(&prefix);
        for item in iter {
            let (key, value) = item?;
            if key.starts_with(&prefix) {
                entries.push(serde_json::from_slice(&value)?);
            } else {
                break;
            }
        }

        Ok(entries)
    }
}

impl AggregateStore for RocksStore {
    fn load(&self, user: &UserId) -> Result<Option<UserAggregate>> {
        match self.db.get(user_key(user))? {
            Some(data) => Ok(Some(serde_json::from_slice(&data)?)),
            None => Ok(None),
        }
    }

    fn create(&self, aggregate: &UserAggregate) -> Result<bool> {
        let _guard = self.locks.lock(&aggregate.user_id);
        if self.load(&aggregate.user_id)?.is_some() {
            return Ok(false);
        }

        let mut batch = WriteBatch::default();
        self.stage_aggregate(&mut batch, None, aggregate)?;
        self.db.write(batch)?;
        Ok(true)
    }

    fn ranked(&self, limit: usize, offset: usize) -> Result<Vec<UserAggregate>> {
        // One snapshot for index and rows so a page is internally consistent
        let snapshot = self.db.snapshot();
        let mut rows = Vec::new();

        let iter = snapshot.iterator(IteratorMode::From(RANK_PREFIX, Direction::Forward));
        for item in iter.skip(offset) {
            if rows.len() >= limit {
                break;
            }
            let (key, _) = item?;
            if !key.starts_with(RANK_PREFIX) {
                break;
            }
            let user = rank_key_user(&key)?;
            match snapshot.get(user_key(&user))? {
                Some(data) => rows.push(serde_json::from_slice(&data)?),
                None => {
                    return Err(Error::StorageUnavailable(format!(
                        "rank index references missing aggregate {}",
                        user
                    )))
                }
            }
        }

        Ok(rows)
    }

    fn count_ahead(&self, aggregate: &UserAggregate) -> Result<u64> {
        count_rank_keys_before(&self.db, &rank_key(aggregate.total_xp, &aggregate.user_id))
    }

    fn count_greater(&self, total_xp: u64) -> Result<u64> {
        let mut bound = RANK_PREFIX.to_vec();
        bound.extend_from_slice(&(!total_xp).to_be_bytes());
        count_rank_keys_before(&self.db, &bound)
    }

    fn user_ids(&self) -> Result<Vec<UserId>> {
        let mut ids = Vec::new();

        let iter = self.db.prefix_iterator(USER_PREFIX);
        for item in iter {
            let (key, _) = item?;
            if key.starts_with(USER_PREFIX) {
                let raw = String::from_utf8_lossy(&key[USER_PREFIX.len()..]).into_owned();
                ids.push(UserId::parse(raw)?);
            } else {
                break;
            }
        }

        Ok(ids)
    }
}

impl ExperienceStore for RocksStore {
    fn commit(&self, commit: GrantCommit) -> Result<CommitOutcome> {
        if commit.entry.user_id != commit.aggregate.user_id {
            return Err(Error::InvalidArgument(format!(
                "entry for {} committed with aggregate of {}",
                commit.entry.user_id, commit.aggregate.user_id
            )));
        }

        let _guard = self.locks.lock(&commit.aggregate.user_id);
        let current = self.load(&commit.aggregate.user_id)?;
        if !expectation_holds(commit.expected, current.as_ref()) {
            return Ok(CommitOutcome::Conflict);
        }

        let mut batch = WriteBatch::default();
        let entry = self.stage_entry(&mut batch, commit.entry)?;
        self.stage_aggregate(&mut batch, current.as_ref(), &commit.aggregate)?;
        self.db.write(batch)?;

        Ok(CommitOutcome::Committed(entry))
    }

    fn replace_aggregate(&self, expected: Option<u64>, aggregate: &UserAggregate) -> Result<bool> {
        let _guard = self.locks.lock(&aggregate.user_id);
        let current = self.load(&aggregate.user_id)?;
        if !expectation_holds(expected, current.as_ref()) {
            return Ok(false);
        }

        let mut batch = WriteBatch::default();
        self.stage_aggregate(&mut batch, current.as_ref(), aggregate)?;
        self.db.write(batch)?;
        Ok(true)
    }
}

fn last_ledger_seq(db: &DB) -> Result<u64> {
    let mut upper = LEDGER_PREFIX.to_vec();
    upper.extend_from_slice(&[0xff; 8]);

    let mut iter = db.iterator(IteratorMode::From(&upper, Direction::Reverse));
    match iter.next() {
        Some(item) => {
            let (key, _) = item?;
            match key.strip_prefix(LEDGER_PREFIX) {
                Some(seq) => Ok(decode_seq(seq)?),
                None => Ok(0),
            }
        }
        None => Ok(0),
    }
}

fn count_rank_keys_before(db: &DB, bound: &[u8]) -> Result<u64> {
    let mut count = 0u64;

    let iter = db.iterator(IteratorMode::From(RANK_PREFIX, Direction::Forward));
    for item in iter {
        let (key, _) = item?;
        if !key.starts_with(RANK_PREFIX) || &*key >= bound {
            break;
        }
        count += 1;
    }

    Ok(count)
}

fn decode_seq(bytes: &[u8]) -> Result<u64> {
    let raw: [u8; 8] = bytes
        .try_into()
        .map_err(|_| Error::StorageUnavailable("malformed ledger key".into()))?;
    Ok(u64::from_be_bytes(raw))
}

fn user_key(user: &UserId) -> Vec<u8> {
    let mut key = USER_PREFIX.to_vec();
    key.extend_from_slice(user.as_str().as_bytes());
    key
}

fn activity_prefix(user: &UserId) -> Vec<u8> {
    let mut key = ACTIVITY_PREFIX.to_vec();
    key.extend_from_slice(user.as_str().as_bytes());
    key.push(b':');
    key
}

fn activity_key(user: &UserId, id: EntryId) -> Vec<u8> {
    let mut key = activity_prefix(user);
    key.extend_from_slice(&id.0.to_be_bytes());
    key
}

fn ledger_key(id: EntryId) -> Vec<u8> {
    let mut key = LEDGER_PREFIX.to_vec();
    key.extend_from_slice(&id.0.to_be_bytes());
    key
}

fn rank_key(total_xp: u64, user: &UserId) -> Vec<u8> {
    let mut key = RANK_PREFIX.to_vec();
    key.extend_from_slice(&(!total_xp).to_be_bytes());
    key.extend_from_slice(user.as_str().as_bytes());
    key
}

fn rank_key_user(key: &[u8]) -> Result<UserId> {
    let raw = key
        .get(RANK_PREFIX.len() + 8..)
        .ok_or_else(|| Error::StorageUnavailable("malformed rank key".into()))?;
    UserId::parse(String::from_utf8_lossy(raw).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ActionKind;
    use chie_leveling::LevelCurve;
    use tempfile::tempdir;

    fn uid(s: &str) -> UserId {
        UserId::parse(s).unwrap()
    }

    fn pending(user: &str, amount: i64) -> PendingEntry {
        PendingEntry {
            user_id: uid(user),
            action: ActionKind::CreateKnowledge,
            xp_amount: amount,
            timestamp: 1,
            note: None,
        }
    }

    fn seeded(store: &RocksStore, user: &str, total: u64) {
        let curve = LevelCurve::default();
        let mut agg = UserAggregate::new(uid(user), &curve, 0);
        agg.total_xp = total;
        agg.refresh(&curve);
        assert!(store.create(&agg).unwrap());
    }

    #[test]
    fn aggregate_roundtrip() {
        let dir = tempdir().unwrap();
        let store = RocksStore::open(dir.path()).unwrap();

        seeded(&store, "alice", 0);
        let loaded = store.load(&uid("alice")).unwrap().unwrap();
        assert_eq!(loaded.level, 1);
        assert!(!store.create(&loaded).unwrap());
        assert!(store.load(&uid("bob")).unwrap().is_none());
    }

    #[test]
    fn commit_writes_entry_and_aggregate() {
        let dir = tempdir().unwrap();
        let store = RocksStore::open(dir.path()).unwrap();
        let curve = LevelCurve::default();

        let fresh = UserAggregate::new(uid("alice"), &curve, 0);
        let next = fresh.advanced(10, &curve, 1);
        let outcome = store
            .commit(GrantCommit {
                entry: pending("alice", 10),
                expected: None,
                aggregate: next,
            })
            .unwrap();
        let CommitOutcome::Committed(entry) = outcome else {
            panic!("expected commit");
        };
        assert_eq!(entry.entry_id, EntryId(1));

        let stored = store.load(&uid("alice")).unwrap().unwrap();
        assert_eq!(stored.total_xp, 10);
        assert_eq!(stored.entry_count, 1);
        assert_eq!(store.sum_xp(&uid("alice")).unwrap(), 10);
    }

    #[test]
    fn stale_commit_conflicts_without_writing() {
        let dir = tempdir().unwrap();
        let store = RocksStore::open(dir.path()).unwrap();
        let curve = LevelCurve::default();
        seeded(&store, "alice", 0);

        let agg = store.load(&uid("alice")).unwrap().unwrap();
        let outcome = store
            .commit(GrantCommit {
                entry: pending("alice", 10),
                expected: Some(5),
                aggregate: agg.advanced(10, &curve, 1),
            })
            .unwrap();
        assert_eq!(outcome, CommitOutcome::Conflict);
        assert!(store.chain(&uid("alice")).unwrap().is_empty());
        assert_eq!(store.load(&uid("alice")).unwrap().unwrap().total_xp, 0);
    }

    #[test]
    fn ledger_lists_newest_first_and_pages() {
        let dir = tempdir().unwrap();
        let store = RocksStore::open(dir.path()).unwrap();

        for amount in 1..=5 {
            store.append(pending("alice", amount)).unwrap();
        }
        store.append(pending("al", 100)).unwrap();
        store.append(pending("alicea", 100)).unwrap();

        let page = store.list_for_user(&uid("alice"), 2, 0).unwrap();
        assert_eq!(
            page.iter().map(|e| e.xp_amount).collect::<Vec<_>>(),
            vec![5, 4]
        );
        let page = store.list_for_user(&uid("alice"), 10, 3).unwrap();
        assert_eq!(
            page.iter().map(|e| e.xp_amount).collect::<Vec<_>>(),
            vec![2, 1]
        );
        assert_eq!(store.sum_xp(&uid("alice")).unwrap(), 15);
        assert_eq!(store.sum_xp(&uid("al")).unwrap(), 100);
    }

    #[test]
    fn chain_digests_link() {
        let dir = tempdir().unwrap();
        let store = RocksStore::open(dir.path()).unwrap();

        store.append(pending("alice", 1)).unwrap();
        store.append(pending("alice", 2)).unwrap();

        let chain = store.chain(&uid("alice")).unwrap();
        assert!(chain[0].verify(None));
        assert!(chain[1].verify(Some(&chain[0].digest)));
    }

    #[test]
    fn sequence_survives_reopen() {
        let dir = tempdir().unwrap();
        {
            let store = RocksStore::open(dir.path()).unwrap();
            store.append(pending("alice", 1)).unwrap();
            store.append(pending("bob", 1)).unwrap();
        }
        let store = RocksStore::open(dir.path()).unwrap();
        assert_eq!(store.append(pending("carol", 1)).unwrap(), EntryId(3));
    }

    #[test]
    fn ranking_order_and_counts() {
        let dir = tempdir().unwrap();
        let store = RocksStore::open(dir.path()).unwrap();

        seeded(&store, "C", 150);
        seeded(&store, "B", 300);
        seeded(&store, "A", 300);

        let ranked = store.ranked(10, 0).unwrap();
        let ids: Vec<&str> = ranked.iter().map(|a| a.user_id.as_str()).collect();
        assert_eq!(ids, vec!["A", "B", "C"]);

        let b = store.load(&uid("B")).unwrap().unwrap();
        assert_eq!(store.count_ahead(&b).unwrap(), 1);
        assert_eq!(store.count_greater(300).unwrap(), 0);
        assert_eq!(store.count_greater(150).unwrap(), 2);
        assert_eq!(store.count_greater(0).unwrap(), 3);
        assert_eq!(store.user_ids().unwrap().len(), 3);
    }

    #[test]
    fn commit_moves_rank_index() {
        let dir = tempdir().unwrap();
        let store = RocksStore::open(dir.path()).unwrap();
        let curve = LevelCurve::default();
        seeded(&store, "A", 50);
        seeded(&store, "B", 100);

        let a = store.load(&uid("A")).unwrap().unwrap();
        store
            .commit(GrantCommit {
                entry: pending("A", 100),
                expected: Some(a.entry_count),
                aggregate: a.advanced(150, &curve, 1),
            })
            .unwrap();

        let ranked = store.ranked(10, 0).unwrap();
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].user_id.as_str(), "A");
        assert_eq!(ranked[0].total_xp, 150);
    }
}
