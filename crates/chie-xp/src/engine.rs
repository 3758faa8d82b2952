//! Experience engine: turns actions into durable XP and level changes.
//!
//! A grant is a read-modify-write over the user's aggregate. The engine
//! reads the aggregate, computes the successor, and hands both the ledger
//! entry and the new aggregate to [`ExperienceStore::commit`], which only
//! applies them if no other grant for that user landed in between. On a
//! conflict the engine re-reads and tries again, up to
//! [`EngineConfig::max_retries`] times.

use crate::error::{Error, Result};
use crate::models::{
    now_millis, ActionKind, ActivityEntry, EntryId, PendingEntry, UserAggregate, UserId,
};
use crate::policy::XpPolicy;
use crate::store::{
    ActivityLedger, AggregateStore, CommitOutcome, ExperienceStore, GrantCommit,
};
use chie_leveling::{LevelCurve, LevelProgress};
use serde::Serialize;
use std::sync::Arc;

/// Default bound on compare-and-swap attempts per grant.
pub const DEFAULT_MAX_RETRIES: u32 = 16;

/// Engine tuning.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// XP → level curve
    pub curve: LevelCurve,

    /// Action kind → XP table
    pub policy: XpPolicy,

    /// Create a missing aggregate on first grant
    pub implicit_create: bool,

    /// Compare-and-swap attempts before giving up with `Conflict`
    pub max_retries: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            curve: LevelCurve::default(),
            policy: XpPolicy::default(),
            implicit_create: true,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }
}

/// What to do when the target user has no aggregate yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Creation {
    /// Start the user at level 1, 0 XP
    Implicit,
    /// Fail with `UserNotFound`
    Require,
}

/// Outcome of a successful grant or adjustment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GrantResult {
    pub user_id: UserId,
    pub entry_id: EntryId,
    pub action: ActionKind,
    pub amount: i64,
    pub old_total_xp: u64,
    pub new_total_xp: u64,
    pub old_level: u64,
    pub new_level: u64,
    pub leveled_up: bool,
    pub current_level_xp: u64,
    pub xp_to_next_level: u64,
}

/// Converts actions into ledger entries and keeps aggregates in step.
///
/// The engine is the only writer of aggregate XP and level fields.
pub struct ExperienceEngine {
    store: Arc<dyn ExperienceStore>,
    config: EngineConfig,
}

impl ExperienceEngine {
    /// Create an engine over `store`.
    pub fn new(store: Arc<dyn ExperienceStore>, config: EngineConfig) -> Self {
        Self { store, config }
    }

    /// The underlying store.
    pub fn store(&self) -> &Arc<dyn ExperienceStore> {
        &self.store
    }

    /// Active configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Level curve in use.
    pub fn curve(&self) -> &LevelCurve {
        &self.config.curve
    }

    /// Grant XP for `action`, creating the user per `EngineConfig::implicit_create`.
    pub fn grant(&self, user: &UserId, action: ActionKind) -> Result<GrantResult> {
        let creation = if self.config.implicit_create {
            Creation::Implicit
        } else {
            Creation::Require
        };
        self.grant_with(user, action, creation)
    }

    /// Grant XP for an action given by name.
    pub fn grant_named(&self, user: &UserId, action: &str) -> Result<GrantResult> {
        let kind: ActionKind = action.parse()?;
        self.grant(user, kind)
    }

    /// Grant XP for `action` with an explicit creation mode.
    pub fn grant_with(
        &self,
        user: &UserId,
        action: ActionKind,
        creation: Creation,
    ) -> Result<GrantResult> {
        let amount = self.config.policy.amount(action)?;
        self.apply(user, action, amount as i64, None, creation)
    }

    /// Record a manual correction. `delta` may be negative but never below 0 XP.
    pub fn adjust(&self, user: &UserId, delta: i64, note: Option<String>) -> Result<GrantResult> {
        if delta == 0 {
            return Err(Error::InvalidArgument("adjustment of 0 XP".into()));
        }
        self.apply(user, ActionKind::Adjustment, delta, note, Creation::Require)
    }

    /// Create the user's aggregate at level 1. Existing aggregates are returned untouched.
    pub fn register(&self, user: &UserId) -> Result<UserAggregate> {
        let fresh = UserAggregate::new(user.clone(), &self.config.curve, now_millis());
        if self.store.create(&fresh)? {
            tracing::info!(user = %user, "Registered experience aggregate");
            return Ok(fresh);
        }
        self.store
            .load(user)?
            .ok_or_else(|| Error::UserNotFound(user.clone()))
    }

    /// Stored aggregate for `user`.
    pub fn aggregate(&self, user: &UserId) -> Result<UserAggregate> {
        self.store
            .load(user)?
            .ok_or_else(|| Error::UserNotFound(user.clone()))
    }

    /// Level progress for `user`, including the next-level threshold.
    pub fn progress(&self, user: &UserId) -> Result<LevelProgress> {
        Ok(self.aggregate(user)?.progress(&self.config.curve))
    }

    /// Ledger entries for `user`, newest first.
    pub fn history(&self, user: &UserId, limit: usize, offset: usize) -> Result<Vec<ActivityEntry>> {
        self.store.list_for_user(user, limit, offset)
    }

    fn apply(
        &self,
        user: &UserId,
        action: ActionKind,
        delta: i64,
        note: Option<String>,
        creation: Creation,
    ) -> Result<GrantResult> {
        let curve = &self.config.curve;
        let attempts = self.config.max_retries.max(1);

        for attempt in 1..=attempts {
            let now = now_millis();
            let (base, expected) = match self.store.load(user)? {
                Some(aggregate) => {
                    let count = aggregate.entry_count;
                    (aggregate, Some(count))
                }
                None if creation == Creation::Implicit => {
                    (UserAggregate::new(user.clone(), curve, now), None)
                }
                None => return Err(Error::UserNotFound(user.clone())),
            };

            let new_total = apply_delta(user, base.total_xp, delta)?;
            let old_level = curve.level(base.total_xp);
            let next = base.advanced(new_total, curve, now);

            let commit = GrantCommit {
                entry: PendingEntry {
                    user_id: user.clone(),
                    action,
                    xp_amount: delta,
                    timestamp: now,
                    note: note.clone(),
                },
                expected,
                aggregate: next.clone(),
            };

            match self.store.commit(commit)? {
                CommitOutcome::Committed(entry) => {
                    let result = GrantResult {
                        user_id: user.clone(),
                        entry_id: entry.entry_id,
                        action,
                        amount: delta,
                        old_total_xp: base.total_xp,
                        new_total_xp: next.total_xp,
                        old_level,
                        new_level: next.level,
                        leveled_up: next.level > old_level,
                        current_level_xp: next.current_level_xp,
                        xp_to_next_level: next.xp_to_next_level,
                    };
                    tracing::debug!(
                        user = %user,
                        action = %action,
                        amount = delta,
                        total = result.new_total_xp,
                        "Granted XP"
                    );
                    if result.leveled_up {
                        tracing::info!(
                            user = %user,
                            from = old_level,
                            to = result.new_level,
                            "Level up"
                        );
                    }
                    return Ok(result);
                }
                CommitOutcome::Conflict => {
                    tracing::debug!(user = %user, attempt, "Grant conflict, retrying");
                }
            }
        }

        tracing::warn!(user = %user, attempts, "Grant abandoned after repeated conflicts");
        Err(Error::Conflict {
            user: user.clone(),
            attempts,
        })
    }
}

/// `total + delta`, bounded to `0..=i64::MAX` so the ledger sum stays representable.
fn apply_delta(user: &UserId, total: u64, delta: i64) -> Result<u64> {
    let next = if delta >= 0 {
        total.checked_add(delta as u64)
    } else {
        match total.checked_sub(delta.unsigned_abs()) {
            Some(v) => Some(v),
            None => {
                return Err(Error::InvalidArgument(format!(
                    "adjustment of {} would take {} below 0 XP (has {})",
                    delta, user, total
                )))
            }
        }
    };

    match next {
        Some(v) if v <= i64::MAX as u64 => Ok(v),
        _ => Err(Error::Overflow {
            user: user.clone(),
            total,
            amount: delta,
        }),
    }
}
