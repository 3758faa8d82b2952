//! Offline consistency checks and repair.
//!
//! The ledger is the source of truth; aggregates are a cache over it. An
//! audit compares the two for one user, and a repair rebuilds the
//! aggregate from the ledger. Neither runs on the grant path.

use crate::engine::ExperienceEngine;
use crate::error::{Error, Result};
use crate::models::{now_millis, EntryId, UserAggregate, UserId};
use crate::store::{first_broken, ActivityLedger, AggregateStore};
use serde::Serialize;

/// Result of auditing one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditReport {
    pub user_id: UserId,

    /// Sum of ledger amounts
    pub ledger_xp: i64,

    /// Number of ledger entries
    pub ledger_entries: u64,

    /// Aggregate total, if an aggregate exists
    pub aggregate_xp: Option<u64>,

    /// Aggregate entry count, if an aggregate exists
    pub aggregate_entries: Option<u64>,

    /// Cached level fields agree with the curve
    pub level_fresh: bool,

    /// First entry whose digest does not chain, if any
    pub broken_at: Option<EntryId>,
}

impl AuditReport {
    /// Aggregate matches the ledger and the chain is intact.
    pub fn is_consistent(&self) -> bool {
        self.broken_at.is_none() && self.level_fresh && self.totals_match()
    }

    /// Aggregate total and entry count match the ledger.
    pub fn totals_match(&self) -> bool {
        match (self.aggregate_xp, self.aggregate_entries) {
            (Some(xp), Some(entries)) => {
                i64::try_from(xp).map_or(false, |xp| xp == self.ledger_xp)
                    && entries == self.ledger_entries
            }
            _ => self.ledger_entries == 0,
        }
    }
}

/// Result of repairing one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RepairOutcome {
    /// Aggregate already matched the ledger
    Unchanged,
    /// Aggregate was rewritten
    Repaired {
        before: Option<UserAggregate>,
        after: UserAggregate,
    },
}

impl ExperienceEngine {
    /// Compare `user`'s aggregate with the ledger.
    ///
    /// The aggregate is read before and after the ledger; a grant landing in
    /// between triggers a re-read so live traffic is not reported as drift.
    pub fn audit(&self, user: &UserId) -> Result<AuditReport> {
        let attempts = self.config().max_retries.max(1);
        let mut attempt = 0;
        let (aggregate, chain) = loop {
            attempt += 1;
            let aggregate = self.store().load(user)?;
            let chain = self.store().chain(user)?;
            let settled = self.store().load(user)?.map(|a| a.entry_count)
                == aggregate.as_ref().map(|a| a.entry_count);
            if settled || attempt >= attempts {
                break (aggregate, chain);
            }
        };

        let broken_at = first_broken(&chain);
        let ledger_xp = chain
            .iter()
            .fold(0i64, |acc, e| acc.saturating_add(e.xp_amount));

        let report = AuditReport {
            user_id: user.clone(),
            ledger_xp,
            ledger_entries: chain.len() as u64,
            aggregate_xp: aggregate.as_ref().map(|a| a.total_xp),
            aggregate_entries: aggregate.as_ref().map(|a| a.entry_count),
            level_fresh: aggregate
                .as_ref()
                .map_or(true, |a| a.is_fresh(self.curve())),
            broken_at,
        };

        if !report.is_consistent() {
            tracing::warn!(
                user = %user,
                ledger_xp = report.ledger_xp,
                aggregate_xp = ?report.aggregate_xp,
                broken_at = ?report.broken_at,
                "Audit found drift"
            );
        }
        Ok(report)
    }

    /// Audit every user with an aggregate.
    pub fn audit_all(&self) -> Result<Vec<AuditReport>> {
        self.store()
            .user_ids()?
            .iter()
            .map(|user| self.audit(user))
            .collect()
    }

    /// Fail with `Inconsistent` unless the aggregate totals match the ledger.
    pub fn check(&self, user: &UserId) -> Result<()> {
        let report = self.audit(user)?;
        if report.totals_match() {
            Ok(())
        } else {
            Err(Error::Inconsistent {
                user: user.clone(),
                ledger_xp: report.ledger_xp,
                aggregate_xp: report.aggregate_xp.unwrap_or(0),
            })
        }
    }

    /// Rebuild `user`'s aggregate from the ledger.
    ///
    /// Rewrites total, entry count and cached level fields. A broken digest
    /// chain is reported by `audit` but cannot be repaired here.
    pub fn repair(&self, user: &UserId) -> Result<RepairOutcome> {
        let attempts = self.config().max_retries.max(1);

        for _ in 0..attempts {
            // Aggregate first: any grant committed after this read moves
            // `entry_count` and fails the swap below
            let current = self.store().load(user)?;
            let chain = self.store().chain(user)?;

            let ledger_xp = chain
                .iter()
                .try_fold(0i64, |acc, e| acc.checked_add(e.xp_amount));
            let total = match ledger_xp.map(u64::try_from) {
                Some(Ok(total)) => total,
                _ => {
                    return Err(Error::Inconsistent {
                        user: user.clone(),
                        ledger_xp: ledger_xp.unwrap_or(i64::MAX),
                        aggregate_xp: current.as_ref().map_or(0, |a| a.total_xp),
                    })
                }
            };

            if let Some(existing) = &current {
                if (chain.len() as u64) < existing.entry_count {
                    return Err(Error::Inconsistent {
                        user: user.clone(),
                        ledger_xp: total as i64,
                        aggregate_xp: existing.total_xp,
                    });
                }
            }

            let created_at = current
                .as_ref()
                .map(|a| a.created_at)
                .or_else(|| chain.first().map(|e| e.timestamp))
                .unwrap_or_else(now_millis);
            let mut rebuilt = UserAggregate::new(user.clone(), self.curve(), created_at);
            rebuilt.total_xp = total;
            rebuilt.entry_count = chain.len() as u64;
            rebuilt.updated_at = now_millis();
            rebuilt.refresh(self.curve());

            if let Some(existing) = &current {
                if existing.total_xp == rebuilt.total_xp
                    && existing.entry_count == rebuilt.entry_count
                    && existing.is_fresh(self.curve())
                {
                    return Ok(RepairOutcome::Unchanged);
                }
            } else if chain.is_empty() {
                return Err(Error::UserNotFound(user.clone()));
            }

            let expected = current.as_ref().map(|a| a.entry_count);
            if self.store().replace_aggregate(expected, &rebuilt)? {
                tracing::info!(
                    user = %user,
                    before = ?current.as_ref().map(|a| a.total_xp),
                    after = rebuilt.total_xp,
                    "Repaired aggregate from ledger"
                );
                return Ok(RepairOutcome::Repaired {
                    before: current,
                    after: rebuilt,
                });
            }
        }

        Err(Error::Conflict {
            user: user.clone(),
            attempts,
        })
    }
}
