//! Activity ledger entries.

use crate::error::{Error, Result};
use crate::models::UserId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Actions that can earn (or correct) XP.
///
/// Closed set. Amounts live in [`crate::XpPolicy`], not here: a kind with no
/// policy entry is rejected rather than granting zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionKind {
    /// Published a knowledge article
    CreateKnowledge,
    /// Commented on an article
    CreateComment,
    /// Attached a file to an article
    UploadFile,
    /// Joined an article as collaborator
    JoinCollaboration,
    /// Viewed an article
    ViewKnowledge,
    /// Manual correction; only reachable through `adjust`
    Adjustment,
}

impl ActionKind {
    /// All kinds, in declaration order.
    pub const ALL: [ActionKind; 6] = [
        ActionKind::CreateKnowledge,
        ActionKind::CreateComment,
        ActionKind::UploadFile,
        ActionKind::JoinCollaboration,
        ActionKind::ViewKnowledge,
        ActionKind::Adjustment,
    ];

    /// Wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::CreateKnowledge => "CREATE_KNOWLEDGE",
            ActionKind::CreateComment => "CREATE_COMMENT",
            ActionKind::UploadFile => "UPLOAD_FILE",
            ActionKind::JoinCollaboration => "JOIN_COLLABORATION",
            ActionKind::ViewKnowledge => "VIEW_KNOWLEDGE",
            ActionKind::Adjustment => "ADJUSTMENT",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let name = s.trim();
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(name))
            .ok_or_else(|| Error::UnknownActionKind(s.to_string()))
    }
}

/// Ledger sequence number. Globally monotonic, never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryId(pub u64);

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An entry the engine wants appended; the store assigns id and digest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingEntry {
    pub user_id: UserId,
    pub action: ActionKind,
    pub xp_amount: i64,
    pub timestamp: u64,
    pub note: Option<String>,
}

/// Immutable XP fact.
///
/// `digest` chains each entry to the previous entry of the same user, so
/// any rewrite of history is detectable by [`ActivityEntry::verify`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityEntry {
    /// Ledger sequence number
    pub entry_id: EntryId,

    /// Recipient
    pub user_id: UserId,

    /// What earned the XP
    pub action: ActionKind,

    /// XP delta (negative only for adjustments)
    pub xp_amount: i64,

    /// Time of the grant (ms since epoch)
    pub timestamp: u64,

    /// Free-text reason (adjustments)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,

    /// Hex BLAKE3 digest over the previous digest and this entry's fields
    pub digest: String,
}

impl ActivityEntry {
    /// Assign an id and seal the entry onto the user's chain.
    pub fn seal(id: EntryId, pending: PendingEntry, prev_digest: Option<&str>) -> Self {
        let digest = compute_digest(id, &pending, prev_digest);
        Self {
            entry_id: id,
            user_id: pending.user_id,
            action: pending.action,
            xp_amount: pending.xp_amount,
            timestamp: pending.timestamp,
            note: pending.note,
            digest,
        }
    }

    /// Recompute the digest against `prev_digest` and compare.
    pub fn verify(&self, prev_digest: Option<&str>) -> bool {
        let pending = PendingEntry {
            user_id: self.user_id.clone(),
            action: self.action,
            xp_amount: self.xp_amount,
            timestamp: self.timestamp,
            note: self.note.clone(),
        };
        compute_digest(self.entry_id, &pending, prev_digest) == self.digest
    }
}

fn compute_digest(id: EntryId, pending: &PendingEntry, prev_digest: Option<&str>) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(prev_digest.unwrap_or("genesis").as_bytes());
    hasher.update(b":");
    hasher.update(&id.0.to_be_bytes());
    hasher.update(pending.user_id.as_str().as_bytes());
    hasher.update(b":");
    hasher.update(pending.action.as_str().as_bytes());
    hasher.update(&pending.xp_amount.to_be_bytes());
    hasher.update(&pending.timestamp.to_be_bytes());
    if let Some(note) = &pending.note {
        hasher.update(note.as_bytes());
    }
    hex::encode(hasher.finalize().as_bytes())
}
