//! Best-effort XP for action handlers.
//!
//! An article or comment that was saved must still be reported as saved
//! when the XP grant behind it fails. Handlers call [`award`] after their
//! primary write commits; failures become a logged warning the handler can
//! pass along, never a failed request.

use crate::engine::{ExperienceEngine, GrantResult};
use crate::error::Error;
use crate::models::UserId;
use serde::Serialize;

/// Outcome of a best-effort grant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Award {
    /// XP was granted
    Granted(GrantResult),
    /// The grant failed; the primary action is unaffected
    Skipped { warning: String, retryable: bool },
}

impl Award {
    /// Downgrade `error` to a skipped award.
    pub fn skipped(error: &Error) -> Self {
        Award::Skipped {
            warning: format!("XP was not awarded: {}", error),
            retryable: error.is_retryable(),
        }
    }

    /// The grant result, if any.
    pub fn granted(&self) -> Option<&GrantResult> {
        match self {
            Award::Granted(result) => Some(result),
            Award::Skipped { .. } => None,
        }
    }
}

/// Grant XP for `action` and downgrade any failure to a warning.
pub fn award(engine: &ExperienceEngine, user: &UserId, action: &str) -> Award {
    match engine.grant_named(user, action) {
        Ok(result) => Award::Granted(result),
        Err(e) => {
            tracing::warn!(user = %user, action, error = %e, "XP grant failed");
            Award::skipped(&e)
        }
    }
}
