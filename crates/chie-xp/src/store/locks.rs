//! Per-user lock striping.

use crate::models::UserId;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Default number of stripes.
pub(crate) const DEFAULT_STRIPES: usize = 64;

/// Fixed set of mutexes; a user always maps to the same stripe.
///
/// Serializes check-and-write for one user while other users (on other
/// stripes) proceed in parallel.
pub(crate) struct LockStripes {
    stripes: Vec<Mutex<()>>,
}

impl LockStripes {
    pub(crate) fn new(count: usize) -> Self {
        Self {
            stripes: (0..count.max(1)).map(|_| Mutex::new(())).collect(),
        }
    }

    pub(crate) fn lock(&self, user: &UserId) -> MutexGuard<'_, ()> {
        self.stripes[self.index(user)]
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn index(&self, user: &UserId) -> usize {
        let mut hasher = DefaultHasher::new();
        user.hash(&mut hasher);
        (hasher.finish() % self.stripes.len() as u64) as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_user_same_stripe() {
        let locks = LockStripes::new(8);
        let user = UserId::parse("alice").unwrap();
        assert_eq!(locks.index(&user), locks.index(&user));
        assert!(locks.index(&user) < 8);
    }

    #[test]
    fn zero_stripes_clamped() {
        let locks = LockStripes::new(0);
        let _guard = locks.lock(&UserId::parse("bob").unwrap());
    }
}
