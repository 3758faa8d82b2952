//! Position of an XP total on a level curve.

/// Where a given XP total sits on a [`crate::LevelCurve`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LevelProgress {
    /// Current level (always >= 1)
    pub level: u64,

    /// Cumulative XP the progress was computed for
    pub total_xp: u64,

    /// XP earned since the current level began
    pub current_level_xp: u64,

    /// XP still needed to reach the next level (0 when the curve is capped)
    pub xp_to_next_level: u64,

    /// Cumulative XP at which the next level begins, if reachable
    pub next_level_threshold: Option<u64>,
}

impl LevelProgress {
    /// Cumulative XP at which the current level began.
    #[inline]
    pub fn level_start(&self) -> u64 {
        self.total_xp - self.current_level_xp
    }

    /// True when the curve has no level above this one.
    #[inline]
    pub fn is_capped(&self) -> bool {
        self.next_level_threshold.is_none() && self.xp_to_next_level == 0
    }

    /// Fraction of the current level completed, in `[0.0, 1.0]`.
    pub fn fraction(&self) -> f64 {
        let span = self.current_level_xp as f64 + self.xp_to_next_level as f64;
        if span == 0.0 {
            1.0
        } else {
            self.current_level_xp as f64 / span
        }
    }
}
