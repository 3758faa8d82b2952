//! Chie Leveling
//!
//! Pure, deterministic mapping from cumulative experience (XP) to a level.
//!
//! # Curve
//!
//! The default curve is triangular. Completing `n` levels costs
//! `K * n * (n + 1) / 2` cumulative XP, so each level costs `K` more than
//! the one before it:
//!
//! | level | starts at (K = 100) | cost of level |
//! |------:|--------------------:|--------------:|
//! | 1     | 0                   | 100           |
//! | 2     | 100                 | 200           |
//! | 3     | 300                 | 300           |
//! | 4     | 600                 | 400           |
//!
//! A user holding `xp` is at level `m + 1`, where `m` is the largest number
//! of completed levels whose cumulative threshold does not exceed `xp`.
//!
//! Curves are configuration: an explicit threshold table can replace the
//! formula. See [`LevelCurve`].
//!
//! # Guarantees
//!
//! - Total: every `xp >= 0` maps to a level `>= 1`.
//! - Monotonic: more XP never yields a lower level.

mod curve;
mod error;
mod progress;

pub use curve::{CurveSpec, LevelCurve};
pub use error::{Error, Result};
pub use progress::LevelProgress;

/// Default `K` for the triangular curve.
pub const DEFAULT_BASE: u64 = 100;

/// The level every user starts at.
pub const FIRST_LEVEL: u64 = 1;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_curve_is_triangular_base_100() {
        let curve = LevelCurve::default();
        assert_eq!(curve.spec(), CurveSpec::Triangular { base: DEFAULT_BASE });
        assert_eq!(curve.progress(0).level, FIRST_LEVEL);
    }
}
