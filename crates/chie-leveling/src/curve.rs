//! Level curves: cumulative thresholds and the XP → level lookup.

use crate::error::{Error, Result};
use crate::progress::LevelProgress;
use crate::{DEFAULT_BASE, FIRST_LEVEL};

/// Unvalidated description of a curve, as it appears in configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(tag = "shape", rename_all = "snake_case")
)]
pub enum CurveSpec {
    /// `threshold(n) = base * n * (n + 1) / 2` cumulative XP for `n` completed levels.
    Triangular { base: u64 },

    /// Explicit cumulative thresholds for reaching levels 2, 3, ...
    ///
    /// Past the last entry the level is capped.
    Table { thresholds: Vec<u64> },
}

/// A validated level curve.
///
/// Construct through [`LevelCurve::triangular`], [`LevelCurve::table`] or
/// `TryFrom<CurveSpec>`; every constructed curve has strictly increasing
/// thresholds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LevelCurve {
    spec: CurveSpec,
}

impl Default for LevelCurve {
    fn default() -> Self {
        Self {
            spec: CurveSpec::Triangular { base: DEFAULT_BASE },
        }
    }
}

impl TryFrom<CurveSpec> for LevelCurve {
    type Error = Error;

    fn try_from(spec: CurveSpec) -> Result<Self> {
        validate(&spec)?;
        Ok(Self { spec })
    }
}

impl LevelCurve {
    /// Triangular curve with per-level cost step `base`.
    pub fn triangular(base: u64) -> Result<Self> {
        Self::try_from(CurveSpec::Triangular { base })
    }

    /// Table curve from cumulative thresholds for levels 2, 3, ...
    pub fn table(thresholds: Vec<u64>) -> Result<Self> {
        Self::try_from(CurveSpec::Table { thresholds })
    }

    /// The configuration this curve was built from.
    pub fn spec(&self) -> CurveSpec {
        self.spec.clone()
    }

    /// Highest reachable level, or `None` for unbounded curves.
    pub fn max_level(&self) -> Option<u64> {
        match &self.spec {
            CurveSpec::Triangular { .. } => None,
            CurveSpec::Table { thresholds } => Some(thresholds.len() as u64 + FIRST_LEVEL),
        }
    }

    /// Cumulative XP at which `level` begins.
    ///
    /// Returns `None` for level 0, for levels past a table's cap, and for
    /// thresholds that do not fit in a `u64`.
    pub fn threshold(&self, level: u64) -> Option<u64> {
        if level < FIRST_LEVEL {
            return None;
        }
        let completed = level - FIRST_LEVEL;
        match &self.spec {
            CurveSpec::Triangular { base } => {
                let xp = (*base as u128).checked_mul(triangular(completed as u128))?;
                u64::try_from(xp).ok()
            }
            CurveSpec::Table { thresholds } => {
                if completed == 0 {
                    Some(0)
                } else {
                    thresholds.get(completed as usize - 1).copied()
                }
            }
        }
    }

    /// Checked lookup for signed inputs. Negative XP is a caller bug.
    pub fn level_for(&self, total_xp: i64) -> Result<LevelProgress> {
        let xp = u64::try_from(total_xp).map_err(|_| Error::InvalidArgument(total_xp))?;
        Ok(self.progress(xp))
    }

    /// Level, progress into the level, and distance to the next level for `total_xp`.
    pub fn progress(&self, total_xp: u64) -> LevelProgress {
        match &self.spec {
            CurveSpec::Triangular { base } => triangular_progress(*base, total_xp),
            CurveSpec::Table { thresholds } => table_progress(thresholds, total_xp),
        }
    }

    /// Level only.
    #[inline]
    pub fn level(&self, total_xp: u64) -> u64 {
        self.progress(total_xp).level
    }
}

fn validate(spec: &CurveSpec) -> Result<()> {
    match spec {
        CurveSpec::Triangular { base } => {
            if *base == 0 {
                return Err(Error::InvalidCurve("base must be positive".into()));
            }
        }
        CurveSpec::Table { thresholds } => {
            let Some(first) = thresholds.first() else {
                return Err(Error::InvalidCurve(
                    "table must contain at least one threshold".into(),
                ));
            };
            if *first == 0 {
                return Err(Error::InvalidCurve(
                    "first threshold must be positive".into(),
                ));
            }
            if let Some(pair) = thresholds.windows(2).find(|w| w[0] >= w[1]) {
                return Err(Error::InvalidCurve(format!(
                    "thresholds must be strictly increasing ({} then {})",
                    pair[0], pair[1]
                )));
            }
        }
    }
    Ok(())
}

/// `n * (n + 1) / 2`
#[inline]
const fn triangular(n: u128) -> u128 {
    n * (n + 1) / 2
}

fn triangular_progress(base: u64, total_xp: u64) -> LevelProgress {
    // threshold(m) <= xp  <=>  tri(m) <= floor(xp / base)
    let quota = (total_xp / base) as u128;

    // Binary search for the number of completed levels
    let mut low = 0u128;
    let mut high = ((2.0 * quota as f64).sqrt() as u128) + 2;
    while triangular(high) <= quota {
        high *= 2;
    }
    while high - low > 1 {
        let mid = (low + high) / 2;
        if triangular(mid) <= quota {
            low = mid;
        } else {
            high = mid;
        }
    }

    let completed = low;
    let start = base as u128 * triangular(completed);
    let next = base as u128 * triangular(completed + 1);
    let xp = total_xp as u128;

    LevelProgress {
        level: completed as u64 + FIRST_LEVEL,
        total_xp,
        current_level_xp: (xp - start) as u64,
        xp_to_next_level: u64::try_from(next - xp).unwrap_or(u64::MAX),
        next_level_threshold: u64::try_from(next).ok(),
    }
}

fn table_progress(thresholds: &[u64], total_xp: u64) -> LevelProgress {
    let completed = thresholds.partition_point(|t| *t <= total_xp);
    let start = if completed == 0 {
        0
    } else {
        thresholds[completed - 1]
    };
    let next = thresholds.get(completed).copied();

    LevelProgress {
        level: completed as u64 + FIRST_LEVEL,
        total_xp,
        current_level_xp: total_xp - start,
        xp_to_next_level: next.map_or(0, |n| n - total_xp),
        next_level_threshold: next,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn curve() -> LevelCurve {
        LevelCurve::triangular(100).unwrap()
    }

    #[test]
    fn zero_xp_is_level_one() {
        let p = curve().progress(0);
        assert_eq!(p.level, 1);
        assert_eq!(p.current_level_xp, 0);
        assert_eq!(p.xp_to_next_level, 100);
        assert_eq!(p.next_level_threshold, Some(100));
    }

    #[test]
    fn eighty_xp_stays_level_one() {
        let p = curve().progress(80);
        assert_eq!(p.level, 1);
        assert_eq!(p.current_level_xp, 80);
        assert_eq!(p.xp_to_next_level, 20);
    }

    #[test]
    fn one_fifty_xp_is_level_two() {
        let p = curve().progress(150);
        assert_eq!(p.level, 2);
        assert_eq!(p.current_level_xp, 50);
        assert_eq!(p.xp_to_next_level, 150);
        assert_eq!(p.next_level_threshold, Some(300));
    }

    #[test]
    fn exact_threshold_starts_new_level() {
        let c = curve();
        assert_eq!(c.level(99), 1);
        assert_eq!(c.level(100), 2);
        assert_eq!(c.level(299), 2);
        assert_eq!(c.level(300), 3);
        assert_eq!(c.level(600), 4);
        assert_eq!(c.progress(300).current_level_xp, 0);
    }

    #[test]
    fn thresholds_match_formula() {
        let c = curve();
        assert_eq!(c.threshold(0), None);
        assert_eq!(c.threshold(1), Some(0));
        assert_eq!(c.threshold(2), Some(100));
        assert_eq!(c.threshold(3), Some(300));
        assert_eq!(c.threshold(10), Some(4500));
    }

    #[test]
    fn huge_xp_does_not_overflow() {
        let p = curve().progress(u64::MAX);
        assert!(p.level > 1);
        assert_eq!(p.total_xp, u64::MAX);

        let unit = LevelCurve::triangular(1).unwrap().progress(u64::MAX);
        assert!(unit.level > 1);
    }

    #[test]
    fn negative_input_rejected() {
        assert_eq!(curve().level_for(-1), Err(Error::InvalidArgument(-1)));
        assert_eq!(curve().level_for(150).unwrap().level, 2);
    }

    #[test]
    fn zero_base_rejected() {
        assert!(matches!(
            LevelCurve::triangular(0),
            Err(Error::InvalidCurve(_))
        ));
    }

    #[test]
    fn table_curve_caps() {
        let c = LevelCurve::table(vec![50, 200, 1000]).unwrap();
        assert_eq!(c.max_level(), Some(4));
        assert_eq!(c.level(0), 1);
        assert_eq!(c.level(50), 2);
        assert_eq!(c.progress(120).xp_to_next_level, 80);

        let top = c.progress(5000);
        assert_eq!(top.level, 4);
        assert_eq!(top.current_level_xp, 4000);
        assert!(top.is_capped());

        assert_eq!(c.threshold(1), Some(0));
        assert_eq!(c.threshold(4), Some(1000));
        assert_eq!(c.threshold(5), None);
    }

    #[test]
    fn bad_tables_rejected() {
        assert!(LevelCurve::table(vec![]).is_err());
        assert!(LevelCurve::table(vec![0, 10]).is_err());
        assert!(LevelCurve::table(vec![10, 10]).is_err());
        assert!(LevelCurve::table(vec![30, 10]).is_err());
    }

    proptest! {
        #[test]
        fn level_is_total_and_at_least_one(base in 1u64..10_000, xp in any::<u64>()) {
            let p = LevelCurve::triangular(base).unwrap().progress(xp);
            prop_assert!(p.level >= FIRST_LEVEL);
            prop_assert_eq!(p.total_xp, xp);
        }

        #[test]
        fn level_is_monotonic(base in 1u64..10_000, a in any::<u64>(), b in any::<u64>()) {
            let c = LevelCurve::triangular(base).unwrap();
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            prop_assert!(c.level(lo) <= c.level(hi));
        }

        #[test]
        fn progress_agrees_with_threshold(base in 1u64..1_000, xp in 0u64..10_000_000) {
            let c = LevelCurve::triangular(base).unwrap();
            let p = c.progress(xp);
            let start = c.threshold(p.level).unwrap();
            let next = c.threshold(p.level + 1).unwrap();
            prop_assert!(start <= xp && xp < next);
            prop_assert_eq!(p.current_level_xp, xp - start);
            prop_assert_eq!(p.xp_to_next_level, next - xp);
        }

        #[test]
        fn table_level_is_monotonic(mut steps in proptest::collection::vec(1u64..1_000, 1..20), a in 0u64..50_000, b in 0u64..50_000) {
            let mut acc = 0u64;
            for s in steps.iter_mut() {
                acc += *s;
                *s = acc;
            }
            let c = LevelCurve::table(steps).unwrap();
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            prop_assert!(c.level(lo) <= c.level(hi));
            prop_assert!(c.level(hi) <= c.max_level().unwrap());
        }
    }
}
