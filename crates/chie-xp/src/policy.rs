//! Static action-kind → XP amount table.

use crate::error::{Error, Result};
use crate::models::ActionKind;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// XP awarded per action kind.
///
/// Adding a kind is a data change here, not a branch in the engine. Kinds
/// missing from the table fail with [`Error::UnknownActionKind`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XpPolicy {
    amounts: BTreeMap<ActionKind, u64>,
}

impl Default for XpPolicy {
    fn default() -> Self {
        Self {
            amounts: BTreeMap::from([
                (ActionKind::CreateKnowledge, 10),
                (ActionKind::CreateComment, 10),
            ]),
        }
    }
}

impl XpPolicy {
    /// Build a policy from explicit `(kind, amount)` pairs.
    pub fn new(entries: impl IntoIterator<Item = (ActionKind, u64)>) -> Result<Self> {
        let mut amounts = BTreeMap::new();
        for (kind, amount) in entries {
            if kind == ActionKind::Adjustment {
                return Err(Error::Config(
                    "ADJUSTMENT cannot carry a fixed amount".into(),
                ));
            }
            if amount == 0 || amount > i64::MAX as u64 {
                return Err(Error::Config(format!(
                    "amount for {} must be in 1..={}, got {}",
                    kind,
                    i64::MAX,
                    amount
                )));
            }
            if amounts.insert(kind, amount).is_some() {
                return Err(Error::Config(format!("duplicate policy entry for {}", kind)));
            }
        }
        Ok(Self { amounts })
    }

    /// XP for `kind`.
    pub fn amount(&self, kind: ActionKind) -> Result<u64> {
        self.amounts
            .get(&kind)
            .copied()
            .ok_or_else(|| Error::UnknownActionKind(kind.as_str().to_string()))
    }

    /// Iterate `(kind, amount)` in kind order.
    pub fn iter(&self) -> impl Iterator<Item = (ActionKind, u64)> + '_ {
        self.amounts.iter().map(|(k, v)| (*k, *v))
    }
}

impl fmt::Display for XpPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .iter()
            .map(|(kind, amount)| format!("{}={}", kind, amount))
            .collect();
        f.write_str(&parts.join(","))
    }
}

/// Parses `KIND=amount,KIND=amount`.
impl FromStr for XpPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let mut entries = Vec::new();
        for part in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let (name, amount) = part
                .split_once('=')
                .ok_or_else(|| Error::Config(format!("policy entry without '=': {}", part)))?;
            let kind: ActionKind = name.parse()?;
            let amount: u64 = amount
                .trim()
                .parse()
                .map_err(|e| Error::Config(format!("bad amount for {}: {}", name.trim(), e)))?;
            entries.push((kind, amount));
        }
        Self::new(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_amounts() {
        let policy = XpPolicy::default();
        assert_eq!(policy.amount(ActionKind::CreateKnowledge).unwrap(), 10);
        assert_eq!(policy.amount(ActionKind::CreateComment).unwrap(), 10);
    }

    #[test]
    fn kinds_outside_table_are_unknown() {
        let policy = XpPolicy::default();
        assert!(matches!(
            policy.amount(ActionKind::ViewKnowledge),
            Err(Error::UnknownActionKind(k)) if k == "VIEW_KNOWLEDGE"
        ));
        assert!(policy.amount(ActionKind::Adjustment).is_err());
    }

    #[test]
    fn parse_round_trips_display() {
        let policy: XpPolicy = "CREATE_KNOWLEDGE=25, UPLOAD_FILE=5".parse().unwrap();
        assert_eq!(policy.amount(ActionKind::CreateKnowledge).unwrap(), 25);
        assert_eq!(policy.amount(ActionKind::UploadFile).unwrap(), 5);
        assert!(policy.amount(ActionKind::CreateComment).is_err());

        let reparsed: XpPolicy = policy.to_string().parse().unwrap();
        assert_eq!(policy, reparsed);
    }

    #[test]
    fn invalid_tables_rejected() {
        assert!("CREATE_KNOWLEDGE".parse::<XpPolicy>().is_err());
        assert!("CREATE_KNOWLEDGE=0".parse::<XpPolicy>().is_err());
        assert!("CREATE_KNOWLEDGE=ten".parse::<XpPolicy>().is_err());
        assert!("ADJUSTMENT=5".parse::<XpPolicy>().is_err());
        assert!("CREATE_KNOWLEDGE=1,CREATE_KNOWLEDGE=2".parse::<XpPolicy>().is_err());
        assert!(matches!(
            "MADE_UP=3".parse::<XpPolicy>(),
            Err(Error::UnknownActionKind(_))
        ));
    }
}
