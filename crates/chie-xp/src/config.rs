//! Node configuration from environment variables.

use crate::engine::{EngineConfig, DEFAULT_MAX_RETRIES};
use crate::error::{Error, Result};
use crate::policy::XpPolicy;
use chie_leveling::{LevelCurve, DEFAULT_BASE};
use std::net::SocketAddr;
use std::path::PathBuf;

/// Default clamp for leaderboard page sizes on the HTTP surface.
pub const DEFAULT_LEADERBOARD_MAX: usize = 100;

/// Configuration for a Chie node.
#[derive(Debug, Clone)]
pub struct ChieConfig {
    /// Data directory for storage
    pub data_dir: PathBuf,

    /// HTTP API listen address
    pub api_addr: SocketAddr,

    /// Admin socket path (for chie-admin CLI)
    pub admin_socket: PathBuf,

    /// Largest leaderboard page served over HTTP
    pub leaderboard_max: usize,

    /// Engine tuning
    pub engine: EngineConfig,
}

impl ChieConfig {
    /// Create config from environment variables with sensible defaults.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create config from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let data_dir =
            PathBuf::from(lookup("CHIE_DATA_DIR").unwrap_or_else(|| "./chie-data".to_string()));

        let api_addr = lookup("CHIE_API_ADDR")
            .unwrap_or_else(|| "0.0.0.0:8080".to_string())
            .parse()
            .map_err(|e| Error::Config(format!("invalid CHIE_API_ADDR: {}", e)))?;

        let admin_socket = lookup("CHIE_ADMIN_SOCKET")
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join("admin.sock"));

        let curve = match lookup("CHIE_LEVEL_TABLE") {
            Some(table) => LevelCurve::table(parse_list("CHIE_LEVEL_TABLE", &table)?)
                .map_err(|e| Error::Config(e.to_string()))?,
            None => {
                let base = parse_or("CHIE_LEVEL_BASE", lookup("CHIE_LEVEL_BASE"), DEFAULT_BASE)?;
                LevelCurve::triangular(base).map_err(|e| Error::Config(e.to_string()))?
            }
        };

        let policy = match lookup("CHIE_XP_POLICY") {
            Some(raw) => raw.parse::<XpPolicy>().map_err(|e| match e {
                Error::Config(msg) => Error::Config(msg),
                other => Error::Config(format!("invalid CHIE_XP_POLICY: {}", other)),
            })?,
            None => XpPolicy::default(),
        };

        let implicit_create = parse_or("CHIE_IMPLICIT_CREATE", lookup("CHIE_IMPLICIT_CREATE"), true)?;
        let max_retries = parse_or("CHIE_MAX_RETRIES", lookup("CHIE_MAX_RETRIES"), DEFAULT_MAX_RETRIES)?;
        let leaderboard_max = parse_or(
            "CHIE_LEADERBOARD_MAX",
            lookup("CHIE_LEADERBOARD_MAX"),
            DEFAULT_LEADERBOARD_MAX,
        )?;

        Ok(Self {
            data_dir,
            api_addr,
            admin_socket,
            leaderboard_max,
            engine: EngineConfig {
                curve,
                policy,
                implicit_create,
                max_retries,
            },
        })
    }

    /// RocksDB directory inside the data dir.
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("db")
    }
}

fn parse_or<T>(name: &str, raw: Option<String>, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match raw {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|e| Error::Config(format!("invalid {}: {}", name, e))),
        None => Ok(default),
    }
}

fn parse_list(name: &str, raw: &str) -> Result<Vec<u64>> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse()
                .map_err(|e| Error::Config(format!("invalid {} entry {:?}: {}", name, s, e)))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ActionKind;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<ChieConfig> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ChieConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn defaults() {
        let c = config(&[]).unwrap();
        assert_eq!(c.data_dir, PathBuf::from("./chie-data"));
        assert_eq!(c.admin_socket, PathBuf::from("./chie-data/admin.sock"));
        assert_eq!(c.api_addr.port(), 8080);
        assert_eq!(c.leaderboard_max, DEFAULT_LEADERBOARD_MAX);
        assert!(c.engine.implicit_create);
        assert_eq!(c.engine.max_retries, DEFAULT_MAX_RETRIES);
        assert_eq!(c.engine.curve, LevelCurve::default());
        assert_eq!(c.engine.policy, XpPolicy::default());
    }

    #[test]
    fn overrides() {
        let c = config(&[
            ("CHIE_DATA_DIR", "/var/lib/chie"),
            ("CHIE_LEVEL_BASE", "250"),
            ("CHIE_XP_POLICY", "CREATE_KNOWLEDGE=30,VIEW_KNOWLEDGE=1"),
            ("CHIE_IMPLICIT_CREATE", "false"),
            ("CHIE_MAX_RETRIES", "4"),
        ])
        .unwrap();
        assert_eq!(c.admin_socket, PathBuf::from("/var/lib/chie/admin.sock"));
        assert_eq!(c.engine.curve.threshold(2), Some(250));
        assert_eq!(
            c.engine.policy.amount(ActionKind::ViewKnowledge).unwrap(),
            1
        );
        assert!(!c.engine.implicit_create);
        assert_eq!(c.engine.max_retries, 4);
    }

    #[test]
    fn table_overrides_base() {
        let c = config(&[
            ("CHIE_LEVEL_BASE", "250"),
            ("CHIE_LEVEL_TABLE", "100, 300, 4500"),
        ])
        .unwrap();
        assert_eq!(c.engine.curve.max_level(), Some(4));
        assert_eq!(c.engine.curve.threshold(4), Some(4500));
    }

    #[test]
    fn bad_values_are_config_errors() {
        for vars in [
            vec![("CHIE_API_ADDR", "nowhere")],
            vec![("CHIE_LEVEL_BASE", "0")],
            vec![("CHIE_LEVEL_BASE", "-3")],
            vec![("CHIE_LEVEL_TABLE", "10,5")],
            vec![("CHIE_XP_POLICY", "NOPE=3")],
            vec![("CHIE_IMPLICIT_CREATE", "maybe")],
        ] {
            assert!(
                matches!(config(&vars), Err(Error::Config(_))),
                "expected config error for {:?}",
                vars
            );
        }
    }
}
