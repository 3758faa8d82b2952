//! Chie XP - Experience & Leveling Engine
//!
//! Awards experience points for platform actions, keeps an append-only
//! activity ledger, derives levels from a cumulative curve, and serves a
//! deterministic leaderboard.
//!
//! # Architecture
//!
//! - **Models**: Ledger entries, user aggregates, leaderboard rows
//! - **Store**: Ledger and aggregate persistence (RocksDB or in-memory)
//! - **Engine**: Grants with atomic ledger append and aggregate update
//! - **Ranking**: Paginated leaderboard and per-user rank
//! - **Audit**: Ledger/aggregate consistency checks and repair
//! - **API**: HTTP endpoints for handlers and profile views
//! - **Admin Socket**: Unix socket for local admin commands (chie-admin CLI)
//!
//! # Example
//!
//! ```no_run
//! use chie_xp::{ChieConfig, ChieNode};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ChieConfig::from_env()?;
//!     let node = ChieNode::new(config).await?;
//!     node.run().await?;
//!     Ok(())
//! }
//! ```

pub mod admin_socket;
pub mod api;
pub mod audit;
pub mod award;
pub mod config;
pub mod engine;
pub mod error;
pub mod models;
pub mod node;
pub mod policy;
pub mod ranking;
pub mod store;

pub use audit::{AuditReport, RepairOutcome};
pub use award::{award, Award};
pub use config::ChieConfig;
pub use engine::{Creation, EngineConfig, ExperienceEngine, GrantResult};
pub use error::{Error, Result};
pub use models::{
    ActionKind, ActivityEntry, EntryId, LeaderboardRow, RankMode, UserAggregate, UserId,
};
pub use node::{ChieNode, ChieState};
pub use policy::XpPolicy;
pub use ranking::RankingAggregator;
pub use store::{ActivityLedger, AggregateStore, ExperienceStore, MemoryStore, RocksStore};
