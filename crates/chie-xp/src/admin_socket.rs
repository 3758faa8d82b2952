//! Unix socket server for admin commands.
//!
//! Provides a local IPC interface for registering users, manual XP
//! corrections, and ledger audits. One JSON command per line, one JSON
//! response per line.

use crate::engine::ExperienceEngine;
use crate::error::Result;
use crate::models::{RankMode, UserId};
use crate::ranking::RankingAggregator;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};

/// Admin command sent over the socket.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum AdminCommand {
    /// Create a user's aggregate at level 1
    Register { user_id: UserId },
    /// Manual XP correction, positive or negative
    Adjust {
        user_id: UserId,
        delta: i64,
        #[serde(default)]
        note: Option<String>,
    },
    /// Compare one user's aggregate with the ledger
    Audit { user_id: UserId },
    /// Audit every user with an aggregate
    AuditAll,
    /// Rebuild one user's aggregate from the ledger
    Repair { user_id: UserId },
    /// Leaderboard rank of one user
    Rank {
        user_id: UserId,
        #[serde(default)]
        mode: RankMode,
    },
    /// Ping (health check)
    Ping,
}

/// Response from admin command.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AdminResponse {
    Ok { message: String },
    Error { error: String },
    Report { value: serde_json::Value },
    Pong,
}

impl AdminResponse {
    fn report<T: Serialize>(value: &T) -> Self {
        match serde_json::to_value(value) {
            Ok(value) => AdminResponse::Report { value },
            Err(e) => AdminResponse::Error {
                error: e.to_string(),
            },
        }
    }

    fn failed(e: impl std::fmt::Display) -> Self {
        AdminResponse::Error {
            error: e.to_string(),
        }
    }
}

/// Admin socket server.
pub struct AdminSocket {
    engine: Arc<ExperienceEngine>,
    ranking: Arc<RankingAggregator>,
    socket_path: PathBuf,
}

impl AdminSocket {
    /// Create a new admin socket server.
    pub fn new(
        engine: Arc<ExperienceEngine>,
        ranking: Arc<RankingAggregator>,
        socket_path: PathBuf,
    ) -> Self {
        Self {
            engine,
            ranking,
            socket_path,
        }
    }

    /// Run the admin socket server.
    pub async fn run(&self) -> Result<()> {
        // Remove existing socket file if present
        let _ = std::fs::remove_file(&self.socket_path);

        let listener = UnixListener::bind(&self.socket_path)?;
        tracing::info!("Admin socket listening on {:?}", self.socket_path);

        loop {
            match listener.accept().await {
                Ok((stream, _)) => {
                    let engine = Arc::clone(&self.engine);
                    let ranking = Arc::clone(&self.ranking);
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, engine, ranking).await {
                            tracing::error!("Admin connection error: {}", e);
                        }
                    });
                }
                Err(e) => {
                    tracing::error!("Failed to accept admin connection: {}", e);
                }
            }
        }
    }

    /// Get the socket path.
    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }
}

async fn handle_connection(
    stream: UnixStream,
    engine: Arc<ExperienceEngine>,
    ranking: Arc<RankingAggregator>,
) -> Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    while reader.read_line(&mut line).await? > 0 {
        let response = match serde_json::from_str::<AdminCommand>(&line) {
            Ok(cmd) => execute_command(cmd, &engine, &ranking),
            Err(e) => AdminResponse::Error {
                error: format!("Invalid command: {}", e),
            },
        };

        let response_json = serde_json::to_string(&response)? + "\n";
        writer.write_all(response_json.as_bytes()).await?;
        line.clear();
    }

    Ok(())
}

fn execute_command(
    cmd: AdminCommand,
    engine: &ExperienceEngine,
    ranking: &RankingAggregator,
) -> AdminResponse {
    match cmd {
        AdminCommand::Register { user_id } => match engine.register(&user_id) {
            Ok(aggregate) => AdminResponse::Ok {
                message: format!(
                    "Registered {} (level {}, {} XP)",
                    user_id, aggregate.level, aggregate.total_xp
                ),
            },
            Err(e) => AdminResponse::failed(e),
        },

        AdminCommand::Adjust {
            user_id,
            delta,
            note,
        } => match engine.adjust(&user_id, delta, note) {
            Ok(result) => {
                tracing::info!(
                    user = %user_id,
                    delta,
                    total = result.new_total_xp,
                    "Applied manual adjustment"
                );
                AdminResponse::report(&result)
            }
            Err(e) => AdminResponse::failed(e),
        },

        AdminCommand::Audit { user_id } => match engine.audit(&user_id) {
            Ok(report) => AdminResponse::report(&report),
            Err(e) => AdminResponse::failed(e),
        },

        AdminCommand::AuditAll => match engine.audit_all() {
            Ok(reports) => {
                let drifted: Vec<_> = reports.into_iter().filter(|r| !r.is_consistent()).collect();
                if drifted.is_empty() {
                    AdminResponse::Ok {
                        message: "All aggregates match the ledger".to_string(),
                    }
                } else {
                    tracing::warn!(count = drifted.len(), "Audit found drifted aggregates");
                    AdminResponse::report(&drifted)
                }
            }
            Err(e) => AdminResponse::failed(e),
        },

        AdminCommand::Repair { user_id } => match engine.repair(&user_id) {
            Ok(outcome) => AdminResponse::report(&outcome),
            Err(e) => AdminResponse::failed(e),
        },

        AdminCommand::Rank { user_id, mode } => match ranking.rank_of_with(&user_id, mode) {
            Ok(rank) => AdminResponse::Ok {
                message: format!("{} is ranked #{}", user_id, rank),
            },
            Err(e) => AdminResponse::failed(e),
        },

        AdminCommand::Ping => AdminResponse::Pong,
    }
}
