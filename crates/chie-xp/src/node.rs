//! Chie Node - the main application entry point.
//!
//! Architecture:
//! - Single daemon process with shared RocksDB storage
//! - One engine and one ranking aggregator over that storage
//! - HTTP API for the platform's handlers and views
//! - Unix admin socket for local ops (chie-admin CLI)

use crate::admin_socket::AdminSocket;
use crate::api;
use crate::config::ChieConfig;
use crate::engine::ExperienceEngine;
use crate::error::Result;
use crate::ranking::RankingAggregator;
use crate::store::{ExperienceStore, RocksStore};
use std::sync::Arc;

/// Shared state for the node - single store instance shared by all components.
pub struct ChieState {
    pub engine: Arc<ExperienceEngine>,
    pub ranking: Arc<RankingAggregator>,
    pub config: ChieConfig,
}

impl ChieState {
    /// Wire an engine and ranking aggregator over `store`.
    pub fn new(config: ChieConfig, store: Arc<dyn ExperienceStore>) -> Self {
        let engine = Arc::new(ExperienceEngine::new(
            Arc::clone(&store),
            config.engine.clone(),
        ));
        let ranking = Arc::new(RankingAggregator::new(store));
        Self {
            engine,
            ranking,
            config,
        }
    }
}

/// A Chie node instance.
pub struct ChieNode {
    state: Arc<ChieState>,
    config: ChieConfig,
}

impl ChieNode {
    /// Create a node backed by RocksDB under `config.data_dir`.
    pub async fn new(config: ChieConfig) -> Result<Self> {
        // Ensure data directory exists
        std::fs::create_dir_all(&config.data_dir)?;

        let store: Arc<dyn ExperienceStore> = Arc::new(RocksStore::open(config.db_path())?);
        Ok(Self::with_store(config, store))
    }

    /// Create a node over an existing store.
    pub fn with_store(config: ChieConfig, store: Arc<dyn ExperienceStore>) -> Self {
        let state = Arc::new(ChieState::new(config.clone(), store));
        Self { state, config }
    }

    /// Get the shared state (for API handlers).
    pub fn state(&self) -> Arc<ChieState> {
        Arc::clone(&self.state)
    }

    /// Run the node (starts HTTP server and admin socket).
    pub async fn run(self) -> Result<()> {
        tracing::info!("Chie node starting");
        tracing::info!("  API: http://{}", self.config.api_addr);
        tracing::info!("  Admin: {:?}", self.config.admin_socket);
        tracing::info!("  Data: {:?}", self.config.data_dir);
        tracing::info!("  Curve: {:?}", self.config.engine.curve.spec());
        tracing::info!("  Policy: {}", self.config.engine.policy);

        // Start admin socket server in background
        let admin_socket = AdminSocket::new(
            Arc::clone(&self.state.engine),
            Arc::clone(&self.state.ranking),
            self.config.admin_socket.clone(),
        );
        tokio::spawn(async move {
            if let Err(e) = admin_socket.run().await {
                tracing::error!("Admin socket error: {}", e);
            }
        });

        // Build HTTP API
        let app = api::build_router(Arc::clone(&self.state));

        // Start HTTP server
        let listener = tokio::net::TcpListener::bind(self.config.api_addr).await?;
        tracing::info!("HTTP server listening on {}", self.config.api_addr);

        axum::serve(listener, app).await?;

        Ok(())
    }
}
