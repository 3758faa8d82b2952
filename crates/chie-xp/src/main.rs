//! Chie Node binary
//!
//! Serves the experience engine over HTTP and a local admin socket.

use chie_xp::{ChieConfig, ChieNode};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "chie_node=info,chie_xp=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Chie Node");

    let config = ChieConfig::from_env()?;

    // Create and run node
    let node = ChieNode::new(config).await?;
    node.run().await?;

    Ok(())
}
