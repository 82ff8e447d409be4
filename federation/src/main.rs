use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use greenwave_federation::CongestionEngine;
use greenwave_federation::FederationStore;
use greenwave_federation::MemoryStore;
use greenwave_federation::SqliteStore;
use greenwave_federation::Topology;
use greenwave_federation::router;
use tracing_subscriber::EnvFilter;

/// Regional congestion controller for federated junctions.
#[derive(Debug, Parser)]
#[command(version)]
struct Cli {
    /// Address to serve on.
    #[arg(long, default_value = "0.0.0.0:8000")]
    listen: SocketAddr,

    /// Topology file (nodes, connections, external links). Missing file
    /// means an empty network that only tracks statuses.
    #[arg(long)]
    topology: Option<PathBuf>,

    /// SQLite database path. Omit to keep all state in memory.
    #[arg(long)]
    db: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let topology = match &cli.topology {
        Some(path) => Topology::load(path)
            .with_context(|| format!("loading topology from {}", path.display()))?,
        None => Topology::default(),
    };
    tracing::info!(nodes = topology.node_count(), "topology loaded");

    let store: Arc<dyn FederationStore> = match &cli.db {
        Some(path) => Arc::new(
            SqliteStore::open(path)
                .with_context(|| format!("opening database {}", path.display()))?,
        ),
        None => Arc::new(MemoryStore::new()),
    };
    tracing::info!(backend = store.backend(), "store ready");

    let app = router(CongestionEngine::new(topology, store));
    let listener = tokio::net::TcpListener::bind(cli.listen)
        .await
        .with_context(|| format!("binding {}", cli.listen))?;
    tracing::info!(listen = %cli.listen, "federation controller up");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                tracing::warn!(%err, "ctrl-c handler failed");
            }
            tracing::info!("shutting down");
        })
        .await
        .context("server error")?;
    Ok(())
}
