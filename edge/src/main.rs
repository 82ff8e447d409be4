mod sim;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use greenwave_core::BridgeConfig;
use greenwave_core::CycleController;
use greenwave_core::DecisionEngine;
use greenwave_core::EdgeConfig;
use greenwave_core::EventEmitter;
use greenwave_core::EventEndpoints;
use greenwave_core::FreezeLog;
use greenwave_core::LogSignals;
use greenwave_core::OverrideSlot;
use greenwave_core::TelemetryBridge;
use greenwave_core::TelemetryStore;
use greenwave_core::source;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Adaptive signal controller for one junction.
#[derive(Debug, Parser)]
#[command(version)]
struct Cli {
    /// Junction identity used in heartbeats and command polls.
    #[arg(long, default_value = "junction-1")]
    junction_id: String,

    /// Base URL of the federation controller.
    #[arg(long, default_value = "http://127.0.0.1:8000")]
    federation_url: String,

    /// Directory with timing.json, zones_<phase>.json and
    /// lane_combinations.json. Missing files fall back to defaults.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Run the built-in traffic simulator instead of real producers.
    #[arg(long)]
    sim: bool,

    /// Stop after this many cycles (simulation runs).
    #[arg(long)]
    cycles: Option<u64>,

    /// Where the freeze snapshot is persisted across restarts.
    #[arg(long, default_value = "state/freeze.json")]
    freeze_log: PathBuf,

    /// Optional decision push endpoint (visualization adapter).
    #[arg(long)]
    decision_url: Option<String>,

    /// Log warnings and errors only.
    #[arg(long, short)]
    quiet: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.quiet { "warn" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .init();

    let mut config = match &cli.config {
        Some(dir) => EdgeConfig::load(dir)?,
        None => EdgeConfig::default(),
    };
    config.timing.validate()?;
    let no_geometry = config
        .zones
        .values()
        .all(|z| z.far_cells.is_empty() && z.near_zone.is_empty());
    if cli.sim && no_geometry {
        config.zones = sim::demo_zones();
    }

    let store = TelemetryStore::new();
    let cancel = CancellationToken::new();
    let overrides = OverrideSlot::new();
    let (decision_tx, decision_rx) = tokio::sync::watch::channel(None);

    let freeze_log = FreezeLog::new(&cli.freeze_log);
    match freeze_log.recover() {
        Ok(Some(record)) => {
            tracing::info!(
                cycle = record.cycle,
                frozen_at = %record.frozen_at,
                "recovered last freeze snapshot"
            );
        }
        Ok(None) => {}
        Err(err) => tracing::warn!(%err, "freeze snapshot unreadable, starting fresh"),
    }

    if cli.sim {
        for (i, phase) in greenwave_protocol::Phase::ALL.into_iter().enumerate() {
            tokio::spawn(source::pump(
                Box::new(sim::SimulatedApproach::new(phase, 40 + i as u64)),
                store.clone(),
                Duration::from_millis(300),
                cancel.clone(),
            ));
        }
        tokio::spawn(sim::blocked_monitor(store.clone(), 99, cancel.clone()));
        tracing::info!("simulated producers running");
    } else {
        tracing::warn!("no telemetry producers configured, cycling on empty approaches");
    }

    let bridge = TelemetryBridge::new(
        BridgeConfig {
            base_url: cli.federation_url.clone(),
            junction_id: cli.junction_id.clone(),
        },
        store.clone(),
        decision_rx.clone(),
        overrides.clone(),
        cancel.clone(),
    );
    tokio::spawn(bridge.run());

    let emitter = EventEmitter::new(
        EventEndpoints {
            decision_url: cli.decision_url.clone(),
            reward_url: None,
            violation_url: None,
        },
        decision_rx,
        cancel.clone(),
    );
    tokio::spawn(emitter.run());

    let engine = DecisionEngine::new(&config);
    let mut controller = CycleController::new(
        store,
        engine,
        Arc::new(LogSignals),
        config.timing,
        overrides,
        Some(freeze_log),
        decision_tx,
        cancel.clone(),
    );
    if let Some(cycles) = cli.cycles {
        controller = controller.with_max_cycles(cycles);
    }

    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received, stopping");
            signal_cancel.cancel();
        }
    });

    tracing::info!(junction = %cli.junction_id, "edge controller up");
    controller.run().await;

    // Stop the background tasks too once the cycle loop ends.
    cancel.cancel();
    Ok(())
}
