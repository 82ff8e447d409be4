//! Edge side of the federation link.
//!
//! A single background task pushes heartbeats and drains the per-junction
//! command queue. The link is strictly advisory: every failure degrades to
//! "not connected" and the cycle loop never notices.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::time::Duration;

use chrono::Utc;
use greenwave_protocol::Command;
use greenwave_protocol::CommandType;
use greenwave_protocol::DecisionResult;
use greenwave_protocol::Heartbeat;
use greenwave_protocol::HeartbeatAck;
use greenwave_protocol::LaneReport;
use greenwave_protocol::Phase;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::cycle::CycleOverride;
use crate::cycle::OverrideSlot;
use crate::telemetry::TelemetryStore;

/// Heartbeat cadence. The queue drain rides the same tick.
const TICK: Duration = Duration::from_millis(300);

/// Per-request budget; the federation answer is a fast ack by design of the
/// protocol, anything slower counts as a dead link.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone)]
pub struct BridgeConfig {
    pub base_url: String,
    pub junction_id: String,
}

/// Pushes heartbeats to the federation controller and applies the commands
/// it queues back.
pub struct TelemetryBridge {
    client: reqwest::Client,
    config: BridgeConfig,
    store: TelemetryStore,
    decisions: watch::Receiver<Option<DecisionResult>>,
    overrides: OverrideSlot,
    connected: Arc<AtomicBool>,
    /// What the federation currently forces on us, keyed by phase. Tracks
    /// the server's view; the one-shot slot is what the controller consumes.
    active_overrides: HashMap<Phase, u32>,
    cancel: CancellationToken,
}

impl TelemetryBridge {
    pub fn new(
        config: BridgeConfig,
        store: TelemetryStore,
        decisions: watch::Receiver<Option<DecisionResult>>,
        overrides: OverrideSlot,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .build()
                // Builder only fails on TLS backend misconfiguration.
                .unwrap_or_default(),
            config,
            store,
            decisions,
            overrides,
            connected: Arc::new(AtomicBool::new(false)),
            active_overrides: HashMap::new(),
            cancel,
        }
    }

    /// Shared flag other tasks can read to report link health.
    pub fn connected_flag(&self) -> Arc<AtomicBool> {
        self.connected.clone()
    }

    pub async fn run(mut self) {
        let mut ticker = tokio::time::interval(TICK);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                () = self.cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }
            self.tick().await;
        }
        tracing::debug!("federation bridge stopped");
    }

    async fn tick(&mut self) {
        let heartbeat = self.build_heartbeat();
        match self.send_heartbeat(&heartbeat).await {
            Ok(ack) => {
                self.set_connected(true);
                // The ack never reports throttling; a server restart would
                // otherwise leave us throttled forever.
                if !ack.server_says_throttled && !self.active_overrides.is_empty() {
                    tracing::info!("server no longer throttling, dropping local overrides");
                    self.active_overrides.clear();
                }
            }
            Err(err) => {
                self.set_connected(false);
                tracing::debug!(%err, "heartbeat failed");
                return;
            }
        }

        match self.fetch_commands().await {
            Ok(commands) => {
                for command in commands {
                    self.apply(command);
                }
            }
            Err(err) => {
                self.set_connected(false);
                tracing::debug!(%err, "command poll failed");
            }
        }
    }

    fn build_heartbeat(&self) -> Heartbeat {
        let snapshot = self.store.snapshot();
        let lanes = match self.decisions.borrow().as_ref() {
            Some(decision) => Phase::ALL
                .into_iter()
                .map(|phase| {
                    let saturation = decision
                        .phase_details
                        .get(&phase)
                        .map(|score| score.saturation_fraction() * 100.0)
                        .unwrap_or(0.0);
                    let green = decision.allocated_times.get(&phase).copied().unwrap_or(0);
                    let event = snapshot
                        .frames
                        .get(&phase)
                        .map(|frame| frame.event)
                        .unwrap_or_default();
                    (
                        phase,
                        LaneReport {
                            saturation_level: saturation,
                            current_green_time: green,
                            event,
                            directional_counts: None,
                        },
                    )
                })
                .collect(),
            // Boot: nothing decided yet, report presence only.
            None => Default::default(),
        };
        Heartbeat {
            junction_id: self.config.junction_id.clone(),
            timestamp: Utc::now().timestamp_millis() as f64 / 1000.0,
            lanes,
        }
    }

    async fn send_heartbeat(&self, heartbeat: &Heartbeat) -> Result<HeartbeatAck, reqwest::Error> {
        self.client
            .post(format!("{}/heartbeat", self.config.base_url))
            .json(heartbeat)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
    }

    async fn fetch_commands(&self) -> Result<Vec<Command>, reqwest::Error> {
        self.client
            .get(format!(
                "{}/commands/{}",
                self.config.base_url, self.config.junction_id
            ))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
    }

    fn apply(&mut self, command: Command) {
        match command.command_type {
            CommandType::ThrottleAdjust => {
                let Some(secs) = command.value else {
                    tracing::warn!(?command, "throttle command without a value, ignoring");
                    return;
                };
                tracing::info!(
                    phase = %command.target_lane,
                    secs,
                    reason = %command.reason,
                    "federation throttle received"
                );
                self.active_overrides.insert(command.target_lane, secs);
                self.overrides.set(CycleOverride {
                    phase: command.target_lane,
                    green_secs: secs,
                    source: command.reason,
                });
            }
            CommandType::RestoreNormal => {
                tracing::info!(phase = %command.target_lane, "federation restore received");
                self.active_overrides.remove(&command.target_lane);
                self.overrides.clear_for(command.target_lane);
            }
        }
    }

    fn set_connected(&self, up: bool) {
        let was = self.connected.swap(up, Ordering::SeqCst);
        if was != up {
            if up {
                tracing::info!(url = %self.config.base_url, "federation link up");
            } else {
                tracing::warn!(url = %self.config.base_url, "federation link down");
            }
        }
    }
}
