//! The congestion control loop: heartbeat in, throttle/restore out.

use std::sync::Arc;

use chrono::Utc;
use greenwave_protocol::Command;
use greenwave_protocol::Heartbeat;
use greenwave_protocol::Phase;

use crate::error::FederationError;
use crate::store::FederationStore;
use crate::store::Intervention;
use crate::store::JunctionStatus;
use crate::topology::Topology;

/// A phase above this is congested and its feeder becomes a throttle target.
const CONGESTION_THRESHOLD: f64 = 80.0;

/// Above this the phase counts as gridlocked and gets the heavy throttle.
const GRIDLOCK_THRESHOLD: f64 = 95.0;

/// A previously congested junction below this average releases its feeders.
const RECOVERY_THRESHOLD: f64 = 50.0;

/// Cap on feeders throttled from a single heartbeat evaluation.
const MAX_THROTTLES_PER_EVAL: usize = 3;

const HEAVY_THROTTLE_SECS: u32 = 25;
const HIGH_THROTTLE_SECS: u32 = 15;

/// Evaluates each heartbeat against the topology and the active
/// interventions. Cheap to clone; the store is shared.
#[derive(Clone)]
pub struct CongestionEngine {
    topology: Arc<Topology>,
    store: Arc<dyn FederationStore>,
}

impl CongestionEngine {
    pub fn new(topology: Topology, store: Arc<dyn FederationStore>) -> Self {
        Self {
            topology: Arc::new(topology),
            store,
        }
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    pub fn store(&self) -> &Arc<dyn FederationStore> {
        &self.store
    }

    /// Full (slow-path) evaluation of one heartbeat: status upsert, then
    /// the throttle and recovery passes.
    pub fn evaluate(&self, heartbeat: &Heartbeat) -> Result<(), FederationError> {
        let status = self.status_from(heartbeat);
        let average = status.junction_saturation;
        let phase_saturations = status.phase_saturations.clone();
        self.store.upsert_status(status)?;

        let any_congested = phase_saturations
            .values()
            .any(|&sat| sat > CONGESTION_THRESHOLD);
        if any_congested {
            if let Some(link) = self.topology.external_link(&heartbeat.junction_id) {
                tracing::info!(
                    junction = %heartbeat.junction_id,
                    %link,
                    "congestion at externally federated junction, alerting only"
                );
            } else {
                self.throttle_feeders(&heartbeat.junction_id, &phase_saturations)?;
            }
        }

        self.release_if_recovered(&heartbeat.junction_id, average)?;
        Ok(())
    }

    fn status_from(&self, heartbeat: &Heartbeat) -> JunctionStatus {
        let phase_saturations: std::collections::BTreeMap<Phase, f64> = heartbeat
            .lanes
            .iter()
            .map(|(phase, lane)| (*phase, lane.saturation_level))
            .collect();
        JunctionStatus {
            junction_id: heartbeat.junction_id.clone(),
            junction_saturation: heartbeat.average_saturation(),
            phase_saturations,
            heartbeat: heartbeat.clone(),
            last_updated: Utc::now(),
        }
    }

    /// Throttle the feeder behind every congested phase, hardest where the
    /// phase is gridlocked. At most one intervention per feeder stays
    /// active, so repeated heartbeats do not stack commands.
    fn throttle_feeders(
        &self,
        junction_id: &str,
        phase_saturations: &std::collections::BTreeMap<Phase, f64>,
    ) -> Result<(), FederationError> {
        let name = self.topology.node_name(junction_id);
        let mut throttled = 0usize;
        for (&phase, &sat) in phase_saturations {
            if sat <= CONGESTION_THRESHOLD || throttled >= MAX_THROTTLES_PER_EVAL {
                continue;
            }
            let Some(upstream) = self.topology.upstream_for(junction_id, phase) else {
                continue;
            };
            let secs = if sat > GRIDLOCK_THRESHOLD {
                HEAVY_THROTTLE_SECS
            } else {
                HIGH_THROTTLE_SECS
            };
            tracing::info!(
                junction = %junction_id,
                %phase,
                sat,
                %upstream,
                secs,
                "throttling feeder"
            );
            self.store.record_intervention(Intervention {
                source_id: upstream.to_string(),
                target_id: junction_id.to_string(),
                reason: format!("Phase {phase} Congestion ({sat:.0}%)"),
                created_at: Utc::now(),
            })?;
            self.store.queue_command(
                upstream,
                Command::throttle(
                    phase,
                    secs,
                    format!("Congestion at {name} phase {phase} ({sat:.0}%)"),
                ),
            )?;
            throttled += 1;
        }
        Ok(())
    }

    /// Once a junction that caused interventions drops below the recovery
    /// threshold, every feeder it throttled gets a full restore.
    fn release_if_recovered(&self, junction_id: &str, average: f64) -> Result<(), FederationError> {
        if average >= RECOVERY_THRESHOLD {
            return Ok(());
        }
        for intervention in self.store.interventions_against(junction_id)? {
            tracing::info!(
                junction = %junction_id,
                feeder = %intervention.source_id,
                "congestion cleared, releasing feeder"
            );
            self.store
                .remove_interventions_from(&intervention.source_id)?;
            let restores = Phase::ALL.into_iter().map(Command::restore).collect();
            self.store
                .replace_commands(&intervention.source_id, restores)?;
        }
        Ok(())
    }
}
