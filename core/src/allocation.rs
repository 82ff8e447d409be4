//! Green-time allocation: composite scoring, winner selection, proportional
//! allocation and the rolling congestion state.

use std::collections::BTreeMap;
use std::collections::VecDeque;

use greenwave_protocol::CongestionState;
use greenwave_protocol::DecisionResult;
use greenwave_protocol::Phase;
use greenwave_protocol::PhaseScore;
use greenwave_protocol::PhaseTelemetry;

use crate::classifier;
use crate::config::CycleConfig;
use crate::config::EdgeConfig;
use crate::conflict::ConflictMatrix;
use crate::scorer::PhaseScorer;

/// Multiplier scaling the far-zone grade (1.0–5.0) onto the priority scale.
const GRID_SCALAR: f64 = 100.0;

/// Cycles of green-time history kept per phase for the saturation proxy.
const HISTORY_LEN: usize = 4;

/// Bounded per-phase history of allocated green times.
///
/// Only used to derive a rolling saturation percentage for federation
/// reporting; never feeds back into allocation.
#[derive(Debug, Clone, Default)]
pub struct CycleHistory {
    green_times: BTreeMap<Phase, VecDeque<u32>>,
}

impl CycleHistory {
    pub fn record(&mut self, allocations: &BTreeMap<Phase, u32>) {
        for (phase, secs) in allocations {
            let history = self.green_times.entry(*phase).or_default();
            if history.len() == HISTORY_LEN {
                history.pop_front();
            }
            history.push_back(*secs);
        }
    }

    /// Rolling saturation proxy for one phase, 0.0–100.0.
    ///
    /// Average allocated green rescaled over the `[g_min, g_max]` range; a
    /// phase that keeps winning long greens reads as saturated.
    pub fn network_saturation(&self, phase: Phase, timing: &CycleConfig) -> f64 {
        let Some(history) = self.green_times.get(&phase) else {
            return 0.0;
        };
        if history.is_empty() {
            return 0.0;
        }
        let avg: f64 = history.iter().map(|&t| f64::from(t)).sum::<f64>() / history.len() as f64;
        let span = f64::from(timing.g_max - timing.g_min);
        (((avg - f64::from(timing.g_min)) / span) * 100.0).clamp(0.0, 100.0)
    }
}

/// The decision maker: aggregates the four phase scorers, selects a winner
/// and allocates green time.
#[derive(Debug)]
pub struct DecisionEngine {
    scorers: BTreeMap<Phase, PhaseScorer>,
    matrix: ConflictMatrix,
    timing: CycleConfig,
    state: CongestionState,
    prev_open_lanes: Vec<String>,
    history: CycleHistory,
    last_details: BTreeMap<Phase, PhaseScore>,
}

impl DecisionEngine {
    pub fn new(config: &EdgeConfig) -> Self {
        let scorers = Phase::ALL
            .into_iter()
            .map(|phase| {
                let zones = config.zones.get(&phase).cloned().unwrap_or_default();
                (phase, PhaseScorer::new(phase, zones))
            })
            .collect();
        Self {
            scorers,
            matrix: config.conflict_matrix.clone(),
            timing: config.timing,
            // First cycle starts strict, matching the reference.
            state: CongestionState::Safe,
            prev_open_lanes: Vec::new(),
            history: CycleHistory::default(),
            last_details: BTreeMap::new(),
        }
    }

    pub fn state(&self) -> CongestionState {
        self.state
    }

    pub fn prev_open_lanes(&self) -> &[String] {
        &self.prev_open_lanes
    }

    /// Per-phase scores from the most recent decision, for the heartbeat.
    pub fn last_details(&self) -> &BTreeMap<Phase, PhaseScore> {
        &self.last_details
    }

    pub fn network_saturation(&self, phase: Phase) -> f64 {
        self.history.network_saturation(phase, &self.timing)
    }

    /// Run one full allocation against a frozen telemetry snapshot.
    pub fn decide(&mut self, telemetry: &BTreeMap<Phase, PhaseTelemetry>) -> DecisionResult {
        let empty = PhaseTelemetry::default();

        // Composite score per phase. A phase with no telemetry still
        // competes with a neutral score.
        let mut details = BTreeMap::new();
        let mut scores = BTreeMap::new();
        let mut total: i64 = 0;
        for (phase, scorer) in &self.scorers {
            let frame = telemetry.get(phase).unwrap_or(&empty);
            let score = scorer.score(frame, self.state, &self.prev_open_lanes);
            let composite =
                (score.grid_value * GRID_SCALAR + score.priority_straight + score.priority_left)
                    as i64;
            total += composite;
            scores.insert(*phase, composite);
            details.insert(*phase, score);
        }

        // Winner: max composite, ties broken by declaration order. BTreeMap
        // iterates in that order, so a strict `>` keeps the first maximum.
        let mut winner = Phase::North;
        let mut best = i64::MIN;
        for (phase, composite) in &scores {
            if *composite > best {
                best = *composite;
                winner = *phase;
            }
        }

        // Proportional allocation: Gi = Gmin + (Pi / total) * (Gmax - Gmin).
        let span = f64::from(self.timing.g_max - self.timing.g_min);
        let allocated_times: BTreeMap<Phase, u32> = scores
            .iter()
            .map(|(phase, composite)| {
                let secs = if total == 0 {
                    self.timing.g_min
                } else {
                    let ratio = *composite as f64 / total as f64;
                    self.timing.g_min + (ratio * span) as u32
                };
                (*phase, secs)
            })
            .collect();

        // Next-cycle state from the average saturation of this snapshot.
        let avg_saturation = details
            .values()
            .map(PhaseScore::saturation_fraction)
            .sum::<f64>()
            / details.len() as f64;
        self.state = classifier::classify(avg_saturation);

        let allowed_lanes = self.matrix.allowed(winner, self.state);
        self.prev_open_lanes = allowed_lanes.clone();
        self.history.record(&allocated_times);
        self.last_details = details.clone();

        tracing::info!(
            %winner,
            state = %self.state,
            scores = ?scores,
            "allocation decided"
        );

        DecisionResult {
            priority_scores: scores,
            allocated_times,
            winner,
            system_state: self.state,
            allowed_lanes,
            phase_details: details,
        }
    }
}
