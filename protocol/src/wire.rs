//! Wire types exchanged between the edge, the federation controller and
//! the external collaborators (simulation adapter, reward backend).

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;

use crate::signal::CongestionState;
use crate::signal::LaneEvent;
use crate::signal::Phase;
use crate::telemetry::PhaseScore;

/// Outcome of one allocation run: who wins, for how long, and what may run
/// alongside them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionResult {
    pub priority_scores: BTreeMap<Phase, i64>,
    /// Allocated green seconds per phase.
    pub allocated_times: BTreeMap<Phase, u32>,
    pub winner: Phase,
    pub system_state: CongestionState,
    /// Lanes compatible with the winner under `system_state`.
    pub allowed_lanes: Vec<String>,
    pub phase_details: BTreeMap<Phase, PhaseScore>,
}

/// Per-lane slice of a heartbeat.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LaneReport {
    /// Saturation as a percentage, 0.0–100.0.
    pub saturation_level: f64,
    pub current_green_time: u32,
    #[serde(default)]
    pub event: LaneEvent,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub directional_counts: Option<BTreeMap<String, u32>>,
}

/// Periodic edge → federation status push.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Heartbeat {
    pub junction_id: String,
    /// Unix timestamp, seconds.
    pub timestamp: f64,
    pub lanes: BTreeMap<Phase, LaneReport>,
}

impl Heartbeat {
    /// Mean saturation across all reported lanes, 0.0–100.0.
    pub fn average_saturation(&self) -> f64 {
        if self.lanes.is_empty() {
            return 0.0;
        }
        let sum: f64 = self.lanes.values().map(|l| l.saturation_level).sum();
        sum / self.lanes.len() as f64
    }
}

/// Immediate acknowledgment for a heartbeat.
///
/// `server_says_throttled` is always `false` in the reference protocol; the
/// edge relies on that to clear stuck local overrides. Kept verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeartbeatAck {
    pub status: String,
    pub server_says_throttled: bool,
}

impl HeartbeatAck {
    pub fn ack() -> Self {
        Self {
            status: "ACK".to_string(),
            server_says_throttled: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CommandType {
    ThrottleAdjust,
    RestoreNormal,
}

/// A one-shot control command delivered via the per-junction poll queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    pub command_type: CommandType,
    pub target_lane: Phase,
    /// Forced green seconds for `ThrottleAdjust`; absent for restores.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<u32>,
    pub reason: String,
}

impl Command {
    pub fn throttle(target_lane: Phase, value: u32, reason: impl Into<String>) -> Self {
        Self {
            command_type: CommandType::ThrottleAdjust,
            target_lane,
            value: Some(value),
            reason: reason.into(),
        }
    }

    pub fn restore(target_lane: Phase) -> Self {
        Self {
            command_type: CommandType::RestoreNormal,
            target_lane,
            value: None,
            reason: "Traffic Cleared".to_string(),
        }
    }
}

/// Fire-and-forget decision notification for the simulation/visualization
/// adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionPush {
    pub winner_phase: Phase,
    pub allowed_lanes: Vec<String>,
    pub allocated_times: BTreeMap<Phase, u32>,
    pub priority_scores: BTreeMap<Phase, i64>,
    pub system_state: CongestionState,
    /// Raw far-zone grades per phase (1.0–5.0).
    pub phase_saturations: BTreeMap<Phase, f64>,
}

impl From<&DecisionResult> for DecisionPush {
    fn from(result: &DecisionResult) -> Self {
        Self {
            winner_phase: result.winner,
            allowed_lanes: result.allowed_lanes.clone(),
            allocated_times: result.allocated_times.clone(),
            priority_scores: result.priority_scores.clone(),
            system_state: result.system_state,
            phase_saturations: result
                .phase_details
                .iter()
                .map(|(phase, score)| (*phase, score.grid_value))
                .collect(),
        }
    }
}

/// Good-behaviour reward event for the wallet backend. Emit-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RewardEvent {
    pub plate_number: String,
    pub points: i32,
    pub reason: String,
    pub junction_id: String,
}

/// Violation report for the enforcement backend. Emit-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViolationReport {
    pub junction_id: String,
    pub plate_number: String,
    /// e.g. "RLV" (red light), "SLV" (stop line), "WLV" (wrong lane).
    pub violation_type: String,
    pub timestamp: f64,
    #[serde(default)]
    pub confidence: f64,
}
