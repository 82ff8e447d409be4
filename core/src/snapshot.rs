//! Cycle-freeze snapshots.
//!
//! Three seconds before green expires the controller freezes the telemetry
//! store and decides the next cycle from that copy. A reduced form of that
//! freeze is written to disk so a restarted edge knows where the last cycle
//! left off. Raw detections are deliberately not persisted; they are stale
//! by the time anything could replay them.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::path::PathBuf;

use chrono::DateTime;
use chrono::Utc;
use greenwave_protocol::CongestionState;
use greenwave_protocol::DecisionResult;
use greenwave_protocol::LaneEvent;
use greenwave_protocol::Phase;
use serde::Deserialize;
use serde::Serialize;

use crate::error::CoreError;
use crate::telemetry::StoreSnapshot;

/// The reduced freeze persisted once per cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FreezeRecord {
    pub cycle: u64,
    pub frozen_at: DateTime<Utc>,
    pub system_state: CongestionState,
    pub winner: Phase,
    pub open_lanes: Vec<String>,
    /// Non-normal lane events active at the freeze, by phase.
    pub events: BTreeMap<Phase, LaneEvent>,
    /// Vehicles detected per phase at the freeze.
    pub detection_counts: BTreeMap<Phase, usize>,
    pub intersection_blocked: bool,
}

impl FreezeRecord {
    pub fn new(cycle: u64, snapshot: &StoreSnapshot, decision: &DecisionResult) -> Self {
        let events = snapshot
            .frames
            .iter()
            .filter(|(_, frame)| frame.event != LaneEvent::Normal)
            .map(|(phase, frame)| (*phase, frame.event))
            .collect();
        let detection_counts = snapshot
            .frames
            .iter()
            .map(|(phase, frame)| (*phase, frame.detections.len()))
            .collect();
        Self {
            cycle,
            frozen_at: Utc::now(),
            system_state: decision.system_state,
            winner: decision.winner,
            open_lanes: decision.allowed_lanes.clone(),
            events,
            detection_counts,
            intersection_blocked: snapshot.intersection_blocked,
        }
    }
}

/// Single-slot on-disk log of the most recent freeze.
#[derive(Debug, Clone)]
pub struct FreezeLog {
    path: PathBuf,
}

impl FreezeLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Write atomically: serialize to a sibling tmp file, then rename over
    /// the target so readers never observe a torn record.
    pub fn persist(&self, record: &FreezeRecord) -> Result<(), CoreError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(record)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    /// Load the last persisted freeze, if any. A missing file is a normal
    /// first boot; a corrupt file is reported so the caller can log it.
    pub fn recover(&self) -> Result<Option<FreezeRecord>, CoreError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let contents = fs::read_to_string(&self.path)?;
        Ok(Some(serde_json::from_str(&contents)?))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use greenwave_protocol::Detection;
    use greenwave_protocol::PhaseTelemetry;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn record() -> FreezeRecord {
        FreezeRecord {
            cycle: 7,
            frozen_at: Utc::now(),
            system_state: CongestionState::LessCongestion,
            winner: Phase::East,
            open_lanes: vec!["East_All".to_string()],
            events: BTreeMap::from([(Phase::South, LaneEvent::Accident)]),
            detection_counts: BTreeMap::from([(Phase::East, 12), (Phase::South, 3)]),
            intersection_blocked: true,
        }
    }

    #[test]
    fn record_reduces_the_frozen_frames() {
        let mut frames = BTreeMap::new();
        frames.insert(
            Phase::North,
            PhaseTelemetry {
                detections: vec![Detection::new(10.0, 10.0, 30.0, 20.0, "car")],
                event: LaneEvent::Normal,
            },
        );
        frames.insert(
            Phase::West,
            PhaseTelemetry {
                detections: Vec::new(),
                event: LaneEvent::Stalled,
            },
        );
        let snapshot = StoreSnapshot {
            frames,
            intersection_blocked: false,
            active_phase: Some(Phase::North),
        };
        let decision = DecisionResult {
            priority_scores: BTreeMap::new(),
            allocated_times: BTreeMap::new(),
            winner: Phase::North,
            system_state: CongestionState::Safe,
            allowed_lanes: vec!["North_All".to_string()],
            phase_details: BTreeMap::new(),
        };

        let rec = FreezeRecord::new(3, &snapshot, &decision);
        assert_eq!(rec.winner, Phase::North);
        assert_eq!(rec.system_state, CongestionState::Safe);
        // Normal events are elided; only the stalled lane is recorded.
        assert_eq!(rec.events, BTreeMap::from([(Phase::West, LaneEvent::Stalled)]));
        assert_eq!(rec.detection_counts[&Phase::North], 1);
        assert_eq!(rec.detection_counts[&Phase::West], 0);
    }

    #[test]
    fn persist_then_recover_round_trips() {
        let dir = TempDir::new().unwrap();
        let log = FreezeLog::new(dir.path().join("freeze.json"));
        let rec = record();
        log.persist(&rec).unwrap();
        assert_eq!(log.recover().unwrap(), Some(rec));
    }

    #[test]
    fn recover_without_file_is_none() {
        let dir = TempDir::new().unwrap();
        let log = FreezeLog::new(dir.path().join("missing.json"));
        assert_eq!(log.recover().unwrap(), None);
    }

    #[test]
    fn corrupt_file_surfaces_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("freeze.json");
        fs::write(&path, "not json").unwrap();
        let log = FreezeLog::new(&path);
        assert!(log.recover().is_err());
    }

    #[test]
    fn persist_creates_missing_parents() {
        let dir = TempDir::new().unwrap();
        let log = FreezeLog::new(dir.path().join("state/deep/freeze.json"));
        log.persist(&record()).unwrap();
        assert!(log.path().exists());
    }
}
