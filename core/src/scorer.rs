//! Per-phase composite priority scoring.
//!
//! Each phase's detections are partitioned into a near zone close to the
//! stop line (weighted per-vehicle demand, split into Left and Straight
//! sub-lanes) and a far zone behind it (graded by grid-cell occupancy).
//! Lane events override the far-zone grade, and the mercy discount halves
//! a left sub-lane that was open last cycle while the system is under
//! load.

use greenwave_protocol::CongestionState;
use greenwave_protocol::Detection;
use greenwave_protocol::LaneEvent;
use greenwave_protocol::Phase;
use greenwave_protocol::PhaseScore;
use greenwave_protocol::PhaseTelemetry;
use greenwave_protocol::VehicleClass;

use crate::config::ZoneConfig;

/// Grade forced by an accident report: the lane is blocked.
const GRADE_BLOCK: f64 = 0.0;
/// Grade forced by a reported gridlock.
const GRADE_MAX: f64 = 5.0;
/// Neutral grade assumed for a degraded camera.
const GRADE_BLIND: f64 = 2.0;
/// Minimum grade while stalled vehicles are present.
const GRADE_STALLED_FLOOR: f64 = 3.0;

/// Scores one phase from its telemetry and zone geometry.
#[derive(Debug, Clone)]
pub struct PhaseScorer {
    phase: Phase,
    zones: ZoneConfig,
}

impl PhaseScorer {
    pub fn new(phase: Phase, zones: ZoneConfig) -> Self {
        Self { phase, zones }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Score one frame of telemetry.
    ///
    /// `state` and `prev_open_lanes` come from the previous cycle's
    /// decision and drive the mercy discount.
    pub fn score(
        &self,
        telemetry: &PhaseTelemetry,
        state: CongestionState,
        prev_open_lanes: &[String],
    ) -> PhaseScore {
        let (near, far) = self.partition(&telemetry.detections);

        let grid_value = self.grade_far_zone(&far, telemetry.event);
        let (priority_straight, raw_left) = self.near_zone_priority(&near);
        let priority_left = self.apply_mercy(raw_left, state, prev_open_lanes);

        PhaseScore {
            grid_value,
            priority_straight,
            priority_left,
        }
    }

    /// Split detections by near-zone membership of the bbox center.
    ///
    /// Without near-zone geometry everything is treated as far zone, which
    /// matches the conservative reference fallback.
    fn partition<'a>(&self, detections: &'a [Detection]) -> (Vec<&'a Detection>, Vec<&'a Detection>) {
        if self.zones.near_zone.is_empty() {
            return (Vec::new(), detections.iter().collect());
        }
        detections.iter().partition(|det| {
            let (cx, cy) = det.center();
            self.zones.near_zone.contains(cx, cy)
        })
    }

    /// Far-zone grade: mean per-cell occupancy grade, with event overrides.
    fn grade_far_zone(&self, far: &[&Detection], event: LaneEvent) -> f64 {
        match event {
            LaneEvent::Accident => return GRADE_BLOCK,
            LaneEvent::Gridlock => return GRADE_MAX,
            LaneEvent::Blind => return GRADE_BLIND,
            LaneEvent::Normal | LaneEvent::Stalled => {}
        }

        let computed = self.computed_grid_value(far);
        if event == LaneEvent::Stalled {
            computed.max(GRADE_STALLED_FLOOR)
        } else {
            computed
        }
    }

    fn computed_grid_value(&self, far: &[&Detection]) -> f64 {
        if self.zones.far_cells.is_empty() {
            return 1.0;
        }
        let total: f64 = self
            .zones
            .far_cells
            .iter()
            .map(|cell| grade_for_occupancy(cell_occupancy_percent(cell, far)))
            .sum();
        total / self.zones.far_cells.len() as f64
    }

    /// Mean raw far-zone density as a fraction 0.0–1.0, for reporting.
    pub fn far_zone_density(&self, telemetry: &PhaseTelemetry) -> f64 {
        let (_, far) = self.partition(&telemetry.detections);
        if self.zones.far_cells.is_empty() {
            return 0.0;
        }
        let total: f64 = self
            .zones
            .far_cells
            .iter()
            .map(|cell| cell_occupancy_percent(cell, &far))
            .sum();
        (total / self.zones.far_cells.len() as f64) / 100.0
    }

    /// Weighted demand per sub-lane: `(straight, raw_left)`.
    fn near_zone_priority(&self, near: &[&Detection]) -> (f64, f64) {
        let Some((min_x, max_x)) = self.zones.near_zone.x_bounds() else {
            return (0.0, 0.0);
        };
        let split_x = min_x + (max_x - min_x) * self.zones.split_fraction();

        let mut straight = 0.0;
        let mut left = 0.0;
        for det in near {
            let weight = VehicleClass::from_label(&det.class).weight();
            let (cx, _) = det.center();
            if cx < split_x {
                left += weight;
            } else {
                straight += weight;
            }
        }
        (straight, left)
    }

    /// Halve the left sub-lane score when it was open last cycle and the
    /// system is still under load. Free flow skips the discount.
    fn apply_mercy(&self, raw_left: f64, state: CongestionState, prev_open_lanes: &[String]) -> f64 {
        let was_open = prev_open_lanes.iter().any(|l| *l == self.phase.left_lane());
        let under_load = matches!(
            state,
            CongestionState::Safe | CongestionState::LessCongestion
        );
        if was_open && under_load {
            tracing::debug!(
                phase = %self.phase,
                raw = raw_left,
                "mercy discount on left sub-lane"
            );
            raw_left * 0.5
        } else {
            raw_left
        }
    }
}

/// Occupancy of one grid cell as a percentage, clamped to 100.
fn cell_occupancy_percent(cell: &crate::config::Rect, detections: &[&Detection]) -> f64 {
    let cell_area = cell.area();
    if cell_area == 0.0 {
        return 0.0;
    }
    let occupied: f64 = detections.iter().map(|det| cell.overlap_area(det)).sum();
    ((occupied / cell_area) * 100.0).min(100.0)
}

/// Step function from occupancy percent to grade value.
fn grade_for_occupancy(percent: f64) -> f64 {
    if percent >= 80.0 {
        5.0
    } else if percent >= 60.0 {
        4.0
    } else if percent >= 40.0 {
        3.0
    } else if percent >= 20.0 {
        2.0
    } else {
        1.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Polygon;
    use crate::config::Rect;
    use pretty_assertions::assert_eq;

    /// 640x480 frame: near zone is the lower half, far zone one big cell in
    /// the upper half.
    fn test_zones() -> ZoneConfig {
        ZoneConfig {
            near_zone: Polygon(vec![
                [0.0, 200.0],
                [640.0, 200.0],
                [640.0, 480.0],
                [0.0, 480.0],
            ]),
            split_fraction: None,
            far_cells: vec![Rect {
                x0: 0.0,
                y0: 0.0,
                x1: 100.0,
                y1: 100.0,
            }],
        }
    }

    fn scorer() -> PhaseScorer {
        PhaseScorer::new(Phase::North, test_zones())
    }

    #[test]
    fn grade_bands_are_a_step_function() {
        for (pct, grade) in [
            (0.0, 1.0),
            (19.9, 1.0),
            (20.0, 2.0),
            (40.0, 3.0),
            (60.0, 4.0),
            (79.9, 4.0),
            (80.0, 5.0),
            (100.0, 5.0),
        ] {
            assert_eq!(grade_for_occupancy(pct), grade, "at {pct}%");
        }
    }

    #[test]
    fn grade_mapping_is_idempotent() {
        let telemetry = PhaseTelemetry {
            detections: vec![Detection::new(10.0, 10.0, 50.0, 50.0, "bus")],
            event: LaneEvent::Normal,
        };
        let s = scorer();
        let first = s.score(&telemetry, CongestionState::MoreLesserCongestion, &[]);
        let second = s.score(&telemetry, CongestionState::MoreLesserCongestion, &[]);
        assert_eq!(first, second);
    }

    #[test]
    fn event_overrides_replace_computed_grade() {
        let telemetry = PhaseTelemetry {
            detections: Vec::new(),
            event: LaneEvent::Accident,
        };
        let s = scorer();
        assert_eq!(
            s.score(&telemetry, CongestionState::Safe, &[]).grid_value,
            0.0
        );

        let gridlocked = PhaseTelemetry {
            event: LaneEvent::Gridlock,
            ..telemetry.clone()
        };
        assert_eq!(
            s.score(&gridlocked, CongestionState::Safe, &[]).grid_value,
            5.0
        );

        let blind = PhaseTelemetry {
            event: LaneEvent::Blind,
            ..telemetry
        };
        assert_eq!(s.score(&blind, CongestionState::Safe, &[]).grid_value, 2.0);
    }

    #[test]
    fn stalled_floors_the_grade() {
        let telemetry = PhaseTelemetry {
            detections: Vec::new(),
            event: LaneEvent::Stalled,
        };
        let score = scorer().score(&telemetry, CongestionState::Safe, &[]);
        assert_eq!(score.grid_value, 3.0);
    }

    #[test]
    fn near_zone_weights_split_by_sub_lane() {
        // Split at x = 0 + 640 * 0.35 = 224. Two autos left, car + bus right.
        let telemetry = PhaseTelemetry {
            detections: vec![
                Detection::new(30.0, 250.0, 40.0, 40.0, "auto"),
                Detection::new(30.0, 300.0, 40.0, 40.0, "auto"),
                Detection::new(400.0, 250.0, 50.0, 50.0, "car"),
                Detection::new(400.0, 350.0, 60.0, 60.0, "bus"),
            ],
            event: LaneEvent::Normal,
        };
        let score = scorer().score(&telemetry, CongestionState::MoreLesserCongestion, &[]);
        assert_eq!(score.priority_left, 80.0);
        assert_eq!(score.priority_straight, 130.0);
    }

    #[test]
    fn mercy_discount_halves_exactly_under_load() {
        let s = scorer();
        let open = vec![Phase::North.left_lane()];
        assert_eq!(s.apply_mercy(24.0, CongestionState::Safe, &open), 12.0);
        assert_eq!(
            s.apply_mercy(24.0, CongestionState::LessCongestion, &open),
            12.0
        );
        assert_eq!(
            s.apply_mercy(24.0, CongestionState::MoreLesserCongestion, &open),
            24.0
        );
        // Not open last cycle: no discount even under load.
        assert_eq!(s.apply_mercy(24.0, CongestionState::Safe, &[]), 24.0);
    }

    #[test]
    fn missing_geometry_scores_neutrally() {
        let bare = PhaseScorer::new(Phase::East, ZoneConfig::default());
        let telemetry = PhaseTelemetry {
            detections: vec![Detection::new(10.0, 10.0, 50.0, 50.0, "bus")],
            event: LaneEvent::Normal,
        };
        let score = bare.score(&telemetry, CongestionState::Safe, &[]);
        assert_eq!(score.grid_value, 1.0);
        assert_eq!(score.priority_straight, 0.0);
        assert_eq!(score.priority_left, 0.0);
    }

    #[test]
    fn full_cell_grades_maximum() {
        // One detection covering the entire far cell.
        let telemetry = PhaseTelemetry {
            detections: vec![Detection::new(0.0, 0.0, 100.0, 100.0, "bus")],
            event: LaneEvent::Normal,
        };
        let score = scorer().score(&telemetry, CongestionState::Safe, &[]);
        assert_eq!(score.grid_value, 5.0);
    }
}
