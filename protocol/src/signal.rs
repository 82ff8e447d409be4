//! Junction phases, congestion states and lane events.

use serde::Deserialize;
use serde::Serialize;

/// One of the four cardinal approach directions at a junction.
///
/// The declaration order is load-bearing: winner selection breaks ties by
/// this order, and `Ord` follows it (North < South < East < West).
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    strum_macros::Display,
    strum_macros::EnumString,
)]
pub enum Phase {
    North,
    South,
    East,
    West,
}

impl Phase {
    /// All phases in declaration (tie-break) order.
    pub const ALL: [Phase; 4] = [Phase::North, Phase::South, Phase::East, Phase::West];

    /// Lane id for the whole approach, e.g. `"North_All"`.
    pub fn all_lane(self) -> String {
        format!("{self}_All")
    }

    /// Lane id for the left sub-lane, e.g. `"North_Left"`.
    pub fn left_lane(self) -> String {
        format!("{self}_Left")
    }
}

/// Global congestion state governing fairness and lane-compatibility rules.
///
/// The names are counter-intuitive by historical convention: `Safe` means
/// "traffic is heavy, play it safe / be strict", while
/// `MoreLesserCongestion` is free flow.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    strum_macros::Display,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum CongestionState {
    /// High congestion: restrict lane openings, mercy discount active.
    Safe,
    /// Moderate congestion: balanced, mercy discount active.
    LessCongestion,
    /// Light traffic / free flow: open all compatible lanes, no discount.
    MoreLesserCongestion,
}

/// Anomaly reported against a lane by external observers.
///
/// Overrides the computed far-zone grade in the scorer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LaneEvent {
    #[default]
    Normal,
    /// Lane is blocked; forces the grade to the block value (0.0).
    Accident,
    /// Stalled vehicles present; floors the grade at 3.0.
    Stalled,
    /// Reported gridlock; forces the maximum grade (5.0).
    Gridlock,
    /// Degraded camera; falls back to a neutral mid grade (2.0).
    Blind,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn phase_order_is_declaration_order() {
        assert!(Phase::North < Phase::South);
        assert!(Phase::South < Phase::East);
        assert!(Phase::East < Phase::West);
    }

    #[test]
    fn congestion_state_wire_names() {
        let json = serde_json::to_string(&CongestionState::MoreLesserCongestion).unwrap();
        assert_eq!(json, "\"MORE_LESSER_CONGESTION\"");
        let back: CongestionState = serde_json::from_str("\"SAFE\"").unwrap();
        assert_eq!(back, CongestionState::Safe);
    }

    #[test]
    fn lane_ids() {
        assert_eq!(Phase::East.all_lane(), "East_All");
        assert_eq!(Phase::North.left_lane(), "North_Left");
    }

    #[test]
    fn lane_event_wire_names() {
        assert_eq!(
            serde_json::to_string(&LaneEvent::Gridlock).unwrap(),
            "\"GRIDLOCK\""
        );
    }
}
