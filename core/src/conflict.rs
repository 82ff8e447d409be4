//! Lane conflict matrix: which lanes may run concurrently with a winning
//! phase under a given congestion state.
//!
//! Loaded once at startup from `lane_combinations.json`:
//!
//! ```json
//! {
//!   "North": {
//!     "SAFE": ["North_All"],
//!     "LESS_CONGESTION": ["North_All", "South_Left"],
//!     "MORE_LESSER_CONGESTION": ["North_All", "South_All"]
//!   }
//! }
//! ```
//!
//! A missing or malformed file is non-fatal: the matrix is empty and every
//! lookup falls back to winner-only lanes.

use std::collections::HashMap;
use std::path::Path;

use greenwave_protocol::CongestionState;
use greenwave_protocol::Phase;
use serde::Deserialize;
use serde::Serialize;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConflictMatrix {
    #[serde(flatten)]
    entries: HashMap<Phase, HashMap<CongestionState, Vec<String>>>,
}

impl ConflictMatrix {
    /// Load the matrix, falling back to empty (winner-only) on any failure.
    pub fn load(path: &Path) -> Self {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(_) => {
                tracing::warn!(
                    "lane conflict matrix {} not found; using winner-only lanes",
                    path.display()
                );
                return Self::default();
            }
        };
        match serde_json::from_str(&raw) {
            Ok(matrix) => matrix,
            Err(err) => {
                tracing::warn!(
                    "malformed lane conflict matrix {}: {err}; using winner-only lanes",
                    path.display()
                );
                Self::default()
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Lanes that may safely open alongside `winner` under `state`.
    ///
    /// Defaults to `["{winner}_All"]` when no entry exists.
    pub fn allowed(&self, winner: Phase, state: CongestionState) -> Vec<String> {
        self.entries
            .get(&winner)
            .and_then(|by_state| by_state.get(&state))
            .cloned()
            .unwrap_or_else(|| vec![winner.all_lane()])
    }

    #[cfg(test)]
    pub fn with_entry(winner: Phase, state: CongestionState, lanes: Vec<String>) -> Self {
        let mut entries: HashMap<Phase, HashMap<CongestionState, Vec<String>>> = HashMap::new();
        entries.entry(winner).or_default().insert(state, lanes);
        Self { entries }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn empty_matrix_returns_winner_only() {
        let matrix = ConflictMatrix::default();
        assert_eq!(
            matrix.allowed(Phase::North, CongestionState::Safe),
            vec!["North_All".to_string()]
        );
    }

    #[test]
    fn entry_lookup_and_per_state_fallback() {
        let matrix = ConflictMatrix::with_entry(
            Phase::North,
            CongestionState::MoreLesserCongestion,
            vec!["North_All".to_string(), "South_All".to_string()],
        );
        assert_eq!(
            matrix.allowed(Phase::North, CongestionState::MoreLesserCongestion),
            vec!["North_All".to_string(), "South_All".to_string()]
        );
        // Same phase, unlisted state: back to winner-only.
        assert_eq!(
            matrix.allowed(Phase::North, CongestionState::Safe),
            vec!["North_All".to_string()]
        );
    }

    #[test]
    fn malformed_file_is_nonfatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lane_combinations.json");
        std::fs::write(&path, "{not json").unwrap();
        let matrix = ConflictMatrix::load(&path);
        assert!(matrix.is_empty());
    }

    #[test]
    fn wire_format_round_trips() {
        let raw = r#"{"East": {"SAFE": ["East_All"], "LESS_CONGESTION": ["East_All", "West_Left"]}}"#;
        let matrix: ConflictMatrix = serde_json::from_str(raw).unwrap();
        assert_eq!(
            matrix.allowed(Phase::East, CongestionState::LessCongestion),
            vec!["East_All".to_string(), "West_Left".to_string()]
        );
    }
}
