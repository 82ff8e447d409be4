//! Static configuration: cycle timing, per-phase zone geometry and the
//! config-directory loader.
//!
//! Every loader degrades to a conservative default with a warning instead of
//! failing: a junction with a missing or mangled config file still runs, it
//! just scores neutrally (or opens winner-only lanes).

use std::collections::BTreeMap;
use std::path::Path;

use greenwave_protocol::Detection;
use greenwave_protocol::Phase;
use serde::Deserialize;
use serde::Serialize;

use crate::conflict::ConflictMatrix;
use crate::error::CoreError;

/// Timing constants for the signal cycle, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CycleConfig {
    /// Minimum green time.
    pub g_min: u32,
    /// Maximum green time.
    pub g_max: u32,
    /// Fixed yellow phase duration.
    pub yellow: u32,
    /// Seconds before green ends at which the freeze snapshot is taken.
    pub freeze_offset: u32,
    /// Seconds remaining in yellow when the calculation must be done; the
    /// processing window is `yellow - deadline_offset`.
    pub deadline_offset: u32,
    /// All-red safety clearance between yellow and the next green.
    pub all_red: u32,
}

impl Default for CycleConfig {
    fn default() -> Self {
        Self {
            g_min: 15,
            g_max: 90,
            yellow: 15,
            freeze_offset: 3,
            deadline_offset: 10,
            all_red: 2,
        }
    }
}

impl CycleConfig {
    /// Reject timings that would make the state machine skip a window.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.g_min == 0 || self.g_max < self.g_min {
            return Err(CoreError::InvalidTiming {
                reason: format!("green bounds [{}, {}] are not ordered", self.g_min, self.g_max),
            });
        }
        if self.freeze_offset >= self.g_min {
            return Err(CoreError::InvalidTiming {
                reason: format!(
                    "freeze_offset {} must be below g_min {}",
                    self.freeze_offset, self.g_min
                ),
            });
        }
        if self.deadline_offset >= self.yellow {
            return Err(CoreError::InvalidTiming {
                reason: format!(
                    "deadline_offset {} leaves no processing window in yellow {}",
                    self.deadline_offset, self.yellow
                ),
            });
        }
        Ok(())
    }

    /// Length of the processing window inside yellow.
    pub fn processing_window(&self) -> u32 {
        self.yellow - self.deadline_offset
    }
}

/// Axis-aligned rectangle in camera coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x0: f64,
    pub y0: f64,
    pub x1: f64,
    pub y1: f64,
}

impl Rect {
    pub fn area(&self) -> f64 {
        ((self.x1 - self.x0) * (self.y1 - self.y0)).max(0.0)
    }

    /// Area of overlap between this rect and a detection's bounding box.
    pub fn overlap_area(&self, det: &Detection) -> f64 {
        let ox = (self.x1.min(det.x + det.w) - self.x0.max(det.x)).max(0.0);
        let oy = (self.y1.min(det.y + det.h) - self.y0.max(det.y)).max(0.0);
        ox * oy
    }
}

/// Simple polygon in camera coordinates, as an ordered vertex list.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Polygon(pub Vec<[f64; 2]>);

impl Polygon {
    /// Ray-cast point-in-polygon test.
    pub fn contains(&self, x: f64, y: f64) -> bool {
        let pts = &self.0;
        if pts.len() < 3 {
            return false;
        }
        let mut inside = false;
        let mut j = pts.len() - 1;
        for i in 0..pts.len() {
            let (xi, yi) = (pts[i][0], pts[i][1]);
            let (xj, yj) = (pts[j][0], pts[j][1]);
            if (yi > y) != (yj > y) && x < (xj - xi) * (y - yi) / (yj - yi) + xi {
                inside = !inside;
            }
            j = i;
        }
        inside
    }

    /// Horizontal extent, `(min_x, max_x)`.
    pub fn x_bounds(&self) -> Option<(f64, f64)> {
        let first = self.0.first()?[0];
        let (min, max) = self
            .0
            .iter()
            .map(|p| p[0])
            .fold((first, first), |(lo, hi), x| (lo.min(x), hi.max(x)));
        Some((min, max))
    }

    pub fn is_empty(&self) -> bool {
        self.0.len() < 3
    }
}

/// Per-phase zone geometry: the near-zone priority polygon (0–50 units from
/// the stop line) and the far-zone grid cells (51–100 units).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ZoneConfig {
    pub near_zone: Polygon,
    /// Fraction of the near zone's width assigned to the left sub-lane,
    /// measured from the left edge.
    pub split_fraction: Option<f64>,
    pub far_cells: Vec<Rect>,
}

impl ZoneConfig {
    pub const DEFAULT_SPLIT_FRACTION: f64 = 0.35;

    pub fn split_fraction(&self) -> f64 {
        self.split_fraction.unwrap_or(Self::DEFAULT_SPLIT_FRACTION)
    }
}

/// Everything the edge binary loads from its config directory at startup.
#[derive(Debug, Clone, Default)]
pub struct EdgeConfig {
    pub timing: CycleConfig,
    pub zones: BTreeMap<Phase, ZoneConfig>,
    pub conflict_matrix: ConflictMatrix,
}

impl EdgeConfig {
    /// Load from a directory containing `timing.json`, `lane_combinations.json`
    /// and `zones_{Phase}.json` files. Missing or malformed files fall back
    /// to defaults with a warning; only an unreadable directory is an error.
    pub fn load(dir: &Path) -> Result<Self, CoreError> {
        let timing = match read_json::<CycleConfig>(&dir.join("timing.json")) {
            Some(t) => t,
            None => CycleConfig::default(),
        };
        timing.validate()?;

        let mut zones = BTreeMap::new();
        for phase in Phase::ALL {
            let path = dir.join(format!("zones_{phase}.json"));
            match read_json::<ZoneConfig>(&path) {
                Some(z) => {
                    zones.insert(phase, z);
                }
                None => {
                    tracing::warn!("no zone geometry for {phase}; phase will score neutrally");
                    zones.insert(phase, ZoneConfig::default());
                }
            }
        }

        let conflict_matrix = ConflictMatrix::load(&dir.join("lane_combinations.json"));

        Ok(Self {
            timing,
            zones,
            conflict_matrix,
        })
    }
}

/// Read and parse a JSON file, logging (not propagating) any failure.
fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Option<T> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(_) => return None,
    };
    match serde_json::from_str(&raw) {
        Ok(value) => Some(value),
        Err(err) => {
            tracing::warn!("malformed config {}: {err}", path.display());
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn default_timing_matches_reference() {
        let t = CycleConfig::default();
        assert_eq!((t.g_min, t.g_max), (15, 90));
        assert_eq!(t.yellow, 15);
        assert_eq!(t.freeze_offset, 3);
        assert_eq!(t.processing_window(), 5);
        assert_eq!(t.all_red, 2);
        assert!(t.validate().is_ok());
    }

    #[test]
    fn timing_validation_rejects_inverted_windows() {
        let bad = CycleConfig {
            deadline_offset: 15,
            ..CycleConfig::default()
        };
        assert!(bad.validate().is_err());

        let bad = CycleConfig {
            freeze_offset: 20,
            ..CycleConfig::default()
        };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn rect_overlap() {
        let cell = Rect {
            x0: 0.0,
            y0: 0.0,
            x1: 10.0,
            y1: 10.0,
        };
        let det = Detection::new(5.0, 5.0, 10.0, 10.0, "car");
        assert_eq!(cell.overlap_area(&det), 25.0);

        let outside = Detection::new(20.0, 20.0, 5.0, 5.0, "car");
        assert_eq!(cell.overlap_area(&outside), 0.0);
    }

    #[test]
    fn polygon_containment() {
        let poly = Polygon(vec![[0.0, 200.0], [640.0, 200.0], [640.0, 480.0], [0.0, 480.0]]);
        assert!(poly.contains(320.0, 300.0));
        assert!(!poly.contains(320.0, 100.0));
        assert!(Polygon::default().is_empty());
    }

    #[test]
    fn load_defaults_from_empty_dir() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = EdgeConfig::load(dir.path()).unwrap();
        assert_eq!(cfg.timing, CycleConfig::default());
        assert!(cfg.zones[&Phase::North].near_zone.is_empty());
        assert!(cfg.conflict_matrix.is_empty());
    }
}
