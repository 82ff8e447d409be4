//! Per-frame vehicle telemetry and scorer output types.

use serde::Deserialize;
use serde::Serialize;

use crate::signal::LaneEvent;

/// A single vehicle detection in camera coordinates.
///
/// `class` is the raw detector label; [`VehicleClass::from_label`] maps it
/// to a weight at scoring time so unknown labels never fail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
    pub class: String,
    #[serde(default)]
    pub confidence: f64,
}

impl Detection {
    pub fn new(x: f64, y: f64, w: f64, h: f64, class: impl Into<String>) -> Self {
        Self {
            x,
            y,
            w,
            h,
            class: class.into(),
            confidence: 0.5,
        }
    }

    /// Bounding-box center, used for zone membership tests.
    pub fn center(&self) -> (f64, f64) {
        (self.x + self.w / 2.0, self.y + self.h / 2.0)
    }
}

/// Vehicle classification with localized priority weights.
///
/// Scale runs from bus (80, highest occupancy) down to bicycle (25).
/// Emergency vehicles are deliberately treated as standard traffic and map
/// to the car weight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VehicleClass {
    Bus,
    Truck,
    Tempo,
    Car,
    Auto,
    Motorcycle,
    Bicycle,
}

impl VehicleClass {
    /// Map a raw detector label to a class. Unrecognized labels fall back
    /// to `Car`.
    pub fn from_label(label: &str) -> Self {
        let label = label.to_ascii_lowercase();
        let contains_any = |needles: &[&str]| needles.iter().any(|n| label.contains(n));

        if contains_any(&["ambulance", "police", "fire"]) {
            // Emergency vehicles are standard traffic here.
            VehicleClass::Car
        } else if label.contains("bus") {
            VehicleClass::Bus
        } else if label.contains("truck") {
            VehicleClass::Truck
        } else if contains_any(&["tempo", "pickup", "van", "minitruck"]) {
            VehicleClass::Tempo
        } else if contains_any(&["auto", "rickshaw", "tuk"]) {
            VehicleClass::Auto
        } else if contains_any(&["bike", "motorcycle", "scooty", "scooter"]) {
            VehicleClass::Motorcycle
        } else if contains_any(&["bicycle", "cyclist"]) {
            VehicleClass::Bicycle
        } else {
            VehicleClass::Car
        }
    }

    /// Near-zone priority weight.
    pub fn weight(self) -> f64 {
        match self {
            VehicleClass::Bus => 80.0,
            VehicleClass::Truck => 65.0,
            VehicleClass::Tempo => 55.0,
            VehicleClass::Car => 50.0,
            VehicleClass::Auto => 40.0,
            VehicleClass::Motorcycle => 35.0,
            VehicleClass::Bicycle => 25.0,
        }
    }
}

/// Latest-value telemetry for one phase, overwritten every frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct PhaseTelemetry {
    pub detections: Vec<Detection>,
    #[serde(default)]
    pub event: LaneEvent,
}

/// Output of the phase scorer for one phase.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PhaseScore {
    /// Far-zone occupancy grade, 1.0–5.0 (0.0 when blocked by an accident).
    pub grid_value: f64,
    /// Weighted near-zone demand in the straight sub-lane.
    pub priority_straight: f64,
    /// Weighted near-zone demand in the left sub-lane, after any mercy
    /// discount.
    pub priority_left: f64,
}

impl PhaseScore {
    /// Neutral score for a phase with no telemetry.
    pub fn empty() -> Self {
        Self {
            grid_value: 1.0,
            priority_straight: 0.0,
            priority_left: 0.0,
        }
    }

    /// Far-zone grade rescaled to a saturation fraction in 0.0–1.0.
    pub fn saturation_fraction(&self) -> f64 {
        ((self.grid_value - 1.0) / 4.0).clamp(0.0, 1.0)
    }
}
