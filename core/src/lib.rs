//! `greenwave-core` — edge-side control plane for one junction.
//!
//! Owns the adaptive signal scheduler: per-phase composite scoring, green
//! time allocation, the GREEN → FREEZE → YELLOW → ACTUATION cycle state
//! machine, and the asynchronous bridge to the federation controller.
//!
//! Data flow:
//!
//! ```text
//! telemetry producers → TelemetryStore → freeze snapshot → DecisionEngine
//!         → CycleController (actuates lights) → TelemetryBridge
//!         → federation (may push throttle commands back down)
//! ```
//!
//! Everything network-facing is an enhancement: the cycle keeps running with
//! the federation unreachable, and shutdown always drives the junction to
//! all-red.

pub mod allocation;
pub mod bridge;
pub mod classifier;
pub mod config;
pub mod conflict;
pub mod cycle;
pub mod error;
pub mod events;
pub mod scorer;
pub mod snapshot;
pub mod source;
pub mod telemetry;

pub use allocation::DecisionEngine;
pub use bridge::BridgeConfig;
pub use bridge::TelemetryBridge;
pub use config::CycleConfig;
pub use config::EdgeConfig;
pub use cycle::CycleController;
pub use cycle::LogSignals;
pub use cycle::OverrideSlot;
pub use cycle::SignalInterface;
pub use error::CoreError;
pub use events::EventEmitter;
pub use events::EventEndpoints;
pub use snapshot::FreezeLog;
pub use source::TelemetrySource;
pub use telemetry::TelemetryStore;
