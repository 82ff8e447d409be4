//! `greenwave-protocol` — shared data model and wire types for the
//! greenwave adaptive signal network.
//!
//! Pure serde types with no I/O. The edge control plane (`greenwave-core`)
//! and the federation server (`greenwave-federation`) both speak these, so
//! every wire-facing enum pins its serialized form explicitly.

pub mod signal;
pub mod telemetry;
pub mod wire;

pub use signal::CongestionState;
pub use signal::LaneEvent;
pub use signal::Phase;
pub use telemetry::Detection;
pub use telemetry::PhaseScore;
pub use telemetry::PhaseTelemetry;
pub use telemetry::VehicleClass;
pub use wire::Command;
pub use wire::CommandType;
pub use wire::DecisionPush;
pub use wire::DecisionResult;
pub use wire::Heartbeat;
pub use wire::HeartbeatAck;
pub use wire::LaneReport;
pub use wire::RewardEvent;
pub use wire::ViolationReport;
