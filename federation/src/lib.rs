//! `greenwave-federation` — the regional congestion controller.
//!
//! Collects heartbeats from edge junctions, tracks per-junction saturation,
//! and pushes throttle/restore commands to upstream feeders when a junction
//! congests. The control loop is advisory end to end: edges keep cycling if
//! this process dies, and every command is delivered at most once.

pub mod engine;
pub mod error;
pub mod server;
pub mod store;
pub mod topology;

pub use engine::CongestionEngine;
pub use error::FederationError;
pub use server::router;
pub use store::FederationStore;
pub use store::Intervention;
pub use store::JunctionStatus;
pub use store::MemoryStore;
pub use store::SqliteStore;
pub use topology::Topology;
