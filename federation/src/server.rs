//! HTTP surface of the federation controller.
//!
//! The heartbeat handler is split in two: the ack is returned immediately,
//! the congestion evaluation runs afterwards on the blocking pool. Edges
//! pulse every few hundred milliseconds, so the ack path must never wait on
//! the store.

use axum::Json;
use axum::Router;
use axum::extract::Path;
use axum::extract::State;
use axum::routing::get;
use axum::routing::post;
use greenwave_protocol::Command;
use greenwave_protocol::Heartbeat;
use greenwave_protocol::HeartbeatAck;
use serde_json::Value;
use serde_json::json;

use crate::engine::CongestionEngine;

pub fn router(engine: CongestionEngine) -> Router {
    Router::new()
        .route("/", get(health))
        .route("/topology", get(topology))
        .route("/live_status", get(live_status))
        .route("/commands/{junction_id}", get(commands))
        .route("/heartbeat", post(heartbeat))
        .with_state(engine)
}

async fn health(State(engine): State<CongestionEngine>) -> Json<Value> {
    Json(json!({
        "status": "Online",
        "store": engine.store().backend(),
        "nodes": engine.topology().node_count(),
    }))
}

async fn topology(State(engine): State<CongestionEngine>) -> Json<Value> {
    Json(json!({
        "nodes": engine.topology().nodes,
        "connections": engine.topology().connections,
    }))
}

async fn live_status(State(engine): State<CongestionEngine>) -> Json<Value> {
    match engine.store().live_status() {
        Ok(statuses) => Json(json!(statuses)),
        Err(err) => {
            tracing::warn!(%err, "live status unavailable");
            Json(json!({}))
        }
    }
}

/// One-shot drain: whatever is returned here is gone from the queue.
async fn commands(
    State(engine): State<CongestionEngine>,
    Path(junction_id): Path<String>,
) -> Json<Vec<Command>> {
    match engine.store().drain_commands(&junction_id) {
        Ok(commands) => Json(commands),
        Err(err) => {
            tracing::warn!(%junction_id, %err, "command drain failed");
            Json(Vec::new())
        }
    }
}

/// Fast ack, slow evaluation. An edge that never polls for commands still
/// gets its status tracked.
async fn heartbeat(
    State(engine): State<CongestionEngine>,
    Json(heartbeat): Json<Heartbeat>,
) -> Json<HeartbeatAck> {
    tokio::task::spawn_blocking(move || {
        if let Err(err) = engine.evaluate(&heartbeat) {
            tracing::warn!(junction = %heartbeat.junction_id, %err, "heartbeat evaluation failed");
        }
    });
    Json(HeartbeatAck::ack())
}
