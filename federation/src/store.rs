//! Federation state: junction statuses, active interventions and the
//! per-junction command queues.
//!
//! Statuses and interventions can be persisted (SQLite) or held in memory;
//! command queues are always in memory. A queued command not yet polled is
//! lost on restart, which is fine: the congestion logic re-derives it from
//! the next heartbeat.

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use chrono::DateTime;
use chrono::Utc;
use greenwave_protocol::Command;
use greenwave_protocol::Heartbeat;
use greenwave_protocol::Phase;
use rusqlite::Connection;
use rusqlite::params;
use serde::Deserialize;
use serde::Serialize;

use crate::error::FederationError;

/// Latest known state of one junction, derived from its heartbeats.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JunctionStatus {
    pub junction_id: String,
    /// Mean saturation across phases, 0.0–100.0.
    pub junction_saturation: f64,
    pub phase_saturations: BTreeMap<Phase, f64>,
    pub heartbeat: Heartbeat,
    pub last_updated: DateTime<Utc>,
}

/// One throttling relationship: `source_id` is being throttled because
/// `target_id` congested. At most one intervention per source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Intervention {
    pub source_id: String,
    pub target_id: String,
    pub reason: String,
    pub created_at: DateTime<Utc>,
}

/// Storage seam between the congestion engine and its state.
pub trait FederationStore: Send + Sync {
    fn backend(&self) -> &'static str;

    fn upsert_status(&self, status: JunctionStatus) -> Result<(), FederationError>;

    fn live_status(&self) -> Result<BTreeMap<String, JunctionStatus>, FederationError>;

    /// Insert unless an intervention for this source already exists.
    /// Returns whether the insert happened.
    fn record_intervention(&self, intervention: Intervention) -> Result<bool, FederationError>;

    /// All interventions caused by congestion at `target_id`.
    fn interventions_against(&self, target_id: &str) -> Result<Vec<Intervention>, FederationError>;

    fn remove_interventions_from(&self, source_id: &str) -> Result<(), FederationError>;

    /// Append unless a command for the same lane is already pending.
    fn queue_command(&self, junction_id: &str, command: Command) -> Result<(), FederationError>;

    /// Drop whatever is pending and queue `commands` instead.
    fn replace_commands(
        &self,
        junction_id: &str,
        commands: Vec<Command>,
    ) -> Result<(), FederationError>;

    /// Take and clear the pending queue. Commands are delivered at most
    /// once; an edge that drops them never sees them again.
    fn drain_commands(&self, junction_id: &str) -> Result<Vec<Command>, FederationError>;
}

#[derive(Debug, Default)]
struct MemoryInner {
    statuses: BTreeMap<String, JunctionStatus>,
    interventions: Vec<Intervention>,
    queues: HashMap<String, Vec<Command>>,
}

/// Volatile store for tests and single-process deployments.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryInner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl FederationStore for MemoryStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    fn upsert_status(&self, status: JunctionStatus) -> Result<(), FederationError> {
        self.lock().statuses.insert(status.junction_id.clone(), status);
        Ok(())
    }

    fn live_status(&self) -> Result<BTreeMap<String, JunctionStatus>, FederationError> {
        Ok(self.lock().statuses.clone())
    }

    fn record_intervention(&self, intervention: Intervention) -> Result<bool, FederationError> {
        let mut inner = self.lock();
        if inner
            .interventions
            .iter()
            .any(|iv| iv.source_id == intervention.source_id)
        {
            return Ok(false);
        }
        inner.interventions.push(intervention);
        Ok(true)
    }

    fn interventions_against(&self, target_id: &str) -> Result<Vec<Intervention>, FederationError> {
        Ok(self
            .lock()
            .interventions
            .iter()
            .filter(|iv| iv.target_id == target_id)
            .cloned()
            .collect())
    }

    fn remove_interventions_from(&self, source_id: &str) -> Result<(), FederationError> {
        self.lock()
            .interventions
            .retain(|iv| iv.source_id != source_id);
        Ok(())
    }

    fn queue_command(&self, junction_id: &str, command: Command) -> Result<(), FederationError> {
        let mut inner = self.lock();
        let queue = inner.queues.entry(junction_id.to_string()).or_default();
        if queue.iter().any(|c| c.target_lane == command.target_lane) {
            return Ok(());
        }
        queue.push(command);
        Ok(())
    }

    fn replace_commands(
        &self,
        junction_id: &str,
        commands: Vec<Command>,
    ) -> Result<(), FederationError> {
        self.lock().queues.insert(junction_id.to_string(), commands);
        Ok(())
    }

    fn drain_commands(&self, junction_id: &str) -> Result<Vec<Command>, FederationError> {
        Ok(self.lock().queues.remove(junction_id).unwrap_or_default())
    }
}

/// SQLite-backed store. Statuses and interventions survive restarts;
/// command queues intentionally do not.
pub struct SqliteStore {
    conn: Mutex<Connection>,
    queues: Mutex<HashMap<String, Vec<Command>>>,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self, FederationError> {
        let conn = Connection::open(path)?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS junction_status (
                junction_id      TEXT PRIMARY KEY,
                saturation_level REAL NOT NULL,
                raw_data         TEXT NOT NULL,
                last_updated     TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS active_interventions (
                source_id  TEXT PRIMARY KEY,
                target_id  TEXT NOT NULL,
                reason     TEXT NOT NULL,
                created_at TEXT NOT NULL
            );
            "#,
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
            queues: Mutex::new(HashMap::new()),
        })
    }

    fn conn(&self) -> std::sync::MutexGuard<'_, Connection> {
        match self.conn.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn queues(&self) -> std::sync::MutexGuard<'_, HashMap<String, Vec<Command>>> {
        match self.queues.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl FederationStore for SqliteStore {
    fn backend(&self) -> &'static str {
        "sqlite"
    }

    fn upsert_status(&self, status: JunctionStatus) -> Result<(), FederationError> {
        let raw = serde_json::to_string(&status)?;
        self.conn().execute(
            r#"
            INSERT INTO junction_status (junction_id, saturation_level, raw_data, last_updated)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(junction_id) DO UPDATE SET
                saturation_level = excluded.saturation_level,
                raw_data = excluded.raw_data,
                last_updated = excluded.last_updated
            "#,
            params![
                status.junction_id,
                status.junction_saturation,
                raw,
                status.last_updated.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn live_status(&self) -> Result<BTreeMap<String, JunctionStatus>, FederationError> {
        let conn = self.conn();
        let mut stmt = conn.prepare("SELECT junction_id, raw_data FROM junction_status")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;
        let mut out = BTreeMap::new();
        for row in rows {
            let (junction_id, raw) = row?;
            match serde_json::from_str(&raw) {
                Ok(status) => {
                    out.insert(junction_id, status);
                }
                Err(err) => {
                    tracing::warn!(%junction_id, %err, "skipping unreadable status row");
                }
            }
        }
        Ok(out)
    }

    fn record_intervention(&self, intervention: Intervention) -> Result<bool, FederationError> {
        let inserted = self.conn().execute(
            r#"
            INSERT INTO active_interventions (source_id, target_id, reason, created_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(source_id) DO NOTHING
            "#,
            params![
                intervention.source_id,
                intervention.target_id,
                intervention.reason,
                intervention.created_at.to_rfc3339(),
            ],
        )?;
        Ok(inserted > 0)
    }

    fn interventions_against(&self, target_id: &str) -> Result<Vec<Intervention>, FederationError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT source_id, target_id, reason, created_at
             FROM active_interventions WHERE target_id = ?1",
        )?;
        let rows = stmt.query_map(params![target_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
            ))
        })?;
        let mut out = Vec::new();
        for row in rows {
            let (source_id, target_id, reason, created_at) = row?;
            let created_at = DateTime::parse_from_rfc3339(&created_at)
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or_else(|_| Utc::now());
            out.push(Intervention {
                source_id,
                target_id,
                reason,
                created_at,
            });
        }
        Ok(out)
    }

    fn remove_interventions_from(&self, source_id: &str) -> Result<(), FederationError> {
        self.conn().execute(
            "DELETE FROM active_interventions WHERE source_id = ?1",
            params![source_id],
        )?;
        Ok(())
    }

    fn queue_command(&self, junction_id: &str, command: Command) -> Result<(), FederationError> {
        let mut queues = self.queues();
        let queue = queues.entry(junction_id.to_string()).or_default();
        if queue.iter().any(|c| c.target_lane == command.target_lane) {
            return Ok(());
        }
        queue.push(command);
        Ok(())
    }

    fn replace_commands(
        &self,
        junction_id: &str,
        commands: Vec<Command>,
    ) -> Result<(), FederationError> {
        self.queues().insert(junction_id.to_string(), commands);
        Ok(())
    }

    fn drain_commands(&self, junction_id: &str) -> Result<Vec<Command>, FederationError> {
        Ok(self.queues().remove(junction_id).unwrap_or_default())
    }
}
