//! Shared latest-value telemetry store.
//!
//! Producers (camera pipelines, simulators) overwrite per-phase frames at
//! their own cadence; the cycle controller takes a consistent snapshot once
//! per cycle at the freeze point. Latest value wins, nothing is queued.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;
use std::time::Instant;

use greenwave_protocol::Phase;
use greenwave_protocol::PhaseTelemetry;

/// What a producer sees when it asks for its phase's signal head.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LightColor {
    Green,
    Red,
}

#[derive(Debug, Default)]
struct Inner {
    frames: BTreeMap<Phase, (PhaseTelemetry, Instant)>,
    intersection_blocked: bool,
    active_phase: Option<Phase>,
}

/// A consistent copy of everything the store held at one instant.
#[derive(Debug, Clone, Default)]
pub struct StoreSnapshot {
    pub frames: BTreeMap<Phase, PhaseTelemetry>,
    pub intersection_blocked: bool,
    pub active_phase: Option<Phase>,
}

/// Thread-safe latest-value store shared between producers and the cycle
/// controller. Cheap to clone; all clones share state.
#[derive(Debug, Clone, Default)]
pub struct TelemetryStore {
    inner: Arc<Mutex<Inner>>,
}

impl TelemetryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite the latest frame for one phase.
    pub fn update_phase(&self, phase: Phase, telemetry: PhaseTelemetry) {
        let mut inner = self.lock();
        inner.frames.insert(phase, (telemetry, Instant::now()));
    }

    /// Flag vehicles stranded in the intersection box, set by whichever
    /// producer watches the box camera.
    pub fn set_intersection_blocked(&self, blocked: bool) {
        self.lock().intersection_blocked = blocked;
    }

    pub fn intersection_blocked(&self) -> bool {
        self.lock().intersection_blocked
    }

    /// Record which phase currently holds green. `None` during all-red.
    pub fn set_active_phase(&self, phase: Option<Phase>) {
        self.lock().active_phase = phase;
    }

    /// The signal head a producer on `phase` would see right now.
    pub fn phase_signal(&self, phase: Phase) -> LightColor {
        if self.lock().active_phase == Some(phase) {
            LightColor::Green
        } else {
            LightColor::Red
        }
    }

    /// Age of the latest frame for `phase`, or `None` if never reported.
    pub fn staleness(&self, phase: Phase) -> Option<Duration> {
        self.lock()
            .frames
            .get(&phase)
            .map(|(_, at)| at.elapsed())
    }

    /// Copy out everything under a single lock acquisition so the decision
    /// runs against frames from one instant.
    pub fn snapshot(&self) -> StoreSnapshot {
        let inner = self.lock();
        StoreSnapshot {
            frames: inner
                .frames
                .iter()
                .map(|(phase, (frame, _))| (*phase, frame.clone()))
                .collect(),
            intersection_blocked: inner.intersection_blocked,
            active_phase: inner.active_phase,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // Writers never panic while holding the lock; recover the data if
        // one somehow did.
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
