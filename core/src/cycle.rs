//! The fixed-shape signal cycle.
//!
//! Every cycle runs GREEN -> YELLOW -> ALL-RED. Three seconds before green
//! expires the controller freezes the telemetry store, decides the next
//! winner from the frozen copy, and actuates it after the clearance
//! interval. The shape never varies; only the green duration does.

use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use greenwave_protocol::DecisionResult;
use greenwave_protocol::Phase;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::allocation::DecisionEngine;
use crate::config::CycleConfig;
use crate::snapshot::FreezeLog;
use crate::snapshot::FreezeRecord;
use crate::telemetry::TelemetryStore;

/// Abstraction over the physical signal heads. The edge binary installs a
/// logging implementation; hardware builds wire in GPIO here.
pub trait SignalInterface: Send + Sync {
    fn set_green(&self, phase: Phase, lanes: &[String], secs: u32);
    fn set_yellow(&self, phase: Phase);
    fn set_all_red(&self);
}

/// Signal interface that only logs transitions.
#[derive(Debug, Default)]
pub struct LogSignals;

impl SignalInterface for LogSignals {
    fn set_green(&self, phase: Phase, lanes: &[String], secs: u32) {
        tracing::info!(%phase, ?lanes, secs, "signal GREEN");
    }

    fn set_yellow(&self, phase: Phase) {
        tracing::info!(%phase, "signal YELLOW");
    }

    fn set_all_red(&self) {
        tracing::info!("signal ALL-RED");
    }
}

/// A federation-ordered forced green: phase and duration replace the
/// computed winner for exactly one cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleOverride {
    pub phase: Phase,
    pub green_secs: u32,
    pub source: String,
}

/// One-shot slot between the bridge (writer) and the controller (consumer).
/// A newer override replaces an unconsumed one; the controller takes it at
/// actuation and the slot empties.
#[derive(Debug, Clone, Default)]
pub struct OverrideSlot {
    inner: Arc<Mutex<Option<CycleOverride>>>,
}

impl OverrideSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, ov: CycleOverride) {
        let mut slot = self.lock();
        if slot.as_ref() != Some(&ov) {
            tracing::info!(
                phase = %ov.phase,
                secs = ov.green_secs,
                source = %ov.source,
                "cycle override armed"
            );
        }
        *slot = Some(ov);
    }

    pub fn clear(&self) {
        *self.lock() = None;
    }

    /// Clear only if the armed override targets `phase`.
    pub fn clear_for(&self, phase: Phase) {
        let mut slot = self.lock();
        if slot.as_ref().is_some_and(|ov| ov.phase == phase) {
            *slot = None;
        }
    }

    pub fn take(&self) -> Option<CycleOverride> {
        self.lock().take()
    }

    pub fn peek(&self) -> Option<CycleOverride> {
        self.lock().clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<CycleOverride>> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Drives the cycle state machine until cancelled.
pub struct CycleController {
    store: TelemetryStore,
    engine: DecisionEngine,
    signals: Arc<dyn SignalInterface>,
    timing: CycleConfig,
    overrides: OverrideSlot,
    freeze_log: Option<FreezeLog>,
    decisions: watch::Sender<Option<DecisionResult>>,
    cancel: CancellationToken,
    /// Stop after this many cycles; `None` runs forever. Used by the
    /// simulator and tests.
    max_cycles: Option<u64>,
}

impl CycleController {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: TelemetryStore,
        engine: DecisionEngine,
        signals: Arc<dyn SignalInterface>,
        timing: CycleConfig,
        overrides: OverrideSlot,
        freeze_log: Option<FreezeLog>,
        decisions: watch::Sender<Option<DecisionResult>>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            store,
            engine,
            signals,
            timing,
            overrides,
            freeze_log,
            decisions,
            cancel,
            max_cycles: None,
        }
    }

    pub fn with_max_cycles(mut self, cycles: u64) -> Self {
        self.max_cycles = Some(cycles);
        self
    }

    /// Run the cycle loop. Returns once cancelled or after `max_cycles`;
    /// the heads are left all-red either way.
    pub async fn run(mut self) {
        // Boot cycle: no telemetry has been decided on yet, so the first
        // green is the floor on the first phase.
        let mut winner = Phase::North;
        let mut green_secs = self.timing.g_min;
        let mut open_lanes = vec![winner.all_lane()];
        let mut cycle: u64 = 0;

        loop {
            cycle += 1;
            tracing::info!(cycle, %winner, green_secs, "cycle start");
            self.signals.set_green(winner, &open_lanes, green_secs);
            self.store.set_active_phase(Some(winner));

            // Green runs until the freeze point at T - freeze_offset.
            let running = green_secs.saturating_sub(self.timing.freeze_offset);
            if self.wait(u64::from(running)).await {
                break;
            }

            // Freeze: one consistent copy; the store keeps updating but
            // this cycle's decision no longer sees it.
            let snapshot = self.store.snapshot();
            let decision = self.engine.decide(&snapshot.frames);
            if let Some(log) = &self.freeze_log {
                let record = FreezeRecord::new(cycle, &snapshot, &decision);
                if let Err(err) = log.persist(&record) {
                    tracing::warn!(path = %log.path().display(), %err, "freeze persist failed");
                }
            }

            if self.wait(u64::from(self.timing.freeze_offset)).await {
                break;
            }

            // Yellow clears the winner; no phase holds green.
            self.signals.set_yellow(winner);
            self.store.set_active_phase(None);
            if self.wait(u64::from(self.timing.yellow)).await {
                break;
            }

            // All-red clearance, then the next winner is actuated.
            self.signals.set_all_red();
            if self.wait(u64::from(self.timing.all_red)).await {
                break;
            }

            winner = decision.winner;
            green_secs = decision.allocated_times[&winner];
            open_lanes = decision.allowed_lanes.clone();
            if let Some(ov) = self.overrides.take() {
                // Forced phase and duration, verbatim, for this one cycle.
                tracing::info!(
                    source = %ov.source,
                    phase = %ov.phase,
                    secs = ov.green_secs,
                    "applying federation override"
                );
                winner = ov.phase;
                green_secs = ov.green_secs;
                open_lanes = vec![winner.all_lane()];
            }

            // Publish for the bridge (heartbeats) and the event emitter.
            let _ = self.decisions.send(Some(decision));

            if self.max_cycles.is_some_and(|max| cycle >= max) {
                tracing::info!(cycle, "cycle budget exhausted");
                break;
            }
        }

        self.signals.set_all_red();
        self.store.set_active_phase(None);
        tracing::info!("cycle controller stopped, heads all-red");
    }

    /// Sleep `secs`, interruptible by cancellation. Returns true if
    /// cancelled.
    async fn wait(&self, secs: u64) -> bool {
        tokio::select! {
            () = self.cancel.cancelled() => true,
            () = tokio::time::sleep(Duration::from_secs(secs)) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EdgeConfig;
    use std::sync::atomic::AtomicU32;
    use std::sync::atomic::Ordering;

    #[derive(Debug, Default)]
    struct CountingSignals {
        greens: AtomicU32,
        yellows: AtomicU32,
        all_reds: AtomicU32,
        last_green: Mutex<Option<(Phase, u32)>>,
    }

    impl SignalInterface for CountingSignals {
        fn set_green(&self, phase: Phase, _lanes: &[String], secs: u32) {
            self.greens.fetch_add(1, Ordering::SeqCst);
            *self.last_green.lock().unwrap() = Some((phase, secs));
        }

        fn set_yellow(&self, _phase: Phase) {
            self.yellows.fetch_add(1, Ordering::SeqCst);
        }

        fn set_all_red(&self) {
            self.all_reds.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn controller(
        signals: Arc<CountingSignals>,
        cancel: CancellationToken,
        decisions: watch::Sender<Option<DecisionResult>>,
        overrides: OverrideSlot,
    ) -> CycleController {
        let config = EdgeConfig::default();
        CycleController::new(
            TelemetryStore::new(),
            DecisionEngine::new(&config),
            signals,
            config.timing,
            overrides,
            None,
            decisions,
            cancel,
        )
    }

    fn throttle(phase: Phase, secs: u32, source: &str) -> CycleOverride {
        CycleOverride {
            phase,
            green_secs: secs,
            source: source.to_string(),
        }
    }

    #[test]
    fn override_slot_is_one_shot() {
        let slot = OverrideSlot::new();
        assert_eq!(slot.take(), None);
        slot.set(throttle(Phase::East, 25, "junction-2"));
        assert!(slot.peek().is_some());
        assert_eq!(slot.take(), Some(throttle(Phase::East, 25, "junction-2")));
        assert_eq!(slot.take(), None);

        slot.set(throttle(Phase::South, 15, "junction-3"));
        slot.clear();
        assert_eq!(slot.peek(), None);
    }

    #[test]
    fn newer_override_replaces_unconsumed_one() {
        let slot = OverrideSlot::new();
        slot.set(throttle(Phase::East, 25, "a"));
        slot.set(throttle(Phase::West, 15, "b"));
        assert_eq!(slot.take().map(|ov| ov.green_secs), Some(15));
    }

    #[test]
    fn clear_for_only_matches_its_phase() {
        let slot = OverrideSlot::new();
        slot.set(throttle(Phase::East, 15, "a"));
        slot.clear_for(Phase::West);
        assert!(slot.peek().is_some());
        slot.clear_for(Phase::East);
        assert!(slot.peek().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn full_cycle_actuates_each_interval_once() {
        let signals = Arc::new(CountingSignals::default());
        let cancel = CancellationToken::new();
        let (tx, rx) = watch::channel(None);
        let ctrl = controller(signals.clone(), cancel.clone(), tx, OverrideSlot::new())
            .with_max_cycles(1);

        let handle = tokio::spawn(ctrl.run());
        // g_min 15 + yellow 15 + all-red 2, with margin.
        tokio::time::sleep(Duration::from_secs(40)).await;
        handle.await.unwrap();

        assert_eq!(signals.greens.load(Ordering::SeqCst), 1);
        assert_eq!(signals.yellows.load(Ordering::SeqCst), 1);
        // One clearance plus the shutdown all-red.
        assert_eq!(signals.all_reds.load(Ordering::SeqCst), 2);
        assert!(rx.borrow().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_stops_mid_green_and_goes_all_red() {
        let signals = Arc::new(CountingSignals::default());
        let cancel = CancellationToken::new();
        let (tx, _rx) = watch::channel(None);
        let ctrl = controller(signals.clone(), cancel.clone(), tx, OverrideSlot::new());

        let handle = tokio::spawn(ctrl.run());
        tokio::time::sleep(Duration::from_secs(5)).await;
        cancel.cancel();
        handle.await.unwrap();

        assert_eq!(signals.greens.load(Ordering::SeqCst), 1);
        assert_eq!(signals.yellows.load(Ordering::SeqCst), 0);
        assert_eq!(signals.all_reds.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn armed_override_forces_the_next_green() {
        let signals = Arc::new(CountingSignals::default());
        let cancel = CancellationToken::new();
        let (tx, _rx) = watch::channel(None);
        let slot = OverrideSlot::new();
        slot.set(throttle(Phase::West, 25, "junction-9"));
        let ctrl =
            controller(signals.clone(), cancel.clone(), tx, slot.clone()).with_max_cycles(2);

        let handle = tokio::spawn(ctrl.run());
        // Two full cycles: 32s boot cycle + 42s overridden cycle, with margin.
        tokio::time::sleep(Duration::from_secs(90)).await;
        handle.await.unwrap();

        assert_eq!(signals.greens.load(Ordering::SeqCst), 2);
        assert_eq!(
            *signals.last_green.lock().unwrap(),
            Some((Phase::West, 25))
        );
        // Consumed exactly once.
        assert!(slot.peek().is_none());
    }
}
