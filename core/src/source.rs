//! Telemetry producer seam.
//!
//! A source is anything that can describe one approach right now: a camera
//! pipeline, a loop-detector adapter, or the built-in simulator. The pump
//! samples it on a fixed cadence and overwrites the store's latest value.

use std::time::Duration;

use greenwave_protocol::Phase;
use greenwave_protocol::PhaseTelemetry;
use tokio_util::sync::CancellationToken;

use crate::telemetry::LightColor;
use crate::telemetry::TelemetryStore;

pub trait TelemetrySource: Send {
    fn phase(&self) -> Phase;

    /// Produce the current frame. `signal` is what this approach's head
    /// shows, so simulators can drain their queue under green.
    fn sample(&mut self, signal: LightColor) -> PhaseTelemetry;
}

/// Drive one source until cancelled, overwriting the store every `period`.
pub async fn pump(
    mut source: Box<dyn TelemetrySource>,
    store: TelemetryStore,
    period: Duration,
    cancel: CancellationToken,
) {
    let phase = source.phase();
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }
        let signal = store.phase_signal(phase);
        store.update_phase(phase, source.sample(signal));
    }
    tracing::debug!(%phase, "telemetry pump stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use greenwave_protocol::Detection;
    use greenwave_protocol::LaneEvent;

    struct OneCar;

    impl TelemetrySource for OneCar {
        fn phase(&self) -> Phase {
            Phase::West
        }

        fn sample(&mut self, _signal: LightColor) -> PhaseTelemetry {
            PhaseTelemetry {
                detections: vec![Detection::new(1.0, 1.0, 2.0, 2.0, "car")],
                event: LaneEvent::Normal,
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn pump_writes_frames_until_cancelled() {
        let store = TelemetryStore::new();
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(pump(
            Box::new(OneCar),
            store.clone(),
            Duration::from_millis(100),
            cancel.clone(),
        ));

        tokio::time::sleep(Duration::from_millis(350)).await;
        cancel.cancel();
        handle.await.unwrap();

        let snap = store.snapshot();
        assert_eq!(snap.frames[&Phase::West].detections.len(), 1);
    }
}
