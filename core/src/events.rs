//! Fire-and-forget notifications to external collaborators.
//!
//! None of these calls can fail the cycle: the decision push is fully
//! silent, rewards and violations only log their failures.

use std::time::Duration;

use greenwave_protocol::DecisionPush;
use greenwave_protocol::DecisionResult;
use greenwave_protocol::RewardEvent;
use greenwave_protocol::ViolationReport;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// The visualization adapter must never delay a cycle.
const PUSH_TIMEOUT: Duration = Duration::from_millis(500);

/// Reward and violation backends get a little longer.
const BACKEND_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone)]
pub struct EventEndpoints {
    /// Decision pushes, e.g. a simulation or signage adapter. Optional.
    pub decision_url: Option<String>,
    /// Reward wallet backend. Optional.
    pub reward_url: Option<String>,
    /// Enforcement backend for violations. Optional.
    pub violation_url: Option<String>,
}

/// Forwards each new decision and any reward/violation events outward.
pub struct EventEmitter {
    client: reqwest::Client,
    endpoints: EventEndpoints,
    decisions: watch::Receiver<Option<DecisionResult>>,
    cancel: CancellationToken,
}

impl EventEmitter {
    pub fn new(
        endpoints: EventEndpoints,
        decisions: watch::Receiver<Option<DecisionResult>>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(BACKEND_TIMEOUT)
                .build()
                .unwrap_or_default(),
            endpoints,
            decisions,
            cancel,
        }
    }

    /// Watch the decision channel and push every change until cancelled.
    pub async fn run(mut self) {
        loop {
            tokio::select! {
                () = self.cancel.cancelled() => break,
                changed = self.decisions.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
            let push = self
                .decisions
                .borrow_and_update()
                .as_ref()
                .map(DecisionPush::from);
            if let Some(push) = push {
                self.push_decision(&push).await;
            }
        }
        tracing::debug!("event emitter stopped");
    }

    /// Best-effort, fully silent: a dead adapter is not worth a log line
    /// every cycle.
    pub async fn push_decision(&self, push: &DecisionPush) {
        let Some(url) = &self.endpoints.decision_url else {
            return;
        };
        let _ = self
            .client
            .post(url)
            .timeout(PUSH_TIMEOUT)
            .json(push)
            .send()
            .await;
    }

    pub async fn credit_reward(&self, event: &RewardEvent) {
        let Some(url) = &self.endpoints.reward_url else {
            return;
        };
        match self.client.post(url).json(event).send().await {
            Ok(resp) if resp.status().is_success() => {
                tracing::info!(plate = %event.plate_number, points = event.points, "reward credited");
            }
            Ok(resp) => {
                tracing::warn!(status = %resp.status(), "reward backend rejected event");
            }
            Err(err) => {
                tracing::warn!(%err, "reward backend unreachable");
            }
        }
    }

    pub async fn report_violation(&self, report: &ViolationReport) {
        let Some(url) = &self.endpoints.violation_url else {
            return;
        };
        match self.client.post(url).json(report).send().await {
            Ok(resp) if resp.status().is_success() => {
                tracing::info!(
                    plate = %report.plate_number,
                    kind = %report.violation_type,
                    "violation reported"
                );
            }
            Ok(resp) => {
                tracing::warn!(status = %resp.status(), "enforcement backend rejected report");
            }
            Err(err) => {
                tracing::warn!(%err, "enforcement backend unreachable");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use greenwave_protocol::Phase;
    use serde_json::json;
    use wiremock::Mock;
    use wiremock::MockServer;
    use wiremock::ResponseTemplate;
    use wiremock::matchers::body_partial_json;
    use wiremock::matchers::method;
    use wiremock::matchers::path;

    fn emitter(endpoints: EventEndpoints) -> EventEmitter {
        let (_tx, rx) = watch::channel(None);
        EventEmitter::new(endpoints, rx, CancellationToken::new())
    }

    #[tokio::test]
    async fn decision_push_reaches_the_adapter() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/decision"))
            .and(body_partial_json(json!({"winner_phase": "East"})))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let emitter = emitter(EventEndpoints {
            decision_url: Some(format!("{}/decision", server.uri())),
            reward_url: None,
            violation_url: None,
        });
        let push = DecisionPush {
            winner_phase: Phase::East,
            allowed_lanes: vec!["East_All".to_string()],
            allocated_times: Default::default(),
            priority_scores: Default::default(),
            system_state: greenwave_protocol::CongestionState::Safe,
            phase_saturations: Default::default(),
        };
        emitter.push_decision(&push).await;
    }

    #[tokio::test]
    async fn missing_endpoints_are_no_ops() {
        let emitter = emitter(EventEndpoints {
            decision_url: None,
            reward_url: None,
            violation_url: None,
        });
        emitter
            .credit_reward(&RewardEvent {
                plate_number: "KA01AB1234".to_string(),
                points: 10,
                reason: "yielded to emergency vehicle".to_string(),
                junction_id: "junction-1".to_string(),
            })
            .await;
        emitter
            .report_violation(&ViolationReport {
                junction_id: "junction-1".to_string(),
                plate_number: "KA01AB1234".to_string(),
                violation_type: "RLV".to_string(),
                timestamp: 0.0,
                confidence: 0.9,
            })
            .await;
    }

    #[tokio::test]
    async fn dead_adapter_is_silent() {
        let emitter = emitter(EventEndpoints {
            decision_url: Some("http://127.0.0.1:1/decision".to_string()),
            reward_url: None,
            violation_url: None,
        });
        let push = DecisionPush {
            winner_phase: Phase::North,
            allowed_lanes: Vec::new(),
            allocated_times: Default::default(),
            priority_scores: Default::default(),
            system_state: greenwave_protocol::CongestionState::Safe,
            phase_saturations: Default::default(),
        };
        emitter.push_decision(&push).await;
    }
}
