//! Orchestrator: the Sense-Decide-Act-Verify state machine.
//!
//! Drives one run from navigation to a terminal result. Every component
//! failure is converted here into a state transition plus a recorded
//! event; a run always ends with a structured [`RunResult`], never an
//! escaped fault.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use action_primitives::{ActionExecutor, ControlPort, ExecutorConfig, SensePort};
use webpilot_event_bus::{EventBus, EventType, FlightEvent, InMemoryBus, RecorderSink};

use crate::config::{AgentConfig, ProviderKind};
use crate::decide::{DecisionProvider, HeuristicProvider};
use crate::errors::AgentError;
use crate::goal::GoalParser;
use crate::result::{FailureReason, RunResult};
use crate::session::AgentSession;
use crate::verify::GoalVerifier;

/// Block reasons that look like a bot challenge rather than an ordinary
/// modal or spinner.
const CHALLENGE_HINTS: &[&str] = &[
    "captcha",
    "challenge",
    "are you a robot",
    "human verification",
    "unusual traffic",
    "automated queries",
    "bot detection",
];

fn is_bot_challenge(reason: &str) -> bool {
    let lower = reason.to_ascii_lowercase();
    CHALLENGE_HINTS.iter().any(|hint| lower.contains(hint))
}

/// Build the configured decision provider.
pub fn make_provider(kind: ProviderKind, confidence_floor: f64) -> Arc<dyn DecisionProvider> {
    match kind {
        ProviderKind::Heuristic => Arc::new(HeuristicProvider::new(confidence_floor)),
    }
}

/// Top-level controller for one agent run.
///
/// Owns the [`AgentSession`] exclusively; the decision and verification
/// layers only ever see its history read-only. Depends on the
/// [`DecisionProvider`] interface, never on a concrete variant.
pub struct Orchestrator {
    config: AgentConfig,
    provider: Arc<dyn DecisionProvider>,
    sense: Arc<dyn SensePort>,
    control: Arc<dyn ControlPort>,
    executor: ActionExecutor,
    recorder: Arc<RecorderSink>,
    bus: Option<Arc<InMemoryBus<FlightEvent>>>,
    cancel: CancellationToken,
}

impl Orchestrator {
    pub fn new(config: AgentConfig, sense: Arc<dyn SensePort>, control: Arc<dyn ControlPort>) -> Self {
        let provider = make_provider(config.provider, config.confidence_floor);
        let executor = ActionExecutor::new(
            control.clone(),
            sense.clone(),
            ExecutorConfig {
                retry: config.retry.clone(),
                stability_timeout: Duration::from_millis(config.stability_timeout_ms),
                action_timeout: Duration::from_millis(config.action_timeout_ms),
                scroll_step_px: 600,
            },
        );
        Self {
            config,
            provider,
            sense,
            control,
            executor,
            recorder: RecorderSink::new(),
            bus: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Swap in an alternative decision provider (capability injection).
    pub fn with_provider(mut self, provider: Arc<dyn DecisionProvider>) -> Self {
        self.provider = provider;
        self
    }

    /// Attach a bus for live event consumers.
    pub fn with_bus(mut self, bus: Arc<InMemoryBus<FlightEvent>>) -> Self {
        self.bus = Some(bus);
        self
    }

    /// Token observed at the top of every loop iteration. Cancelling it
    /// fails the run without interrupting an in-flight action.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// The ordered flight log recorded so far.
    pub fn recorder(&self) -> Arc<RecorderSink> {
        self.recorder.clone()
    }

    /// Run the loop until the goal is verified, the step budget runs out,
    /// or an unrecoverable failure occurs.
    pub async fn run(&self) -> RunResult {
        let started_at = Utc::now();
        let started = Instant::now();
        let mut session = AgentSession::new();
        let sub_goals = GoalParser::parse(&self.config.goal);
        info!(
            run_id = %session.run_id,
            sub_goals = sub_goals.len(),
            provider = self.provider.name(),
            "starting agent run"
        );

        if self.config.start_evasive {
            match self.control.relaunch_in_evasive_mode().await {
                Ok(()) => session.stealth_escalated = true,
                Err(err) => warn!(%err, "could not start in evasive mode"),
            }
        }

        // Navigating: the target URL loads once, at session start only.
        if !self.config.url.trim().is_empty() {
            match self.control.navigate(self.config.url.trim()).await {
                Ok(()) => {
                    self.emit(0, EventType::Navigation, json!({ "url": self.config.url }))
                        .await;
                }
                Err(err) => {
                    // A failed initial load is not necessarily fatal; the
                    // sensing loop decides whether anything is actionable.
                    self.emit(0, EventType::Error, json!({ "message": err.to_string() }))
                        .await;
                }
            }
        }

        let mut recovery_attempts: u32 = 0;
        // Sub-goal index of the previous step's timeout, for the
        // consecutive-recurrence escalation rule.
        let mut timeout_on_sub_goal: Option<usize> = None;
        let mut last_failure: Option<FailureReason> = None;

        loop {
            // Cancellation is observed here, never mid-action.
            if self.cancel.is_cancelled() {
                self.emit(
                    session.steps_taken,
                    EventType::Error,
                    json!({ "message": "run cancelled" }),
                )
                .await;
                return self.finish(
                    session,
                    false,
                    Some(FailureReason::Cancelled),
                    Some("run cancelled".to_string()),
                    started,
                    started_at,
                ).await;
            }

            if session.steps_taken >= self.config.max_steps {
                let reason = last_failure.unwrap_or(FailureReason::StepBudgetExhausted);
                return self.finish(
                    session,
                    false,
                    Some(reason),
                    Some("max steps reached without achieving goal".to_string()),
                    started,
                    started_at,
                ).await;
            }

            // Sensing.
            let world = match self.sense.sense_world_state().await {
                Ok(world) => world,
                Err(err) => {
                    self.emit(
                        session.steps_taken,
                        EventType::Error,
                        json!({ "message": err.to_string() }),
                    )
                    .await;
                    recovery_attempts += 1;
                    if recovery_attempts > self.config.recovery_attempts {
                        return self.finish(
                            session,
                            false,
                            Some(FailureReason::BlockedState),
                            Some(format!("sensing failed repeatedly: {err}")),
                            started,
                            started_at,
                        ).await;
                    }
                    continue;
                }
            };
            self.emit(
                session.steps_taken,
                EventType::WorldState,
                json!({
                    "elements": world.elements.len(),
                    "blocked": world.blocked,
                    "block_reason": world.block_reason,
                    "url": world.url,
                }),
            )
            .await;

            // Recovering.
            if world.blocked {
                let reason = world
                    .block_reason
                    .clone()
                    .unwrap_or_else(|| "unknown blocker".to_string());

                // One-time stealth escalation on a bot-challenge signature,
                // preserving sub-goal index and history.
                if is_bot_challenge(&reason) && !session.stealth_escalated {
                    self.emit(
                        session.steps_taken,
                        EventType::Recovery,
                        json!({ "strategy": "evasive_relaunch", "reason": reason }),
                    )
                    .await;
                    match self.control.relaunch_in_evasive_mode().await {
                        Ok(()) => {
                            session.stealth_escalated = true;
                            continue;
                        }
                        Err(err) => {
                            warn!(%err, "evasive relaunch failed; falling back to dismissal");
                        }
                    }
                }

                recovery_attempts += 1;
                self.emit(
                    session.steps_taken,
                    EventType::Recovery,
                    json!({
                        "strategy": "dismiss",
                        "attempt": recovery_attempts,
                        "reason": reason,
                    }),
                )
                .await;
                if recovery_attempts > self.config.recovery_attempts {
                    return self.finish(
                        session,
                        false,
                        Some(FailureReason::BlockedState),
                        Some(format!("blocked by: {reason}")),
                        started,
                        started_at,
                    ).await;
                }
                if !self.sense.dismiss_blocking_state().await {
                    debug!("blocking-state dismissal did not succeed");
                }
                continue;
            }
            recovery_attempts = 0;

            let Some(sub_goal) = sub_goals.get(session.current_sub_goal_index) else {
                // All sub-goals already verified.
                return self.finish(session, true, None, None, started, started_at).await;
            };

            // Deciding.
            let decision = match self
                .provider
                .decide(sub_goal, &world, session.history())
                .await
            {
                Ok(decision) => decision,
                Err(AgentError::NoCandidate(description)) => {
                    // Recoverable: one blocking-state dismissal, then
                    // re-sense; fatal only through the step budget.
                    last_failure = Some(FailureReason::NoCandidate);
                    self.emit(
                        session.steps_taken,
                        EventType::Warning,
                        json!({ "message": format!("no candidate element for '{description}'") }),
                    )
                    .await;
                    let _ = self.sense.dismiss_blocking_state().await;
                    session.steps_taken += 1;
                    continue;
                }
                Err(err) => {
                    self.emit(
                        session.steps_taken,
                        EventType::Error,
                        json!({ "message": err.to_string() }),
                    )
                    .await;
                    return self.finish(
                        session,
                        false,
                        Some(FailureReason::NoCandidate),
                        Some(err.to_string()),
                        started,
                        started_at,
                    ).await;
                }
            };
            self.emit(
                session.steps_taken,
                EventType::Decision,
                json!({
                    "action": decision.action.to_string(),
                    "target_element_id": decision.target_element_id,
                    "target_selector": decision.target_selector,
                    "confidence": decision.confidence,
                    "reasoning": decision.reasoning,
                }),
            )
            .await;
            if decision.is_low_confidence(self.config.confidence_floor) {
                // Documented heuristic limitation: proceed anyway, loudly.
                self.emit(
                    session.steps_taken,
                    EventType::Warning,
                    json!({
                        "message": "decision confidence below floor",
                        "confidence": decision.confidence,
                        "floor": self.config.confidence_floor,
                    }),
                )
                .await;
            }

            // Acting.
            let before_digest = world.digest(&self.sense.page_text().await);
            let outcome = self.executor.execute(&decision).await;
            self.emit(
                session.steps_taken,
                EventType::Action,
                json!({
                    "succeeded": outcome.succeeded,
                    "retries_used": outcome.retries_used,
                    "used_fallback": outcome.used_fallback,
                    "error": outcome.error,
                    "error_message": outcome.error_message,
                }),
            )
            .await;
            session.record(decision.clone(), outcome.clone());

            // Timeouts are warnings until they recur for the same sub-goal
            // across consecutive steps.
            if outcome.timed_out() {
                self.emit(
                    session.steps_taken,
                    EventType::Warning,
                    json!({ "message": "action timed out", "sub_goal": sub_goal.sequence_index }),
                )
                .await;
                if timeout_on_sub_goal == Some(sub_goal.sequence_index) {
                    return self.finish(
                        session,
                        false,
                        Some(FailureReason::Timeout),
                        Some(format!(
                            "timeout recurred for sub-goal {}",
                            sub_goal.sequence_index
                        )),
                        started,
                        started_at,
                    ).await;
                }
                timeout_on_sub_goal = Some(sub_goal.sequence_index);
            } else {
                timeout_on_sub_goal = None;
            }

            // Verifying.
            let after_world = match self.sense.sense_world_state().await {
                Ok(world) => world,
                Err(err) => {
                    warn!(%err, "re-sense for verification failed; using pre-action state");
                    world.clone()
                }
            };
            let page_text = self.sense.page_text().await;
            let verified = GoalVerifier::verify(
                sub_goal,
                Some(&outcome),
                Some(&before_digest),
                &after_world,
                &page_text,
            );
            session.steps_taken += 1;

            if verified {
                info!(
                    sub_goal = sub_goal.sequence_index,
                    step = session.steps_taken,
                    "sub-goal verified"
                );
                session.advance_sub_goal();
                if session.current_sub_goal_index >= sub_goals.len() {
                    return self.finish(session, true, None, None, started, started_at).await;
                }
            } else {
                debug!(
                    sub_goal = sub_goal.sequence_index,
                    "sub-goal not verified; re-sensing"
                );
            }
        }
    }

    async fn finish(
        &self,
        session: AgentSession,
        success: bool,
        reason: Option<FailureReason>,
        error: Option<String>,
        started: Instant,
        started_at: chrono::DateTime<Utc>,
    ) -> RunResult {
        let result = RunResult {
            run_id: session.run_id.clone(),
            success,
            goal: self.config.goal.clone(),
            url: self.config.url.clone(),
            steps: session.steps_taken,
            max_steps: self.config.max_steps,
            duration_seconds: started.elapsed().as_secs_f64(),
            decisions: session.decisions(),
            reason,
            error,
            started_at,
            finished_at: Utc::now(),
        };
        let completion = FlightEvent::new(
            session.steps_taken,
            EventType::Completion,
            json!({
                "success": success,
                "steps": session.steps_taken,
                "reason": reason.map(|r| r.to_string()),
                "error": result.error,
            }),
        );
        self.recorder.record(completion.clone());
        if let Some(bus) = &self.bus {
            let _ = bus.publish(completion).await;
        }
        info!(success, steps = result.steps, "run finished");
        result
    }

    async fn emit(&self, step: u32, event_type: EventType, payload: serde_json::Value) {
        let event = FlightEvent::new(step, event_type, payload);
        self.recorder.record(event.clone());
        if let Some(bus) = &self.bus {
            // No subscribers is fine; the recorder already has the event.
            let _ = bus.publish(event).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use action_primitives::{ScriptedDriver, ScriptedElement, ScriptedFixture, ScriptedFrame};

    fn orchestrator_for(fixture: ScriptedFixture, config: AgentConfig) -> (Orchestrator, Arc<ScriptedDriver>) {
        let driver = Arc::new(ScriptedDriver::new(fixture));
        let orchestrator = Orchestrator::new(config, driver.clone(), driver.clone());
        (orchestrator, driver)
    }

    #[test]
    fn bot_challenge_detection_uses_keyword_hints() {
        assert!(is_bot_challenge("Please solve the CAPTCHA to continue"));
        assert!(is_bot_challenge("Unusual traffic from your network"));
        assert!(!is_bot_challenge("Subscribe to our newsletter"));
    }

    #[tokio::test]
    async fn cancelled_token_fails_immediately() {
        let fixture = ScriptedFixture::new(vec![ScriptedFrame::new(
            vec![ScriptedElement::new("button", "Go")],
            "",
        )]);
        let (orchestrator, _driver) = orchestrator_for(
            fixture,
            AgentConfig::minimal("https://example.com", "click Go"),
        );
        orchestrator.cancellation_token().cancel();

        let result = orchestrator.run().await;

        assert!(!result.success);
        assert_eq!(result.reason, Some(FailureReason::Cancelled));
        assert_eq!(result.steps, 0);
        assert!(result.decisions.is_empty());
    }

    #[tokio::test]
    async fn unverifiable_goal_exhausts_step_budget() {
        // A click that changes nothing observable: success is never
        // verified, so the loop retries until the budget runs out.
        let fixture = ScriptedFixture::new(vec![ScriptedFrame::new(
            vec![ScriptedElement::new("button", "Noop")],
            "static page",
        )]);
        let config = AgentConfig::minimal("https://example.com", "click Noop").max_steps(4);
        let (orchestrator, _driver) = orchestrator_for(fixture, config);

        let result = orchestrator.run().await;

        assert!(!result.success);
        assert_eq!(result.steps, 4);
        assert_eq!(result.reason, Some(FailureReason::StepBudgetExhausted));
        assert_eq!(result.decisions.len(), 4);
    }

    #[tokio::test]
    async fn stealth_escalates_once_on_challenge() {
        let mut challenge = ScriptedFrame::blocked("bot detection challenge");
        challenge.unblock_on_evasive = true;
        challenge.elements = vec![ScriptedElement::new("button", "Continue").advancing()];
        let second = ScriptedFrame::new(vec![], "Welcome through");

        let config = AgentConfig::minimal("https://example.com", "click Continue").max_steps(6);
        let (orchestrator, driver) =
            orchestrator_for(ScriptedFixture::new(vec![challenge, second]), config);

        let result = orchestrator.run().await;

        assert!(driver.is_evasive());
        // Escalation preserved history: the click decision is recorded.
        assert!(result.decisions.iter().any(|d| d.target_element_id.is_some()));
    }

    #[tokio::test]
    async fn navigation_happens_once_at_start() {
        let fixture = ScriptedFixture::new(vec![ScriptedFrame::new(
            vec![ScriptedElement::new("button", "Go").advancing()],
            "",
        ), ScriptedFrame::new(vec![], "done page")]);
        let config = AgentConfig::minimal("https://example.com/start", "click Go").max_steps(3);
        let (orchestrator, driver) = orchestrator_for(fixture, config);

        let _ = orchestrator.run().await;

        assert_eq!(driver.navigations(), vec!["https://example.com/start".to_string()]);
    }
}
