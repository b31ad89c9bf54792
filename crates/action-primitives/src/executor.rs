//! Action executor: carries one decision out against the live page.
//!
//! Every failure is converted into the returned [`ActionOutcome`]; nothing
//! escapes this boundary. Retries re-attempt the real action, so page-level
//! idempotence is explicitly not guaranteed; callers see the attempt count
//! in `retries_used`.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;
use tracing::{debug, warn};
use webpilot_core_types::{ActionOutcome, ActionVerb, Decision, ErrorKind};

use crate::errors::ActionError;
use crate::ports::{ControlPort, LiveHandle, SensePort};
use crate::retry::RetryPolicy;

/// Tunables for one executor instance.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    pub retry: RetryPolicy,
    /// Bound on the pre-action stability wait. Exceeding it degrades to a
    /// warning; the action is still attempted.
    pub stability_timeout: Duration,
    /// Hard bound on a single action attempt.
    pub action_timeout: Duration,
    /// Page-scroll distance for scroll decisions without a target.
    pub scroll_step_px: i32,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            stability_timeout: Duration::from_secs(15),
            action_timeout: Duration::from_secs(30),
            scroll_step_px: 600,
        }
    }
}

/// Executes decisions through the control port with scroll-into-view,
/// stability waits, retries, and the force-click fallback.
pub struct ActionExecutor {
    control: Arc<dyn ControlPort>,
    sense: Arc<dyn SensePort>,
    config: ExecutorConfig,
}

impl ActionExecutor {
    pub fn new(
        control: Arc<dyn ControlPort>,
        sense: Arc<dyn SensePort>,
        config: ExecutorConfig,
    ) -> Self {
        Self {
            control,
            sense,
            config,
        }
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Execute one decision. Never raises past this boundary.
    pub async fn execute(&self, decision: &Decision) -> ActionOutcome {
        match decision.action {
            ActionVerb::Wait => self.execute_wait().await,
            ActionVerb::Navigate => self.execute_navigate(decision).await,
            ActionVerb::Verify => ActionOutcome::success(0),
            ActionVerb::Scroll if decision.target_element_id.is_none() => {
                self.execute_page_scroll().await
            }
            ActionVerb::Click | ActionVerb::Type | ActionVerb::Scroll => {
                self.execute_targeted(decision).await
            }
        }
    }

    async fn execute_wait(&self) -> ActionOutcome {
        if !self
            .sense
            .wait_for_stability(self.config.stability_timeout)
            .await
        {
            warn!("stability wait exceeded its bound; continuing");
        }
        ActionOutcome::success(0)
    }

    async fn execute_navigate(&self, decision: &Decision) -> ActionOutcome {
        let url = decision.value.clone().unwrap_or_default();
        let url = url.trim();
        if url.is_empty() {
            return ActionOutcome::failure(
                0,
                ErrorKind::Internal,
                "navigate decision carries no url",
            );
        }
        let result = timeout(self.config.action_timeout, self.control.navigate(url)).await;
        match flatten_timeout(result, "navigate") {
            Ok(()) => {
                self.settle().await;
                ActionOutcome::success(0)
            }
            Err(err) => ActionOutcome::failure(0, err.kind(), err.to_string()),
        }
    }

    async fn execute_page_scroll(&self) -> ActionOutcome {
        let result = timeout(
            self.config.action_timeout,
            self.control.scroll_by(self.config.scroll_step_px),
        )
        .await;
        match flatten_timeout(result, "scroll") {
            Ok(()) => ActionOutcome::success(0),
            Err(err) => ActionOutcome::failure(0, err.kind(), err.to_string()),
        }
    }

    /// The per-action protocol for element-targeting verbs: resolve, scroll
    /// into view, stability wait, act; retry transient faults from
    /// resolution; force-click fallback once the budget is gone.
    async fn execute_targeted(&self, decision: &Decision) -> ActionOutcome {
        let policy = &self.config.retry;
        let mut failed_attempts: u32 = 0;
        let mut last_error: Option<ActionError> = None;
        // Handle from the most recent successful resolution; the fallback
        // reuses it instead of spending a budget-breaking extra resolution.
        let mut last_handle: Option<LiveHandle> = None;

        loop {
            let attempt = timeout(
                self.config.action_timeout,
                self.attempt(decision, &mut last_handle),
            )
            .await;
            match flatten_timeout(attempt, "action attempt") {
                Ok(()) => {
                    self.settle().await;
                    return ActionOutcome::success(failed_attempts);
                }
                Err(err) => {
                    failed_attempts += 1;
                    debug!(attempt = failed_attempts, error = %err, "action attempt failed");
                    let retryable = err.is_retryable();
                    last_error = Some(err);
                    if retryable && policy.allows_retry(failed_attempts) {
                        tokio::time::sleep(policy.backoff()).await;
                        continue;
                    }
                    break;
                }
            }
        }

        let error = last_error.unwrap_or_else(|| ActionError::Internal("no attempt made".into()));

        // Click-only escape hatch: one forced low-level click, reusing the
        // already-resolved handle.
        if decision.action == ActionVerb::Click && policy.fallback_on_exhaust {
            if let Some(handle) = last_handle {
                warn!("retry budget exhausted; falling back to forced click");
                let forced =
                    timeout(self.config.action_timeout, self.control.force_click(handle)).await;
                return match flatten_timeout(forced, "force click") {
                    Ok(()) => {
                        self.settle().await;
                        ActionOutcome {
                            succeeded: true,
                            retries_used: failed_attempts,
                            used_fallback: true,
                            error: None,
                            error_message: None,
                        }
                    }
                    Err(fallback_err) => ActionOutcome {
                        succeeded: false,
                        retries_used: failed_attempts,
                        used_fallback: true,
                        error: Some(fallback_err.kind()),
                        error_message: Some(fallback_err.to_string()),
                    },
                };
            }
        }

        ActionOutcome::failure(failed_attempts, error.kind(), error.to_string())
    }

    async fn attempt(
        &self,
        decision: &Decision,
        last_handle: &mut Option<LiveHandle>,
    ) -> Result<(), ActionError> {
        let element_id = decision
            .target_element_id
            .ok_or_else(|| ActionError::Internal("decision carries no target element".into()))?;

        let handle = self.control.resolve_element(element_id).await?;
        *last_handle = Some(handle);

        self.control.scroll_into_view(handle).await?;

        if !self
            .sense
            .wait_for_stability(self.config.stability_timeout)
            .await
        {
            warn!(element_id, "stability wait timed out before action; attempting anyway");
        }

        match decision.action {
            ActionVerb::Click => self.control.click(handle).await,
            ActionVerb::Type => {
                let text = decision.value.as_deref().unwrap_or_default();
                self.control.set_value(handle, text).await
            }
            // Already scrolled into view above.
            ActionVerb::Scroll => Ok(()),
            other => Err(ActionError::Internal(format!(
                "verb {other} is not a targeted action"
            ))),
        }
    }

    /// Post-action stability wait; timeout is only a warning.
    async fn settle(&self) {
        if !self
            .sense
            .wait_for_stability(self.config.stability_timeout)
            .await
        {
            warn!("post-action stability wait timed out");
        }
    }
}

fn flatten_timeout<T>(
    result: Result<Result<T, ActionError>, tokio::time::error::Elapsed>,
    what: &str,
) -> Result<T, ActionError> {
    match result {
        Ok(inner) => inner,
        Err(_) => Err(ActionError::ActionTimeout(format!(
            "{what} exceeded its bound"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use webpilot_core_types::WorldState;

    #[derive(Default)]
    struct StubState {
        resolutions: u32,
        clicks: u32,
        forced_clicks: u32,
        typed: Vec<String>,
        fail_stale: bool,
        occlusions_remaining: u32,
    }

    #[derive(Default)]
    struct StubDriver {
        state: Mutex<StubState>,
    }

    impl StubDriver {
        fn always_stale() -> Self {
            let stub = Self::default();
            stub.state.lock().fail_stale = true;
            stub
        }

        fn occluded_times(count: u32) -> Self {
            let stub = Self::default();
            stub.state.lock().occlusions_remaining = count;
            stub
        }
    }

    #[async_trait]
    impl SensePort for StubDriver {
        async fn sense_world_state(&self) -> Result<WorldState, ActionError> {
            Ok(WorldState::new(vec![]))
        }

        async fn wait_for_stability(&self, _timeout: Duration) -> bool {
            true
        }

        async fn dismiss_blocking_state(&self) -> bool {
            false
        }

        async fn page_text(&self) -> String {
            String::new()
        }
    }

    #[async_trait]
    impl ControlPort for StubDriver {
        async fn navigate(&self, _url: &str) -> Result<(), ActionError> {
            Ok(())
        }

        async fn relaunch_in_evasive_mode(&self) -> Result<(), ActionError> {
            Ok(())
        }

        async fn resolve_element(&self, element_id: u32) -> Result<LiveHandle, ActionError> {
            let mut state = self.state.lock();
            state.resolutions += 1;
            if state.fail_stale {
                return Err(ActionError::StaleTarget(format!("element {element_id}")));
            }
            Ok(LiveHandle(u64::from(element_id)))
        }

        async fn click(&self, _handle: LiveHandle) -> Result<(), ActionError> {
            let mut state = self.state.lock();
            if state.occlusions_remaining > 0 {
                state.occlusions_remaining -= 1;
                return Err(ActionError::Occluded("overlay".into()));
            }
            state.clicks += 1;
            Ok(())
        }

        async fn set_value(&self, _handle: LiveHandle, text: &str) -> Result<(), ActionError> {
            self.state.lock().typed.push(text.to_string());
            Ok(())
        }

        async fn scroll_into_view(&self, _handle: LiveHandle) -> Result<(), ActionError> {
            Ok(())
        }

        async fn scroll_by(&self, _pixels: i32) -> Result<(), ActionError> {
            Ok(())
        }

        async fn force_click(&self, _handle: LiveHandle) -> Result<(), ActionError> {
            self.state.lock().forced_clicks += 1;
            Ok(())
        }
    }

    fn executor_with(driver: Arc<StubDriver>) -> ActionExecutor {
        let config = ExecutorConfig {
            retry: RetryPolicy::new(3, Duration::ZERO),
            stability_timeout: Duration::from_millis(10),
            action_timeout: Duration::from_secs(5),
            scroll_step_px: 600,
        };
        ActionExecutor::new(driver.clone(), driver, config)
    }

    fn click_decision() -> Decision {
        Decision::new(ActionVerb::Click, "stub", 0.9).with_target(7, "button#7")
    }

    #[tokio::test]
    async fn always_stale_target_exhausts_budget_exactly() {
        let driver = Arc::new(StubDriver::always_stale());
        let executor = executor_with(driver.clone());

        let outcome = executor.execute(&click_decision()).await;

        assert!(!outcome.succeeded);
        assert_eq!(outcome.retries_used, 3);
        // Never a budget+1 resolution, and no fallback without a handle.
        assert_eq!(driver.state.lock().resolutions, 3);
        assert_eq!(driver.state.lock().forced_clicks, 0);
        assert!(!outcome.used_fallback);
    }

    #[tokio::test]
    async fn transient_occlusion_recovers_within_budget() {
        let driver = Arc::new(StubDriver::occluded_times(2));
        let executor = executor_with(driver.clone());

        let outcome = executor.execute(&click_decision()).await;

        assert!(outcome.succeeded);
        assert_eq!(outcome.retries_used, 2);
        assert!(!outcome.used_fallback);
        assert_eq!(driver.state.lock().clicks, 1);
    }

    #[tokio::test]
    async fn persistent_occlusion_falls_back_to_forced_click() {
        let driver = Arc::new(StubDriver::occluded_times(u32::MAX));
        let executor = executor_with(driver.clone());

        let outcome = executor.execute(&click_decision()).await;

        assert!(outcome.succeeded);
        assert!(outcome.used_fallback);
        assert_eq!(outcome.retries_used, 3);
        assert_eq!(driver.state.lock().forced_clicks, 1);
        // Fallback reuses the resolved handle; three resolutions only.
        assert_eq!(driver.state.lock().resolutions, 3);
    }

    #[tokio::test]
    async fn type_action_sends_value() {
        let driver = Arc::new(StubDriver::default());
        let executor = executor_with(driver.clone());
        let decision = Decision::new(ActionVerb::Type, "the input", 0.8)
            .with_target(1, "input#1")
            .with_value("Buy milk");

        let outcome = executor.execute(&decision).await;

        assert!(outcome.succeeded);
        assert_eq!(driver.state.lock().typed, vec!["Buy milk".to_string()]);
    }

    #[tokio::test]
    async fn type_without_fallback_fails_cleanly() {
        let driver = Arc::new(StubDriver::always_stale());
        let executor = executor_with(driver.clone());
        let decision = Decision::new(ActionVerb::Type, "the input", 0.8)
            .with_target(1, "input#1")
            .with_value("x");

        let outcome = executor.execute(&decision).await;

        assert!(!outcome.succeeded);
        assert!(!outcome.used_fallback);
        assert_eq!(driver.state.lock().forced_clicks, 0);
    }

    #[tokio::test]
    async fn navigate_without_url_fails() {
        let driver = Arc::new(StubDriver::default());
        let executor = executor_with(driver);
        let decision = Decision::new(ActionVerb::Navigate, "somewhere", 0.5);

        let outcome = executor.execute(&decision).await;
        assert!(!outcome.succeeded);
    }
}
