//! Error types for the execution layer.

use thiserror::Error;

/// Failures an action can hit between resolution and completion.
#[derive(Debug, Error, Clone)]
pub enum ActionError {
    /// Target element can no longer be located on the live page.
    #[error("stale target: {0}")]
    StaleTarget(String),

    /// Click target is covered by another element.
    #[error("target occluded: {0}")]
    Occluded(String),

    /// Element exists but refuses interaction (disabled, detached input).
    #[error("element not interactable: {0}")]
    NotInteractable(String),

    /// Stability wait exceeded its bound.
    #[error("stability wait timeout: {0}")]
    WaitTimeout(String),

    /// Navigation did not settle within its bound.
    #[error("navigation timeout: {0}")]
    NavTimeout(String),

    /// The action itself exceeded its per-action bound.
    #[error("action timeout: {0}")]
    ActionTimeout(String),

    /// Run cancellation observed while the action was pending.
    #[error("interrupted: {0}")]
    Interrupted(String),

    /// Underlying driver/transport failure.
    #[error("driver error: {0}")]
    Driver(String),

    /// Session-state persistence failure.
    #[error("session state error: {0}")]
    SessionState(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ActionError {
    /// Coarse classification carried on action outcomes.
    pub fn kind(&self) -> webpilot_core_types::ErrorKind {
        use webpilot_core_types::ErrorKind;
        match self {
            ActionError::StaleTarget(_) => ErrorKind::StaleTarget,
            ActionError::Occluded(_) => ErrorKind::Occluded,
            ActionError::NotInteractable(_) => ErrorKind::NotInteractable,
            ActionError::WaitTimeout(_)
            | ActionError::NavTimeout(_)
            | ActionError::ActionTimeout(_) => ErrorKind::Timeout,
            ActionError::Interrupted(_) => ErrorKind::Interrupted,
            ActionError::Driver(_) | ActionError::SessionState(_) => ErrorKind::Driver,
            ActionError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Transient faults worth another resolution attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ActionError::StaleTarget(_) | ActionError::Occluded(_))
    }

    /// Timeout-class faults, escalated by the orchestrator when they recur
    /// for the same sub-goal.
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            ActionError::WaitTimeout(_) | ActionError::NavTimeout(_) | ActionError::ActionTimeout(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stale_and_occluded_are_retryable() {
        assert!(ActionError::StaleTarget("gone".into()).is_retryable());
        assert!(ActionError::Occluded("modal".into()).is_retryable());
        assert!(!ActionError::Driver("boom".into()).is_retryable());
        assert!(!ActionError::ActionTimeout("slow".into()).is_retryable());
    }

    #[test]
    fn timeout_classification() {
        assert!(ActionError::ActionTimeout("t".into()).is_timeout());
        assert!(ActionError::WaitTimeout("t".into()).is_timeout());
        assert!(!ActionError::StaleTarget("t".into()).is_timeout());
    }
}
