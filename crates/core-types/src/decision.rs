//! Decision and action-outcome types flowing between the decision layer
//! and the executor.

use serde::{Deserialize, Serialize};

use crate::goal::ActionVerb;

/// The single chosen next action for one step.
///
/// `target_element_id` is a back-reference into the world state that
/// produced the decision, not an ownership relation; it is meaningless
/// against any other snapshot. `target_selector` carries the element's
/// selector path so history comparisons survive re-sensing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub action: ActionVerb,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_element_id: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_selector: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    /// Human-readable trace of how the score came together.
    pub reasoning: String,
    /// In [0, 1], derived only from the scoring function.
    pub confidence: f64,
}

impl Decision {
    pub fn new(action: ActionVerb, reasoning: impl Into<String>, confidence: f64) -> Self {
        Self {
            action,
            target_element_id: None,
            target_selector: None,
            value: None,
            reasoning: reasoning.into(),
            confidence: confidence.clamp(0.0, 1.0),
        }
    }

    pub fn with_target(mut self, element_id: u32, selector: impl Into<String>) -> Self {
        self.target_element_id = Some(element_id);
        self.target_selector = Some(selector.into());
        self
    }

    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }

    /// True when confidence fell below the configured floor.
    pub fn is_low_confidence(&self, floor: f64) -> bool {
        self.confidence < floor
    }
}

/// Coarse classification of an action failure, shared across layers so the
/// orchestrator can branch without parsing messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Target vanished between sensing and acting.
    StaleTarget,
    /// Target covered by another element.
    Occluded,
    /// Target present but refusing interaction.
    NotInteractable,
    /// A stability wait, navigation, or action exceeded its bound.
    Timeout,
    /// Cancellation observed mid-action.
    Interrupted,
    /// Underlying driver failure.
    Driver,
    Internal,
}

/// Result of executing one decision.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionOutcome {
    pub succeeded: bool,
    pub retries_used: u32,
    pub used_fallback: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl ActionOutcome {
    pub fn success(retries_used: u32) -> Self {
        Self {
            succeeded: true,
            retries_used,
            used_fallback: false,
            error: None,
            error_message: None,
        }
    }

    pub fn failure(retries_used: u32, kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            succeeded: false,
            retries_used,
            used_fallback: false,
            error: Some(kind),
            error_message: Some(message.into()),
        }
    }

    pub fn with_fallback(mut self) -> Self {
        self.used_fallback = true;
        self
    }

    pub fn timed_out(&self) -> bool {
        self.error == Some(ErrorKind::Timeout)
    }
}
