//! Structured run result, the terminal output of every run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use webpilot_core_types::{Decision, RunId};

/// Typed reason for a failed run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    /// No candidate element could satisfy an action sub-goal, repeatedly.
    NoCandidate,
    /// The world stayed blocked past the recovery budget.
    BlockedState,
    /// A timeout recurred for the same sub-goal across consecutive steps.
    Timeout,
    /// External cancellation.
    Cancelled,
    /// The step budget ran out before the goal was verified.
    StepBudgetExhausted,
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            FailureReason::NoCandidate => "no_candidate",
            FailureReason::BlockedState => "blocked_state",
            FailureReason::Timeout => "timeout",
            FailureReason::Cancelled => "cancelled",
            FailureReason::StepBudgetExhausted => "step_budget_exhausted",
        };
        f.write_str(label)
    }
}

/// Everything external reporting needs about a finished run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResult {
    pub run_id: RunId,
    pub success: bool,
    pub goal: String,
    pub url: String,
    pub steps: u32,
    pub max_steps: u32,
    pub duration_seconds: f64,
    pub decisions: Vec<Decision>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<FailureReason>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunResult {
    pub fn is_failure(&self) -> bool {
        !self.success
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn result_serializes_reporting_fields() {
        let result = RunResult {
            run_id: RunId::new(),
            success: false,
            goal: "click login".to_string(),
            url: "https://example.com".to_string(),
            steps: 4,
            max_steps: 50,
            duration_seconds: 1.25,
            decisions: vec![],
            reason: Some(FailureReason::StepBudgetExhausted),
            error: Some("max steps reached".to_string()),
            started_at: Utc::now(),
            finished_at: Utc::now(),
        };

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["steps"], 4);
        assert_eq!(json["max_steps"], 50);
        assert_eq!(json["reason"], "step_budget_exhausted");
    }
}
