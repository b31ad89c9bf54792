//! Error taxonomy for the agent core.

use action_primitives::ActionError;
use thiserror::Error;

/// Failures surfaced by the agent layers. All of them are caught at the
/// orchestrator boundary and converted into a state transition plus a
/// recorded event; none escapes a run.
#[derive(Debug, Error)]
pub enum AgentError {
    /// The decision layer cannot satisfy an action sub-goal against an
    /// empty world.
    #[error("no candidate element for sub-goal: {0}")]
    NoCandidate(String),

    /// The world kept reporting a blocking state past the recovery budget.
    #[error("blocked state persisted: {0}")]
    BlockedState(String),

    /// A timeout recurred for the same sub-goal across consecutive steps.
    #[error("timeout recurred for sub-goal {0}")]
    Timeout(usize),

    /// External cancellation observed; always fatal, never retried.
    #[error("run cancelled")]
    Cancelled,

    /// A decision provider failed for reasons other than missing candidates.
    #[error("decision provider error: {0}")]
    Provider(String),

    #[error(transparent)]
    Action(#[from] ActionError),
}
