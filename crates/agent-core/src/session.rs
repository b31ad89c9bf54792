//! Per-run mutable state, owned exclusively by the orchestrator.

use serde::Serialize;
use webpilot_core_types::{ActionOutcome, Decision, RunId};

/// One decision/outcome pair in the run history.
#[derive(Debug, Clone, Serialize)]
pub struct HistoryEntry {
    pub decision: Decision,
    pub outcome: ActionOutcome,
}

/// Process-wide state of one run. Created at run start, destroyed at run
/// end, never shared across concurrent runs; the decision and verification
/// layers only ever see the history as a read-only slice.
#[derive(Debug)]
pub struct AgentSession {
    pub run_id: RunId,
    pub current_sub_goal_index: usize,
    pub steps_taken: u32,
    pub stealth_escalated: bool,
    history: Vec<HistoryEntry>,
}

impl AgentSession {
    pub fn new() -> Self {
        Self {
            run_id: RunId::new(),
            current_sub_goal_index: 0,
            steps_taken: 0,
            stealth_escalated: false,
            history: Vec::new(),
        }
    }

    pub fn record(&mut self, decision: Decision, outcome: ActionOutcome) {
        self.history.push(HistoryEntry { decision, outcome });
    }

    pub fn history(&self) -> &[HistoryEntry] {
        &self.history
    }

    pub fn decisions(&self) -> Vec<Decision> {
        self.history.iter().map(|e| e.decision.clone()).collect()
    }

    pub fn advance_sub_goal(&mut self) {
        self.current_sub_goal_index += 1;
    }
}

impl Default for AgentSession {
    fn default() -> Self {
        Self::new()
    }
}
