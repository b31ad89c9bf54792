//! Shared data contract for the webpilot agent layers.
//!
//! Everything the sensing, decision, execution, and orchestration layers
//! exchange lives here: world-state snapshots, parsed sub-goals, decisions,
//! and action outcomes. Types are plain data with serde derives; behavior
//! belongs to the layer crates.

pub mod decision;
pub mod goal;
pub mod world;

pub use decision::{ActionOutcome, Decision, ErrorKind};
pub use goal::{ActionVerb, SubGoal};
pub use world::{BoundingBox, CandidateElement, PageDigest, WorldState};

use uuid::Uuid;

/// Identifier for one agent run, assigned at session start.
#[derive(Clone, Debug, Eq, PartialEq, Hash, serde::Serialize, serde::Deserialize)]
pub struct RunId(pub String);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_ids_are_unique() {
        assert_ne!(RunId::new(), RunId::new());
    }
}
