//! Parsed goal types: the verb vocabulary and atomic sub-goals.

use serde::{Deserialize, Serialize};

/// The fixed action vocabulary shared by the parser, the decision layer,
/// and the executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionVerb {
    Click,
    Type,
    Scroll,
    Wait,
    Navigate,
    Verify,
}

impl ActionVerb {
    /// Verbs that cannot proceed without a target element in the world.
    pub fn requires_target(&self) -> bool {
        matches!(self, ActionVerb::Click | ActionVerb::Type)
    }

    /// Verify never changes page state; everything else may.
    pub fn mutates_page(&self) -> bool {
        !matches!(self, ActionVerb::Verify)
    }
}

impl std::fmt::Display for ActionVerb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ActionVerb::Click => "click",
            ActionVerb::Type => "type",
            ActionVerb::Scroll => "scroll",
            ActionVerb::Wait => "wait",
            ActionVerb::Navigate => "navigate",
            ActionVerb::Verify => "verify",
        };
        f.write_str(name)
    }
}

/// One atomic instruction extracted from the goal text.
///
/// Sequence indices are contiguous from 0 and define execution order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubGoal {
    pub verb: ActionVerb,
    /// Free text used by the decision layer for element matching.
    pub target_description: String,
    /// Literal value for type/verify/navigate, preserved verbatim.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    /// Verification clause attached to this sub-goal, if the goal text
    /// carried one inline.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verification: Option<String>,
    pub sequence_index: usize,
}

impl SubGoal {
    pub fn new(verb: ActionVerb, target_description: impl Into<String>, index: usize) -> Self {
        Self {
            verb,
            target_description: target_description.into(),
            value: None,
            verification: None,
            sequence_index: index,
        }
    }

    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }

    pub fn with_verification(mut self, clause: impl Into<String>) -> Self {
        self.verification = Some(clause.into());
        self
    }
}

impl std::fmt::Display for SubGoal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {:?}", self.verb, self.target_description)?;
        if let Some(value) = &self.value {
            write!(f, " = {:?}", value)?;
        }
        Ok(())
    }
}
