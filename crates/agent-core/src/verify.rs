//! Goal verifier: decides whether a sub-goal is satisfied.
//!
//! Pure heuristic over observable state. A succeeded action with no
//! observable page change counts as unverified, not failed: "nothing
//! happened" is distinguishable from "definitely wrong", and the loop gets
//! another attempt at the same sub-goal.

use webpilot_core_types::{ActionOutcome, ActionVerb, PageDigest, SubGoal, WorldState};

pub struct GoalVerifier;

impl GoalVerifier {
    /// Check the current sub-goal against the post-action world.
    ///
    /// `outcome` and `before` are absent for pure verification sub-goals,
    /// which read page text only.
    pub fn verify(
        sub_goal: &SubGoal,
        outcome: Option<&ActionOutcome>,
        before: Option<&PageDigest>,
        after: &WorldState,
        page_text: &str,
    ) -> bool {
        match sub_goal.verb {
            ActionVerb::Verify => {
                let needle = sub_goal
                    .value
                    .as_deref()
                    .unwrap_or(&sub_goal.target_description);
                text_contains(page_text, needle)
            }
            ActionVerb::Navigate => match (&sub_goal.value, &after.url) {
                (Some(target), Some(current)) => current.contains(target.as_str()),
                // No target URL recorded: fall through to observable change.
                _ => changed(outcome, before, after, page_text),
            },
            ActionVerb::Wait => outcome.map(|o| o.succeeded).unwrap_or(false),
            ActionVerb::Click | ActionVerb::Type | ActionVerb::Scroll => {
                if let Some(clause) = &sub_goal.verification {
                    // An explicit verification clause decides on its own.
                    if text_contains(page_text, clause) {
                        return true;
                    }
                }
                changed(outcome, before, after, page_text)
            }
        }
    }
}

/// Succeeded and the world moved in a measurable way: element count, URL,
/// or page text.
fn changed(
    outcome: Option<&ActionOutcome>,
    before: Option<&PageDigest>,
    after: &WorldState,
    page_text: &str,
) -> bool {
    let succeeded = outcome.map(|o| o.succeeded).unwrap_or(false);
    if !succeeded {
        return false;
    }
    match before {
        Some(before) => *before != after.digest(page_text),
        // Without a before-state there is nothing to compare against;
        // success alone is not verification.
        None => false,
    }
}

fn text_contains(page_text: &str, needle: &str) -> bool {
    if needle.trim().is_empty() {
        return false;
    }
    page_text
        .to_ascii_lowercase()
        .contains(&needle.to_ascii_lowercase())
}
