//! Decision layer: capability trait plus the deterministic scoring provider.
//!
//! One provider implementation ships today; alternatives (remote models,
//! learned policies) slot in behind [`DecisionProvider`] by configuration,
//! never by branching inside the loop.

use async_trait::async_trait;
use webpilot_core_types::{ActionVerb, CandidateElement, Decision, SubGoal, WorldState};

use crate::errors::AgentError;
use crate::session::HistoryEntry;

/// Signal contribution caps. No single signal can push a candidate past
/// its band, so no signal can dominate the sum.
const TEXT_CAP: f64 = 0.5;
const TAG_CAP: f64 = 0.2;
const ATTRIBUTE_CAP: f64 = 0.3;
const RECENCY_PENALTY: f64 = 0.15;

/// Confidence assigned to target-less fallback decisions (scroll to
/// discover, wait for content).
const FALLBACK_CONFIDENCE: f64 = 0.3;

/// Attributes that carry naming/accessibility hints worth matching.
const LABEL_ATTRIBUTES: &[&str] = &["id", "name", "aria-label", "placeholder", "title"];

/// Words too generic to identify a target.
const STOPWORDS: &[&str] = &[
    "the", "a", "an", "to", "on", "in", "into", "of", "for", "with", "at", "that", "this", "it",
];

/// Chooses the single best next action for one step.
#[async_trait]
pub trait DecisionProvider: Send + Sync {
    async fn decide(
        &self,
        sub_goal: &SubGoal,
        world: &WorldState,
        history: &[HistoryEntry],
    ) -> Result<Decision, AgentError>;

    /// Stable identifier used in configuration and events.
    fn name(&self) -> &'static str;
}

/// Deterministic keyword-scoring provider.
///
/// For every visible interactive element, sums clamped independent signals
/// (text containment, verb-tag affinity, attribute hits, recency penalty)
/// and returns the strict-highest scorer, ties broken by first-seen order.
#[derive(Debug, Clone)]
pub struct HeuristicProvider {
    confidence_floor: f64,
}

impl HeuristicProvider {
    pub fn new(confidence_floor: f64) -> Self {
        Self {
            confidence_floor: confidence_floor.clamp(0.0, 1.0),
        }
    }

    pub fn confidence_floor(&self) -> f64 {
        self.confidence_floor
    }

    fn score(
        &self,
        element: &CandidateElement,
        tokens: &[String],
        verb: ActionVerb,
        history: &[HistoryEntry],
    ) -> (f64, String) {
        let mut parts: Vec<String> = Vec::new();

        let text_score = containment_score(&element.visible_text, tokens, TEXT_CAP);
        if text_score > 0.0 {
            parts.push(format!("text match +{text_score:.2}"));
        }

        let tag_score = tag_affinity(element, verb);
        if tag_score > 0.0 {
            parts.push(format!("tag <{}> fits {verb} +{tag_score:.2}", element.tag));
        }

        let label_blob: String = LABEL_ATTRIBUTES
            .iter()
            .map(|key| element.attribute(key))
            .collect::<Vec<_>>()
            .join(" ");
        let attribute_score = containment_score(&label_blob, tokens, ATTRIBUTE_CAP);
        if attribute_score > 0.0 {
            parts.push(format!("attribute match +{attribute_score:.2}"));
        }

        let repeats = history
            .iter()
            .filter(|entry| {
                entry.decision.target_selector.as_deref() == Some(element.selector_path.as_str())
            })
            .count();
        let penalty = RECENCY_PENALTY * repeats as f64;
        if penalty > 0.0 {
            parts.push(format!("seen {repeats}x before -{penalty:.2}"));
        }

        let raw = text_score + tag_score + attribute_score - penalty;
        let score = raw.clamp(0.0, 1.0);
        let reasoning = if parts.is_empty() {
            "no matching signals".to_string()
        } else {
            parts.join("; ")
        };
        (score, reasoning)
    }

    fn best_candidate<'w>(
        &self,
        sub_goal: &SubGoal,
        world: &'w WorldState,
        history: &[HistoryEntry],
    ) -> Option<(&'w CandidateElement, f64, String)> {
        let tokens = target_tokens(&sub_goal.target_description);
        let mut best: Option<(&CandidateElement, f64, String)> = None;
        for element in world.interactive() {
            let (score, reasoning) = self.score(element, &tokens, sub_goal.verb, history);
            // Strictly-greater keeps the lowest index on ties.
            let replace = match &best {
                Some((_, best_score, _)) => score > *best_score,
                None => true,
            };
            if replace {
                best = Some((element, score, reasoning));
            }
        }
        best
    }
}

#[async_trait]
impl DecisionProvider for HeuristicProvider {
    async fn decide(
        &self,
        sub_goal: &SubGoal,
        world: &WorldState,
        history: &[HistoryEntry],
    ) -> Result<Decision, AgentError> {
        match sub_goal.verb {
            ActionVerb::Verify => {
                let mut decision = Decision::new(
                    ActionVerb::Verify,
                    "verification reads page text, no interaction needed",
                    1.0,
                );
                decision.value = sub_goal
                    .value
                    .clone()
                    .or_else(|| Some(sub_goal.target_description.clone()));
                return Ok(decision);
            }
            ActionVerb::Wait => {
                return Ok(Decision::new(
                    ActionVerb::Wait,
                    "waiting for the page to settle",
                    1.0,
                ));
            }
            ActionVerb::Navigate => {
                let mut decision =
                    Decision::new(ActionVerb::Navigate, "navigation to explicit target", 1.0);
                decision.value = sub_goal.value.clone();
                return Ok(decision);
            }
            ActionVerb::Click | ActionVerb::Type | ActionVerb::Scroll => {}
        }

        if world.elements.is_empty() && sub_goal.verb.requires_target() {
            return Err(AgentError::NoCandidate(sub_goal.target_description.clone()));
        }

        match self.best_candidate(sub_goal, world, history) {
            Some((element, score, reasoning)) => {
                let mut decision = Decision::new(
                    sub_goal.verb,
                    format!(
                        "[{}] <{}> {:?}: {}",
                        element.id,
                        element.tag,
                        truncate(&element.visible_text, 30),
                        reasoning
                    ),
                    score,
                )
                .with_target(element.id, element.selector_path.clone());
                if sub_goal.verb == ActionVerb::Type {
                    decision.value = sub_goal.value.clone();
                }
                if decision.is_low_confidence(self.confidence_floor) {
                    tracing::debug!(
                        score,
                        floor = self.confidence_floor,
                        "best candidate sits below the confidence floor"
                    );
                }
                Ok(decision)
            }
            // Nothing visible and interactive to score: scroll to discover
            // more of the page rather than erroring out.
            None => Ok(Decision::new(
                ActionVerb::Scroll,
                "no matching elements found, scrolling to discover more",
                FALLBACK_CONFIDENCE,
            )),
        }
    }

    fn name(&self) -> &'static str {
        "heuristic"
    }
}

/// Lower-cased whitespace-split tokens of the target description, stripped
/// of punctuation and stopwords.
fn target_tokens(description: &str) -> Vec<String> {
    description
        .split_whitespace()
        .map(|word| {
            word.trim_matches(|c: char| !c.is_ascii_alphanumeric())
                .to_ascii_lowercase()
        })
        .filter(|word| !word.is_empty() && !STOPWORDS.contains(&word.as_str()))
        .collect()
}

/// Fraction of tokens found as substrings of `haystack`, scaled into `cap`.
fn containment_score(haystack: &str, tokens: &[String], cap: f64) -> f64 {
    if tokens.is_empty() || haystack.is_empty() {
        return 0.0;
    }
    let haystack = haystack.to_ascii_lowercase();
    let matched = tokens.iter().filter(|t| haystack.contains(t.as_str())).count();
    cap * matched as f64 / tokens.len() as f64
}

/// Verb-to-tag affinity table.
fn tag_affinity(element: &CandidateElement, verb: ActionVerb) -> f64 {
    let tag = element.tag.as_str();
    match verb {
        ActionVerb::Click => {
            if tag == "button" || tag == "a" {
                TAG_CAP
            } else if tag == "input"
                && matches!(element.attribute("type"), "submit" | "button")
            {
                TAG_CAP
            } else {
                0.0
            }
        }
        ActionVerb::Type => {
            if tag == "textarea" {
                TAG_CAP
            } else if tag == "input"
                && !matches!(
                    element.attribute("type"),
                    "submit" | "button" | "checkbox" | "radio"
                )
            {
                TAG_CAP
            } else {
                0.0
            }
        }
        _ => 0.0,
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use webpilot_core_types::{ActionOutcome, BoundingBox};

    fn element(id: u32, tag: &str, text: &str) -> CandidateElement {
        CandidateElement {
            id,
            tag: tag.to_string(),
            visible_text: text.to_string(),
            attributes: HashMap::new(),
            selector_path: format!("{tag}:{id}"),
            is_interactive: true,
            is_visible: true,
            in_shadow_tree: false,
            shadow_host_id: None,
            bounding_box: BoundingBox::new(0.0, 0.0, 120.0, 24.0),
        }
    }

    fn world(elements: Vec<CandidateElement>) -> WorldState {
        WorldState::new(elements)
    }

    fn click_goal(description: &str) -> SubGoal {
        SubGoal::new(ActionVerb::Click, description, 0)
    }

    fn provider() -> HeuristicProvider {
        HeuristicProvider::new(0.3)
    }

    #[tokio::test]
    async fn identical_inputs_yield_identical_decisions() {
        let world = world(vec![
            element(0, "a", "Home"),
            element(1, "button", "Log in"),
            element(2, "button", "Sign up"),
        ]);
        let goal = click_goal("the log in button");

        let first = provider().decide(&goal, &world, &[]).await.unwrap();
        let second = provider().decide(&goal, &world, &[]).await.unwrap();

        assert_eq!(first.target_element_id, second.target_element_id);
        assert_eq!(first.confidence, second.confidence);
        assert_eq!(first.reasoning, second.reasoning);
        assert_eq!(first.target_element_id, Some(1));
    }

    #[tokio::test]
    async fn equal_scores_break_ties_by_lowest_index() {
        let world = world(vec![
            element(0, "button", "Submit"),
            element(1, "button", "Submit"),
        ]);
        let goal = click_goal("submit");

        let decision = provider().decide(&goal, &world, &[]).await.unwrap();
        assert_eq!(decision.target_element_id, Some(0));
    }

    #[tokio::test]
    async fn recency_penalty_strictly_decreases_score() {
        let world = world(vec![element(0, "button", "Next")]);
        let goal = click_goal("next");

        let fresh = provider().decide(&goal, &world, &[]).await.unwrap();

        let history = vec![HistoryEntry {
            decision: fresh.clone(),
            outcome: ActionOutcome::success(0),
        }];
        let repeated = provider().decide(&goal, &world, &history).await.unwrap();

        assert!(repeated.confidence < fresh.confidence);
        assert!((fresh.confidence - repeated.confidence - RECENCY_PENALTY).abs() < 1e-9);

        let mut deep_history = Vec::new();
        for _ in 0..20 {
            deep_history.push(HistoryEntry {
                decision: fresh.clone(),
                outcome: ActionOutcome::success(0),
            });
        }
        let floored = provider().decide(&goal, &world, &deep_history).await.unwrap();
        assert_eq!(floored.confidence, 0.0);
    }

    #[tokio::test]
    async fn type_goal_prefers_inputs_and_carries_value() {
        let world = world(vec![
            element(0, "button", "Add"),
            element(1, "input", ""),
        ]);
        let goal = SubGoal::new(ActionVerb::Type, "the input", 0).with_value("Buy milk");

        let decision = provider().decide(&goal, &world, &[]).await.unwrap();
        assert_eq!(decision.action, ActionVerb::Type);
        assert_eq!(decision.target_element_id, Some(1));
        assert_eq!(decision.value.as_deref(), Some("Buy milk"));
    }

    #[tokio::test]
    async fn empty_world_errors_for_target_verbs() {
        let goal = click_goal("anything");
        let err = provider().decide(&goal, &world(vec![]), &[]).await.unwrap_err();
        assert!(matches!(err, AgentError::NoCandidate(_)));
    }

    #[tokio::test]
    async fn verify_decides_without_candidates() {
        let goal = SubGoal::new(ActionVerb::Verify, "confirmation", 0).with_value("Saved");
        let decision = provider().decide(&goal, &world(vec![]), &[]).await.unwrap();
        assert_eq!(decision.action, ActionVerb::Verify);
        assert_eq!(decision.value.as_deref(), Some("Saved"));
        assert!(decision.target_element_id.is_none());
    }

    #[tokio::test]
    async fn hidden_elements_fall_back_to_scroll() {
        let mut hidden = element(0, "button", "Checkout");
        hidden.is_visible = false;
        hidden.bounding_box = BoundingBox::default();
        let goal = click_goal("checkout");

        let decision = provider().decide(&goal, &world(vec![hidden]), &[]).await.unwrap();
        assert_eq!(decision.action, ActionVerb::Scroll);
        assert_eq!(decision.confidence, FALLBACK_CONFIDENCE);
        assert!(decision.target_element_id.is_none());
    }

    #[tokio::test]
    async fn attribute_hints_score_without_visible_text() {
        let mut input = element(0, "input", "");
        input
            .attributes
            .insert("placeholder".to_string(), "Search products".to_string());
        let mut other = element(1, "input", "");
        other
            .attributes
            .insert("placeholder".to_string(), "Coupon code".to_string());
        let goal = SubGoal::new(ActionVerb::Type, "search", 0).with_value("laptop");

        let decision = provider()
            .decide(&goal, &world(vec![other, input]), &[])
            .await
            .unwrap();
        // Second element carries the matching placeholder despite equal tags.
        assert_eq!(decision.target_element_id, Some(0));
    }

    #[test]
    fn tokens_strip_quotes_and_stopwords() {
        let tokens = target_tokens("the 'Add' button");
        assert_eq!(tokens, vec!["add".to_string(), "button".to_string()]);
    }
}
