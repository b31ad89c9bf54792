//! Configuration for one agent run.

use serde::{Deserialize, Serialize};

use action_primitives::RetryPolicy;

/// Which decision provider backs the loop. Providers are swapped here, by
/// configuration, never by conditional branching inside the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    #[default]
    Heuristic,
}

impl std::str::FromStr for ProviderKind {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "heuristic" | "auto" => Ok(ProviderKind::Heuristic),
            other => Err(format!("unknown decision provider '{other}'")),
        }
    }
}

/// Tunables for the orchestration loop and its layers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Target page loaded once at session start.
    pub url: String,

    /// Natural-language goal to achieve.
    pub goal: String,

    /// Sensing→Verifying cycles before the run fails.
    /// Default: 50
    pub max_steps: u32,

    /// Bound on each stability wait, milliseconds.
    /// Default: 15000
    pub stability_timeout_ms: u64,

    /// Bound on each action execution, milliseconds.
    /// Default: 30000
    pub action_timeout_ms: u64,

    /// Retry behavior for individual actions.
    pub retry: RetryPolicy,

    /// Blocking-state dismissal attempts before the run fails.
    /// Default: 3
    pub recovery_attempts: u32,

    /// Decisions scoring below this are flagged (and proceed with a
    /// recorded warning). Default: 0.3
    pub confidence_floor: f64,

    /// Decision provider backing the loop.
    pub provider: ProviderKind,

    /// Launch the control session in evasive mode from the start instead
    /// of waiting for a challenge.
    pub start_evasive: bool,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            goal: String::new(),
            max_steps: 50,
            stability_timeout_ms: 15_000,
            action_timeout_ms: 30_000,
            retry: RetryPolicy::default(),
            recovery_attempts: 3,
            confidence_floor: 0.3,
            provider: ProviderKind::Heuristic,
            start_evasive: false,
        }
    }
}

impl AgentConfig {
    pub fn new(url: impl Into<String>, goal: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            goal: goal.into(),
            ..Self::default()
        }
    }

    /// Small bounds and no backoff, for tests.
    pub fn minimal(url: impl Into<String>, goal: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            goal: goal.into(),
            max_steps: 10,
            stability_timeout_ms: 50,
            action_timeout_ms: 2_000,
            retry: RetryPolicy::new(3, std::time::Duration::ZERO),
            recovery_attempts: 3,
            confidence_floor: 0.3,
            provider: ProviderKind::Heuristic,
            start_evasive: false,
        }
    }

    /// Builder: set the step budget.
    pub fn max_steps(mut self, steps: u32) -> Self {
        self.max_steps = steps.max(1);
        self
    }

    /// Builder: set the recovery-attempt budget.
    pub fn recovery_attempts(mut self, attempts: u32) -> Self {
        self.recovery_attempts = attempts;
        self
    }

    /// Builder: set the confidence floor.
    pub fn confidence_floor(mut self, floor: f64) -> Self {
        self.confidence_floor = floor.clamp(0.0, 1.0);
        self
    }

    /// Validate fields that cannot be checked by construction.
    pub fn validate(&self) -> Result<(), String> {
        if self.goal.trim().is_empty() {
            return Err("goal must not be empty".to_string());
        }
        if !self.url.trim().is_empty() {
            url::Url::parse(self.url.trim()).map_err(|err| format!("invalid url: {err}"))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_bounds() {
        let config = AgentConfig::default();
        assert_eq!(config.max_steps, 50);
        assert_eq!(config.stability_timeout_ms, 15_000);
        assert_eq!(config.action_timeout_ms, 30_000);
        assert_eq!(config.recovery_attempts, 3);
        assert_eq!(config.confidence_floor, 0.3);
    }

    #[test]
    fn builder_chains() {
        let config = AgentConfig::new("https://example.com", "click things")
            .max_steps(5)
            .confidence_floor(0.5);
        assert_eq!(config.max_steps, 5);
        assert_eq!(config.confidence_floor, 0.5);
    }

    #[test]
    fn validation_rejects_bad_urls_and_empty_goals() {
        let bad_url = AgentConfig::new("not a url", "do something");
        assert!(bad_url.validate().is_err());

        let empty_goal = AgentConfig::new("https://example.com", "  ");
        assert!(empty_goal.validate().is_err());

        let ok = AgentConfig::new("https://example.com", "click login");
        assert!(ok.validate().is_ok());
    }

    #[test]
    fn provider_kind_parses_aliases() {
        assert_eq!(
            "heuristic".parse::<ProviderKind>().unwrap(),
            ProviderKind::Heuristic
        );
        assert_eq!("auto".parse::<ProviderKind>().unwrap(), ProviderKind::Heuristic);
        assert!("quantum".parse::<ProviderKind>().is_err());
    }
}
