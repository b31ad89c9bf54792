//! CLI configuration: defaults, optional YAML file, environment overrides.
//!
//! Precedence, lowest to highest: built-in defaults, config file,
//! `WEBPILOT_*` environment variables, command-line flags (applied by the
//! caller after loading).

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::errors::CliError;

const ENV_REPORT_DIR: &str = "WEBPILOT_REPORT_DIR";
const ENV_MAX_STEPS: &str = "WEBPILOT_MAX_STEPS";
const ENV_LOG: &str = "WEBPILOT_LOG";
const ENV_SESSION_DIR: &str = "WEBPILOT_SESSION_DIR";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// Directory run reports land in.
    pub report_dir: PathBuf,
    /// Directory for saved session states.
    pub session_dir: PathBuf,
    /// Default step budget when the flag is absent.
    pub max_steps: u32,
    /// Default log level when RUST_LOG is unset.
    pub log_level: String,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            report_dir: PathBuf::from("./webpilot_reports"),
            session_dir: PathBuf::from("./webpilot_sessions"),
            max_steps: 50,
            log_level: "info".to_string(),
        }
    }
}

impl CliConfig {
    /// Load defaults, merge an optional YAML file, then apply environment
    /// overrides.
    pub fn load(config_file: Option<&Path>) -> Result<Self, CliError> {
        let mut config = Self::default();

        if let Some(path) = config_file {
            if !path.exists() {
                return Err(CliError::Config(format!(
                    "config file {} does not exist",
                    path.display()
                )));
            }
            let raw = std::fs::read_to_string(path)
                .map_err(|err| CliError::Config(format!("cannot read config file: {err}")))?;
            config = serde_yaml::from_str(&raw)
                .map_err(|err| CliError::Config(format!("invalid config file: {err}")))?;
        }

        if let Ok(dir) = std::env::var(ENV_REPORT_DIR) {
            if !dir.trim().is_empty() {
                config.report_dir = PathBuf::from(dir);
            }
        }
        if let Ok(dir) = std::env::var(ENV_SESSION_DIR) {
            if !dir.trim().is_empty() {
                config.session_dir = PathBuf::from(dir);
            }
        }
        if let Ok(steps) = std::env::var(ENV_MAX_STEPS) {
            if let Ok(parsed) = steps.parse::<u32>() {
                config.max_steps = parsed.max(1);
            }
        }
        if let Ok(level) = std::env::var(ENV_LOG) {
            if !level.trim().is_empty() {
                config.log_level = level;
            }
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sensible() {
        let config = CliConfig::default();
        assert_eq!(config.max_steps, 50);
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn file_values_override_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "max_steps: 12\nlog_level: debug\n").unwrap();

        let config = CliConfig::load(Some(&path)).unwrap();
        assert_eq!(config.max_steps, 12);
        assert_eq!(config.log_level, "debug");
        // Unspecified keys keep their defaults.
        assert_eq!(config.report_dir, PathBuf::from("./webpilot_reports"));
    }

    #[test]
    fn missing_file_is_an_error() {
        let result = CliConfig::load(Some(Path::new("/definitely/not/here.yaml")));
        assert!(result.is_err());
    }
}
