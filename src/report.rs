//! Run-report persistence: one directory per run holding the structured
//! result and the ordered flight-event log, both as JSON. Rendering into
//! anything richer is an external concern.

use std::fs;
use std::path::{Path, PathBuf};

use agent_core::RunResult;
use chrono::Utc;
use webpilot_event_bus::FlightEvent;

use crate::errors::CliError;

pub struct RunReporter {
    output_dir: PathBuf,
}

impl RunReporter {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    /// Write `result.json` and `events.json` under a fresh run directory,
    /// returning its path.
    pub fn persist(
        &self,
        result: &RunResult,
        events: &[FlightEvent],
    ) -> Result<PathBuf, CliError> {
        let run_dir = self.output_dir.join(run_dir_name(result));
        fs::create_dir_all(&run_dir)?;

        let result_path = run_dir.join("result.json");
        fs::write(&result_path, serde_json::to_string_pretty(result)?)?;

        let events_path = run_dir.join("events.json");
        fs::write(&events_path, serde_json::to_string_pretty(events)?)?;

        Ok(run_dir)
    }
}

/// Timestamped, collision-free directory name for one run.
fn run_dir_name(result: &RunResult) -> String {
    let stamp = Utc::now().format("%Y%m%d_%H%M%S");
    let short_id: String = result.run_id.0.chars().take(8).collect();
    format!("{stamp}_{short_id}")
}

/// Latest run directory under `output_dir`, if any.
pub fn latest_run_dir(output_dir: &Path) -> Option<PathBuf> {
    let mut dirs: Vec<PathBuf> = fs::read_dir(output_dir)
        .ok()?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_dir())
        .collect();
    dirs.sort();
    dirs.pop()
}

#[cfg(test)]
mod tests {
    use super::*;
    use agent_core::FailureReason;
    use webpilot_core_types::RunId;
    use webpilot_event_bus::EventType;

    fn sample_result() -> RunResult {
        RunResult {
            run_id: RunId::new(),
            success: true,
            goal: "click login".to_string(),
            url: "https://example.com".to_string(),
            steps: 2,
            max_steps: 50,
            duration_seconds: 0.4,
            decisions: vec![],
            reason: None,
            error: None,
            started_at: Utc::now(),
            finished_at: Utc::now(),
        }
    }

    #[test]
    fn persist_writes_result_and_events() {
        let dir = tempfile::tempdir().unwrap();
        let reporter = RunReporter::new(dir.path());
        let events = vec![FlightEvent::new(
            0,
            EventType::Navigation,
            serde_json::json!({"url": "https://example.com"}),
        )];

        let run_dir = reporter.persist(&sample_result(), &events).unwrap();

        assert!(run_dir.join("result.json").exists());
        assert!(run_dir.join("events.json").exists());

        let raw = std::fs::read_to_string(run_dir.join("result.json")).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed["success"], true);
        assert_eq!(parsed["steps"], 2);

        assert_eq!(latest_run_dir(dir.path()).unwrap(), run_dir);
    }

    #[test]
    fn failed_runs_serialize_reason() {
        let dir = tempfile::tempdir().unwrap();
        let reporter = RunReporter::new(dir.path());
        let mut result = sample_result();
        result.success = false;
        result.reason = Some(FailureReason::BlockedState);
        result.error = Some("blocked by: captcha".to_string());

        let run_dir = reporter.persist(&result, &[]).unwrap();
        let raw = std::fs::read_to_string(run_dir.join("result.json")).unwrap();
        assert!(raw.contains("blocked_state"));
        assert!(raw.contains("captcha"));
    }
}
