//! Session-state snapshots: cookies and storage captured once, restored
//! later to skip login flows on repeated runs.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionStateError {
    #[error("failed to access session state file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse session state: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("session state '{0}' not found")]
    NotFound(String),
}

/// Saved browser session state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionState {
    #[serde(default)]
    pub cookies: Vec<serde_json::Value>,
    #[serde(default)]
    pub local_storage: HashMap<String, String>,
    #[serde(default)]
    pub session_storage: HashMap<String, String>,
    pub url: String,
}

impl SessionState {
    pub fn at_url(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }
}

/// Directory-backed store of named session states, one JSON file each.
#[derive(Debug, Clone)]
pub struct SessionStateStore {
    dir: PathBuf,
}

impl SessionStateStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.json"))
    }

    pub fn save(&self, name: &str, state: &SessionState) -> Result<PathBuf, SessionStateError> {
        fs::create_dir_all(&self.dir)?;
        let path = self.path_for(name);
        let raw = serde_json::to_string_pretty(state)?;
        fs::write(&path, raw)?;
        Ok(path)
    }

    pub fn load(&self, name: &str) -> Result<SessionState, SessionStateError> {
        let path = self.path_for(name);
        if !path.exists() {
            return Err(SessionStateError::NotFound(name.to_string()));
        }
        let raw = fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn list(&self) -> Result<Vec<String>, SessionStateError> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().map(|e| e == "json").unwrap_or(false) {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    names.push(stem.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn save_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStateStore::new(dir.path());
        let mut state = SessionState::at_url("https://app.example/dashboard");
        state
            .local_storage
            .insert("token".to_string(), "abc123".to_string());

        store.save("logged_in", &state).unwrap();
        let loaded = store.load("logged_in").unwrap();

        assert_eq!(loaded.url, "https://app.example/dashboard");
        assert_eq!(loaded.local_storage.get("token").unwrap(), "abc123");
    }

    #[test]
    fn missing_state_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStateStore::new(dir.path());
        assert!(matches!(
            store.load("nope"),
            Err(SessionStateError::NotFound(_))
        ));
    }

    #[test]
    fn list_returns_sorted_names() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStateStore::new(dir.path());
        store.save("b", &SessionState::default()).unwrap();
        store.save("a", &SessionState::default()).unwrap();
        assert_eq!(store.list().unwrap(), vec!["a", "b"]);
    }
}
