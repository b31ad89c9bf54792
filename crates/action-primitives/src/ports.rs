//! Port traits for the external sensing and session/control collaborators.
//!
//! The agent core never talks to a browser directly; it talks to these
//! traits. Production backends (CDP, WebDriver) and the scripted training
//! backend all implement the same surface.

use std::time::Duration;

use async_trait::async_trait;
use webpilot_core_types::WorldState;

use crate::errors::ActionError;
use crate::session_state::SessionState;

/// Opaque reference to a live element resolved by the control backend.
///
/// Valid until the page mutates under it; every use may fail with
/// [`ActionError::StaleTarget`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LiveHandle(pub u64);

/// World-state sensing collaborator.
#[async_trait]
pub trait SensePort: Send + Sync {
    /// Build a fresh snapshot of candidate elements plus the blocked flag.
    async fn sense_world_state(&self) -> Result<WorldState, ActionError>;

    /// Wait until the page stops mutating, bounded by `timeout`.
    /// Returns false on timeout; callers treat that as a warning.
    async fn wait_for_stability(&self, timeout: Duration) -> bool;

    /// Attempt one blocking-state dismissal (close button, escape key).
    /// Returns true if the blocker went away.
    async fn dismiss_blocking_state(&self) -> bool;

    /// Full visible text of the page, for verification clauses.
    async fn page_text(&self) -> String;

    /// Capability flag: whether this backend can pierce shadow trees.
    /// The core never branches on it; it only shapes the WorldState.
    fn supports_shadow_traversal(&self) -> bool {
        false
    }
}

/// Session/control collaborator: navigation, element interaction, and the
/// evasive-mode relaunch used for stealth escalation.
#[async_trait]
pub trait ControlPort: Send + Sync {
    async fn navigate(&self, url: &str) -> Result<(), ActionError>;

    /// Tear down and relaunch the underlying session in bot-evasion mode.
    /// The implementation swaps its internal handle; callers keep using
    /// the same port object.
    async fn relaunch_in_evasive_mode(&self) -> Result<(), ActionError>;

    /// Resolve a snapshot element id to a live handle.
    async fn resolve_element(&self, element_id: u32) -> Result<LiveHandle, ActionError>;

    async fn click(&self, handle: LiveHandle) -> Result<(), ActionError>;

    async fn set_value(&self, handle: LiveHandle, text: &str) -> Result<(), ActionError>;

    async fn scroll_into_view(&self, handle: LiveHandle) -> Result<(), ActionError>;

    /// Scroll the page itself, for scroll decisions without a target.
    async fn scroll_by(&self, pixels: i32) -> Result<(), ActionError>;

    /// Low-level click-handler invocation bypassing input simulation.
    /// Last-resort fallback after the retry budget is exhausted.
    async fn force_click(&self, handle: LiveHandle) -> Result<(), ActionError>;

    /// Snapshot cookies/storage for later restore. Optional capability;
    /// backends without it return Ok(None).
    async fn capture_session_state(&self) -> Result<Option<SessionState>, ActionError> {
        Ok(None)
    }

    /// Restore a previously captured session state. Optional capability.
    async fn restore_session_state(&self, _state: &SessionState) -> Result<(), ActionError> {
        Ok(())
    }
}
