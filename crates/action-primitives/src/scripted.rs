//! Scripted driver: a hermetic sensing/control backend.
//!
//! Training-mode replacement for a real browser. A fixture describes an
//! ordered sequence of page frames plus per-element behaviors (resolution
//! failures, occlusions, frame advances), which is enough to exercise the
//! whole Sense-Decide-Act-Verify loop in tests, demos, and CI without a
//! driver binary.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use webpilot_core_types::{BoundingBox, CandidateElement, WorldState};

use crate::errors::ActionError;
use crate::ports::{ControlPort, LiveHandle, SensePort};
use crate::session_state::SessionState;

fn default_true() -> bool {
    true
}

/// One element of a scripted frame, with optional fault injection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptedElement {
    pub tag: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub attributes: HashMap<String, String>,
    /// Selector path; defaults to `tag:index` so identical layouts share
    /// selectors across frames.
    #[serde(default)]
    pub selector: Option<String>,
    #[serde(default = "default_true")]
    pub interactive: bool,
    #[serde(default = "default_true")]
    pub visible: bool,
    #[serde(default)]
    pub in_shadow_tree: bool,
    /// Resolution attempts that fail stale before one succeeds.
    #[serde(default)]
    pub fail_stale_times: u32,
    /// Click attempts rejected as occluded before one lands.
    #[serde(default)]
    pub occluded_times: u32,
    /// Clicking this element moves the script to the next frame.
    #[serde(default)]
    pub advance_on_click: bool,
    /// Text typed into this element becomes part of the page text.
    #[serde(default)]
    pub record_typed_text: bool,
}

impl ScriptedElement {
    pub fn new(tag: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            text: text.into(),
            attributes: HashMap::new(),
            selector: None,
            interactive: true,
            visible: true,
            in_shadow_tree: false,
            fail_stale_times: 0,
            occluded_times: 0,
            advance_on_click: false,
            record_typed_text: false,
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn stale_times(mut self, count: u32) -> Self {
        self.fail_stale_times = count;
        self
    }

    pub fn advancing(mut self) -> Self {
        self.advance_on_click = true;
        self
    }

    pub fn recording_typed_text(mut self) -> Self {
        self.record_typed_text = true;
        self
    }
}

/// One page state in the script.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScriptedFrame {
    #[serde(default)]
    pub elements: Vec<ScriptedElement>,
    #[serde(default)]
    pub page_text: String,
    #[serde(default)]
    pub blocked: bool,
    #[serde(default)]
    pub block_reason: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    /// Dismissal attempts needed before the blocker clears; None means the
    /// blocker never clears through dismissal.
    #[serde(default)]
    pub dismiss_after: Option<u32>,
    /// Blocker clears after an evasive-mode relaunch.
    #[serde(default)]
    pub unblock_on_evasive: bool,
    /// Stability waits report timeout while this frame is current.
    #[serde(default)]
    pub unstable: bool,
}

impl ScriptedFrame {
    pub fn new(elements: Vec<ScriptedElement>, page_text: impl Into<String>) -> Self {
        Self {
            elements,
            page_text: page_text.into(),
            ..Self::default()
        }
    }

    pub fn blocked(reason: impl Into<String>) -> Self {
        Self {
            blocked: true,
            block_reason: Some(reason.into()),
            ..Self::default()
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn dismissable_after(mut self, attempts: u32) -> Self {
        self.dismiss_after = Some(attempts);
        self
    }
}

/// Complete script for one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptedFixture {
    #[serde(default)]
    pub start_url: Option<String>,
    pub frames: Vec<ScriptedFrame>,
}

impl ScriptedFixture {
    pub fn new(frames: Vec<ScriptedFrame>) -> Self {
        Self {
            start_url: None,
            frames,
        }
    }

    pub fn from_yaml(raw: &str) -> Result<Self, ActionError> {
        serde_yaml::from_str(raw)
            .map_err(|err| ActionError::Internal(format!("invalid fixture: {err}")))
    }

    pub fn from_path(path: &Path) -> Result<Self, ActionError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|err| ActionError::Internal(format!("cannot read fixture: {err}")))?;
        Self::from_yaml(&raw)
    }
}

#[derive(Default)]
struct DriverState {
    frame_index: usize,
    stale_remaining: HashMap<(usize, u32), u32>,
    occluded_remaining: HashMap<(usize, u32), u32>,
    dismissals: HashMap<usize, u32>,
    typed_page_text: Vec<String>,
    typed: Vec<(u32, String)>,
    clicks: Vec<u32>,
    forced_clicks: Vec<u32>,
    navigations: Vec<String>,
    resolutions: HashMap<u32, u32>,
    restored_sessions: Vec<SessionState>,
    evasive: bool,
    scrolled_px: i64,
}

/// The scripted backend. Implements both ports over the fixture.
pub struct ScriptedDriver {
    fixture: ScriptedFixture,
    state: Mutex<DriverState>,
}

impl ScriptedDriver {
    pub fn new(mut fixture: ScriptedFixture) -> Self {
        // A script always has at least one frame to sense.
        if fixture.frames.is_empty() {
            fixture.frames.push(ScriptedFrame::default());
        }
        let mut state = DriverState::default();
        for (frame_idx, frame) in fixture.frames.iter().enumerate() {
            for (elem_idx, elem) in frame.elements.iter().enumerate() {
                let key = (frame_idx, elem_idx as u32);
                if elem.fail_stale_times > 0 {
                    state.stale_remaining.insert(key, elem.fail_stale_times);
                }
                if elem.occluded_times > 0 {
                    state.occluded_remaining.insert(key, elem.occluded_times);
                }
            }
        }
        Self {
            fixture,
            state: Mutex::new(state),
        }
    }

    /// Single static frame, the simplest useful script.
    pub fn single_frame(frame: ScriptedFrame) -> Self {
        Self::new(ScriptedFixture::new(vec![frame]))
    }

    fn current_frame(&self) -> &ScriptedFrame {
        let index = self.state.lock().frame_index.min(self.fixture.frames.len() - 1);
        &self.fixture.frames[index]
    }

    fn frame_cleared(&self, frame_index: usize) -> bool {
        let frame = &self.fixture.frames[frame_index];
        if !frame.blocked {
            return true;
        }
        let state = self.state.lock();
        if frame.unblock_on_evasive && state.evasive {
            return true;
        }
        match frame.dismiss_after {
            Some(needed) => state.dismissals.get(&frame_index).copied().unwrap_or(0) >= needed,
            None => false,
        }
    }

    fn element(&self, frame_index: usize, id: u32) -> Option<&ScriptedElement> {
        self.fixture.frames[frame_index].elements.get(id as usize)
    }

    fn selector_for(&self, elem: &ScriptedElement, id: u32) -> String {
        elem.selector
            .clone()
            .unwrap_or_else(|| format!("{}:{}", elem.tag, id))
    }

    fn advance_frame(&self) {
        let mut state = self.state.lock();
        if state.frame_index + 1 < self.fixture.frames.len() {
            state.frame_index += 1;
        }
    }

    // Introspection for tests and demo reporting.

    pub fn frame_position(&self) -> usize {
        self.state.lock().frame_index
    }

    pub fn resolution_count(&self, element_id: u32) -> u32 {
        self.state
            .lock()
            .resolutions
            .get(&element_id)
            .copied()
            .unwrap_or(0)
    }

    pub fn clicked_elements(&self) -> Vec<u32> {
        self.state.lock().clicks.clone()
    }

    pub fn typed_values(&self) -> Vec<(u32, String)> {
        self.state.lock().typed.clone()
    }

    pub fn navigations(&self) -> Vec<String> {
        self.state.lock().navigations.clone()
    }

    pub fn dismiss_attempts(&self, frame_index: usize) -> u32 {
        self.state
            .lock()
            .dismissals
            .get(&frame_index)
            .copied()
            .unwrap_or(0)
    }

    pub fn is_evasive(&self) -> bool {
        self.state.lock().evasive
    }

    pub fn restored_sessions(&self) -> Vec<SessionState> {
        self.state.lock().restored_sessions.clone()
    }

    pub fn scrolled_pixels(&self) -> i64 {
        self.state.lock().scrolled_px
    }
}

#[async_trait]
impl SensePort for ScriptedDriver {
    async fn sense_world_state(&self) -> Result<WorldState, ActionError> {
        let frame_index = self.state.lock().frame_index;
        let frame = &self.fixture.frames[frame_index];
        let cleared = self.frame_cleared(frame_index);

        let elements = frame
            .elements
            .iter()
            .enumerate()
            .map(|(idx, elem)| {
                let id = idx as u32;
                CandidateElement {
                    id,
                    tag: elem.tag.clone(),
                    visible_text: elem.text.clone(),
                    attributes: elem.attributes.clone(),
                    selector_path: self.selector_for(elem, id),
                    is_interactive: elem.interactive,
                    is_visible: elem.visible,
                    in_shadow_tree: elem.in_shadow_tree,
                    shadow_host_id: None,
                    bounding_box: if elem.visible {
                        BoundingBox::new(0.0, 24.0 * idx as f64, 200.0, 20.0)
                    } else {
                        BoundingBox::default()
                    },
                }
            })
            .collect();

        let mut world = WorldState::new(elements);
        if !cleared {
            world.blocked = true;
            world.block_reason = frame.block_reason.clone();
        }
        world.url = frame.url.clone().or_else(|| self.fixture.start_url.clone());
        Ok(world)
    }

    async fn wait_for_stability(&self, _timeout: Duration) -> bool {
        !self.current_frame().unstable
    }

    async fn dismiss_blocking_state(&self) -> bool {
        let frame_index = self.state.lock().frame_index;
        {
            let mut state = self.state.lock();
            *state.dismissals.entry(frame_index).or_insert(0) += 1;
        }
        self.frame_cleared(frame_index)
    }

    async fn page_text(&self) -> String {
        let frame = self.current_frame();
        let typed = self.state.lock().typed_page_text.join("\n");
        if typed.is_empty() {
            frame.page_text.clone()
        } else {
            format!("{}\n{}", frame.page_text, typed)
        }
    }

    fn supports_shadow_traversal(&self) -> bool {
        true
    }
}

#[async_trait]
impl ControlPort for ScriptedDriver {
    async fn navigate(&self, url: &str) -> Result<(), ActionError> {
        self.state.lock().navigations.push(url.to_string());
        Ok(())
    }

    async fn relaunch_in_evasive_mode(&self) -> Result<(), ActionError> {
        self.state.lock().evasive = true;
        Ok(())
    }

    async fn resolve_element(&self, element_id: u32) -> Result<LiveHandle, ActionError> {
        let frame_index = self.state.lock().frame_index;
        let Some(_elem) = self.element(frame_index, element_id) else {
            return Err(ActionError::StaleTarget(format!(
                "element {element_id} not present in frame {frame_index}"
            )));
        };

        let mut state = self.state.lock();
        *state.resolutions.entry(element_id).or_insert(0) += 1;
        let key = (frame_index, element_id);
        if let Some(remaining) = state.stale_remaining.get_mut(&key) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(ActionError::StaleTarget(format!(
                    "element {element_id} detached"
                )));
            }
        }
        Ok(LiveHandle(((frame_index as u64) << 32) | u64::from(element_id)))
    }

    async fn click(&self, handle: LiveHandle) -> Result<(), ActionError> {
        let (frame_index, element_id) = decode(handle);
        if frame_index != self.state.lock().frame_index {
            return Err(ActionError::StaleTarget(format!(
                "handle from frame {frame_index} used after frame change"
            )));
        }
        let key = (frame_index, element_id);
        {
            let mut state = self.state.lock();
            if let Some(remaining) = state.occluded_remaining.get_mut(&key) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(ActionError::Occluded(format!(
                        "element {element_id} covered"
                    )));
                }
            }
            state.clicks.push(element_id);
        }
        let advance = self
            .element(frame_index, element_id)
            .map(|e| e.advance_on_click)
            .unwrap_or(false);
        if advance {
            self.advance_frame();
        }
        Ok(())
    }

    async fn set_value(&self, handle: LiveHandle, text: &str) -> Result<(), ActionError> {
        let (frame_index, element_id) = decode(handle);
        let record = self
            .element(frame_index, element_id)
            .ok_or_else(|| ActionError::StaleTarget(format!("element {element_id} gone")))?
            .record_typed_text;
        let mut state = self.state.lock();
        state.typed.push((element_id, text.to_string()));
        if record {
            state.typed_page_text.push(text.to_string());
        }
        Ok(())
    }

    async fn scroll_into_view(&self, _handle: LiveHandle) -> Result<(), ActionError> {
        Ok(())
    }

    async fn scroll_by(&self, pixels: i32) -> Result<(), ActionError> {
        self.state.lock().scrolled_px += i64::from(pixels);
        Ok(())
    }

    async fn force_click(&self, handle: LiveHandle) -> Result<(), ActionError> {
        let (frame_index, element_id) = decode(handle);
        self.state.lock().forced_clicks.push(element_id);
        let advance = self
            .element(frame_index, element_id)
            .map(|e| e.advance_on_click)
            .unwrap_or(false);
        if advance {
            self.advance_frame();
        }
        Ok(())
    }

    async fn capture_session_state(&self) -> Result<Option<SessionState>, ActionError> {
        let url = self
            .current_frame()
            .url
            .clone()
            .or_else(|| self.fixture.start_url.clone())
            .unwrap_or_default();
        Ok(Some(SessionState::at_url(url)))
    }

    async fn restore_session_state(&self, state: &SessionState) -> Result<(), ActionError> {
        self.state.lock().restored_sessions.push(state.clone());
        Ok(())
    }
}

fn decode(handle: LiveHandle) -> (usize, u32) {
    ((handle.0 >> 32) as usize, (handle.0 & 0xffff_ffff) as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn login_fixture() -> ScriptedFixture {
        ScriptedFixture::new(vec![
            ScriptedFrame::new(
                vec![
                    ScriptedElement::new("input", "").recording_typed_text(),
                    ScriptedElement::new("button", "Log in").advancing(),
                ],
                "Welcome back",
            ),
            ScriptedFrame::new(vec![ScriptedElement::new("a", "Dashboard")], "Dashboard"),
        ])
    }

    #[tokio::test]
    async fn sense_builds_world_from_current_frame() {
        let driver = ScriptedDriver::new(login_fixture());
        let world = driver.sense_world_state().await.unwrap();
        assert_eq!(world.elements.len(), 2);
        assert!(!world.blocked);
        assert_eq!(world.elements[1].visible_text, "Log in");
        assert!(world.elements.iter().all(|e| e.geometry_consistent()));
    }

    #[tokio::test]
    async fn click_advances_frame_when_configured() {
        let driver = ScriptedDriver::new(login_fixture());
        let handle = driver.resolve_element(1).await.unwrap();
        driver.click(handle).await.unwrap();
        assert_eq!(driver.frame_position(), 1);
        let world = driver.sense_world_state().await.unwrap();
        assert_eq!(world.elements[0].visible_text, "Dashboard");
    }

    #[tokio::test]
    async fn stale_handle_rejected_after_frame_change() {
        let driver = ScriptedDriver::new(login_fixture());
        let stale = driver.resolve_element(0).await.unwrap();
        let button = driver.resolve_element(1).await.unwrap();
        driver.click(button).await.unwrap();
        let err = driver.click(stale).await.unwrap_err();
        assert!(matches!(err, ActionError::StaleTarget(_)));
    }

    #[tokio::test]
    async fn typed_text_lands_in_page_text() {
        let driver = ScriptedDriver::new(login_fixture());
        let input = driver.resolve_element(0).await.unwrap();
        driver.set_value(input, "alice@example.com").await.unwrap();
        let text = driver.page_text().await;
        assert!(text.contains("alice@example.com"));
    }

    #[tokio::test]
    async fn stale_injection_counts_down() {
        let fixture = ScriptedFixture::new(vec![ScriptedFrame::new(
            vec![ScriptedElement::new("button", "Go").stale_times(2)],
            "",
        )]);
        let driver = ScriptedDriver::new(fixture);
        assert!(driver.resolve_element(0).await.is_err());
        assert!(driver.resolve_element(0).await.is_err());
        assert!(driver.resolve_element(0).await.is_ok());
        assert_eq!(driver.resolution_count(0), 3);
    }

    #[tokio::test]
    async fn blocked_frame_clears_after_dismissals() {
        let fixture =
            ScriptedFixture::new(vec![ScriptedFrame::blocked("newsletter modal").dismissable_after(2)]);
        let driver = ScriptedDriver::new(fixture);
        assert!(driver.sense_world_state().await.unwrap().blocked);
        assert!(!driver.dismiss_blocking_state().await);
        assert!(driver.dismiss_blocking_state().await);
        assert!(!driver.sense_world_state().await.unwrap().blocked);
    }

    #[tokio::test]
    async fn evasive_relaunch_clears_challenge_frames() {
        let mut frame = ScriptedFrame::blocked("captcha challenge");
        frame.unblock_on_evasive = true;
        let driver = ScriptedDriver::single_frame(frame);
        assert!(driver.sense_world_state().await.unwrap().blocked);
        driver.relaunch_in_evasive_mode().await.unwrap();
        assert!(driver.is_evasive());
        assert!(!driver.sense_world_state().await.unwrap().blocked);
    }

    #[test]
    fn fixture_yaml_round_trip() {
        let yaml = r#"
start_url: "https://shop.example"
frames:
  - page_text: "Catalog"
    elements:
      - tag: button
        text: "Add to cart"
        advance_on_click: true
  - page_text: "Cart: 1 item"
"#;
        let fixture = ScriptedFixture::from_yaml(yaml).unwrap();
        assert_eq!(fixture.frames.len(), 2);
        assert_eq!(fixture.start_url.as_deref(), Some("https://shop.example"));
        assert!(fixture.frames[0].elements[0].advance_on_click);
    }
}
