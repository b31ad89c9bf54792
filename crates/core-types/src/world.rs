//! World-state snapshot types supplied by the sensing collaborator.

use std::collections::HashMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Viewport-relative geometry of a candidate element.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl BoundingBox {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// A zero-area box, the marker for elements that are not laid out.
    pub fn is_empty(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }
}

/// One perceivable, potentially interactive page element.
///
/// Element ids are stable only within the snapshot that produced them;
/// a fresh sensing call invalidates every id from the previous snapshot.
/// Cross-snapshot identity, where needed, goes through `selector_path`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateElement {
    /// Snapshot-scoped identifier.
    pub id: u32,
    /// Lower-case HTML tag name.
    pub tag: String,
    /// Visible text content, whitespace-normalized.
    pub visible_text: String,
    /// Raw attributes as reported by the sensing layer.
    #[serde(default)]
    pub attributes: HashMap<String, String>,
    /// CSS-ish path usable to re-locate the element across snapshots.
    pub selector_path: String,
    pub is_interactive: bool,
    pub is_visible: bool,
    /// True when the element lives inside a shadow tree.
    #[serde(default)]
    pub in_shadow_tree: bool,
    /// Snapshot id of the shadow host, when `in_shadow_tree` is set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shadow_host_id: Option<u32>,
    #[serde(default)]
    pub bounding_box: BoundingBox,
}

impl CandidateElement {
    /// Attribute lookup, empty string when absent.
    pub fn attribute(&self, key: &str) -> &str {
        self.attributes.get(key).map(String::as_str).unwrap_or("")
    }

    /// Visible implies laid out; a visible element with an empty box is a
    /// sensing bug the core refuses to act on.
    pub fn geometry_consistent(&self) -> bool {
        !self.is_visible || !self.bounding_box.is_empty()
    }
}

impl std::fmt::Display for CandidateElement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let preview: String = self.visible_text.chars().take(40).collect();
        write!(f, "[{}] <{}> {:?}", self.id, self.tag, preview)
    }
}

/// Immutable snapshot of candidate elements plus the blocked-state signal,
/// for one point in time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorldState {
    pub elements: Vec<CandidateElement>,
    pub blocked: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub captured_at: DateTime<Utc>,
}

impl WorldState {
    pub fn new(elements: Vec<CandidateElement>) -> Self {
        Self {
            elements,
            blocked: false,
            block_reason: None,
            url: None,
            captured_at: Utc::now(),
        }
    }

    pub fn blocked(reason: impl Into<String>) -> Self {
        Self {
            elements: Vec::new(),
            blocked: true,
            block_reason: Some(reason.into()),
            url: None,
            captured_at: Utc::now(),
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn element(&self, id: u32) -> Option<&CandidateElement> {
        self.elements.iter().find(|e| e.id == id)
    }

    /// Elements eligible for interaction scoring.
    pub fn interactive(&self) -> impl Iterator<Item = &CandidateElement> {
        self.elements
            .iter()
            .filter(|e| e.is_visible && e.is_interactive)
    }

    /// Cheap fingerprint used for before/after change detection.
    pub fn digest(&self, page_text: &str) -> PageDigest {
        let mut hasher = DefaultHasher::new();
        page_text.hash(&mut hasher);
        PageDigest {
            element_count: self.elements.len(),
            url: self.url.clone(),
            text_hash: hasher.finish(),
        }
    }
}

/// Measurable-change fingerprint of a page: element count, URL, and a hash
/// of the visible text. Two equal digests mean "nothing observable changed".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageDigest {
    pub element_count: usize,
    pub url: Option<String>,
    pub text_hash: u64,
}
