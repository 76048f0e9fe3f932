use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

/// Lifecycle status of an agent-driven browser instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BrowserStatus {
    Starting,
    Ready,
    Busy,
    Error,
    Closed,
}

/// One tab of a remote browser instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrowserTab {
    pub id: String,
    pub url: String,
    pub title: String,
}

/// A remote, agent-driven browser tab set, streamed to the UI as screenshots.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserInstance {
    pub id: String,
    pub status: BrowserStatus,
    pub current_url: Option<String>,
    pub current_title: Option<String>,
    #[serde(default)]
    pub tabs: Vec<BrowserTab>,
    pub active_tab: Option<String>,
    pub error_message: Option<String>,
}

/// A frame from the browser-preview streaming channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum PreviewEvent {
    /// Full replacement of the instance set.
    BrowserList { browsers: Vec<BrowserInstance> },
    /// A screenshot plus the page state of one instance. Merged into that
    /// instance; other instances are untouched.
    Screenshot {
        browser_id: String,
        /// Base64-encoded PNG.
        data: String,
        url: Option<String>,
        title: Option<String>,
        tabs: Option<Vec<BrowserTab>>,
        active_tab: Option<String>,
    },
    /// Something changed outside the screenshot path (instance created or
    /// closed); the consumer should re-fetch the full list.
    StateChange,
}

// ---------------------------------------------------------------------------
// PreviewRegistry
// ---------------------------------------------------------------------------

/// The browser instances of one conversation, plus the latest screenshot
/// frame per instance.
#[derive(Debug)]
pub struct PreviewRegistry {
    conversation_id: String,
    instances: Vec<BrowserInstance>,
    frames: HashMap<String, String>,
}

impl PreviewRegistry {
    pub fn new(conversation_id: impl Into<String>) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            instances: Vec::new(),
            frames: HashMap::new(),
        }
    }

    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }

    pub fn instances(&self) -> &[BrowserInstance] {
        &self.instances
    }

    pub fn get(&self, id: &str) -> Option<&BrowserInstance> {
        self.instances.iter().find(|b| b.id == id)
    }

    /// The latest screenshot for an instance, if any frame has arrived.
    pub fn frame(&self, id: &str) -> Option<&str> {
        self.frames.get(id).map(String::as_str)
    }

    /// Replace the whole instance set (from the initial fetch, a
    /// `browser_list` frame, or a `state_change` re-fetch). Frames for
    /// instances that no longer exist are dropped.
    pub fn replace_all(&mut self, browsers: Vec<BrowserInstance>) {
        debug!(
            conversation = %self.conversation_id,
            count = browsers.len(),
            "browser list replaced"
        );
        self.instances = browsers;
        let live: Vec<&str> = self.instances.iter().map(|b| b.id.as_str()).collect();
        self.frames.retain(|id, _| live.contains(&id.as_str()));
    }

    /// Merge a screenshot frame into one instance. Fields present in the
    /// frame overwrite; absent fields and every other instance are left
    /// untouched. Frames for unknown instances are ignored (returns `false`).
    pub fn apply_screenshot(
        &mut self,
        browser_id: &str,
        data: String,
        url: Option<String>,
        title: Option<String>,
        tabs: Option<Vec<BrowserTab>>,
        active_tab: Option<String>,
    ) -> bool {
        let Some(instance) = self.instances.iter_mut().find(|b| b.id == browser_id) else {
            debug!(browser = browser_id, "screenshot for unknown instance ignored");
            return false;
        };
        if let Some(url) = url {
            instance.current_url = Some(url);
        }
        if let Some(title) = title {
            instance.current_title = Some(title);
        }
        if let Some(tabs) = tabs {
            instance.tabs = tabs;
        }
        if let Some(active_tab) = active_tab {
            instance.active_tab = Some(active_tab);
        }
        self.frames.insert(browser_id.to_string(), data);
        true
    }

    /// Conversation ended: every instance is closed and frames are dropped.
    pub fn close_all(&mut self) {
        for instance in &mut self.instances {
            instance.status = BrowserStatus::Closed;
        }
        self.frames.clear();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn instance(id: &str) -> BrowserInstance {
        BrowserInstance {
            id: id.to_string(),
            status: BrowserStatus::Ready,
            current_url: Some(format!("https://example.com/{id}")),
            current_title: Some("Example".into()),
            tabs: Vec::new(),
            active_tab: None,
            error_message: None,
        }
    }

    #[test]
    fn replace_all_swaps_set_and_prunes_frames() {
        let mut reg = PreviewRegistry::new("conv-1");
        reg.replace_all(vec![instance("a"), instance("b")]);
        reg.apply_screenshot("a", "AAAA".into(), None, None, None, None);
        reg.apply_screenshot("b", "BBBB".into(), None, None, None, None);

        reg.replace_all(vec![instance("b")]);
        assert!(reg.get("a").is_none());
        assert!(reg.frame("a").is_none());
        assert_eq!(reg.frame("b"), Some("BBBB"));
    }

    #[test]
    fn screenshot_merges_without_touching_others() {
        let mut reg = PreviewRegistry::new("conv-1");
        reg.replace_all(vec![instance("a"), instance("b")]);

        let applied = reg.apply_screenshot(
            "a",
            "PNGDATA".into(),
            Some("https://new.example".into()),
            Some("New Title".into()),
            None,
            Some("tab-2".into()),
        );
        assert!(applied);

        let a = reg.get("a").unwrap();
        assert_eq!(a.current_url.as_deref(), Some("https://new.example"));
        assert_eq!(a.current_title.as_deref(), Some("New Title"));
        assert_eq!(a.active_tab.as_deref(), Some("tab-2"));
        // Absent fields keep their prior values.
        assert_eq!(a.status, BrowserStatus::Ready);

        let b = reg.get("b").unwrap();
        assert_eq!(b.current_url.as_deref(), Some("https://example.com/b"));
        assert!(reg.frame("b").is_none());
    }

    #[test]
    fn screenshot_for_unknown_instance_is_ignored() {
        let mut reg = PreviewRegistry::new("conv-1");
        reg.replace_all(vec![instance("a")]);

        assert!(!reg.apply_screenshot("ghost", "X".into(), None, None, None, None));
        assert!(reg.frame("ghost").is_none());
    }

    #[test]
    fn newer_frame_replaces_older() {
        let mut reg = PreviewRegistry::new("conv-1");
        reg.replace_all(vec![instance("a")]);

        reg.apply_screenshot("a", "frame1".into(), None, None, None, None);
        reg.apply_screenshot("a", "frame2".into(), None, None, None, None);
        assert_eq!(reg.frame("a"), Some("frame2"));
    }

    #[test]
    fn close_all_marks_closed_and_drops_frames() {
        let mut reg = PreviewRegistry::new("conv-1");
        reg.replace_all(vec![instance("a"), instance("b")]);
        reg.apply_screenshot("a", "X".into(), None, None, None, None);

        reg.close_all();
        assert!(reg
            .instances()
            .iter()
            .all(|b| b.status == BrowserStatus::Closed));
        assert!(reg.frame("a").is_none());
    }

    #[test]
    fn preview_events_parse_from_wire_json() {
        let list: PreviewEvent = serde_json::from_str(
            r#"{"type":"browser_list","browsers":[{"id":"b1","status":"ready","current_url":null,"current_title":null,"active_tab":null,"error_message":null}]}"#,
        )
        .unwrap();
        assert!(matches!(list, PreviewEvent::BrowserList { browsers } if browsers.len() == 1));

        let shot: PreviewEvent = serde_json::from_str(
            r#"{"type":"screenshot","browser_id":"b1","data":"iVBOR","url":"https://x.dev","title":"X","tabs":null,"active_tab":null}"#,
        )
        .unwrap();
        assert!(matches!(shot, PreviewEvent::Screenshot { browser_id, .. } if browser_id == "b1"));

        let change: PreviewEvent = serde_json::from_str(r#"{"type":"state_change"}"#).unwrap();
        assert!(matches!(change, PreviewEvent::StateChange));
    }
}
