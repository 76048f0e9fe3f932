use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tracing::debug;

use atrium_core::chat::{ToolEndpoint, ToolStatus};

// ---------------------------------------------------------------------------
// TermKey
// ---------------------------------------------------------------------------

/// Identity of a terminal connection: one per `(workspace, pane)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TermKey {
    pub workspace_id: String,
    pub pane_id: String,
}

impl TermKey {
    pub fn new(workspace_id: impl Into<String>, pane_id: impl Into<String>) -> Self {
        Self {
            workspace_id: workspace_id.into(),
            pane_id: pane_id.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// TerminalLink
// ---------------------------------------------------------------------------

/// A persistent terminal connection handle.
#[derive(Debug, Clone)]
pub struct TerminalLink {
    pub key: TermKey,
    pub endpoint: ToolEndpoint,
    pub status: ToolStatus,
    pub connected_at: DateTime<Utc>,
    pub last_used: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// TerminalRegistry
// ---------------------------------------------------------------------------

/// Registry of live terminal connections, keyed by `(workspace, pane)`.
///
/// Each terminal-backed pane owns exactly one connection. Acquiring an
/// existing key returns the live link — hiding a pane and showing it again
/// (or re-rendering it) never reconnects. Only an explicit
/// [`Self::release`] drops the connection.
#[derive(Debug, Default)]
pub struct TerminalRegistry {
    links: HashMap<TermKey, TerminalLink>,
}

impl TerminalRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the connection for this key, creating it on first acquisition.
    pub fn acquire(&mut self, key: TermKey, endpoint: ToolEndpoint) -> &TerminalLink {
        let now = Utc::now();
        self.links
            .entry(key.clone())
            .and_modify(|link| {
                debug!(workspace = %key.workspace_id, pane = %key.pane_id, "reusing terminal connection");
                link.last_used = now;
            })
            .or_insert_with(|| {
                debug!(workspace = %key.workspace_id, pane = %key.pane_id, "opening terminal connection");
                TerminalLink {
                    key: key.clone(),
                    endpoint,
                    status: ToolStatus::Running,
                    connected_at: now,
                    last_used: now,
                }
            })
    }

    pub fn get(&self, key: &TermKey) -> Option<&TerminalLink> {
        self.links.get(key)
    }

    /// Record activity on a connection. Returns `false` for unknown keys.
    pub fn touch(&mut self, key: &TermKey) -> bool {
        match self.links.get_mut(key) {
            Some(link) => {
                link.last_used = Utc::now();
                true
            }
            None => false,
        }
    }

    /// Mark a connection broken. Returns `false` for unknown keys.
    pub fn mark_error(&mut self, key: &TermKey) -> bool {
        match self.links.get_mut(key) {
            Some(link) => {
                link.status = ToolStatus::Error;
                true
            }
            None => false,
        }
    }

    /// Explicitly disconnect. Returns the dropped link, if any.
    pub fn release(&mut self, key: &TermKey) -> Option<TerminalLink> {
        let removed = self.links.remove(key);
        if removed.is_some() {
            debug!(workspace = %key.workspace_id, pane = %key.pane_id, "released terminal connection");
        }
        removed
    }

    /// Drop every errored connection. Returns how many were pruned.
    pub fn prune_errored(&mut self) -> usize {
        let before = self.links.len();
        self.links.retain(|_, link| link.status != ToolStatus::Error);
        before - self.links.len()
    }

    pub fn active_count(&self) -> usize {
        self.links
            .values()
            .filter(|l| l.status == ToolStatus::Running)
            .count()
    }

    pub fn total_count(&self) -> usize {
        self.links.len()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
