use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::pane::{Pane, ToolKind};

/// A named collection of panes within a workspace, with at most one pane
/// active at a time.
///
/// Invariant: `active_pane_id` is `None` or the id of a pane currently in
/// `panes` — never a reference to a closed pane.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    pub id: String,
    pub name: String,
    pub panes: Vec<Pane>,
    pub active_pane_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Room {
    /// Create an empty room.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            panes: Vec::new(),
            active_pane_id: None,
            created_at: Utc::now(),
        }
    }

    pub fn pane(&self, id: &str) -> Option<&Pane> {
        self.panes.iter().find(|p| p.id == id)
    }

    pub fn pane_mut(&mut self, id: &str) -> Option<&mut Pane> {
        self.panes.iter_mut().find(|p| p.id == id)
    }

    pub fn active_pane(&self) -> Option<&Pane> {
        self.active_pane_id
            .as_deref()
            .and_then(|id| self.pane(id))
    }

    /// Append a pane and make it active. Returns the pane id.
    pub fn add_pane(&mut self, pane: Pane) -> String {
        let id = pane.id.clone();
        debug!(room = %self.id, pane = %id, title = %pane.title, "opened pane");
        self.panes.push(pane);
        self.active_pane_id = Some(id.clone());
        id
    }

    /// Open a chat pane (one fresh session) and activate it.
    pub fn open_chat_pane(&mut self) -> String {
        self.add_pane(Pane::chat())
    }

    /// Open an editor pane for a file and activate it.
    pub fn open_editor_pane(
        &mut self,
        file_path: impl Into<String>,
        content: impl Into<String>,
    ) -> String {
        self.add_pane(Pane::editor(file_path, content))
    }

    /// Open a terminal pane titled `"Terminal {n}"` and activate it. The
    /// number is one more than the count of existing terminal panes;
    /// display-only, never used to classify the pane.
    pub fn open_terminal_pane(&mut self) -> String {
        let n = self
            .panes
            .iter()
            .filter(|p| p.tool_kind() == Some(ToolKind::Terminal))
            .count()
            + 1;
        self.add_pane(Pane::tool(ToolKind::Terminal, format!("Terminal {n}")))
    }

    /// Make a pane active. A no-op returning `false` when the id is not in
    /// the current panes.
    pub fn set_active_pane(&mut self, id: &str) -> bool {
        if self.panes.iter().any(|p| p.id == id) {
            self.active_pane_id = Some(id.to_string());
            true
        } else {
            false
        }
    }

    /// Close a pane. If it was active, activation falls to the previous pane
    /// in order (the new occupant of its slot when it was first), or `None`
    /// when the room empties.
    pub fn close_pane(&mut self, id: &str) -> Result<()> {
        let idx = self
            .panes
            .iter()
            .position(|p| p.id == id)
            .with_context(|| format!("No such pane: {id}"))?;
        let was_active = self.active_pane_id.as_deref() == Some(id);
        self.panes.remove(idx);
        debug!(room = %self.id, pane = %id, "closed pane");

        if was_active {
            self.active_pane_id = if self.panes.is_empty() {
                None
            } else {
                let fallback = idx.saturating_sub(1).min(self.panes.len() - 1);
                Some(self.panes[fallback].id.clone())
            };
        }
        Ok(())
    }

    /// Close every closable pane except the given one. Chat and terminal
    /// panes are skipped. Returns the number closed.
    pub fn close_other_panes(&mut self, keep_id: &str) -> Result<usize> {
        if !self.panes.iter().any(|p| p.id == keep_id) {
            anyhow::bail!("No such pane: {keep_id}");
        }
        let before = self.panes.len();
        self.panes
            .retain(|p| p.id == keep_id || p.survives_bulk_close());
        self.fix_active_after_bulk(Some(keep_id));
        Ok(before - self.panes.len())
    }

    /// Close every closable pane. Chat and terminal panes are skipped.
    /// Returns the number closed.
    pub fn close_all_panes(&mut self) -> usize {
        let before = self.panes.len();
        self.panes.retain(|p| p.survives_bulk_close());
        self.fix_active_after_bulk(None);
        before - self.panes.len()
    }

    /// Re-derive activation after a bulk close: keep the current pane if it
    /// survived, otherwise the preferred pane, otherwise the first survivor.
    fn fix_active_after_bulk(&mut self, preferred: Option<&str>) {
        let current_survives = self
            .active_pane_id
            .as_deref()
            .is_some_and(|id| self.panes.iter().any(|p| p.id == id));
        if current_survives {
            return;
        }
        self.active_pane_id = preferred
            .filter(|id| self.panes.iter().any(|p| p.id == *id))
            .map(str::to_string)
            .or_else(|| self.panes.first().map(|p| p.id.clone()));
    }

    pub fn rename(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    /// Deep-copy this room with fresh ids. The active-pane reference is
    /// remapped by position.
    pub fn duplicated(&self) -> Self {
        let active_pos = self
            .active_pane_id
            .as_deref()
            .and_then(|id| self.panes.iter().position(|p| p.id == id));
        let panes: Vec<Pane> = self.panes.iter().map(Pane::duplicated).collect();
        let active_pane_id = active_pos.map(|i| panes[i].id.clone());
        Self {
            id: Uuid::new_v4().to_string(),
            name: format!("{} copy", self.name),
            panes,
            active_pane_id,
            created_at: Utc::now(),
        }
    }

    /// Check the activation invariant. Used by tests and debug assertions.
    pub fn active_pane_is_consistent(&self) -> bool {
        match self.active_pane_id.as_deref() {
            None => true,
            Some(id) => self.panes.iter().any(|p| p.id == id),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
