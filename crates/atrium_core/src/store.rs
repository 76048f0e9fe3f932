use anyhow::{bail, Context, Result};
use tracing::debug;

use crate::pane::Pane;
use crate::room::Room;
use crate::workspace::{Workspace, WorkspaceConfig};

/// In-memory registry of workspaces and the single source of truth for all
/// entity state.
///
/// Components read snapshots and dispatch the named operations below; nothing
/// mutates an entity through any other path, which is what keeps the
/// activation invariants (no dangling active pane/room/session) enforceable
/// in one place.
#[derive(Debug, Default)]
pub struct WorkspaceStore {
    workspaces: Vec<Workspace>,
    selected_id: Option<String>,
}

impl WorkspaceStore {
    pub fn new() -> Self {
        Self::default()
    }

    // -----------------------------------------------------------------------
    // Workspace registry
    // -----------------------------------------------------------------------

    /// Create a workspace with the default runtime config, a default room,
    /// and a default chat pane, and select it. Returns the workspace id.
    pub fn create_workspace(&mut self, name: &str) -> Result<String> {
        self.create_workspace_with_config(WorkspaceConfig {
            name: name.to_string(),
            color: None,
            runtime: Default::default(),
        })
    }

    /// Create a workspace from an explicit config and select it. Duplicate
    /// names (trimmed, case-insensitive) are rejected.
    pub fn create_workspace_with_config(&mut self, config: WorkspaceConfig) -> Result<String> {
        let name = config.name.trim();
        if name.is_empty() {
            bail!("Workspace name cannot be empty");
        }
        if self
            .workspaces
            .iter()
            .any(|w| w.name.trim().eq_ignore_ascii_case(name))
        {
            bail!("A workspace named {name:?} already exists");
        }
        let workspace = Workspace::with_config(WorkspaceConfig {
            name: name.to_string(),
            ..config
        });
        let id = workspace.id.clone();
        debug!(workspace = %id, %name, "created workspace");
        self.workspaces.push(workspace);
        self.selected_id = Some(id.clone());
        Ok(id)
    }

    /// Delete a workspace. Selection falls to the first remaining workspace,
    /// or `None`. Returns the removed workspace.
    pub fn delete_workspace(&mut self, id: &str) -> Result<Workspace> {
        let idx = self
            .workspaces
            .iter()
            .position(|w| w.id == id)
            .with_context(|| format!("No such workspace: {id}"))?;
        let removed = self.workspaces.remove(idx);
        debug!(workspace = %id, "deleted workspace");
        if self.selected_id.as_deref() == Some(id) {
            self.selected_id = self.workspaces.first().map(|w| w.id.clone());
        }
        Ok(removed)
    }

    /// Focus a workspace. Pure UI change, no backend involvement. Returns
    /// `false` for unknown ids.
    pub fn select_workspace(&mut self, id: &str) -> bool {
        if self.workspaces.iter().any(|w| w.id == id) {
            self.selected_id = Some(id.to_string());
            true
        } else {
            false
        }
    }

    /// Focus a room of the selected workspace. Returns `false` when nothing
    /// is selected or the id is unknown.
    pub fn select_room(&mut self, room_id: &str) -> bool {
        match self.selected_mut_opt() {
            Some(ws) => ws.set_active_room(room_id),
            None => false,
        }
    }

    pub fn workspaces(&self) -> &[Workspace] {
        &self.workspaces
    }

    pub fn get(&self, id: &str) -> Option<&Workspace> {
        self.workspaces.iter().find(|w| w.id == id)
    }

    pub fn get_mut(&mut self, id: &str) -> Result<&mut Workspace> {
        self.workspaces
            .iter_mut()
            .find(|w| w.id == id)
            .with_context(|| format!("No such workspace: {id}"))
    }

    pub fn selected(&self) -> Option<&Workspace> {
        self.selected_id.as_deref().and_then(|id| self.get(id))
    }

    fn selected_mut_opt(&mut self) -> Option<&mut Workspace> {
        let id = self.selected_id.clone()?;
        self.workspaces.iter_mut().find(|w| w.id == id)
    }

    /// Mutable access to the selected workspace, for the runtime layer
    /// (status polls, file-tree loads). UI components stay on the named
    /// operations.
    pub fn selected_mut(&mut self) -> Result<&mut Workspace> {
        self.selected_mut_opt()
            .context("No workspace is selected")
    }

    /// The active room of the selected workspace.
    pub fn current_room(&self) -> Option<&Room> {
        self.selected().map(|ws| ws.active_room())
    }

    fn current_room_mut(&mut self) -> Result<&mut Room> {
        Ok(self.selected_mut()?.active_room_mut())
    }

    /// Find a pane by id across the selected workspace's rooms.
    fn pane_mut(&mut self, pane_id: &str) -> Result<&mut Pane> {
        let ws = self.selected_mut()?;
        ws.rooms
            .iter_mut()
            .find_map(|r| r.pane_mut(pane_id))
            .with_context(|| format!("No such pane: {pane_id}"))
    }

    // -----------------------------------------------------------------------
    // Rooms
    // -----------------------------------------------------------------------

    pub fn create_room(&mut self, name: &str) -> Result<String> {
        Ok(self.selected_mut()?.add_room(name))
    }

    pub fn duplicate_room(&mut self, room_id: &str) -> Result<String> {
        self.selected_mut()?.duplicate_room(room_id)
    }

    pub fn rename_room(&mut self, room_id: &str, name: &str) -> Result<()> {
        self.selected_mut()?.rename_room(room_id, name)
    }

    /// Delete a room of the selected workspace. The workspace's last room
    /// cannot be deleted.
    pub fn delete_room(&mut self, room_id: &str) -> Result<()> {
        self.selected_mut()?.remove_room(room_id)
    }

    // -----------------------------------------------------------------------
    // Panes (addressed within the selected workspace)
    // -----------------------------------------------------------------------

    /// Append a terminal pane to the current room and activate it.
    pub fn open_terminal_tab(&mut self) -> Result<String> {
        Ok(self.current_room_mut()?.open_terminal_pane())
    }

    /// Terminal opened from the chat surface. Same semantics as
    /// [`Self::open_terminal_tab`]; the distinct name mirrors the distinct
    /// entry point.
    pub fn open_chat_terminal(&mut self) -> Result<String> {
        self.open_terminal_tab()
    }

    /// Open an editor pane in the current room.
    pub fn open_editor(&mut self, file_path: &str, content: &str) -> Result<String> {
        Ok(self.current_room_mut()?.open_editor_pane(file_path, content))
    }

    /// Open an additional chat pane in the current room.
    pub fn open_chat_pane(&mut self) -> Result<String> {
        Ok(self.current_room_mut()?.open_chat_pane())
    }

    /// Close a pane in the current room, reassigning activation per the
    /// previous-pane rule.
    pub fn close_pane(&mut self, pane_id: &str) -> Result<()> {
        self.current_room_mut()?.close_pane(pane_id)
    }

    /// Activate a pane of the current room. No-op (`false`) for unknown ids.
    pub fn set_active_pane(&mut self, pane_id: &str) -> Result<bool> {
        Ok(self.current_room_mut()?.set_active_pane(pane_id))
    }

    pub fn close_other_panes(&mut self, keep_id: &str) -> Result<usize> {
        self.current_room_mut()?.close_other_panes(keep_id)
    }

    pub fn close_all_panes(&mut self) -> Result<usize> {
        Ok(self.current_room_mut()?.close_all_panes())
    }

    // -----------------------------------------------------------------------
    // Chat sessions and messages
    // -----------------------------------------------------------------------

    pub fn create_chat_session(&mut self, pane_id: &str) -> Result<String> {
        self.pane_mut(pane_id)?.create_chat_session()
    }

    /// Delete a chat session. The pane's last remaining session cannot be
    /// deleted (enforced here even though the UI hides the affordance).
    pub fn delete_chat_session(&mut self, pane_id: &str, session_id: &str) -> Result<()> {
        self.pane_mut(pane_id)?.delete_chat_session(session_id)
    }

    pub fn select_chat_session(&mut self, pane_id: &str, session_id: &str) -> Result<bool> {
        self.pane_mut(pane_id)?.select_chat_session(session_id)
    }

    /// Append a user message to the pane's active session. Empty or
    /// whitespace-only text is rejected with no mutation.
    pub fn send_chat_message(&mut self, pane_id: &str, text: &str) -> Result<()> {
        self.pane_mut(pane_id)?.send_chat_message(text)
    }

    // -----------------------------------------------------------------------
    // Editor panes
    // -----------------------------------------------------------------------

    pub fn update_editor_content(&mut self, pane_id: &str, content: &str) -> Result<()> {
        self.pane_mut(pane_id)?.update_editor_content(content)
    }

    /// Called by the save round trip on success.
    pub fn mark_editor_saved(&mut self, pane_id: &str) -> Result<()> {
        self.pane_mut(pane_id)?.mark_editor_saved()
    }

    // -----------------------------------------------------------------------
    // Lifecycle transitions (driven by the runtime service)
    // -----------------------------------------------------------------------

    pub fn begin_start(&mut self, id: &str) -> Result<bool> {
        self.get_mut(id)?.begin_start()
    }

    pub fn complete_start(&mut self, id: &str) -> Result<()> {
        self.get_mut(id)?.complete_start()
    }

    pub fn begin_stop(&mut self, id: &str) -> Result<bool> {
        self.get_mut(id)?.begin_stop()
    }

    pub fn complete_stop(&mut self, id: &str) -> Result<()> {
        self.get_mut(id)?.complete_stop()
    }

    pub fn fail(&mut self, id: &str, message: &str) -> Result<()> {
        self.get_mut(id)?.fail(message)
    }

    pub fn reset_error(&mut self, id: &str) -> Result<()> {
        self.get_mut(id)?.reset_error()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
