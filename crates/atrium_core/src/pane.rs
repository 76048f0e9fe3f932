use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::chat::{ChatSession, MessageRole, ToolEndpoint, ToolStatus};

// ---------------------------------------------------------------------------
// Kind tags
// ---------------------------------------------------------------------------

/// Coarse pane discriminator, for consumers that only branch on the family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaneKind {
    Chat,
    Editor,
    Tool,
}

/// What a tool pane fronts. This is the explicit tag that rendering and
/// bulk-close decisions key on; titles are display-only and may be anything
/// (a pane renamed "Terminal Notes" stays whatever kind it was created as).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolKind {
    Terminal,
    Browser,
    Job,
    Other,
}

// ---------------------------------------------------------------------------
// Pane content
// ---------------------------------------------------------------------------

/// Kind-specific pane state. Every consumer matches exhaustively on the tag.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum PaneContent {
    /// A chat surface. Holds at least one session at all times.
    Chat {
        sessions: Vec<ChatSession>,
        active_session_id: String,
    },
    /// A file editor. `dirty` is set on every content update, cleared only by
    /// a successful save.
    Editor {
        file_path: String,
        content: String,
        last_saved: Option<DateTime<Utc>>,
        dirty: bool,
    },
    /// A tool surface (terminal, browser preview, job console).
    Tool {
        tool: ToolKind,
        summary: Option<String>,
        endpoint: Option<ToolEndpoint>,
        status: ToolStatus,
    },
}

/// One visible unit of work surface within a room.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pane {
    pub id: String,
    pub title: String,
    pub content: PaneContent,
}

impl Pane {
    /// Create a chat pane with one fresh session.
    pub fn chat() -> Self {
        let session = ChatSession::new();
        let active_session_id = session.id.clone();
        Self {
            id: Uuid::new_v4().to_string(),
            title: "Chat".to_string(),
            content: PaneContent::Chat {
                sessions: vec![session],
                active_session_id,
            },
        }
    }

    /// Create an editor pane for a file. Title is the file name portion.
    pub fn editor(file_path: impl Into<String>, content: impl Into<String>) -> Self {
        let file_path = file_path.into();
        let title = file_path
            .rsplit('/')
            .next()
            .unwrap_or(&file_path)
            .to_string();
        let content = content.into();
        Self {
            id: Uuid::new_v4().to_string(),
            title,
            content: PaneContent::Editor {
                file_path,
                content,
                last_saved: None,
                dirty: false,
            },
        }
    }

    /// Create a tool pane.
    pub fn tool(kind: ToolKind, title: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            title: title.into(),
            content: PaneContent::Tool {
                tool: kind,
                summary: None,
                endpoint: None,
                status: ToolStatus::Running,
            },
        }
    }

    pub fn kind(&self) -> PaneKind {
        match &self.content {
            PaneContent::Chat { .. } => PaneKind::Chat,
            PaneContent::Editor { .. } => PaneKind::Editor,
            PaneContent::Tool { .. } => PaneKind::Tool,
        }
    }

    pub fn is_chat(&self) -> bool {
        self.kind() == PaneKind::Chat
    }

    /// The tool subkind, for tool panes only.
    pub fn tool_kind(&self) -> Option<ToolKind> {
        match &self.content {
            PaneContent::Tool { tool, .. } => Some(*tool),
            PaneContent::Chat { .. } | PaneContent::Editor { .. } => None,
        }
    }

    /// Whether a bulk "close others"/"close all" skips this pane. Chat panes
    /// and terminal panes survive bulk closes; their state is too expensive
    /// to lose by accident.
    pub fn survives_bulk_close(&self) -> bool {
        self.is_chat() || self.tool_kind() == Some(ToolKind::Terminal)
    }

    /// Deep-copy this pane with fresh ids (for room duplication). Chat
    /// sessions are re-keyed and the active-session reference is remapped by
    /// position.
    pub fn duplicated(&self) -> Self {
        let mut copy = self.clone();
        copy.id = Uuid::new_v4().to_string();
        if let PaneContent::Chat {
            sessions,
            active_session_id,
        } = &mut copy.content
        {
            let active_pos = sessions
                .iter()
                .position(|s| s.id == *active_session_id)
                .unwrap_or(0);
            for session in sessions.iter_mut() {
                session.id = Uuid::new_v4().to_string();
            }
            *active_session_id = sessions[active_pos].id.clone();
        }
        copy
    }

    // -----------------------------------------------------------------------
    // Chat pane operations
    // -----------------------------------------------------------------------

    /// The currently active chat session, for chat panes.
    pub fn active_chat_session(&self) -> Option<&ChatSession> {
        match &self.content {
            PaneContent::Chat {
                sessions,
                active_session_id,
            } => sessions.iter().find(|s| s.id == *active_session_id),
            PaneContent::Editor { .. } | PaneContent::Tool { .. } => None,
        }
    }

    pub fn chat_sessions(&self) -> Option<&[ChatSession]> {
        match &self.content {
            PaneContent::Chat { sessions, .. } => Some(sessions),
            PaneContent::Editor { .. } | PaneContent::Tool { .. } => None,
        }
    }

    /// Create a fresh session and make it active. Returns the session id.
    pub fn create_chat_session(&mut self) -> Result<String> {
        match &mut self.content {
            PaneContent::Chat {
                sessions,
                active_session_id,
            } => {
                let session = ChatSession::new();
                let id = session.id.clone();
                sessions.push(session);
                *active_session_id = id.clone();
                Ok(id)
            }
            PaneContent::Editor { .. } | PaneContent::Tool { .. } => {
                bail!("Pane {} is not a chat pane", self.id)
            }
        }
    }

    /// Delete a session. Rejected when it is the pane's only remaining
    /// session — a chat pane always holds at least one. Deleting the active
    /// session re-activates the most recently updated survivor.
    pub fn delete_chat_session(&mut self, session_id: &str) -> Result<()> {
        match &mut self.content {
            PaneContent::Chat {
                sessions,
                active_session_id,
            } => {
                if sessions.len() <= 1 {
                    bail!("Cannot delete the last session of pane {}", self.id);
                }
                let idx = sessions
                    .iter()
                    .position(|s| s.id == session_id)
                    .with_context(|| format!("No such session: {session_id}"))?;
                sessions.remove(idx);
                if *active_session_id == session_id {
                    let survivor = sessions
                        .iter()
                        .max_by_key(|s| s.updated_at)
                        .map(|s| s.id.clone())
                        .unwrap_or_default();
                    *active_session_id = survivor;
                }
                Ok(())
            }
            PaneContent::Editor { .. } | PaneContent::Tool { .. } => {
                bail!("Pane {} is not a chat pane", self.id)
            }
        }
    }

    /// Make a session active. Returns `false` (and leaves the selection
    /// untouched) when the id is unknown.
    pub fn select_chat_session(&mut self, session_id: &str) -> Result<bool> {
        match &mut self.content {
            PaneContent::Chat {
                sessions,
                active_session_id,
            } => {
                if sessions.iter().any(|s| s.id == session_id) {
                    *active_session_id = session_id.to_string();
                    Ok(true)
                } else {
                    Ok(false)
                }
            }
            PaneContent::Editor { .. } | PaneContent::Tool { .. } => {
                bail!("Pane {} is not a chat pane", self.id)
            }
        }
    }

    /// Append a user message to the active session. Empty or whitespace-only
    /// text is rejected with no mutation; the asynchronous agent turn that
    /// follows a real message is backend-owned.
    pub fn send_chat_message(&mut self, text: &str) -> Result<()> {
        if text.trim().is_empty() {
            bail!("Cannot send an empty message");
        }
        match &mut self.content {
            PaneContent::Chat {
                sessions,
                active_session_id,
            } => {
                let session = sessions
                    .iter_mut()
                    .find(|s| s.id == *active_session_id)
                    .with_context(|| format!("No active session in pane {}", self.id))?;
                session.push_message(MessageRole::User, text);
                Ok(())
            }
            PaneContent::Editor { .. } | PaneContent::Tool { .. } => {
                bail!("Pane {} is not a chat pane", self.id)
            }
        }
    }

    // -----------------------------------------------------------------------
    // Editor pane operations
    // -----------------------------------------------------------------------

    /// Replace the editor buffer. Sets `dirty` on every call — no equality
    /// check against the saved content, matching the observed behavior.
    pub fn update_editor_content(&mut self, new_content: impl Into<String>) -> Result<()> {
        match &mut self.content {
            PaneContent::Editor { content, dirty, .. } => {
                *content = new_content.into();
                *dirty = true;
                Ok(())
            }
            PaneContent::Chat { .. } | PaneContent::Tool { .. } => {
                bail!("Pane {} is not an editor pane", self.id)
            }
        }
    }

    /// The save round-trip succeeded; the buffer is clean.
    pub fn mark_editor_saved(&mut self) -> Result<()> {
        match &mut self.content {
            PaneContent::Editor {
                dirty, last_saved, ..
            } => {
                *dirty = false;
                *last_saved = Some(Utc::now());
                Ok(())
            }
            PaneContent::Chat { .. } | PaneContent::Tool { .. } => {
                bail!("Pane {} is not an editor pane", self.id)
            }
        }
    }

    pub fn editor_dirty(&self) -> Option<bool> {
        match &self.content {
            PaneContent::Editor { dirty, .. } => Some(*dirty),
            PaneContent::Chat { .. } | PaneContent::Tool { .. } => None,
        }
    }

    pub fn editor_content(&self) -> Option<(&str, &str)> {
        match &self.content {
            PaneContent::Editor {
                file_path, content, ..
            } => Some((file_path.as_str(), content.as_str())),
            PaneContent::Chat { .. } | PaneContent::Tool { .. } => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_pane_starts_with_one_active_session() {
        let pane = Pane::chat();
        let sessions = pane.chat_sessions().unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(pane.active_chat_session().unwrap().id, sessions[0].id);
    }

    #[test]
    fn delete_last_session_is_rejected() {
        let mut pane = Pane::chat();
        let only = pane.chat_sessions().unwrap()[0].id.clone();

        assert!(pane.delete_chat_session(&only).is_err());
        assert_eq!(pane.chat_sessions().unwrap().len(), 1);
    }

    #[test]
    fn delete_active_session_reactivates_survivor() {
        let mut pane = Pane::chat();
        let second = pane.create_chat_session().unwrap();
        assert_eq!(pane.active_chat_session().unwrap().id, second);

        pane.delete_chat_session(&second).unwrap();
        // The original session is active again.
        let sessions = pane.chat_sessions().unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(pane.active_chat_session().unwrap().id, sessions[0].id);
    }

    #[test]
    fn select_unknown_session_is_a_no_op() {
        let mut pane = Pane::chat();
        let original = pane.active_chat_session().unwrap().id.clone();

        assert!(!pane.select_chat_session("nope").unwrap());
        assert_eq!(pane.active_chat_session().unwrap().id, original);
    }

    #[test]
    fn send_message_appends_to_active_session_only() {
        let mut pane = Pane::chat();
        let first = pane.chat_sessions().unwrap()[0].id.clone();
        let second = pane.create_chat_session().unwrap();

        pane.select_chat_session(&first).unwrap();
        pane.send_chat_message("hello").unwrap();

        let sessions = pane.chat_sessions().unwrap();
        let a = sessions.iter().find(|s| s.id == first).unwrap();
        let b = sessions.iter().find(|s| s.id == second).unwrap();
        assert_eq!(a.messages.len(), 1);
        assert_eq!(a.messages[0].role, MessageRole::User);
        assert_eq!(a.messages[0].content, "hello");
        assert!(b.messages.is_empty());
    }

    #[test]
    fn empty_and_whitespace_messages_are_rejected() {
        let mut pane = Pane::chat();
        assert!(pane.send_chat_message("").is_err());
        assert!(pane.send_chat_message("   \n\t ").is_err());
        assert!(pane.active_chat_session().unwrap().messages.is_empty());
    }

    #[test]
    fn chat_ops_reject_non_chat_panes() {
        let mut pane = Pane::editor("src/main.rs", "fn main() {}");
        assert!(pane.create_chat_session().is_err());
        assert!(pane.send_chat_message("hi").is_err());
        assert!(pane.delete_chat_session("x").is_err());
    }

    #[test]
    fn editor_dirty_round_trip() {
        let mut pane = Pane::editor("notes.md", "draft");
        assert_eq!(pane.editor_dirty(), Some(false));

        pane.update_editor_content("X").unwrap();
        assert_eq!(pane.editor_dirty(), Some(true));

        pane.mark_editor_saved().unwrap();
        assert_eq!(pane.editor_dirty(), Some(false));

        // Same content again still marks dirty — no equality short-circuit.
        pane.update_editor_content("X").unwrap();
        assert_eq!(pane.editor_dirty(), Some(true));
    }

    #[test]
    fn editor_title_is_file_name() {
        let pane = Pane::editor("deep/nested/mod.rs", "");
        assert_eq!(pane.title, "mod.rs");
    }

    #[test]
    fn tool_kind_is_the_discriminator_not_the_title() {
        let mut pane = Pane::tool(ToolKind::Browser, "Terminal Notes");
        // A misleading title does not make this a terminal.
        assert_eq!(pane.tool_kind(), Some(ToolKind::Browser));
        assert!(!pane.survives_bulk_close());

        pane = Pane::tool(ToolKind::Terminal, "scratch");
        assert!(pane.survives_bulk_close());
    }

    #[test]
    fn chat_panes_survive_bulk_close() {
        assert!(Pane::chat().survives_bulk_close());
        assert!(!Pane::editor("a.rs", "").survives_bulk_close());
    }

    #[test]
    fn duplicated_pane_re_keys_sessions() {
        let mut pane = Pane::chat();
        pane.create_chat_session().unwrap();
        let copy = pane.duplicated();

        assert_ne!(copy.id, pane.id);
        let orig_ids: Vec<&str> = pane
            .chat_sessions()
            .unwrap()
            .iter()
            .map(|s| s.id.as_str())
            .collect();
        for session in copy.chat_sessions().unwrap() {
            assert!(!orig_ids.contains(&session.id.as_str()));
        }
        // Active selection is preserved by position.
        assert_eq!(
            copy.active_chat_session().unwrap().id,
            copy.chat_sessions().unwrap()[1].id
        );
    }
}
