use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

/// Who authored a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    User,
    Assistant,
}

/// A single message within a chat session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tool sessions
// ---------------------------------------------------------------------------

/// Live status of an agent-invoked tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolStatus {
    Running,
    Idle,
    Error,
}

/// Host/port a tool exposes for the UI to attach to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolEndpoint {
    pub host: String,
    pub port: u16,
}

/// A record of one agent-invoked tool's live status. Distinct from a terminal
/// pane: this tracks the agent's own tool use, shown inside the chat surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolSession {
    pub id: String,
    pub label: String,
    pub status: ToolStatus,
    pub summary: Option<String>,
    pub endpoint: Option<ToolEndpoint>,
    pub connected_at: DateTime<Utc>,
}

impl ToolSession {
    /// Create a running tool session.
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            label: label.into(),
            status: ToolStatus::Running,
            summary: None,
            endpoint: None,
            connected_at: Utc::now(),
        }
    }

    /// The tool completed; record its result summary.
    pub fn finish(&mut self, summary: impl Into<String>) {
        self.status = ToolStatus::Idle;
        self.summary = Some(summary.into());
    }

    /// The tool errored; record what went wrong.
    pub fn fail(&mut self, summary: impl Into<String>) {
        self.status = ToolStatus::Error;
        self.summary = Some(summary.into());
    }
}

// ---------------------------------------------------------------------------
// Title derivation
// ---------------------------------------------------------------------------

/// Derives a session title from the first user message, truncated to 50
/// characters at a char boundary.
pub fn derive_title(messages: &[ChatMessage]) -> String {
    let first_user = messages.iter().find(|m| m.role == MessageRole::User);
    match first_user {
        Some(msg) => {
            let trimmed = msg.content.trim();
            if trimmed.len() <= 50 {
                trimmed.to_string()
            } else {
                let boundary = trimmed
                    .char_indices()
                    .take_while(|(i, _)| *i < 50)
                    .last()
                    .map(|(i, c)| i + c.len_utf8())
                    .unwrap_or(50);
                format!("{}...", &trimmed[..boundary])
            }
        }
        None => "New Session".to_string(),
    }
}

// ---------------------------------------------------------------------------
// ChatSession
// ---------------------------------------------------------------------------

/// One conversation thread within a chat pane: ordered messages plus the
/// tools the agent currently has in flight.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatSession {
    pub id: String,
    pub title: String,
    pub messages: Vec<ChatMessage>,
    pub active_tools: Vec<ToolSession>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ChatSession {
    /// Creates a new empty session.
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            title: "New Session".to_string(),
            messages: Vec::new(),
            active_tools: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Appends a message and refreshes the title / timestamp.
    pub fn push_message(&mut self, role: MessageRole, content: impl Into<String>) {
        self.messages.push(ChatMessage::new(role, content));
        self.title = derive_title(&self.messages);
        self.updated_at = Utc::now();
    }

    /// Register a tool the agent just invoked.
    pub fn add_tool(&mut self, tool: ToolSession) {
        self.active_tools.push(tool);
        self.updated_at = Utc::now();
    }

    pub fn tool_mut(&mut self, id: &str) -> Option<&mut ToolSession> {
        self.active_tools.iter_mut().find(|t| t.id == id)
    }

    /// Drop a finished tool from the active list. Returns whether it existed.
    pub fn remove_tool(&mut self, id: &str) -> bool {
        let before = self.active_tools.len();
        self.active_tools.retain(|t| t.id != id);
        self.active_tools.len() != before
    }
}

impl Default for ChatSession {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
