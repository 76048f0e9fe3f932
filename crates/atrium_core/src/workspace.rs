use anyhow::{bail, Context, Result};
use atrium_fs::FileTree;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::room::Room;

// ---------------------------------------------------------------------------
// Status and runtime types
// ---------------------------------------------------------------------------

/// Lifecycle status of a workspace.
///
/// Legal edges: `stopped → starting → running → stopping → stopped`, with
/// `error` reachable from `starting`, `running`, or `stopping` on a backend
/// failure. `error → stopped` happens only through the explicit retry/stop
/// action ([`Workspace::reset_error`]) — there is no automatic recovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkspaceStatus {
    Stopped,
    Starting,
    Running,
    Stopping,
    Error,
}

impl WorkspaceStatus {
    /// Display label used in the status chip.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Stopped => "Stopped",
            Self::Starting => "Starting",
            Self::Running => "Running",
            Self::Stopping => "Stopping",
            Self::Error => "Error",
        }
    }

    /// Whether a start/stop control should be disabled (a transition is in
    /// flight).
    pub fn is_transitioning(&self) -> bool {
        matches!(self, Self::Starting | Self::Stopping)
    }
}

/// Where a workspace's runtime lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RuntimeKind {
    Local,
    DockerLocal,
    DockerRemote,
}

/// Runtime configuration chosen at workspace creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeConfig {
    pub kind: RuntimeKind,
    pub container_id: Option<String>,
    pub container_name: Option<String>,
    pub container_image: Option<String>,
    pub work_dir: Option<String>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            kind: RuntimeKind::Local,
            container_id: None,
            container_name: None,
            container_image: None,
            work_dir: None,
        }
    }
}

/// Compact runtime block of the status endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeSummary {
    #[serde(rename = "type")]
    pub kind: RuntimeKind,
    pub container_id: Option<String>,
    pub container_status: Option<String>,
    pub uptime: Option<u64>,
}

/// Container resource usage reported by the backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceUsage {
    pub cpu_percent: f64,
    pub memory_percent: f64,
    pub memory_usage: u64,
    pub memory_limit: u64,
}

/// Detailed runtime block of the status endpoint, preserved verbatim for the
/// status popover. `error` holds the last failure message when the workspace
/// is in the error state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeDetailed {
    pub phase: String,
    pub message: Option<String>,
    pub progress: Option<f32>,
    pub error: Option<String>,
    pub container_id: Option<String>,
    pub container_name: Option<String>,
    pub container_status: Option<String>,
    pub container_image: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub last_updated_at: DateTime<Utc>,
    pub resources: Option<ResourceUsage>,
}

impl RuntimeDetailed {
    /// Minimal detail block carrying just an error message.
    fn from_error(message: impl Into<String>) -> Self {
        Self {
            phase: "error".to_string(),
            message: None,
            progress: None,
            error: Some(message.into()),
            container_id: None,
            container_name: None,
            container_status: None,
            container_image: None,
            started_at: None,
            last_updated_at: Utc::now(),
            resources: None,
        }
    }
}

/// A file or artifact attached to the workspace.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceAsset {
    pub id: String,
    pub name: String,
    pub path: String,
}

/// Configuration for creating a workspace.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceConfig {
    pub name: String,
    pub color: Option<String>,
    #[serde(default)]
    pub runtime: RuntimeConfig,
}

// ---------------------------------------------------------------------------
// Workspace
// ---------------------------------------------------------------------------

/// A top-level isolated environment: rooms of panes, a lazily-loaded file
/// tree, attached assets, and a runtime that can be started and stopped.
///
/// Invariant: a workspace always holds at least one room, and
/// `active_room_id` references one of them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Workspace {
    pub id: String,
    pub name: String,
    pub color: Option<String>,
    pub status: WorkspaceStatus,
    pub runtime: RuntimeConfig,
    pub runtime_detailed: Option<RuntimeDetailed>,
    pub rooms: Vec<Room>,
    pub active_room_id: String,
    pub file_tree: FileTree,
    pub assets: Vec<WorkspaceAsset>,
    pub tools: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Workspace {
    /// Create a stopped workspace with a default room containing a default
    /// chat pane.
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_config(WorkspaceConfig {
            name: name.into(),
            color: None,
            runtime: RuntimeConfig::default(),
        })
    }

    /// Create a workspace from an explicit configuration.
    pub fn with_config(config: WorkspaceConfig) -> Self {
        let mut room = Room::new("Room 1");
        room.open_chat_pane();
        let active_room_id = room.id.clone();
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            name: config.name,
            color: config.color,
            status: WorkspaceStatus::Stopped,
            runtime: config.runtime,
            runtime_detailed: None,
            rooms: vec![room],
            active_room_id,
            file_tree: FileTree::new(),
            assets: Vec::new(),
            tools: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    // -----------------------------------------------------------------------
    // Status transitions
    // -----------------------------------------------------------------------

    /// Move `stopped → starting`. Returns `false` (serialized no-op) when a
    /// start is already in flight; any other state is an invalid transition.
    pub fn begin_start(&mut self) -> Result<bool> {
        match self.status {
            WorkspaceStatus::Stopped => {
                debug!(workspace = %self.id, "starting");
                self.status = WorkspaceStatus::Starting;
                Ok(true)
            }
            WorkspaceStatus::Starting => Ok(false),
            other => bail!(
                "Cannot start workspace {} from status {}",
                self.id,
                other.label()
            ),
        }
    }

    /// Move `starting → running`.
    pub fn complete_start(&mut self) -> Result<()> {
        if self.status != WorkspaceStatus::Starting {
            bail!(
                "Workspace {} is not starting (status: {})",
                self.id,
                self.status.label()
            );
        }
        self.status = WorkspaceStatus::Running;
        Ok(())
    }

    /// Move `running → stopping`. Returns `false` when a stop is already in
    /// flight.
    pub fn begin_stop(&mut self) -> Result<bool> {
        match self.status {
            WorkspaceStatus::Running => {
                debug!(workspace = %self.id, "stopping");
                self.status = WorkspaceStatus::Stopping;
                Ok(true)
            }
            WorkspaceStatus::Stopping => Ok(false),
            other => bail!(
                "Cannot stop workspace {} from status {}",
                self.id,
                other.label()
            ),
        }
    }

    /// Move `stopping → stopped`.
    pub fn complete_stop(&mut self) -> Result<()> {
        if self.status != WorkspaceStatus::Stopping {
            bail!(
                "Workspace {} is not stopping (status: {})",
                self.id,
                self.status.label()
            );
        }
        self.status = WorkspaceStatus::Stopped;
        Ok(())
    }

    /// A backend failure during a transition (or while running) moves the
    /// workspace to `error`, preserving the message for the status popover.
    pub fn fail(&mut self, message: impl Into<String>) -> Result<()> {
        match self.status {
            WorkspaceStatus::Starting | WorkspaceStatus::Running | WorkspaceStatus::Stopping => {
                let message = message.into();
                debug!(workspace = %self.id, %message, "runtime failure");
                match &mut self.runtime_detailed {
                    Some(detail) => {
                        detail.phase = "error".to_string();
                        detail.error = Some(message);
                        detail.last_updated_at = Utc::now();
                    }
                    None => self.runtime_detailed = Some(RuntimeDetailed::from_error(message)),
                }
                self.status = WorkspaceStatus::Error;
                Ok(())
            }
            other => bail!(
                "Workspace {} cannot fail from status {}",
                self.id,
                other.label()
            ),
        }
    }

    /// Explicit retry/stop acknowledgment: `error → stopped`. The preserved
    /// error detail is cleared.
    pub fn reset_error(&mut self) -> Result<()> {
        if self.status != WorkspaceStatus::Error {
            bail!(
                "Workspace {} is not in the error state (status: {})",
                self.id,
                self.status.label()
            );
        }
        if let Some(detail) = &mut self.runtime_detailed {
            detail.error = None;
        }
        self.status = WorkspaceStatus::Stopped;
        Ok(())
    }

    /// Overwrite status detail from a backend status poll. The backend is
    /// authoritative for polled state; stale-poll protection lives in the
    /// service layer, which serializes polls per workspace.
    pub fn apply_status_report(
        &mut self,
        status: WorkspaceStatus,
        runtime_detailed: Option<RuntimeDetailed>,
    ) {
        self.status = status;
        if runtime_detailed.is_some() {
            self.runtime_detailed = runtime_detailed;
        }
        self.updated_at = Utc::now();
    }

    /// The last runtime error, if the workspace is in the error state.
    pub fn last_error(&self) -> Option<&str> {
        self.runtime_detailed
            .as_ref()
            .and_then(|d| d.error.as_deref())
    }

    // -----------------------------------------------------------------------
    // Rooms
    // -----------------------------------------------------------------------

    pub fn room(&self, id: &str) -> Option<&Room> {
        self.rooms.iter().find(|r| r.id == id)
    }

    pub fn room_mut(&mut self, id: &str) -> Option<&mut Room> {
        self.rooms.iter_mut().find(|r| r.id == id)
    }

    pub fn active_room(&self) -> &Room {
        self.rooms
            .iter()
            .find(|r| r.id == self.active_room_id)
            .unwrap_or(&self.rooms[0])
    }

    pub fn active_room_mut(&mut self) -> &mut Room {
        let idx = self
            .rooms
            .iter()
            .position(|r| r.id == self.active_room_id)
            .unwrap_or(0);
        &mut self.rooms[idx]
    }

    /// Add an empty room and make it active. Returns the room id.
    pub fn add_room(&mut self, name: impl Into<String>) -> String {
        let room = Room::new(name);
        let id = room.id.clone();
        self.rooms.push(room);
        self.active_room_id = id.clone();
        id
    }

    /// Duplicate a room (fresh pane/session ids, " copy" name suffix) and
    /// make the copy active. Returns the new room id.
    pub fn duplicate_room(&mut self, id: &str) -> Result<String> {
        let room = self
            .room(id)
            .with_context(|| format!("No such room: {id}"))?;
        let copy = room.duplicated();
        let copy_id = copy.id.clone();
        self.rooms.push(copy);
        self.active_room_id = copy_id.clone();
        Ok(copy_id)
    }

    pub fn rename_room(&mut self, id: &str, name: impl Into<String>) -> Result<()> {
        self.room_mut(id)
            .with_context(|| format!("No such room: {id}"))?
            .rename(name);
        Ok(())
    }

    /// Remove a room. Rejected when it is the workspace's last room. Removing
    /// the active room activates the previous room in order.
    pub fn remove_room(&mut self, id: &str) -> Result<()> {
        if self.rooms.len() <= 1 {
            bail!("Cannot delete the last room of workspace {}", self.id);
        }
        let idx = self
            .rooms
            .iter()
            .position(|r| r.id == id)
            .with_context(|| format!("No such room: {id}"))?;
        let was_active = self.active_room_id == id;
        self.rooms.remove(idx);
        if was_active {
            let fallback = idx.saturating_sub(1).min(self.rooms.len() - 1);
            self.active_room_id = self.rooms[fallback].id.clone();
        }
        Ok(())
    }

    /// Focus a room. A no-op returning `false` for unknown ids.
    pub fn set_active_room(&mut self, id: &str) -> bool {
        if self.rooms.iter().any(|r| r.id == id) {
            self.active_room_id = id.to_string();
            true
        } else {
            false
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
