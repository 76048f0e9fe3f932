use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::config::AtriumConfig;

/// UI session state for save/restore across launches.
///
/// Persisted to `~/.atrium/session.json`. On startup the front end loads this
/// to restore focus (workspace, room) and reopen files. Entity state itself
/// lives in the backend; this file only records where the user was looking.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct UiSession {
    pub active_workspace_id: Option<String>,
    pub active_room_id: Option<String>,
    pub window_size: Option<[u32; 2]>,
    pub open_files: Vec<String>,
}

impl UiSession {
    fn session_path() -> Result<PathBuf> {
        Ok(AtriumConfig::base_dir()?.join("session.json"))
    }

    /// Persist session state to `~/.atrium/session.json`.
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::session_path()?)
    }

    /// Load session state from disk. Returns `Default` if the file is missing
    /// or corrupt (never errors on bad JSON).
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::session_path()?)
    }

    /// Load session from an explicit path (for testing without `~/.atrium/`).
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read session: {}", path.display()))?;
            Ok(serde_json::from_str(&content).unwrap_or_default())
        } else {
            Ok(Self::default())
        }
    }

    /// Save session to an explicit path (for testing without `~/.atrium/`).
    pub fn save_to(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to save session: {}", path.display()))?;
        Ok(())
    }

    /// Delete the session file.
    pub fn clear() -> Result<()> {
        let path = Self::session_path()?;
        if path.exists() {
            std::fs::remove_file(&path)?;
        }
        Ok(())
    }

    /// Quick save: record just the active workspace/room without touching
    /// other fields. Reads the existing session first to preserve them.
    pub fn save_focus(workspace_id: &str, room_id: &str) -> Result<()> {
        let mut state = Self::load().unwrap_or_default();
        state.active_workspace_id = Some(workspace_id.to_string());
        state.active_room_id = Some(room_id.to_string());
        state.save()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn save_and_load_round_trip() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("session.json");

        let state = UiSession {
            active_workspace_id: Some("ws-1".into()),
            active_room_id: Some("room-2".into()),
            window_size: Some([1920, 1080]),
            open_files: vec!["src/main.rs".into()],
        };
        state.save_to(&path).unwrap();

        let loaded = UiSession::load_from(&path).unwrap();
        assert_eq!(loaded.active_workspace_id.as_deref(), Some("ws-1"));
        assert_eq!(loaded.active_room_id.as_deref(), Some("room-2"));
        assert_eq!(loaded.window_size, Some([1920, 1080]));
        assert_eq!(loaded.open_files, vec!["src/main.rs"]);
    }

    #[test]
    fn missing_file_returns_default() {
        let tmp = TempDir::new().unwrap();
        let loaded = UiSession::load_from(&tmp.path().join("session.json")).unwrap();
        assert!(loaded.active_workspace_id.is_none());
        assert!(loaded.open_files.is_empty());
    }

    #[test]
    fn corrupt_json_returns_default() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("session.json");
        std::fs::write(&path, "NOT VALID JSON {{{{").unwrap();

        let loaded = UiSession::load_from(&path).unwrap();
        assert!(loaded.active_workspace_id.is_none());
    }

    #[test]
    fn save_overwrites_previous_session() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("session.json");

        UiSession {
            active_workspace_id: Some("first".into()),
            ..Default::default()
        }
        .save_to(&path)
        .unwrap();
        UiSession {
            active_workspace_id: Some("second".into()),
            ..Default::default()
        }
        .save_to(&path)
        .unwrap();

        let loaded = UiSession::load_from(&path).unwrap();
        assert_eq!(loaded.active_workspace_id.as_deref(), Some("second"));
    }
}
