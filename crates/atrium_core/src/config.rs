use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::workspace::RuntimeKind;

/// Application configuration stored at `~/.atrium/config.json`.
///
/// Holds the defaults applied to newly created workspaces and the timing
/// knobs for the runtime layer. Missing or corrupt files load as defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AtriumConfig {
    /// Base URL of the workspace backend.
    pub backend_url: String,
    /// Runtime kind applied to workspaces created without an explicit config.
    pub default_runtime: RuntimeKind,
    /// Container image for docker-backed workspaces.
    pub container_image: String,
    /// Working directory inside the workspace runtime.
    pub work_dir: String,
    /// Interval between workspace status polls, in seconds.
    pub status_poll_secs: u64,
    /// Fixed delay before a browser-preview reconnect attempt, in seconds.
    pub preview_reconnect_secs: u64,
}

impl Default for AtriumConfig {
    fn default() -> Self {
        Self {
            backend_url: "http://127.0.0.1:8700".into(),
            default_runtime: RuntimeKind::Local,
            container_image: "atrium/workspace:latest".into(),
            work_dir: "/workspace".into(),
            status_poll_secs: 3,
            preview_reconnect_secs: 3,
        }
    }
}

impl AtriumConfig {
    /// Base directory for all Atrium state: `~/.atrium`.
    pub fn base_dir() -> Result<PathBuf> {
        let home = dirs::home_dir().context("Cannot determine home directory")?;
        let dir = home.join(".atrium");
        if !dir.exists() {
            std::fs::create_dir_all(&dir)
                .with_context(|| format!("Failed to create {}", dir.display()))?;
        }
        Ok(dir)
    }

    /// Path of the config file: `~/.atrium/config.json`.
    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::base_dir()?.join("config.json"))
    }

    /// Directory for rotated log files: `~/.atrium/logs`.
    pub fn logs_dir() -> Result<PathBuf> {
        Ok(Self::base_dir()?.join("logs"))
    }

    /// Load the config, falling back to defaults when the file is missing or
    /// unparseable.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// Load from an explicit path (for testing without `~/.atrium/`).
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config: {}", path.display()))?;
            Ok(serde_json::from_str(&content).unwrap_or_default())
        } else {
            Ok(Self::default())
        }
    }

    /// Persist the config.
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    /// Save to an explicit path (for testing without `~/.atrium/`).
    pub fn save_to(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to save config: {}", path.display()))?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
