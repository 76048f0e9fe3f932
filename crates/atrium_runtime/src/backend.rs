use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use url::Url;

use atrium_core::error::AtriumError;
use atrium_core::workspace::{RuntimeDetailed, RuntimeSummary, WorkspaceStatus};
use atrium_fs::NodeKind;

use crate::preview::BrowserInstance;

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

/// Response of `GET /api/workspaces/{id}/status`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusReport {
    pub status: WorkspaceStatus,
    pub runtime: Option<RuntimeSummary>,
    pub runtime_detailed: Option<RuntimeDetailed>,
}

/// One directory entry, as returned by the listing endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileEntry {
    pub name: String,
    pub path: String,
    pub kind: NodeKind,
}

// ---------------------------------------------------------------------------
// Backend seam
// ---------------------------------------------------------------------------

/// The workspace backend, as consumed by the runtime layer.
///
/// Everything behind this trait is an external collaborator: the endpoints
/// own all persistence and the agent turn. Tests substitute an in-memory
/// implementation.
#[async_trait]
pub trait WorkspaceBackend: Send + Sync {
    async fn fetch_status(&self, workspace_id: &str) -> Result<StatusReport>;

    async fn start_workspace(&self, workspace_id: &str) -> Result<()>;

    async fn stop_workspace(&self, workspace_id: &str) -> Result<()>;

    /// Persist file content as UTF-8 text keyed by path.
    async fn save_file(&self, workspace_id: &str, path: &str, content: &str) -> Result<()>;

    /// One level of a directory listing.
    async fn list_dir(&self, workspace_id: &str, path: &str) -> Result<Vec<FileEntry>>;

    async fn create_entry(&self, workspace_id: &str, path: &str, kind: NodeKind) -> Result<()>;

    async fn rename_entry(&self, workspace_id: &str, path: &str, new_name: &str) -> Result<()>;

    /// Recursive for folders, backend-side.
    async fn delete_entry(&self, workspace_id: &str, path: &str) -> Result<()>;

    async fn list_browsers(&self, conversation_id: &str) -> Result<Vec<BrowserInstance>>;
}

// ---------------------------------------------------------------------------
// HttpBackend
// ---------------------------------------------------------------------------

/// REST implementation of [`WorkspaceBackend`] against the backend's base
/// URL.
pub struct HttpBackend {
    client: reqwest::Client,
    base: Url,
}

#[derive(Serialize)]
struct SaveFileBody<'a> {
    path: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct CreateEntryBody<'a> {
    path: &'a str,
    kind: NodeKind,
}

#[derive(Serialize)]
struct RenameEntryBody<'a> {
    path: &'a str,
    new_name: &'a str,
}

#[derive(Serialize)]
struct DeleteEntryBody<'a> {
    path: &'a str,
}

impl HttpBackend {
    pub fn new(base: Url) -> Self {
        Self {
            client: reqwest::Client::new(),
            base,
        }
    }

    /// Build a backend from a base URL string (e.g. from `AtriumConfig`).
    pub fn from_base_url(base: &str) -> Result<Self> {
        let base = Url::parse(base)
            .map_err(|e| AtriumError::Config(format!("Invalid backend URL {base:?}: {e}")))?;
        Ok(Self::new(base))
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base
            .join(path)
            .with_context(|| format!("Invalid endpoint: {path}"))
    }

    /// Map non-2xx answers to [`AtriumError::Backend`].
    async fn check(response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            Ok(response)
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(AtriumError::Backend(format!("HTTP {status}: {body}")).into())
        }
    }
}

#[async_trait]
impl WorkspaceBackend for HttpBackend {
    async fn fetch_status(&self, workspace_id: &str) -> Result<StatusReport> {
        let url = self.endpoint(&format!("api/workspaces/{workspace_id}/status"))?;
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| AtriumError::Connection(e.to_string()))?;
        let report = Self::check(response)
            .await?
            .json::<StatusReport>()
            .await
            .context("Malformed status response")?;
        Ok(report)
    }

    async fn start_workspace(&self, workspace_id: &str) -> Result<()> {
        let url = self.endpoint(&format!("api/workspaces/{workspace_id}/start"))?;
        let response = self
            .client
            .post(url)
            .send()
            .await
            .map_err(|e| AtriumError::Connection(e.to_string()))?;
        Self::check(response).await?;
        Ok(())
    }

    async fn stop_workspace(&self, workspace_id: &str) -> Result<()> {
        let url = self.endpoint(&format!("api/workspaces/{workspace_id}/stop"))?;
        let response = self
            .client
            .post(url)
            .send()
            .await
            .map_err(|e| AtriumError::Connection(e.to_string()))?;
        Self::check(response).await?;
        Ok(())
    }

    async fn save_file(&self, workspace_id: &str, path: &str, content: &str) -> Result<()> {
        let url = self.endpoint(&format!("api/workspaces/{workspace_id}/file"))?;
        let response = self
            .client
            .put(url)
            .json(&SaveFileBody { path, content })
            .send()
            .await
            .map_err(|e| AtriumError::Connection(e.to_string()))?;
        Self::check(response).await?;
        Ok(())
    }

    async fn list_dir(&self, workspace_id: &str, path: &str) -> Result<Vec<FileEntry>> {
        let url = self.endpoint(&format!("api/workspaces/{workspace_id}/dir"))?;
        let response = self
            .client
            .get(url)
            .query(&[("path", path)])
            .send()
            .await
            .map_err(|e| AtriumError::Connection(e.to_string()))?;
        let entries = Self::check(response)
            .await?
            .json::<Vec<FileEntry>>()
            .await
            .context("Malformed directory listing")?;
        Ok(entries)
    }

    async fn create_entry(&self, workspace_id: &str, path: &str, kind: NodeKind) -> Result<()> {
        let url = self.endpoint(&format!("api/workspaces/{workspace_id}/entries"))?;
        let response = self
            .client
            .post(url)
            .json(&CreateEntryBody { path, kind })
            .send()
            .await
            .map_err(|e| AtriumError::Connection(e.to_string()))?;
        Self::check(response).await?;
        Ok(())
    }

    async fn rename_entry(&self, workspace_id: &str, path: &str, new_name: &str) -> Result<()> {
        let url = self.endpoint(&format!("api/workspaces/{workspace_id}/entries/rename"))?;
        let response = self
            .client
            .post(url)
            .json(&RenameEntryBody { path, new_name })
            .send()
            .await
            .map_err(|e| AtriumError::Connection(e.to_string()))?;
        Self::check(response).await?;
        Ok(())
    }

    async fn delete_entry(&self, workspace_id: &str, path: &str) -> Result<()> {
        let url = self.endpoint(&format!("api/workspaces/{workspace_id}/entries/delete"))?;
        let response = self
            .client
            .post(url)
            .json(&DeleteEntryBody { path })
            .send()
            .await
            .map_err(|e| AtriumError::Connection(e.to_string()))?;
        Self::check(response).await?;
        Ok(())
    }

    async fn list_browsers(&self, conversation_id: &str) -> Result<Vec<BrowserInstance>> {
        let url = self.endpoint(&format!("api/conversations/{conversation_id}/browsers"))?;
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| AtriumError::Connection(e.to_string()))?;
        let browsers = Self::check(response)
            .await?
            .json::<Vec<BrowserInstance>>()
            .await
            .context("Malformed browser list")?;
        Ok(browsers)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
