use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, warn};

use atrium_core::error::classify_error;
use atrium_core::store::WorkspaceStore;
use atrium_fs::{FileNode, MutationOverlay, NodeKind};

use crate::backend::WorkspaceBackend;

/// Drives the async half of the workspace lifecycle against the backend,
/// applying results back to the store.
///
/// The store stays the single owner of entity state; this service only calls
/// its named operations (plus the file tree's load/overlay protocol) around
/// backend round trips. Locks are never held across an await.
pub struct WorkspaceService {
    store: Arc<RwLock<WorkspaceStore>>,
    backend: Arc<dyn WorkspaceBackend>,
    overlays: Mutex<HashMap<String, MutationOverlay>>,
}

impl WorkspaceService {
    pub fn new(store: Arc<RwLock<WorkspaceStore>>, backend: Arc<dyn WorkspaceBackend>) -> Self {
        Self {
            store,
            backend,
            overlays: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> Arc<RwLock<WorkspaceStore>> {
        Arc::clone(&self.store)
    }

    // -----------------------------------------------------------------------
    // Start / stop
    // -----------------------------------------------------------------------

    /// Start a workspace: `stopped → starting → running`, or `→ error` with
    /// the backend's message preserved for display. A start already in
    /// flight makes this a no-op (the control is disabled while loading).
    pub async fn start_workspace(&self, id: &str) -> Result<()> {
        if !self.store.write().begin_start(id)? {
            debug!(workspace = %id, "start already in flight");
            return Ok(());
        }
        match self.backend.start_workspace(id).await {
            Ok(()) => {
                self.store.write().complete_start(id)?;
                Ok(())
            }
            Err(e) => {
                self.store.write().fail(id, &e.to_string())?;
                Err(e)
            }
        }
    }

    /// Stop a workspace: `running → stopping → stopped`, or `→ error`.
    pub async fn stop_workspace(&self, id: &str) -> Result<()> {
        if !self.store.write().begin_stop(id)? {
            debug!(workspace = %id, "stop already in flight");
            return Ok(());
        }
        match self.backend.stop_workspace(id).await {
            Ok(()) => {
                self.store.write().complete_stop(id)?;
                Ok(())
            }
            Err(e) => {
                self.store.write().fail(id, &e.to_string())?;
                Err(e)
            }
        }
    }

    /// One status poll. A failed poll is logged and swallowed — the previous
    /// status stays visible (stale-but-available) until the next interval.
    pub async fn refresh_status(&self, id: &str) {
        match self.backend.fetch_status(id).await {
            Ok(report) => {
                let mut store = self.store.write();
                match store.get_mut(id) {
                    Ok(ws) => ws.apply_status_report(report.status, report.runtime_detailed),
                    Err(_) => debug!(workspace = %id, "status for removed workspace dropped"),
                }
            }
            Err(e) => {
                warn!(
                    workspace = %id,
                    category = ?classify_error(&e),
                    "status poll failed, keeping previous status: {e}"
                );
            }
        }
    }

    // -----------------------------------------------------------------------
    // Editor save round trip
    // -----------------------------------------------------------------------

    /// Persist an editor pane's content. On success the pane is marked
    /// clean; on failure `dirty` stays set and the error is returned — the
    /// user re-saves manually, there is no auto-retry.
    pub async fn save_editor_content(&self, pane_id: &str) -> Result<()> {
        let (workspace_id, path, content) = {
            let store = self.store.read();
            let ws = store.selected().context("No workspace is selected")?;
            let pane = ws
                .rooms
                .iter()
                .find_map(|r| r.pane(pane_id))
                .with_context(|| format!("No such pane: {pane_id}"))?;
            let (path, content) = pane
                .editor_content()
                .with_context(|| format!("Pane {pane_id} is not an editor pane"))?;
            (ws.id.clone(), path.to_string(), content.to_string())
        };

        self.backend
            .save_file(&workspace_id, &path, &content)
            .await?;
        self.store.write().mark_editor_saved(pane_id)?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // File tree
    // -----------------------------------------------------------------------

    /// Load one level of a folder's children into the selected workspace's
    /// tree. Safe to call redundantly (an expand re-issued while a load is in
    /// flight): the replace is idempotent and completions that lost the race
    /// are discarded by sequence number. Returns whether the result applied.
    pub async fn load_directory_children(&self, path: &str) -> Result<bool> {
        let (workspace_id, ticket) = {
            let mut store = self.store.write();
            let ws = store.selected_mut()?;
            let ticket = ws.file_tree.begin_load(path)?;
            (ws.id.clone(), ticket)
        };

        let entries = self.backend.list_dir(&workspace_id, path).await?;
        let nodes: Vec<FileNode> = entries
            .into_iter()
            .map(|e| match e.kind {
                NodeKind::File => FileNode::file(e.name, e.path),
                NodeKind::Folder => FileNode::folder(e.name, e.path),
            })
            .collect();

        let mut store = self.store.write();
        match store.get_mut(&workspace_id) {
            Ok(ws) => ws.file_tree.apply_children(&ticket, nodes),
            // Workspace deleted while the listing was in flight.
            Err(_) => Ok(false),
        }
    }

    /// Create a file or folder: optimistic tree insert, reconciled against
    /// the backend (confirmed, or rolled back on rejection). `parent` of
    /// `None` targets the tree root. Returns the new entry's path.
    pub async fn add_file_node(
        &self,
        parent: Option<&str>,
        kind: NodeKind,
        name: &str,
    ) -> Result<String> {
        let parent = parent.unwrap_or("");
        let path = if parent.is_empty() {
            name.to_string()
        } else {
            format!("{parent}/{name}")
        };

        let (workspace_id, op_id) = {
            let mut store = self.store.write();
            let ws = store.selected_mut()?;
            let ws_id = ws.id.clone();
            let mut overlays = self.overlays.lock();
            let overlay = overlays.entry(ws_id.clone()).or_default();
            let op_id = overlay.apply_add(&mut ws.file_tree, parent, kind, name)?;
            (ws_id, op_id)
        };

        match self.backend.create_entry(&workspace_id, &path, kind).await {
            Ok(()) => {
                self.confirm(&workspace_id, &op_id)?;
                Ok(path)
            }
            Err(e) => {
                self.rollback(&workspace_id, &op_id);
                Err(e)
            }
        }
    }

    /// Rename an entry optimistically; reconciled like
    /// [`Self::add_file_node`]. Returns the entry's new path.
    pub async fn rename_file_node(&self, path: &str, new_name: &str) -> Result<String> {
        let parent = path.rsplit_once('/').map(|(p, _)| p).unwrap_or("");
        let new_path = if parent.is_empty() {
            new_name.to_string()
        } else {
            format!("{parent}/{new_name}")
        };

        let (workspace_id, op_id) = {
            let mut store = self.store.write();
            let ws = store.selected_mut()?;
            let ws_id = ws.id.clone();
            let mut overlays = self.overlays.lock();
            let overlay = overlays.entry(ws_id.clone()).or_default();
            let op_id = overlay.apply_rename(&mut ws.file_tree, path, new_name)?;
            (ws_id, op_id)
        };

        match self.backend.rename_entry(&workspace_id, path, new_name).await {
            Ok(()) => {
                self.confirm(&workspace_id, &op_id)?;
                Ok(new_path)
            }
            Err(e) => {
                self.rollback(&workspace_id, &op_id);
                Err(e)
            }
        }
    }

    /// Delete an entry optimistically (recursive for folders); a backend
    /// rejection restores the whole subtree.
    pub async fn delete_file_node(&self, path: &str) -> Result<()> {
        let (workspace_id, op_id) = {
            let mut store = self.store.write();
            let ws = store.selected_mut()?;
            let ws_id = ws.id.clone();
            let mut overlays = self.overlays.lock();
            let overlay = overlays.entry(ws_id.clone()).or_default();
            let op_id = overlay.apply_delete(&mut ws.file_tree, path)?;
            (ws_id, op_id)
        };

        match self.backend.delete_entry(&workspace_id, path).await {
            Ok(()) => self.confirm(&workspace_id, &op_id),
            Err(e) => {
                self.rollback(&workspace_id, &op_id);
                Err(e)
            }
        }
    }

    fn confirm(&self, workspace_id: &str, op_id: &str) -> Result<()> {
        self.overlays
            .lock()
            .get_mut(workspace_id)
            .with_context(|| format!("No overlay for workspace {workspace_id}"))?
            .confirm(op_id)
    }

    fn rollback(&self, workspace_id: &str, op_id: &str) {
        let mut store = self.store.write();
        let mut overlays = self.overlays.lock();
        let (Ok(ws), Some(overlay)) = (store.get_mut(workspace_id), overlays.get_mut(workspace_id))
        else {
            debug!(workspace = %workspace_id, "rollback target gone; nothing to restore");
            return;
        };
        if let Err(e) = overlay.rollback(&mut ws.file_tree, op_id) {
            warn!(workspace = %workspace_id, op = %op_id, "rollback failed: {e}");
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{FileEntry, StatusReport};
    use crate::preview::BrowserInstance;
    use async_trait::async_trait;
    use atrium_core::workspace::WorkspaceStatus;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// In-memory backend with per-call failure switches.
    #[derive(Default)]
    struct FakeBackend {
        fail_start: bool,
        fail_stop: bool,
        fail_save: bool,
        fail_entries: bool,
        fail_status: bool,
        entries: Vec<FileEntry>,
        start_calls: AtomicUsize,
        saved: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl WorkspaceBackend for FakeBackend {
        async fn fetch_status(&self, _workspace_id: &str) -> Result<StatusReport> {
            if self.fail_status {
                anyhow::bail!("connection refused");
            }
            Ok(StatusReport {
                status: WorkspaceStatus::Running,
                runtime: None,
                runtime_detailed: None,
            })
        }
        async fn start_workspace(&self, _workspace_id: &str) -> Result<()> {
            self.start_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_start {
                anyhow::bail!("container exited with code 125");
            }
            Ok(())
        }
        async fn stop_workspace(&self, _workspace_id: &str) -> Result<()> {
            if self.fail_stop {
                anyhow::bail!("stop timed out");
            }
            Ok(())
        }
        async fn save_file(&self, _workspace_id: &str, path: &str, content: &str) -> Result<()> {
            if self.fail_save {
                anyhow::bail!("disk full");
            }
            self.saved
                .lock()
                .push((path.to_string(), content.to_string()));
            Ok(())
        }
        async fn list_dir(&self, _workspace_id: &str, _path: &str) -> Result<Vec<FileEntry>> {
            Ok(self.entries.clone())
        }
        async fn create_entry(
            &self,
            _workspace_id: &str,
            _path: &str,
            _kind: NodeKind,
        ) -> Result<()> {
            if self.fail_entries {
                anyhow::bail!("permission denied");
            }
            Ok(())
        }
        async fn rename_entry(
            &self,
            _workspace_id: &str,
            _path: &str,
            _new_name: &str,
        ) -> Result<()> {
            if self.fail_entries {
                anyhow::bail!("permission denied");
            }
            Ok(())
        }
        async fn delete_entry(&self, _workspace_id: &str, _path: &str) -> Result<()> {
            if self.fail_entries {
                anyhow::bail!("permission denied");
            }
            Ok(())
        }
        async fn list_browsers(&self, _conversation_id: &str) -> Result<Vec<BrowserInstance>> {
            Ok(Vec::new())
        }
    }

    fn service_with(backend: FakeBackend) -> (WorkspaceService, String, Arc<FakeBackend>) {
        let mut store = WorkspaceStore::new();
        let id = store.create_workspace("demo").unwrap();
        let backend = Arc::new(backend);
        let service = WorkspaceService::new(
            Arc::new(RwLock::new(store)),
            Arc::clone(&backend) as Arc<dyn WorkspaceBackend>,
        );
        (service, id, backend)
    }

    #[tokio::test]
    async fn start_walks_through_starting_to_running() {
        let (service, id, _) = service_with(FakeBackend::default());

        service.start_workspace(&id).await.unwrap();
        let store = service.store();
        let store = store.read();
        assert_eq!(store.get(&id).unwrap().status, WorkspaceStatus::Running);
    }

    #[tokio::test]
    async fn start_failure_surfaces_error_detail() {
        let (service, id, _) = service_with(FakeBackend {
            fail_start: true,
            ..Default::default()
        });

        assert!(service.start_workspace(&id).await.is_err());
        let store = service.store();
        let store = store.read();
        let ws = store.get(&id).unwrap();
        assert_eq!(ws.status, WorkspaceStatus::Error);
        assert!(ws.last_error().unwrap().contains("code 125"));
    }

    #[tokio::test]
    async fn start_while_starting_skips_backend_call() {
        let (service, id, backend) = service_with(FakeBackend::default());
        // A start is already in flight.
        service.store().write().begin_start(&id).unwrap();

        service.start_workspace(&id).await.unwrap();
        {
            let store = service.store();
            let store = store.read();
            assert_eq!(store.get(&id).unwrap().status, WorkspaceStatus::Starting);
        }
        assert_eq!(backend.start_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn stop_failure_surfaces_error() {
        let (service, id, _) = service_with(FakeBackend {
            fail_stop: true,
            ..Default::default()
        });
        service.start_workspace(&id).await.unwrap();

        assert!(service.stop_workspace(&id).await.is_err());
        let store = service.store();
        let store = store.read();
        assert_eq!(store.get(&id).unwrap().status, WorkspaceStatus::Error);
    }

    #[tokio::test]
    async fn failed_status_poll_keeps_previous_status() {
        let (service, id, _) = service_with(FakeBackend {
            fail_status: true,
            ..Default::default()
        });

        service.refresh_status(&id).await;
        let store = service.store();
        let store = store.read();
        assert_eq!(store.get(&id).unwrap().status, WorkspaceStatus::Stopped);
    }

    #[tokio::test]
    async fn successful_status_poll_applies_report() {
        let (service, id, _) = service_with(FakeBackend::default());

        service.refresh_status(&id).await;
        let store = service.store();
        let store = store.read();
        assert_eq!(store.get(&id).unwrap().status, WorkspaceStatus::Running);
    }

    #[tokio::test]
    async fn save_clears_dirty_on_success_only() {
        let (service, _id, backend) = service_with(FakeBackend::default());
        let pane = service
            .store()
            .write()
            .open_editor("src/lib.rs", "v1")
            .unwrap();
        service
            .store()
            .write()
            .update_editor_content(&pane, "v2")
            .unwrap();

        service.save_editor_content(&pane).await.unwrap();
        {
            let store = service.store();
            let store = store.read();
            let room = store.current_room().unwrap();
            assert_eq!(room.pane(&pane).unwrap().editor_dirty(), Some(false));
        }
        assert_eq!(
            backend.saved.lock().as_slice(),
            &[("src/lib.rs".to_string(), "v2".to_string())]
        );
    }

    #[tokio::test]
    async fn failed_save_keeps_dirty() {
        let (service, _id, _) = service_with(FakeBackend {
            fail_save: true,
            ..Default::default()
        });
        let pane = service
            .store()
            .write()
            .open_editor("src/lib.rs", "v1")
            .unwrap();
        service
            .store()
            .write()
            .update_editor_content(&pane, "v2")
            .unwrap();

        assert!(service.save_editor_content(&pane).await.is_err());
        let store = service.store();
        let store = store.read();
        let room = store.current_room().unwrap();
        assert_eq!(room.pane(&pane).unwrap().editor_dirty(), Some(true));
    }

    #[tokio::test]
    async fn directory_loads_are_idempotent() {
        let (service, id, _) = service_with(FakeBackend {
            entries: vec![
                FileEntry {
                    name: "src".into(),
                    path: "src".into(),
                    kind: NodeKind::Folder,
                },
                FileEntry {
                    name: "README.md".into(),
                    path: "README.md".into(),
                    kind: NodeKind::File,
                },
            ],
            ..Default::default()
        });

        assert!(service.load_directory_children("").await.unwrap());
        assert!(service.load_directory_children("").await.unwrap());

        let store = service.store();
        let store = store.read();
        let ws = store.get(&id).unwrap();
        assert_eq!(ws.file_tree.root().children.len(), 2);
        assert_eq!(ws.file_tree.root().children[0].name, "src");
    }

    #[tokio::test]
    async fn add_file_node_confirms_on_success() {
        let (service, id, _) = service_with(FakeBackend::default());

        let path = service
            .add_file_node(None, NodeKind::File, "notes.md")
            .await
            .unwrap();
        assert_eq!(path, "notes.md");

        let store = service.store();
        let store = store.read();
        assert!(store.get(&id).unwrap().file_tree.find("notes.md").is_some());
    }

    #[tokio::test]
    async fn rejected_add_rolls_back() {
        let (service, id, _) = service_with(FakeBackend {
            fail_entries: true,
            ..Default::default()
        });

        assert!(service
            .add_file_node(None, NodeKind::File, "notes.md")
            .await
            .is_err());
        let store = service.store();
        let store = store.read();
        assert!(store.get(&id).unwrap().file_tree.find("notes.md").is_none());
    }

    #[tokio::test]
    async fn rejected_delete_restores_subtree() {
        let (service, id, _) = service_with(FakeBackend {
            entries: vec![FileEntry {
                name: "src".into(),
                path: "src".into(),
                kind: NodeKind::Folder,
            }],
            ..Default::default()
        });
        service.load_directory_children("").await.unwrap();

        // The failing delete uses its own backend against the shared store.
        let store = service.store();
        let failing = WorkspaceService::new(
            Arc::clone(&store),
            Arc::new(FakeBackend {
                fail_entries: true,
                ..Default::default()
            }),
        );
        assert!(failing.delete_file_node("src").await.is_err());

        let store = store.read();
        assert!(store.get(&id).unwrap().file_tree.find("src").is_some());
    }

    #[tokio::test]
    async fn rename_confirms_and_returns_new_path() {
        let (service, id, _) = service_with(FakeBackend {
            entries: vec![FileEntry {
                name: "main.rs".into(),
                path: "main.rs".into(),
                kind: NodeKind::File,
            }],
            ..Default::default()
        });
        service.load_directory_children("").await.unwrap();

        let new_path = service.rename_file_node("main.rs", "app.rs").await.unwrap();
        assert_eq!(new_path, "app.rs");

        let store = service.store();
        let store = store.read();
        let tree = &store.get(&id).unwrap().file_tree;
        assert!(tree.find("app.rs").is_some());
        assert!(tree.find("main.rs").is_none());
    }
}
