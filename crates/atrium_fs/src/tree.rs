use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::debug;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Node types
// ---------------------------------------------------------------------------

/// Whether a tree node is a file or a folder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    File,
    Folder,
}

/// One node in the workspace file tree.
///
/// Paths are slash-separated and relative to the tree root (`"src/main.rs"`).
/// For a folder, `children == []` is ambiguous between "empty" and "not yet
/// fetched"; the tree resolves this by tracking loaded folders separately
/// (see [`FileTree::needs_load`]).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileNode {
    pub id: String,
    pub name: String,
    pub path: String,
    pub kind: NodeKind,
    pub children: Vec<FileNode>,
}

impl FileNode {
    /// Create a file node.
    pub fn file(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            path: path.into(),
            kind: NodeKind::File,
            children: Vec::new(),
        }
    }

    /// Create a folder node with no (unfetched) children.
    pub fn folder(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            path: path.into(),
            kind: NodeKind::Folder,
            children: Vec::new(),
        }
    }

    pub fn is_folder(&self) -> bool {
        self.kind == NodeKind::Folder
    }

    fn find(&self, path: &str) -> Option<&FileNode> {
        if self.path == path {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find(path))
    }

    fn find_mut(&mut self, path: &str) -> Option<&mut FileNode> {
        if self.path == path {
            return Some(self);
        }
        self.children.iter_mut().find_map(|c| c.find_mut(path))
    }

    fn find_by_id_mut(&mut self, id: &str) -> Option<&mut FileNode> {
        if self.id == id {
            return Some(self);
        }
        self.children.iter_mut().find_map(|c| c.find_by_id_mut(id))
    }

    /// Collect the ids of this node and every descendant.
    fn collect_ids(&self, out: &mut Vec<String>) {
        out.push(self.id.clone());
        for child in &self.children {
            child.collect_ids(out);
        }
    }

    /// Rewrite this node's path prefix after a rename or move.
    fn rewrite_prefix(&mut self, old_prefix: &str, new_prefix: &str) {
        if let Some(rest) = self.path.strip_prefix(old_prefix) {
            self.path = format!("{new_prefix}{rest}");
        }
        for child in &mut self.children {
            child.rewrite_prefix(old_prefix, new_prefix);
        }
    }
}

/// Join a parent path and a child name into the child's full path.
pub(crate) fn join_path(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_string()
    } else {
        format!("{parent}/{name}")
    }
}

/// The parent path of a node path (`""` for top-level entries).
fn parent_path(path: &str) -> &str {
    path.rsplit_once('/').map(|(p, _)| p).unwrap_or("")
}

/// Folders first, then case-sensitive name order — the order the explorer
/// displays and the backend returns.
fn sort_children(children: &mut [FileNode]) {
    children.sort_by(|a, b| {
        b.is_folder()
            .cmp(&a.is_folder())
            .then_with(|| a.name.cmp(&b.name))
    });
}

// ---------------------------------------------------------------------------
// LoadTicket
// ---------------------------------------------------------------------------

/// Handle for one in-flight directory load.
///
/// Carries the target folder's node id (rename-safe) and a per-folder
/// monotonic sequence number. Only the latest ticket issued for a folder may
/// apply its result; earlier tickets that complete late are discarded, so a
/// stale refresh can never clobber a newer state of the tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadTicket {
    pub node_id: String,
    pub seq: u64,
}

// ---------------------------------------------------------------------------
// FileTree
// ---------------------------------------------------------------------------

/// Lazily-loaded file tree for one workspace.
///
/// Folders are fetched one level at a time. The tree records which folders
/// have been loaded (so the `children == []` sentinel stays unambiguous) and
/// hands out sequence-numbered [`LoadTicket`]s so out-of-order network
/// completions apply last-write-wins per folder, not per call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileTree {
    root: FileNode,
    #[serde(skip)]
    loaded: HashSet<String>,
    #[serde(skip)]
    seq: HashMap<String, u64>,
}

impl FileTree {
    /// Create a tree with an empty, unloaded root folder.
    pub fn new() -> Self {
        Self {
            root: FileNode::folder("", ""),
            loaded: HashSet::new(),
            seq: HashMap::new(),
        }
    }

    pub fn root(&self) -> &FileNode {
        &self.root
    }

    /// Look up a node by path. The empty path is the root.
    pub fn find(&self, path: &str) -> Option<&FileNode> {
        self.root.find(path)
    }

    /// Whether expanding this folder should issue a load request.
    ///
    /// True for a folder that has never had a completed load, regardless of
    /// whether `children` is empty — the request itself is idempotent, so
    /// issuing it redundantly is safe.
    pub fn needs_load(&self, path: &str) -> bool {
        match self.find(path) {
            Some(node) => node.is_folder() && !self.loaded.contains(&node.id),
            None => false,
        }
    }

    /// Begin a directory load, allocating the next sequence number for the
    /// folder. The returned ticket must be passed to [`Self::apply_children`].
    pub fn begin_load(&mut self, path: &str) -> Result<LoadTicket> {
        let node = self
            .root
            .find(path)
            .with_context(|| format!("No such folder: {path}"))?;
        if !node.is_folder() {
            bail!("Not a folder: {path}");
        }
        let node_id = node.id.clone();
        let seq = self.seq.entry(node_id.clone()).or_insert(0);
        *seq += 1;
        debug!(path, seq = *seq, "directory load started");
        Ok(LoadTicket {
            node_id,
            seq: *seq,
        })
    }

    /// Apply the result of a directory load.
    ///
    /// Replaces the folder's children wholesale (never appends, so redundant
    /// calls with the same entries converge to the same set). Returns `false`
    /// when the result was discarded: the ticket is stale (a newer load was
    /// issued for the folder) or the folder no longer exists.
    pub fn apply_children(&mut self, ticket: &LoadTicket, mut entries: Vec<FileNode>) -> Result<bool> {
        let latest = self.seq.get(&ticket.node_id).copied().unwrap_or(0);
        if ticket.seq != latest {
            debug!(seq = ticket.seq, latest, "discarding stale directory load");
            return Ok(false);
        }
        let Some(node) = self.root.find_by_id_mut(&ticket.node_id) else {
            debug!("discarding directory load for removed folder");
            return Ok(false);
        };
        sort_children(&mut entries);
        node.children = entries;
        self.loaded.insert(ticket.node_id.clone());
        Ok(true)
    }

    /// Insert a new child under a folder. Fails on unknown parent, non-folder
    /// parent, or sibling name collision.
    pub fn insert_child(&mut self, parent: &str, node: FileNode) -> Result<()> {
        let parent_node = self
            .root
            .find_mut(parent)
            .with_context(|| format!("No such folder: {parent}"))?;
        if !parent_node.is_folder() {
            bail!("Not a folder: {parent}");
        }
        if parent_node.children.iter().any(|c| c.name == node.name) {
            bail!("Entry already exists: {}", node.path);
        }
        parent_node.children.push(node);
        sort_children(&mut parent_node.children);
        Ok(())
    }

    /// Rename a node in place, rewriting its own path and the paths of every
    /// descendant. Returns the node's new path.
    pub fn rename(&mut self, path: &str, new_name: &str) -> Result<String> {
        if new_name.trim().is_empty() || new_name.contains('/') {
            bail!("Invalid entry name: {new_name:?}");
        }
        if path.is_empty() {
            bail!("Cannot rename the tree root");
        }
        let parent = parent_path(path).to_string();
        let new_path = join_path(&parent, new_name);
        let parent_node = self
            .root
            .find_mut(&parent)
            .with_context(|| format!("No such folder: {parent}"))?;
        if parent_node
            .children
            .iter()
            .any(|c| c.name == new_name && c.path != path)
        {
            bail!("Entry already exists: {new_path}");
        }
        let node = parent_node
            .children
            .iter_mut()
            .find(|c| c.path == path)
            .with_context(|| format!("No such entry: {path}"))?;
        node.name = new_name.to_string();
        node.rewrite_prefix(path, &new_path);
        sort_children(&mut parent_node.children);
        debug!(from = path, to = %new_path, "renamed entry");
        Ok(new_path)
    }

    /// Remove a node (recursively, for folders) and return the detached
    /// subtree. Load bookkeeping for the subtree is pruned.
    pub fn remove(&mut self, path: &str) -> Result<FileNode> {
        if path.is_empty() {
            bail!("Cannot remove the tree root");
        }
        let parent = parent_path(path).to_string();
        let parent_node = self
            .root
            .find_mut(&parent)
            .with_context(|| format!("No such folder: {parent}"))?;
        let idx = parent_node
            .children
            .iter()
            .position(|c| c.path == path)
            .with_context(|| format!("No such entry: {path}"))?;
        let node = parent_node.children.remove(idx);

        let mut ids = Vec::new();
        node.collect_ids(&mut ids);
        for id in &ids {
            self.loaded.remove(id);
            self.seq.remove(id);
        }
        debug!(path, "removed entry");
        Ok(node)
    }
}

impl Default for FileTree {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
