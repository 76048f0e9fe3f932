use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::tree::{join_path, FileNode, FileTree, NodeKind};

// ---------------------------------------------------------------------------
// Pending operations
// ---------------------------------------------------------------------------

/// A tree mutation that has been applied locally but not yet confirmed by the
/// backend. Carries what is needed to invert it on rollback.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "op")]
pub enum PendingOp {
    Add {
        path: String,
    },
    Rename {
        old_path: String,
        new_path: String,
    },
    Delete {
        parent: String,
        /// The detached subtree, kept whole so a failed recursive delete can
        /// be restored in one piece.
        node: FileNode,
    },
}

impl PendingOp {
    /// The path this operation touches, for display in the explorer.
    pub fn path(&self) -> &str {
        match self {
            Self::Add { path } => path,
            Self::Rename { new_path, .. } => new_path,
            Self::Delete { node, .. } => &node.path,
        }
    }
}

// ---------------------------------------------------------------------------
// MutationOverlay
// ---------------------------------------------------------------------------

/// Optimistic-mutation overlay for a [`FileTree`].
///
/// Explorer actions mutate the tree immediately and register a pending
/// operation here; when the backend answers, the operation is either
/// confirmed (record dropped, tree already correct) or rolled back (inverse
/// mutation restores the prior tree). The canonical tree is therefore never
/// left diverged from the backend after a failure.
#[derive(Debug, Default)]
pub struct MutationOverlay {
    pending: HashMap<String, PendingOp>,
}

impl MutationOverlay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Optimistically create a file or folder under `parent`.
    ///
    /// Returns the operation id to confirm or roll back against.
    pub fn apply_add(
        &mut self,
        tree: &mut FileTree,
        parent: &str,
        kind: NodeKind,
        name: &str,
    ) -> Result<String> {
        if name.trim().is_empty() || name.contains('/') {
            bail!("Invalid entry name: {name:?}");
        }
        let path = join_path(parent, name);
        let node = match kind {
            NodeKind::File => FileNode::file(name, path.clone()),
            NodeKind::Folder => FileNode::folder(name, path.clone()),
        };
        tree.insert_child(parent, node)?;

        let op_id = Uuid::new_v4().to_string();
        debug!(op = %op_id, %path, "optimistic add");
        self.pending.insert(op_id.clone(), PendingOp::Add { path });
        Ok(op_id)
    }

    /// Optimistically rename an entry.
    pub fn apply_rename(
        &mut self,
        tree: &mut FileTree,
        path: &str,
        new_name: &str,
    ) -> Result<String> {
        let new_path = tree.rename(path, new_name)?;

        let op_id = Uuid::new_v4().to_string();
        debug!(op = %op_id, from = path, to = %new_path, "optimistic rename");
        self.pending.insert(
            op_id.clone(),
            PendingOp::Rename {
                old_path: path.to_string(),
                new_path,
            },
        );
        Ok(op_id)
    }

    /// Optimistically delete an entry (recursive for folders).
    pub fn apply_delete(&mut self, tree: &mut FileTree, path: &str) -> Result<String> {
        let parent = path.rsplit_once('/').map(|(p, _)| p).unwrap_or("").to_string();
        let node = tree.remove(path)?;

        let op_id = Uuid::new_v4().to_string();
        debug!(op = %op_id, path, "optimistic delete");
        self.pending
            .insert(op_id.clone(), PendingOp::Delete { parent, node });
        Ok(op_id)
    }

    /// The backend accepted the operation; the optimistic state is canonical.
    pub fn confirm(&mut self, op_id: &str) -> Result<()> {
        self.pending
            .remove(op_id)
            .with_context(|| format!("Unknown pending operation: {op_id}"))?;
        Ok(())
    }

    /// The backend rejected the operation; restore the prior tree.
    pub fn rollback(&mut self, tree: &mut FileTree, op_id: &str) -> Result<()> {
        let op = self
            .pending
            .remove(op_id)
            .with_context(|| format!("Unknown pending operation: {op_id}"))?;

        match op {
            PendingOp::Add { path } => {
                tree.remove(&path)
                    .with_context(|| format!("Rollback of add failed for {path}"))?;
            }
            PendingOp::Rename { old_path, new_path } => {
                let old_name = old_path.rsplit('/').next().unwrap_or(&old_path);
                tree.rename(&new_path, old_name)
                    .with_context(|| format!("Rollback of rename failed for {new_path}"))?;
            }
            PendingOp::Delete { parent, node } => {
                let path = node.path.clone();
                tree.insert_child(&parent, node)
                    .with_context(|| format!("Rollback of delete failed for {path}"))?;
            }
        }
        warn!(op = %op_id, "rolled back rejected tree mutation");
        Ok(())
    }

    /// Number of operations still awaiting a backend answer.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Iterate pending operations (id, op), unordered.
    pub fn pending_ops(&self) -> impl Iterator<Item = (&str, &PendingOp)> {
        self.pending.iter().map(|(id, op)| (id.as_str(), op))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn loaded_tree() -> FileTree {
        let mut tree = FileTree::new();
        let t = tree.begin_load("").unwrap();
        tree.apply_children(&t, vec![FileNode::folder("src", "src")])
            .unwrap();
        let t = tree.begin_load("src").unwrap();
        tree.apply_children(
            &t,
            vec![
                FileNode::file("main.rs", "src/main.rs"),
                FileNode::folder("util", "src/util"),
            ],
        )
        .unwrap();
        let t = tree.begin_load("src/util").unwrap();
        tree.apply_children(&t, vec![FileNode::file("mod.rs", "src/util/mod.rs")])
            .unwrap();
        tree
    }

    #[test]
    fn add_then_confirm() {
        let mut tree = loaded_tree();
        let mut overlay = MutationOverlay::new();

        let op = overlay
            .apply_add(&mut tree, "src", NodeKind::File, "new.rs")
            .unwrap();
        assert!(tree.find("src/new.rs").is_some());
        assert_eq!(overlay.pending_count(), 1);

        overlay.confirm(&op).unwrap();
        assert!(tree.find("src/new.rs").is_some());
        assert_eq!(overlay.pending_count(), 0);
    }

    #[test]
    fn add_then_rollback() {
        let mut tree = loaded_tree();
        let mut overlay = MutationOverlay::new();

        let op = overlay
            .apply_add(&mut tree, "src", NodeKind::Folder, "tmp")
            .unwrap();
        assert!(tree.find("src/tmp").is_some());

        overlay.rollback(&mut tree, &op).unwrap();
        assert!(tree.find("src/tmp").is_none());
        assert_eq!(overlay.pending_count(), 0);
    }

    #[test]
    fn rename_then_rollback() {
        let mut tree = loaded_tree();
        let mut overlay = MutationOverlay::new();

        let op = overlay
            .apply_rename(&mut tree, "src/main.rs", "app.rs")
            .unwrap();
        assert!(tree.find("src/app.rs").is_some());
        assert!(tree.find("src/main.rs").is_none());

        overlay.rollback(&mut tree, &op).unwrap();
        assert!(tree.find("src/main.rs").is_some());
        assert!(tree.find("src/app.rs").is_none());
    }

    #[test]
    fn delete_rollback_restores_recursive_subtree() {
        let mut tree = loaded_tree();
        let mut overlay = MutationOverlay::new();

        let op = overlay.apply_delete(&mut tree, "src").unwrap();
        assert!(tree.find("src").is_none());
        assert!(tree.find("src/util/mod.rs").is_none());

        overlay.rollback(&mut tree, &op).unwrap();
        assert!(tree.find("src").is_some());
        assert!(tree.find("src/util").is_some());
        assert!(tree.find("src/util/mod.rs").is_some());
    }

    #[test]
    fn delete_then_confirm_drops_record() {
        let mut tree = loaded_tree();
        let mut overlay = MutationOverlay::new();

        let op = overlay.apply_delete(&mut tree, "src/util").unwrap();
        overlay.confirm(&op).unwrap();
        assert!(tree.find("src/util").is_none());
        assert_eq!(overlay.pending_count(), 0);
    }

    #[test]
    fn unknown_op_ids_error() {
        let mut tree = loaded_tree();
        let mut overlay = MutationOverlay::new();

        assert!(overlay.confirm("nope").is_err());
        assert!(overlay.rollback(&mut tree, "nope").is_err());
    }

    #[test]
    fn add_rejects_bad_names() {
        let mut tree = loaded_tree();
        let mut overlay = MutationOverlay::new();

        assert!(overlay
            .apply_add(&mut tree, "src", NodeKind::File, "")
            .is_err());
        assert!(overlay
            .apply_add(&mut tree, "src", NodeKind::File, "a/b")
            .is_err());
        // Collision with the optimistic state is rejected too.
        overlay
            .apply_add(&mut tree, "src", NodeKind::File, "x.rs")
            .unwrap();
        assert!(overlay
            .apply_add(&mut tree, "src", NodeKind::File, "x.rs")
            .is_err());
    }

    #[test]
    fn pending_ops_expose_paths() {
        let mut tree = loaded_tree();
        let mut overlay = MutationOverlay::new();

        overlay
            .apply_rename(&mut tree, "src/main.rs", "app.rs")
            .unwrap();
        let paths: Vec<&str> = overlay.pending_ops().map(|(_, op)| op.path()).collect();
        assert_eq!(paths, vec!["src/app.rs"]);
    }
}
