pub mod overlay;
pub mod tree;

pub use overlay::{MutationOverlay, PendingOp};
pub use tree::{FileNode, FileTree, LoadTicket, NodeKind};
