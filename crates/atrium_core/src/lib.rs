pub mod chat;
pub mod config;
pub mod error;
pub mod logging;
pub mod pane;
pub mod room;
pub mod session;
pub mod store;
pub mod workspace;

pub use chat::{ChatMessage, ChatSession, MessageRole, ToolEndpoint, ToolSession, ToolStatus};
pub use config::AtriumConfig;
pub use error::{classify_error, AtriumError, ErrorCategory};
pub use pane::{Pane, PaneContent, PaneKind, ToolKind};
pub use room::Room;
pub use session::UiSession;
pub use store::WorkspaceStore;
pub use workspace::{
    ResourceUsage, RuntimeConfig, RuntimeDetailed, RuntimeKind, RuntimeSummary, Workspace,
    WorkspaceAsset, WorkspaceConfig, WorkspaceStatus,
};
