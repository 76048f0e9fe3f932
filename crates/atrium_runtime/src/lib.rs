pub mod backend;
pub mod link;
pub mod preview;
pub mod service;
pub mod terminal;

pub use backend::{FileEntry, HttpBackend, StatusReport, WorkspaceBackend};
pub use link::{
    LinkState, LinkSupervisor, PreviewLink, PreviewStream, PreviewTransport, ScheduledReconnect,
    WsTransport,
};
pub use preview::{BrowserInstance, BrowserStatus, BrowserTab, PreviewEvent, PreviewRegistry};
pub use service::WorkspaceService;
pub use terminal::{TermKey, TerminalLink, TerminalRegistry};
