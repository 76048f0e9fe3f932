use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::StreamExt;
use parking_lot::{Mutex, RwLock};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, warn};
use url::Url;

use crate::backend::WorkspaceBackend;
use crate::preview::{PreviewEvent, PreviewRegistry};

// ---------------------------------------------------------------------------
// LinkSupervisor — the reconnect state machine
// ---------------------------------------------------------------------------

/// Connection state of the preview streaming link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Disconnected,
    Connecting,
    Connected,
    ReconnectPending,
}

/// A scheduled reconnect: sleep `delay`, then report back with `token`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduledReconnect {
    pub token: u64,
    pub delay: Duration,
}

/// Pure state machine governing the streaming link's lifecycle.
///
/// Holds a single reconnect-timer slot: every connection loss hands out a new
/// token and invalidates the previous one, so two losses in quick succession
/// leave exactly one live timer. Once disposed, every event is ignored — no
/// state changes after teardown.
#[derive(Debug)]
pub struct LinkSupervisor {
    state: LinkState,
    reconnect_delay: Duration,
    next_token: u64,
    pending_token: Option<u64>,
    disposed: bool,
}

impl LinkSupervisor {
    pub fn new(reconnect_delay: Duration) -> Self {
        Self {
            state: LinkState::Disconnected,
            reconnect_delay,
            next_token: 0,
            pending_token: None,
            disposed: false,
        }
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// The live timer token, when a reconnect is pending.
    pub fn pending_token(&self) -> Option<u64> {
        self.pending_token
    }

    /// Begin a connection attempt. Returns `false` once disposed.
    pub fn connect_requested(&mut self) -> bool {
        if self.disposed {
            return false;
        }
        self.state = LinkState::Connecting;
        true
    }

    /// The connection attempt succeeded.
    pub fn connected(&mut self) {
        if self.disposed {
            return;
        }
        self.state = LinkState::Connected;
    }

    /// The connection errored or closed. Schedules a reconnect after the
    /// fixed delay, cancelling any previously pending timer (its token goes
    /// stale). Returns `None` once disposed.
    pub fn connection_lost(&mut self) -> Option<ScheduledReconnect> {
        if self.disposed {
            return None;
        }
        self.state = LinkState::ReconnectPending;
        self.next_token += 1;
        let token = self.next_token;
        self.pending_token = Some(token);
        Some(ScheduledReconnect {
            token,
            delay: self.reconnect_delay,
        })
    }

    /// A reconnect timer fired. Stale tokens (superseded or cancelled) are
    /// ignored; the live token moves the machine back to connecting and
    /// returns `true`.
    pub fn timer_fired(&mut self, token: u64) -> bool {
        if self.disposed || self.pending_token != Some(token) {
            return false;
        }
        self.pending_token = None;
        self.state = LinkState::Connecting;
        true
    }

    /// Tear the link down. Terminal: every later event is ignored.
    pub fn dispose(&mut self) {
        self.disposed = true;
        self.pending_token = None;
        self.state = LinkState::Disconnected;
    }
}

// ---------------------------------------------------------------------------
// Transport seam
// ---------------------------------------------------------------------------

/// One established streaming connection, read side only.
#[async_trait]
pub trait PreviewStream: Send {
    /// The next decoded event. `None` means the connection closed; `Err`
    /// means it failed. Either way the caller reconnects.
    async fn next_event(&mut self) -> Option<Result<PreviewEvent>>;
}

/// Opens streaming connections scoped to a conversation.
#[async_trait]
pub trait PreviewTransport: Send + Sync {
    async fn connect(&self, conversation_id: &str) -> Result<Box<dyn PreviewStream>>;
}

/// WebSocket transport against the backend's preview endpoint.
pub struct WsTransport {
    base: Url,
}

impl WsTransport {
    /// `base` is the backend's WebSocket origin, e.g. `ws://127.0.0.1:8700`.
    pub fn new(base: Url) -> Self {
        Self { base }
    }

    fn endpoint(&self, conversation_id: &str) -> Result<Url> {
        self.base
            .join(&format!("ws/conversations/{conversation_id}/browsers"))
            .context("Invalid preview endpoint")
    }
}

struct WsStream {
    inner: tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >,
}

#[async_trait]
impl PreviewStream for WsStream {
    async fn next_event(&mut self) -> Option<Result<PreviewEvent>> {
        while let Some(msg) = self.inner.next().await {
            match msg {
                Ok(Message::Text(text)) => match serde_json::from_str::<PreviewEvent>(&text) {
                    Ok(event) => return Some(Ok(event)),
                    Err(e) => {
                        warn!("Bad preview frame: {e}");
                        continue;
                    }
                },
                Ok(Message::Close(_)) => {
                    debug!("preview stream closed by server");
                    return None;
                }
                Ok(_) => continue, // Ignore binary/ping/pong
                Err(e) => return Some(Err(anyhow::Error::from(e))),
            }
        }
        None
    }
}

#[async_trait]
impl PreviewTransport for WsTransport {
    async fn connect(&self, conversation_id: &str) -> Result<Box<dyn PreviewStream>> {
        let url = self.endpoint(conversation_id)?;
        let (stream, _) = connect_async(url.as_str())
            .await
            .with_context(|| format!("Preview connect failed: {url}"))?;
        Ok(Box::new(WsStream { inner: stream }))
    }
}

// ---------------------------------------------------------------------------
// PreviewLink — the driver
// ---------------------------------------------------------------------------

/// Keeps a [`PreviewRegistry`] synchronized with the backend for one
/// conversation: an initial list fetch, then a streaming connection that is
/// re-established after a fixed delay whenever it drops, forever, until
/// disposed.
pub struct PreviewLink {
    conversation_id: String,
    registry: Arc<RwLock<PreviewRegistry>>,
    backend: Arc<dyn WorkspaceBackend>,
    transport: Arc<dyn PreviewTransport>,
    supervisor: Mutex<LinkSupervisor>,
}

impl PreviewLink {
    pub fn new(
        conversation_id: impl Into<String>,
        backend: Arc<dyn WorkspaceBackend>,
        transport: Arc<dyn PreviewTransport>,
        reconnect_delay: Duration,
    ) -> Self {
        let conversation_id = conversation_id.into();
        Self {
            registry: Arc::new(RwLock::new(PreviewRegistry::new(conversation_id.clone()))),
            conversation_id,
            backend,
            transport,
            supervisor: Mutex::new(LinkSupervisor::new(reconnect_delay)),
        }
    }

    pub fn registry(&self) -> Arc<RwLock<PreviewRegistry>> {
        Arc::clone(&self.registry)
    }

    pub fn state(&self) -> LinkState {
        self.supervisor.lock().state()
    }

    /// Tear down: the run loop exits at its next check and no registry
    /// update happens afterwards.
    pub fn dispose(&self) {
        self.supervisor.lock().dispose();
    }

    /// Drive the link until disposed.
    pub async fn run(&self) {
        self.refresh_list().await;

        loop {
            if !self.supervisor.lock().connect_requested() {
                break;
            }
            match self.transport.connect(&self.conversation_id).await {
                Ok(mut stream) => {
                    self.supervisor.lock().connected();
                    debug!(conversation = %self.conversation_id, "preview stream connected");
                    while let Some(event) = stream.next_event().await {
                        if self.supervisor.lock().is_disposed() {
                            return;
                        }
                        match event {
                            Ok(event) => self.apply(event).await,
                            Err(e) => {
                                warn!("Preview stream error: {e}");
                                break;
                            }
                        }
                    }
                }
                Err(e) => {
                    warn!("Preview connect failed: {e}");
                }
            }

            let Some(scheduled) = self.supervisor.lock().connection_lost() else {
                break;
            };
            tokio::time::sleep(scheduled.delay).await;
            if !self.supervisor.lock().timer_fired(scheduled.token) {
                break;
            }
        }
    }

    async fn apply(&self, event: PreviewEvent) {
        match event {
            PreviewEvent::BrowserList { browsers } => {
                self.registry.write().replace_all(browsers);
            }
            PreviewEvent::Screenshot {
                browser_id,
                data,
                url,
                title,
                tabs,
                active_tab,
            } => {
                self.registry
                    .write()
                    .apply_screenshot(&browser_id, data, url, title, tabs, active_tab);
            }
            PreviewEvent::StateChange => {
                self.refresh_list().await;
            }
        }
    }

    /// Fetch the full instance list. Failures are logged and leave the prior
    /// state unchanged (stale-but-available).
    async fn refresh_list(&self) {
        match self.backend.list_browsers(&self.conversation_id).await {
            Ok(browsers) => {
                if !self.supervisor.lock().is_disposed() {
                    self.registry.write().replace_all(browsers);
                }
            }
            Err(e) => warn!("Browser list fetch failed: {e}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
