use crate::config::{ReconnectPolicy, ResumeConfig};
use crate::connection::{close_details, Handshake, Transport, WsReader, ABNORMAL_CLOSE};
use crate::error::{LavalinkError, Result};
use crate::protocol::{Inbound, NodeStats, Outbound, TrackEvent};
use crate::rest::{self, LoadTracksResponse};
use crate::session::{NodeUpdate, Session};
use crate::subscription::PoolEvent;
use crate::types::{GuildId, NodeDescriptor};
use futures_util::StreamExt;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use uuid::Uuid;

/// Guild to session map shared by a pool and all of its nodes
pub(crate) type SessionRegistry = Arc<RwLock<HashMap<GuildId, Session>>>;

/// Pool-wide settings every node of a pool shares
#[derive(Clone)]
pub(crate) struct NodeContext {
    pub user_id: String,
    pub shards: u64,
    /// Resume settings; the key is generated once and reused by every node
    pub resume: Option<Arc<Mutex<ResumeConfig>>>,
    pub sessions: SessionRegistry,
    pub events: broadcast::Sender<PoolEvent>,
    pub http: reqwest::Client,
}

/// Connection to one Lavalink node
///
/// Owns the socket, captures node statistics, and routes player updates and
/// events to the sessions bound to this node.
pub struct NodeConnection {
    descriptor: NodeDescriptor,
    ctx: NodeContext,
    connected: AtomicBool,
    /// Set by a local close so the node does not reconnect
    closing: AtomicBool,
    stats: RwLock<Option<NodeStats>>,
    transport: Mutex<Option<Transport>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl NodeConnection {
    pub(crate) fn new(descriptor: NodeDescriptor, ctx: NodeContext) -> Self {
        Self {
            descriptor,
            ctx,
            connected: AtomicBool::new(false),
            closing: AtomicBool::new(false),
            stats: RwLock::new(None),
            transport: Mutex::new(None),
            task: Mutex::new(None),
        }
    }

    /// Get the node id
    pub fn id(&self) -> &str {
        &self.descriptor.id
    }

    /// Get the static node description
    pub fn descriptor(&self) -> &NodeDescriptor {
        &self.descriptor
    }

    /// Whether the socket is open
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Last statistics reported by the node
    pub fn stats(&self) -> Option<NodeStats> {
        self.stats
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Start the connection task unless one is already running
    pub(crate) fn spawn(self: &Arc<Self>, policy: ReconnectPolicy) {
        let mut task = self.task.lock().unwrap_or_else(PoisonError::into_inner);
        if task.as_ref().is_some_and(|handle| !handle.is_finished()) {
            tracing::debug!("Node {} is already running", self.id());
            return;
        }

        self.closing.store(false, Ordering::SeqCst);
        *task = Some(tokio::spawn(self.clone().run(policy)));
    }

    /// Connection lifecycle: open, serve until closed, then reconnect if the
    /// policy allows it
    async fn run(self: Arc<Self>, policy: ReconnectPolicy) {
        let mut attempt = 0;

        loop {
            match self.open().await {
                Ok(reader) => {
                    attempt = 0;
                    self.serve(reader).await;
                }
                Err(e) => {
                    tracing::error!("Failed to connect to node {}: {}", self.id(), e);
                    self.report(e);
                }
            }

            if self.closing.load(Ordering::SeqCst) {
                break;
            }

            attempt += 1;
            if !policy.allows(attempt) {
                break;
            }

            let delay = policy.backoff(attempt);
            tracing::info!("Reconnecting to node {} in {:?}", self.id(), delay);
            let _ = self.ctx.events.send(PoolEvent::NodeReconnecting {
                node_id: self.id().to_string(),
                attempt,
                delay,
            });
            tokio::time::sleep(delay).await;
        }
    }

    /// Perform the handshake and negotiate resuming
    async fn open(&self) -> Result<WsReader> {
        if self.descriptor.uses_default_password() {
            tracing::warn!(
                "Node {} has no password configured, falling back to the default Lavalink password",
                self.id()
            );
        }

        let resume_key = self.ctx.resume.as_ref().and_then(|resume| {
            resume
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .key
                .clone()
        });

        let (transport, reader) = Transport::open(Handshake {
            url: self.descriptor.websocket_url(),
            password: self.descriptor.effective_password(),
            user_id: &self.ctx.user_id,
            shards: self.ctx.shards,
            resume_key: resume_key.as_deref(),
        })
        .await?;

        if let Some(resume) = &self.ctx.resume {
            let frame = {
                let mut resume = resume.lock().unwrap_or_else(PoisonError::into_inner);
                let key = resume
                    .key
                    .get_or_insert_with(|| Uuid::new_v4().simple().to_string())
                    .clone();
                Outbound::ConfigureResuming {
                    key,
                    timeout: resume.timeout_secs,
                }
            };
            let json = serde_json::to_string(&frame)?;
            tracing::debug!("Sending: {}", json);
            transport.send_text(json)?;
        }

        *self.transport.lock().unwrap_or_else(PoisonError::into_inner) = Some(transport);
        self.connected.store(true, Ordering::SeqCst);

        tracing::info!("Connected to node {}", self.id());
        let _ = self.ctx.events.send(PoolEvent::NodeConnected {
            node_id: self.id().to_string(),
        });

        Ok(reader)
    }

    /// Read frames until the socket ends
    async fn serve(&self, mut reader: WsReader) {
        let mut close = None;

        while let Some(msg_result) = reader.next().await {
            match msg_result {
                Ok(Message::Text(text)) => self.handle_frame(&text),
                Ok(Message::Binary(data)) => match String::from_utf8(data) {
                    Ok(text) => self.handle_frame(&text),
                    Err(e) => self.report(LavalinkError::Decode(e.to_string())),
                },
                Ok(Message::Close(frame)) => {
                    tracing::info!("Node {} sent close: {:?}", self.id(), frame);
                    // Keep reading so the close handshake completes
                    close = Some(close_details(frame));
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::error!("WebSocket error on node {}: {}", self.id(), e);
                    self.report(LavalinkError::WebSocket(e));
                }
            }
        }

        let (code, reason) = close.unwrap_or((ABNORMAL_CLOSE, String::new()));
        self.mark_closed(code, reason);
    }

    fn mark_closed(&self, code: u16, reason: String) {
        self.connected.store(false, Ordering::SeqCst);
        self.transport
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        tracing::info!("Node {} closed ({}): {}", self.id(), code, reason);
        let _ = self.ctx.events.send(PoolEvent::NodeClosed {
            node_id: self.id().to_string(),
            code,
            reason,
        });
    }

    /// Decode one inbound frame and apply it
    pub(crate) fn handle_frame(&self, text: &str) {
        tracing::debug!("Received from {}: {}", self.id(), text);

        let inbound = match Inbound::decode(text) {
            Ok(inbound) => inbound,
            Err(e) => {
                tracing::warn!("Could not parse frame from node {}: {}", self.id(), e);
                self.report(e);
                return;
            }
        };

        let session = inbound.guild_id().and_then(|guild_id| self.session_for(guild_id));

        match inbound {
            Inbound::Stats(stats) => {
                *self.stats.write().unwrap_or_else(PoisonError::into_inner) = Some(stats);
            }
            Inbound::PlayerUpdate(update) => {
                if let (Some(position), Some(session)) = (update.state.position, session) {
                    session.apply(NodeUpdate::Position(position));
                }
            }
            Inbound::Event(frame) => {
                if frame.event == TrackEvent::Unknown {
                    tracing::warn!("Unknown event type, here is the raw data: {}", text);
                    return;
                }
                if let Some(session) = session {
                    session.apply(NodeUpdate::Event(frame.event));
                }
            }
            Inbound::Other(op) => {
                tracing::debug!("Ignoring op {} from node {}", op, self.id());
            }
        }
    }

    /// Session for a guild, if it exists and is bound to this node
    fn session_for(&self, guild_id: &str) -> Option<Session> {
        let sessions = self
            .ctx
            .sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner);

        match sessions.get(guild_id) {
            Some(session) if session.node_id() == self.id() => Some(session.clone()),
            Some(_) => {
                tracing::debug!(
                    "Dropping frame for guild {}: session is bound to another node",
                    guild_id
                );
                None
            }
            None => {
                tracing::debug!("Dropping frame for unknown guild {}", guild_id);
                None
            }
        }
    }

    fn report(&self, error: LavalinkError) {
        let _ = self.ctx.events.send(PoolEvent::NodeError {
            node_id: self.id().to_string(),
            error: Arc::new(error),
        });
    }

    /// Send a frame to the node
    ///
    /// Fails with `NotConnected` if the socket is not open; frames are not
    /// buffered until the node connects.
    pub fn send(&self, frame: &Outbound) -> Result<()> {
        let transport = self.transport.lock().unwrap_or_else(PoisonError::into_inner);

        let transport = match transport.as_ref() {
            Some(transport) if self.is_connected() => transport,
            _ => {
                tracing::warn!(
                    "Cannot send to node {} for guild {}: not connected",
                    self.id(),
                    frame.guild_id().unwrap_or("-")
                );
                return Err(LavalinkError::NotConnected(self.id().to_string()));
            }
        };

        let json = serde_json::to_string(frame)?;
        tracing::debug!(
            "Sending to {} for guild {}: {}",
            self.id(),
            frame.guild_id().unwrap_or("-"),
            json
        );
        transport.send_text(json)
    }

    /// Close the socket without reconnecting
    pub fn close(&self) -> Result<()> {
        self.closing.store(true, Ordering::SeqCst);

        let transport = self.transport.lock().unwrap_or_else(PoisonError::into_inner);
        match transport.as_ref() {
            Some(transport) => transport.close(),
            None => {
                // Not open: stop a pending handshake or backoff
                let task = self.task.lock().unwrap_or_else(PoisonError::into_inner).take();
                if let Some(handle) = task {
                    handle.abort();
                }
                Ok(())
            }
        }
    }

    /// Look up tracks through the node's REST surface
    pub async fn load_tracks(&self, identifier: &str) -> Result<LoadTracksResponse> {
        rest::load_tracks(&self.ctx.http, &self.descriptor, identifier).await
    }

    /// Attach an in-memory transport and mark the node connected
    #[cfg(test)]
    pub(crate) fn attach_detached(&self) -> tokio::sync::mpsc::UnboundedReceiver<Message> {
        let (transport, rx) = Transport::detached();
        *self.transport.lock().unwrap_or_else(PoisonError::into_inner) = Some(transport);
        self.connected.store(true, Ordering::SeqCst);
        rx
    }

    #[cfg(test)]
    pub(crate) fn detach(&self) {
        self.mark_closed(1000, "test".to_string());
    }
}

impl std::fmt::Debug for NodeConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeConnection")
            .field("id", &self.descriptor.id)
            .field("url", &self.descriptor.websocket_url())
            .field("connected", &self.is_connected())
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::subscription::EventReceiver;

    pub(crate) fn test_context() -> NodeContext {
        let (events, _) = broadcast::channel(100);
        NodeContext {
            user_id: "42".to_string(),
            shards: 1,
            resume: None,
            sessions: Arc::new(RwLock::new(HashMap::new())),
            events,
            http: reqwest::Client::new(),
        }
    }

    pub(crate) fn sent_frames(
        rx: &mut tokio::sync::mpsc::UnboundedReceiver<Message>,
    ) -> Vec<serde_json::Value> {
        let mut frames = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            if let Message::Text(text) = msg {
                frames.push(serde_json::from_str(&text).unwrap());
            }
        }
        frames
    }

    const STATS: &str = r#"{
        "op": "stats",
        "players": 2,
        "playingPlayers": 1,
        "uptime": 1000,
        "memory": {"reservable": 4, "used": 3, "free": 2, "allocated": 1},
        "cpu": {"cores": 2, "systemLoad": 0.1, "lavalinkLoad": 0.05}
    }"#;

    #[test]
    fn stats_frame_updates_stats() {
        let node = NodeConnection::new(NodeDescriptor::new("a", "localhost", 2333), test_context());
        assert!(node.stats().is_none());

        node.handle_frame(STATS);

        let stats = node.stats().unwrap();
        assert_eq!(stats.players, 2);
        assert_eq!(stats.cpu.cores, 2);
    }

    #[test]
    fn malformed_frame_reports_decode_error() {
        let ctx = test_context();
        let mut events = EventReceiver::new(ctx.events.subscribe());
        let node = NodeConnection::new(NodeDescriptor::new("a", "localhost", 2333), ctx);
        node.handle_frame(STATS);

        node.handle_frame("{definitely not json");

        match events.try_recv().unwrap() {
            Some(PoolEvent::NodeError { node_id, error }) => {
                assert_eq!(node_id, "a");
                assert!(matches!(*error, LavalinkError::Decode(_)));
            }
            other => panic!("expected decode error, got {:?}", other),
        }
        assert_eq!(node.stats().unwrap().players, 2);
    }

    #[test]
    fn send_fails_when_not_connected() {
        let node = NodeConnection::new(NodeDescriptor::new("a", "localhost", 2333), test_context());
        let result = node.send(&Outbound::Stop {
            guild_id: "1".to_string(),
        });
        assert!(matches!(result, Err(LavalinkError::NotConnected(id)) if id == "a"));
    }

    #[test]
    fn send_serializes_frames() {
        let node = NodeConnection::new(NodeDescriptor::new("a", "localhost", 2333), test_context());
        let mut rx = node.attach_detached();

        node.send(&Outbound::Pause {
            guild_id: "1".to_string(),
            pause: true,
        })
        .unwrap();

        assert_eq!(
            sent_frames(&mut rx),
            vec![serde_json::json!({"op": "pause", "guildId": "1", "pause": true})]
        );
    }

    #[test]
    fn close_marks_node_disconnected() {
        let ctx = test_context();
        let mut events = EventReceiver::new(ctx.events.subscribe());
        let node = NodeConnection::new(NodeDescriptor::new("a", "localhost", 2333), ctx);
        let _rx = node.attach_detached();
        assert!(node.is_connected());

        node.detach();

        assert!(!node.is_connected());
        assert!(matches!(
            events.try_recv().unwrap(),
            Some(PoolEvent::NodeClosed { code: 1000, .. })
        ));
    }
}
