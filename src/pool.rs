use crate::config::PoolConfig;
use crate::error::{LavalinkError, Result};
use crate::node::{NodeConnection, NodeContext};
use crate::rest::LoadTracksResponse;
use crate::selection::{FirstNode, NodeSelector};
use crate::session::Session;
use crate::subscription::{EventReceiver, PoolEvent};
use crate::types::NodeDescriptor;
use crate::voice::{VoiceFragment, VoiceGateway};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tokio::sync::broadcast;

/// Entry point for the host application
///
/// Owns the node connections and the per-guild sessions, and routes voice
/// credentials from the Discord gateway to the right session.
///
/// # Example
///
/// ```no_run
/// use lavalink_session::{ConnectionPool, NodeDescriptor, PoolConfig, VoiceChannelRequest};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = PoolConfig::new("123456789")
///         .node(NodeDescriptor::new("main", "localhost", 2333).password("hunter2"));
///
///     let pool = ConnectionPool::new(config, |guild_id: &str, request: VoiceChannelRequest| {
///         // forward `request` to the shard that owns `guild_id`
///         println!("{}: {}", guild_id, serde_json::to_string(&request).unwrap());
///     });
///     pool.connect_all().await?;
///
///     let session = pool.get_or_create_session("987654321", None)?;
///     session.connect_to_channel("555", Default::default());
///     Ok(())
/// }
/// ```
pub struct ConnectionPool {
    config: PoolConfig,
    ctx: NodeContext,
    gateway: Arc<dyn VoiceGateway>,
    selector: Box<dyn NodeSelector>,
    /// Insertion ordered
    nodes: RwLock<Vec<Arc<NodeConnection>>>,
}

impl ConnectionPool {
    /// Create a pool; nothing connects until [`connect_all`](Self::connect_all)
    pub fn new(config: PoolConfig, gateway: impl VoiceGateway + 'static) -> Self {
        let (events, _) = broadcast::channel(100);
        let ctx = NodeContext {
            user_id: config.user_id.clone(),
            shards: config.effective_shards(),
            resume: config.resume.clone().map(|resume| Arc::new(Mutex::new(resume))),
            sessions: Arc::new(RwLock::new(HashMap::new())),
            events,
            http: reqwest::Client::new(),
        };

        Self {
            config,
            ctx,
            gateway: Arc::new(gateway),
            selector: Box::new(FirstNode),
            nodes: RwLock::new(Vec::new()),
        }
    }

    /// Replace the node selection strategy
    pub fn with_selector(mut self, selector: impl NodeSelector + 'static) -> Self {
        self.selector = Box::new(selector);
        self
    }

    /// Subscribe to node lifecycle and error notifications
    pub fn subscribe(&self) -> EventReceiver<PoolEvent> {
        EventReceiver::new(self.ctx.events.subscribe())
    }

    /// Resume key currently in use, once negotiated or configured
    pub fn resume_key(&self) -> Option<String> {
        self.ctx.resume.as_ref().and_then(|resume| {
            resume
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .key
                .clone()
        })
    }

    /// Add a node without connecting it
    ///
    /// Returns the existing connection if a node with the same id is
    /// already part of the pool.
    pub fn add_node(&self, descriptor: NodeDescriptor) -> Arc<NodeConnection> {
        let mut nodes = self.nodes.write().unwrap_or_else(PoisonError::into_inner);

        if let Some(existing) = nodes.iter().find(|node| node.id() == descriptor.id) {
            return existing.clone();
        }

        let node = Arc::new(NodeConnection::new(descriptor, self.ctx.clone()));
        nodes.push(node.clone());
        node
    }

    /// Connect every configured node
    ///
    /// Fails with [`LavalinkError::NoNodes`] (also published as
    /// [`PoolEvent::Error`]) when there is nothing to connect to. Connection
    /// outcomes are reported through [`subscribe`](Self::subscribe).
    pub async fn connect_all(&self) -> Result<()> {
        for descriptor in &self.config.nodes {
            self.add_node(descriptor.clone());
        }

        let nodes = self.nodes();
        if nodes.is_empty() {
            tracing::error!("No nodes were provided to connect to");
            let _ = self
                .ctx
                .events
                .send(PoolEvent::Error(Arc::new(LavalinkError::NoNodes)));
            return Err(LavalinkError::NoNodes);
        }

        for node in nodes {
            node.spawn(self.config.reconnect.clone());
        }

        Ok(())
    }

    /// Get a node by id
    pub fn node(&self, id: &str) -> Option<Arc<NodeConnection>> {
        self.nodes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|node| node.id() == id)
            .cloned()
    }

    /// All nodes in insertion order
    pub fn nodes(&self) -> Vec<Arc<NodeConnection>> {
        self.nodes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn pick_node(&self, preferred: Option<&str>) -> Result<Arc<NodeConnection>> {
        match preferred {
            Some(id) => self
                .node(id)
                .ok_or_else(|| LavalinkError::UnknownNode(id.to_string())),
            None => {
                let nodes = self.nodes();
                if nodes.is_empty() {
                    return Err(LavalinkError::NoNodes);
                }
                self.selector.select(&nodes).ok_or(LavalinkError::NoNodes)
            }
        }
    }

    /// Get the session for a guild, creating it on first use
    ///
    /// A new session is bound to `preferred` if given, otherwise to the node
    /// chosen by the selection strategy. An existing session is returned as
    /// is and keeps its node.
    pub fn get_or_create_session(
        &self,
        guild_id: &str,
        preferred: Option<&str>,
    ) -> Result<Session> {
        if let Some(session) = self.session(guild_id) {
            return Ok(session);
        }

        let node = self.pick_node(preferred)?;

        let mut sessions = self
            .ctx
            .sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let session = sessions
            .entry(guild_id.to_string())
            .or_insert_with(|| {
                tracing::debug!("Creating session for guild {} on node {}", guild_id, node.id());
                Session::new(guild_id, node, self.gateway.clone())
            })
            .clone();

        Ok(session)
    }

    /// Get the session for a guild, if one exists
    pub fn session(&self, guild_id: &str) -> Option<Session> {
        self.ctx
            .sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(guild_id)
            .cloned()
    }

    pub fn sessions(&self) -> Vec<Session> {
        self.ctx
            .sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    /// Hand a voice credential half to the session of its guild
    ///
    /// Fragments for guilds without a session are dropped. Returns whether a
    /// `voiceUpdate` was sent as a result.
    pub fn route_voice_update(&self, fragment: VoiceFragment) -> Result<bool> {
        match self.session(fragment.guild_id()) {
            Some(session) => session.merge_voice_fragment(fragment),
            None => {
                tracing::debug!(
                    "Dropping voice fragment for guild {} without a session",
                    fragment.guild_id()
                );
                Ok(false)
            }
        }
    }

    /// Remove a guild's session and destroy its player on the node
    pub fn remove_session(&self, guild_id: &str) -> Option<Session> {
        let session = self
            .ctx
            .sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(guild_id)?;

        if session.node().is_connected() {
            if let Err(e) = session.destroy() {
                tracing::warn!("Failed to destroy player for guild {}: {}", guild_id, e);
            }
        }

        Some(session)
    }

    /// Look up tracks on a node picked by the selection strategy
    pub async fn resolve_track(&self, identifier: &str) -> Result<LoadTracksResponse> {
        let node = self.pick_node(None)?;
        node.load_tracks(identifier).await
    }

    /// Close a node by id
    ///
    /// Returns `Ok(false)` if no such node exists.
    pub fn close_node(&self, id: &str) -> Result<bool> {
        match self.node(id) {
            Some(node) => {
                node.close()?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Close every node and forget all sessions
    pub fn shutdown(&self) {
        for node in self.nodes() {
            if let Err(e) = node.close() {
                tracing::error!("Failed to close node {}: {}", node.id(), e);
            }
        }

        self.ctx
            .sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl Drop for ConnectionPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}
