use serde::{Deserialize, Serialize};

/// Guild identifier (Discord snowflake, kept as its string form)
pub type GuildId = String;

/// Node identifier, unique within a pool
pub type NodeId = String;

/// Voice channel identifier
pub type ChannelId = String;

/// Track position or duration in milliseconds
pub type Millis = u64;

/// Password Lavalink ships with out of the box
pub const DEFAULT_PASSWORD: &str = "youshallnotpass";

/// Static description of one Lavalink node
///
/// Built once and never mutated; the pool creates exactly one
/// [`NodeConnection`](crate::NodeConnection) per descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeDescriptor {
    pub id: NodeId,
    pub host: String,
    pub port: u16,

    /// Use `wss`/`https` instead of `ws`/`http`
    #[serde(default)]
    pub secure: bool,

    /// Leaving this unset falls back to [`DEFAULT_PASSWORD`]
    #[serde(default)]
    pub password: Option<String>,
}

impl NodeDescriptor {
    /// Describe a node at `host:port`
    pub fn new(id: impl Into<NodeId>, host: impl Into<String>, port: u16) -> Self {
        Self {
            id: id.into(),
            host: host.into(),
            port,
            secure: false,
            password: None,
        }
    }

    /// Connect over TLS
    pub fn secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    /// Set the node password
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Password sent in the `Authorization` header
    pub fn effective_password(&self) -> &str {
        self.password.as_deref().unwrap_or(DEFAULT_PASSWORD)
    }

    /// Whether the node will authenticate with the well-known default password
    pub fn uses_default_password(&self) -> bool {
        self.password.is_none()
    }

    /// WebSocket URL of the node
    pub fn websocket_url(&self) -> String {
        let scheme = if self.secure { "wss" } else { "ws" };
        format!("{}://{}:{}", scheme, self.host, self.port)
    }

    /// Base URL of the node's REST surface
    pub fn http_url(&self) -> String {
        let scheme = if self.secure { "https" } else { "http" };
        format!("{}://{}:{}", scheme, self.host, self.port)
    }
}

/// Options for [`Session::play`](crate::Session::play)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlayOptions {
    /// Position to start the track at
    pub start_time: Option<Millis>,
    /// Position to stop the track at
    pub end_time: Option<Millis>,
    /// Ignore the request if a track is already playing
    pub no_replace: Option<bool>,
}

/// Options for [`Session::connect_to_channel`](crate::Session::connect_to_channel)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConnectOptions {
    pub self_deaf: bool,
    pub self_mute: bool,
}
