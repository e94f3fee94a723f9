use crate::types::{GuildId, Millis};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Frame sent from the client to a node
///
/// Every guild-scoped frame carries `guildId`; `configureResuming` is
/// node-scoped and does not.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "op", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Outbound {
    Play {
        guild_id: GuildId,
        track: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        start_time: Option<Millis>,
        #[serde(skip_serializing_if = "Option::is_none")]
        end_time: Option<Millis>,
        #[serde(skip_serializing_if = "Option::is_none")]
        no_replace: Option<bool>,
    },
    Stop {
        guild_id: GuildId,
    },
    Pause {
        guild_id: GuildId,
        pause: bool,
    },
    Seek {
        guild_id: GuildId,
        position: Millis,
    },
    Volume {
        guild_id: GuildId,
        volume: u16,
    },
    VoiceUpdate {
        guild_id: GuildId,
        session_id: String,
        event: Value,
    },
    Destroy {
        guild_id: GuildId,
    },
    ConfigureResuming {
        key: String,
        timeout: u64,
    },
}

impl Outbound {
    /// Guild the frame is addressed to, if it is guild-scoped
    pub fn guild_id(&self) -> Option<&str> {
        match self {
            Outbound::Play { guild_id, .. }
            | Outbound::Stop { guild_id }
            | Outbound::Pause { guild_id, .. }
            | Outbound::Seek { guild_id, .. }
            | Outbound::Volume { guild_id, .. }
            | Outbound::VoiceUpdate { guild_id, .. }
            | Outbound::Destroy { guild_id } => Some(guild_id),
            Outbound::ConfigureResuming { .. } => None,
        }
    }
}

/// Node statistics from a `stats` frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeStats {
    pub memory: MemoryStats,
    pub cpu: CpuStats,
    /// Node uptime in milliseconds
    pub uptime: u64,
    pub playing_players: u64,
    pub players: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame_stats: Option<FrameStats>,
}

/// Memory usage in bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryStats {
    pub reservable: u64,
    pub used: u64,
    pub free: u64,
    pub allocated: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CpuStats {
    pub cores: u32,
    /// Load of the whole host, 0.0 to 1.0
    pub system_load: f64,
    /// Load caused by the node process, 0.0 to 1.0
    #[serde(rename = "lavalinkLoad", alias = "nodeLoad")]
    pub node_load: f64,
}

/// Audio frame counters over the last minute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameStats {
    pub sent: i64,
    pub nulled: i64,
    pub deficit: i64,
}

/// Payload of a `playerUpdate` frame
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerUpdate {
    pub guild_id: GuildId,
    pub state: PlayerState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct PlayerState {
    /// Unix time of the update in milliseconds
    #[serde(default)]
    pub time: Option<u64>,
    #[serde(default)]
    pub position: Option<Millis>,
}

/// Payload of an `event` frame
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventFrame {
    pub guild_id: GuildId,
    #[serde(flatten)]
    pub event: TrackEvent,
}

/// Player event reported by a node
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all_fields = "camelCase")]
pub enum TrackEvent {
    #[serde(rename = "TrackStartEvent")]
    TrackStart { track: String },

    #[serde(rename = "TrackEndEvent")]
    TrackEnd {
        #[serde(default)]
        track: Option<String>,
        reason: String,
    },

    #[serde(rename = "TrackExceptionEvent")]
    TrackException {
        #[serde(default)]
        track: Option<String>,
        /// Plain message used by older nodes
        #[serde(default)]
        error: Option<String>,
        #[serde(default)]
        exception: Option<TrackException>,
    },

    #[serde(rename = "TrackStuckEvent")]
    TrackStuck {
        #[serde(default)]
        track: Option<String>,
        threshold_ms: Millis,
    },

    #[serde(rename = "WebSocketClosedEvent")]
    WebSocketClosed {
        code: u16,
        #[serde(default)]
        reason: String,
        #[serde(default)]
        by_remote: bool,
    },

    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackException {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub severity: Option<String>,
    #[serde(default)]
    pub cause: Option<String>,
}

impl TrackEvent {
    /// Human readable error of a `TrackExceptionEvent`
    pub fn error_message(&self) -> Option<String> {
        match self {
            TrackEvent::TrackException {
                error, exception, ..
            } => error
                .clone()
                .or_else(|| exception.as_ref().and_then(|e| e.message.clone()))
                .or_else(|| Some("Unknown track exception".to_string())),
            _ => None,
        }
    }
}

/// Inbound frame after decoding
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Stats(NodeStats),
    PlayerUpdate(PlayerUpdate),
    Event(EventFrame),
    /// An `op` this client does not handle
    Other(String),
}

impl Inbound {
    /// Decode a text frame
    ///
    /// Malformed JSON, a missing `op`, or a payload that does not match its
    /// `op` all yield [`LavalinkError::Decode`](crate::LavalinkError::Decode).
    pub fn decode(text: &str) -> crate::Result<Self> {
        let value: Value = serde_json::from_str(text)
            .map_err(|e| crate::LavalinkError::Decode(e.to_string()))?;

        let op = value
            .get("op")
            .and_then(Value::as_str)
            .ok_or_else(|| crate::LavalinkError::Decode("No op present in payload".to_string()))?
            .to_string();

        let decoded = match op.as_str() {
            "stats" => serde_json::from_value(value).map(Inbound::Stats),
            "playerUpdate" => serde_json::from_value(value).map(Inbound::PlayerUpdate),
            "event" => serde_json::from_value(value).map(Inbound::Event),
            _ => return Ok(Inbound::Other(op)),
        };

        decoded.map_err(|e| crate::LavalinkError::Decode(format!("{} payload: {}", op, e)))
    }

    /// Guild the frame refers to, if any
    pub fn guild_id(&self) -> Option<&str> {
        match self {
            Inbound::PlayerUpdate(update) => Some(&update.guild_id),
            Inbound::Event(frame) => Some(&frame.guild_id),
            Inbound::Stats(_) | Inbound::Other(_) => None,
        }
    }
}
