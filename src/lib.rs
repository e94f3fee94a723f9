//! Async client runtime for driving Lavalink audio nodes
//!
//! This library lets a Discord bot control one or more remote Lavalink nodes
//! over their WebSocket protocol and keeps per-guild player state in sync
//! with the events those nodes send back. It provides:
//!
//! - Node connections with authentication and session resumption
//! - Node statistics capture and pluggable node selection
//! - Routing of Discord voice credentials to the right player
//! - Per-guild players: play, stop, pause, seek, volume
//! - Player and node event subscriptions
//! - Track lookup through a node's REST surface
//!
//! # Quick Start
//!
//! ```no_run
//! use lavalink_session::{
//!     ConnectionPool, NodeDescriptor, PlayOptions, PoolConfig, PoolEvent, VoiceChannelRequest,
//!     VoiceFragment,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = PoolConfig::new("123456789")
//!         .node(NodeDescriptor::new("main", "localhost", 2333).password("hunter2"));
//!
//!     // Voice join/leave requests go out through the bot's gateway connection
//!     let pool = ConnectionPool::new(config, |guild_id: &str, request: VoiceChannelRequest| {
//!         println!("send to shard of {}: {:?}", guild_id, request);
//!     });
//!
//!     let mut events = pool.subscribe();
//!     pool.connect_all().await?;
//!     while let Ok(event) = events.recv().await {
//!         if let PoolEvent::NodeConnected { .. } = event {
//!             break;
//!         }
//!     }
//!
//!     let session = pool.get_or_create_session("987654321", None)?;
//!     session.connect_to_channel("555", Default::default());
//!
//!     // Feed VOICE_SERVER_UPDATE and VOICE_STATE_UPDATE payloads from the gateway
//!     let server = serde_json::json!({"guild_id": "987654321", "token": "t", "endpoint": "e"});
//!     pool.route_voice_update(VoiceFragment::from_value(server)?)?;
//!
//!     let tracks = pool.resolve_track("ytsearch:never gonna give you up").await?;
//!     if let Some(track) = tracks.tracks.first() {
//!         session.play(track.track.clone(), PlayOptions::default())?;
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! - **Pool**: owns nodes and sessions, entry point for the host
//! - **Node**: one WebSocket connection; decodes frames and routes them
//! - **Session**: per-guild player state and voice credential merging
//! - **Connection**: low-level socket handshake and writer task
//! - **Protocol**: JSON frame structures
//! - **Voice**: Discord voice credentials and the host's gateway hook

mod config;
mod connection;
mod error;
mod node;
mod pool;
mod protocol;
mod rest;
mod selection;
mod session;
mod subscription;
mod types;
mod voice;

// Public exports
pub use config::{PoolConfig, ReconnectPolicy, ResumeConfig};
pub use connection::{ABNORMAL_CLOSE, NO_STATUS_CLOSE};
pub use error::{LavalinkError, Result};
pub use node::NodeConnection;
pub use pool::ConnectionPool;
pub use protocol::{
    CpuStats, EventFrame, FrameStats, Inbound, MemoryStats, NodeStats, Outbound, PlayerState,
    PlayerUpdate, TrackEvent, TrackException,
};
pub use rest::{LoadException, LoadTracksResponse, LoadType, PlaylistInfo, Track, TrackInfo};
pub use selection::{penalty, FirstNode, LeastLoaded, NodeSelector, RoundRobin};
pub use session::{Session, SessionState, SessionStatus, DEFAULT_VOLUME};
pub use subscription::{EventReceiver, PoolEvent, SessionEvent};
pub use types::{
    ChannelId, ConnectOptions, GuildId, Millis, NodeDescriptor, NodeId, PlayOptions,
    DEFAULT_PASSWORD,
};
pub use voice::{
    VoiceChannelRequest, VoiceChannelRequestData, VoiceFragment, VoiceGateway,
    VoiceServerUpdate, VoiceStateUpdate, VOICE_STATE_OPCODE,
};
