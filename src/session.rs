use crate::error::Result;
use crate::node::NodeConnection;
use crate::protocol::{Outbound, TrackEvent};
use crate::subscription::{EventReceiver, SessionEvent};
use crate::types::{ChannelId, ConnectOptions, GuildId, Millis, PlayOptions};
use crate::voice::{
    VoiceChannelRequest, VoiceFragment, VoiceGateway, VoiceServerUpdate, VoiceStateUpdate,
};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::broadcast;

/// Volume a new session assumes until told otherwise
pub const DEFAULT_VOLUME: u16 = 50;

/// Where a session is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    /// Not in a voice channel
    Idle,
    /// Join requested, voice credentials not yet delivered to the node
    Connecting,
    /// In a voice channel with nothing playing
    ConnectedIdle,
    Playing,
    Paused,
}

/// Snapshot of a session's mirrored player state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionState {
    pub connected: bool,
    pub playing: bool,
    pub paused: bool,
    pub volume: u16,
    /// Last position reported by the node
    pub position: Millis,
    pub track: Option<String>,
    pub channel_id: Option<ChannelId>,
    /// A `voiceUpdate` was delivered since the last join
    pub voice_ready: bool,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            connected: false,
            playing: false,
            paused: false,
            volume: DEFAULT_VOLUME,
            position: 0,
            track: None,
            channel_id: None,
            voice_ready: false,
        }
    }
}

impl SessionState {
    pub fn status(&self) -> SessionStatus {
        if !self.connected {
            SessionStatus::Idle
        } else if !self.voice_ready {
            SessionStatus::Connecting
        } else if self.playing && self.paused {
            SessionStatus::Paused
        } else if self.playing {
            SessionStatus::Playing
        } else {
            SessionStatus::ConnectedIdle
        }
    }
}

/// Update applied by the owning node's dispatch path
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum NodeUpdate {
    Position(Millis),
    Event(TrackEvent),
}

struct Inner {
    state: SessionState,
    pending_server: Option<VoiceServerUpdate>,
    pending_state: Option<VoiceStateUpdate>,
}

/// Player for one guild
///
/// A session is bound to a single node for its whole life. Commands are sent
/// to that node and mirrored locally; the node's `event` and `playerUpdate`
/// frames are the authoritative source for playback state.
#[derive(Clone)]
pub struct Session {
    guild_id: GuildId,
    node: Arc<NodeConnection>,
    gateway: Arc<dyn VoiceGateway>,
    inner: Arc<Mutex<Inner>>,
    events: broadcast::Sender<SessionEvent>,
}

impl Session {
    pub(crate) fn new(
        guild_id: impl Into<GuildId>,
        node: Arc<NodeConnection>,
        gateway: Arc<dyn VoiceGateway>,
    ) -> Self {
        let (events, _) = broadcast::channel(100);
        Self {
            guild_id: guild_id.into(),
            node,
            gateway,
            inner: Arc::new(Mutex::new(Inner {
                state: SessionState::default(),
                pending_server: None,
                pending_state: None,
            })),
            events,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Get the guild id
    pub fn guild_id(&self) -> &str {
        &self.guild_id
    }

    /// Get the node this session is bound to
    pub fn node(&self) -> &Arc<NodeConnection> {
        &self.node
    }

    pub fn node_id(&self) -> &str {
        self.node.id()
    }

    /// Get a snapshot of the session state
    pub fn state(&self) -> SessionState {
        self.lock().state.clone()
    }

    pub fn status(&self) -> SessionStatus {
        self.lock().state.status()
    }

    /// Whether both sessions are the same player
    pub fn ptr_eq(&self, other: &Session) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Subscribe to player events
    pub fn subscribe(&self) -> EventReceiver<SessionEvent> {
        EventReceiver::new(self.events.subscribe())
    }

    /// Ask the host to join a voice channel
    ///
    /// The join is fire-and-forget: the session counts as connected as soon
    /// as the request is handed to the gateway.
    pub fn connect_to_channel(&self, channel_id: impl Into<ChannelId>, options: ConnectOptions) {
        let channel_id = channel_id.into();
        let request = VoiceChannelRequest::join(
            self.guild_id.clone(),
            channel_id.clone(),
            options.self_deaf,
            options.self_mute,
        );
        self.gateway.send_voice_request(&self.guild_id, request);

        let mut inner = self.lock();
        inner.state.connected = true;
        inner.state.channel_id = Some(channel_id);
        inner.state.voice_ready = false;
    }

    /// Ask the host to leave the voice channel
    pub fn disconnect(&self) {
        self.gateway
            .send_voice_request(&self.guild_id, VoiceChannelRequest::leave(self.guild_id.clone()));

        let mut inner = self.lock();
        inner.state.connected = false;
        inner.state.channel_id = None;
        inner.state.voice_ready = false;
        inner.pending_server = None;
        inner.pending_state = None;
    }

    /// Store one half of the voice credentials
    ///
    /// Once both halves are present a single `voiceUpdate` is sent and both
    /// slots are cleared, whichever order they arrived in. Returns whether a
    /// `voiceUpdate` was sent.
    pub fn merge_voice_fragment(&self, fragment: VoiceFragment) -> Result<bool> {
        if fragment.guild_id() != self.guild_id {
            tracing::warn!(
                "Ignoring voice fragment for guild {} on session {}",
                fragment.guild_id(),
                self.guild_id
            );
            return Ok(false);
        }

        let pair = {
            let mut inner = self.lock();
            match fragment {
                VoiceFragment::Server(update) => inner.pending_server = Some(update),
                VoiceFragment::State(update) => inner.pending_state = Some(update),
            }

            match (inner.pending_server.take(), inner.pending_state.take()) {
                (Some(server), Some(state)) => Some((server, state)),
                (server, state) => {
                    inner.pending_server = server;
                    inner.pending_state = state;
                    None
                }
            }
        };

        let Some((server, state)) = pair else {
            return Ok(false);
        };

        self.send(Outbound::VoiceUpdate {
            guild_id: self.guild_id.clone(),
            session_id: state.session_id,
            event: serde_json::to_value(&server)?,
        })?;

        self.lock().state.voice_ready = true;
        Ok(true)
    }

    /// Play a track
    pub fn play(&self, track: impl Into<String>, options: PlayOptions) -> Result<()> {
        let track = track.into();
        self.send(Outbound::Play {
            guild_id: self.guild_id.clone(),
            track: track.clone(),
            start_time: options.start_time,
            end_time: options.end_time,
            no_replace: options.no_replace,
        })?;

        let mut inner = self.lock();
        inner.state.playing = true;
        inner.state.track = Some(track);
        Ok(())
    }

    /// Stop playback
    ///
    /// Local state is left alone; the node's `TrackEndEvent` clears it.
    pub fn stop(&self) -> Result<()> {
        self.send(Outbound::Stop {
            guild_id: self.guild_id.clone(),
        })
    }

    /// Pause or unpause playback
    pub fn pause(&self, pause: bool) -> Result<()> {
        self.send(Outbound::Pause {
            guild_id: self.guild_id.clone(),
            pause,
        })?;

        self.lock().state.paused = pause;
        Ok(())
    }

    pub fn resume(&self) -> Result<()> {
        self.pause(false)
    }

    /// Seek to a position in milliseconds
    pub fn seek(&self, position: Millis) -> Result<()> {
        self.send(Outbound::Seek {
            guild_id: self.guild_id.clone(),
            position,
        })?;

        self.lock().state.position = position;
        Ok(())
    }

    pub fn set_volume(&self, volume: u16) -> Result<()> {
        self.send(Outbound::Volume {
            guild_id: self.guild_id.clone(),
            volume,
        })?;

        self.lock().state.volume = volume;
        Ok(())
    }

    /// Tell the node to drop its player for this guild
    pub(crate) fn destroy(&self) -> Result<()> {
        self.send(Outbound::Destroy {
            guild_id: self.guild_id.clone(),
        })
    }

    fn send(&self, frame: Outbound) -> Result<()> {
        self.node.send(&frame)
    }

    /// Apply a frame routed here by the owning node
    pub(crate) fn apply(&self, update: NodeUpdate) {
        let event = {
            let mut inner = self.lock();
            let state = &mut inner.state;

            match update {
                NodeUpdate::Position(position) => {
                    state.position = position;
                    None
                }
                NodeUpdate::Event(event) => {
                    let message = event.error_message();
                    match event {
                        TrackEvent::TrackStart { track } => {
                            state.track = Some(track.clone());
                            state.playing = true;
                            Some(SessionEvent::Start { track })
                        }
                        TrackEvent::TrackEnd { track, reason } => {
                            state.track = None;
                            state.playing = false;
                            state.paused = false;
                            Some(SessionEvent::End { track, reason })
                        }
                        TrackEvent::TrackException { track, .. } => Some(SessionEvent::Error {
                            track,
                            message: message.unwrap_or_default(),
                        }),
                        TrackEvent::TrackStuck {
                            track,
                            threshold_ms,
                        } => Some(SessionEvent::Stuck {
                            track,
                            threshold_ms,
                        }),
                        TrackEvent::WebSocketClosed {
                            code,
                            reason,
                            by_remote,
                        } => Some(SessionEvent::Closed {
                            code,
                            reason,
                            by_remote,
                        }),
                        TrackEvent::Unknown => None,
                    }
                }
            }
        };

        if let Some(event) = event {
            let _ = self.events.send(event);
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("guild_id", &self.guild_id)
            .field("node", &self.node.id())
            .field("state", &self.state())
            .finish()
    }
}
