//! Voice credentials and the host's voice gateway hook.
//!
//! Discord hands out voice credentials in two independent gateway events:
//! `VOICE_SERVER_UPDATE` (token and endpoint) and `VOICE_STATE_UPDATE`
//! (session id). A node can only join the voice channel once it has both.

use crate::types::{ChannelId, GuildId};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Discord gateway opcode for voice state updates
pub const VOICE_STATE_OPCODE: u8 = 4;

/// Server half of the voice credentials (`VOICE_SERVER_UPDATE`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoiceServerUpdate {
    pub guild_id: GuildId,
    pub token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    /// Any other fields, forwarded to the node untouched
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Client half of the voice credentials (`VOICE_STATE_UPDATE`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoiceStateUpdate {
    pub guild_id: GuildId,
    #[serde(alias = "sessionId")]
    pub session_id: String,
    #[serde(default)]
    pub channel_id: Option<ChannelId>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One of the two voice credential halves
#[derive(Debug, Clone, PartialEq)]
pub enum VoiceFragment {
    Server(VoiceServerUpdate),
    State(VoiceStateUpdate),
}

impl VoiceFragment {
    /// Classify a raw gateway payload (`d` of the dispatch)
    ///
    /// A payload with a `token` is the server half, anything else is
    /// treated as the state half.
    pub fn from_value(value: Value) -> crate::Result<Self> {
        if value.get("token").is_some() {
            Ok(VoiceFragment::Server(serde_json::from_value(value)?))
        } else {
            Ok(VoiceFragment::State(serde_json::from_value(value)?))
        }
    }

    pub fn guild_id(&self) -> &str {
        match self {
            VoiceFragment::Server(update) => &update.guild_id,
            VoiceFragment::State(update) => &update.guild_id,
        }
    }
}

impl From<VoiceServerUpdate> for VoiceFragment {
    fn from(update: VoiceServerUpdate) -> Self {
        VoiceFragment::Server(update)
    }
}

impl From<VoiceStateUpdate> for VoiceFragment {
    fn from(update: VoiceStateUpdate) -> Self {
        VoiceFragment::State(update)
    }
}

/// Join/leave request the host forwards to the Discord gateway
///
/// Serializes to the gateway payload `{"op": 4, "d": {...}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VoiceChannelRequest {
    pub op: u8,
    pub d: VoiceChannelRequestData,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VoiceChannelRequestData {
    pub guild_id: GuildId,
    /// `None` leaves the current channel
    pub channel_id: Option<ChannelId>,
    pub self_deaf: bool,
    pub self_mute: bool,
}

impl VoiceChannelRequest {
    pub fn join(
        guild_id: impl Into<GuildId>,
        channel_id: impl Into<ChannelId>,
        self_deaf: bool,
        self_mute: bool,
    ) -> Self {
        Self {
            op: VOICE_STATE_OPCODE,
            d: VoiceChannelRequestData {
                guild_id: guild_id.into(),
                channel_id: Some(channel_id.into()),
                self_deaf,
                self_mute,
            },
        }
    }

    pub fn leave(guild_id: impl Into<GuildId>) -> Self {
        Self {
            op: VOICE_STATE_OPCODE,
            d: VoiceChannelRequestData {
                guild_id: guild_id.into(),
                channel_id: None,
                self_deaf: false,
                self_mute: false,
            },
        }
    }
}

/// Hook through which sessions ask the host to join or leave voice channels
///
/// Any `Fn(&str, VoiceChannelRequest)` closure works as a gateway.
pub trait VoiceGateway: Send + Sync {
    fn send_voice_request(&self, guild_id: &str, request: VoiceChannelRequest);
}

impl<F> VoiceGateway for F
where
    F: Fn(&str, VoiceChannelRequest) + Send + Sync,
{
    fn send_voice_request(&self, guild_id: &str, request: VoiceChannelRequest) {
        self(guild_id, request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn token_decides_the_fragment_kind() {
        let server = VoiceFragment::from_value(json!({
            "guild_id": "1",
            "token": "abc",
            "endpoint": "eu.discord.media:443"
        }))
        .unwrap();
        assert!(matches!(server, VoiceFragment::Server(ref u) if u.token == "abc"));

        let state = VoiceFragment::from_value(json!({
            "guild_id": "1",
            "session_id": "sess",
            "channel_id": "99",
            "user_id": "42",
            "self_deaf": false
        }))
        .unwrap();
        assert_eq!(state.guild_id(), "1");
        let VoiceFragment::State(state) = state else {
            panic!("expected state fragment");
        };
        assert_eq!(state.session_id, "sess");
        assert_eq!(state.extra.get("self_deaf"), Some(&json!(false)));
    }

    #[test]
    fn server_fragment_round_trips_verbatim() {
        let raw = json!({
            "guild_id": "1",
            "token": "abc",
            "endpoint": "eu.discord.media:443",
            "extra_field": 7
        });
        let VoiceFragment::Server(update) = VoiceFragment::from_value(raw.clone()).unwrap() else {
            panic!("expected server fragment");
        };
        assert_eq!(serde_json::to_value(&update).unwrap(), raw);
    }

    #[test]
    fn server_fragment_without_endpoint_round_trips_verbatim() {
        let raw = json!({"guild_id": "G1", "token": "tok"});
        let VoiceFragment::Server(update) = VoiceFragment::from_value(raw.clone()).unwrap() else {
            panic!("expected server fragment");
        };
        assert_eq!(update.endpoint, None);
        assert_eq!(serde_json::to_value(&update).unwrap(), raw);
    }

    #[test]
    fn state_fragment_accepts_camel_case_session_id() {
        let fragment = VoiceFragment::from_value(json!({
            "guild_id": "G1",
            "sessionId": "sess"
        }))
        .unwrap();
        let VoiceFragment::State(state) = fragment else {
            panic!("expected state fragment");
        };
        assert_eq!(state.session_id, "sess");
        assert!(state.extra.is_empty());
    }

    #[test]
    fn join_request_matches_gateway_payload() {
        let request = VoiceChannelRequest::join("1", "99", true, false);
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({
                "op": 4,
                "d": {"guild_id": "1", "channel_id": "99", "self_deaf": true, "self_mute": false}
            })
        );

        let leave = serde_json::to_value(VoiceChannelRequest::leave("1")).unwrap();
        assert_eq!(leave["d"]["channel_id"], Value::Null);
    }
}
