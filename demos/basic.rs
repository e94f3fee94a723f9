//! Connects to a Lavalink node, resolves a track and plays it in a guild.
//!
//! Voice credentials normally come from the bot's Discord gateway; here they
//! are read from the environment so the demo can run on its own:
//!
//! ```text
//! LAVALINK_HOST=localhost LAVALINK_PASSWORD=youshallnotpass BOT_USER_ID=... \
//! GUILD_ID=... CHANNEL_ID=... VOICE_SESSION_ID=... VOICE_TOKEN=... VOICE_ENDPOINT=... \
//! cargo run --example basic -- "ytsearch:lofi"
//! ```

use lavalink_session::{
    ConnectOptions, ConnectionPool, NodeDescriptor, PlayOptions, PoolConfig, PoolEvent,
    ReconnectPolicy, ResumeConfig, SessionEvent, VoiceChannelRequest, VoiceFragment,
};
use serde_json::json;
use std::env;

fn var(name: &str) -> Result<String, Box<dyn std::error::Error>> {
    env::var(name).map_err(|_| format!("{} is not set", name).into())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let query = env::args().nth(1).unwrap_or_else(|| "ytsearch:lofi hip hop".to_string());
    let guild_id = var("GUILD_ID")?;

    let mut node = NodeDescriptor::new("main", var("LAVALINK_HOST")?, 2333);
    if let Ok(password) = var("LAVALINK_PASSWORD") {
        node = node.password(password);
    }

    let config = PoolConfig::new(var("BOT_USER_ID")?)
        .node(node)
        .resume(ResumeConfig::new())
        .reconnect(ReconnectPolicy::exponential());

    let pool = ConnectionPool::new(config, |guild_id: &str, request: VoiceChannelRequest| {
        // A real bot writes this to the gateway shard that owns the guild
        tracing::info!("voice request for {}: {}", guild_id, json!(request));
    });

    let mut events = pool.subscribe();
    pool.connect_all().await?;
    loop {
        match events.recv().await? {
            PoolEvent::NodeConnected { node_id } => {
                tracing::info!("node {} connected", node_id);
                break;
            }
            PoolEvent::NodeError { node_id, error } => {
                tracing::error!("node {} failed: {}", node_id, error);
            }
            _ => {}
        }
    }

    let session = pool.get_or_create_session(&guild_id, None)?;
    session.connect_to_channel(var("CHANNEL_ID")?, ConnectOptions::default());

    pool.route_voice_update(VoiceFragment::from_value(json!({
        "guild_id": guild_id,
        "session_id": var("VOICE_SESSION_ID")?,
    }))?)?;
    pool.route_voice_update(VoiceFragment::from_value(json!({
        "guild_id": guild_id,
        "token": var("VOICE_TOKEN")?,
        "endpoint": var("VOICE_ENDPOINT")?,
    }))?)?;

    let result = pool.resolve_track(&query).await?;
    let Some(track) = result.tracks.first() else {
        tracing::warn!("no tracks found for {}", query);
        return Ok(());
    };
    tracing::info!("playing {} by {}", track.info.title, track.info.author);
    session.play(track.track.clone(), PlayOptions::default())?;

    let mut player_events = session.subscribe();
    while let Ok(event) = player_events.recv().await {
        tracing::info!("{:?}", event);
        if let SessionEvent::End { .. } = event {
            break;
        }
    }

    pool.remove_session(&guild_id);
    pool.shutdown();
    Ok(())
}
