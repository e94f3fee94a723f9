//! Fake Lavalink node for integration tests.

#![allow(dead_code)]

use futures_util::{SinkExt, StreamExt};
use lavalink_session::{EventReceiver, PoolEvent, SessionEvent};
use serde_json::Value;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::HeaderMap;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_hdr_async, WebSocketStream};

pub const WAIT: Duration = Duration::from_secs(5);

pub type ServerSocket = WebSocketStream<TcpStream>;

/// Loopback WebSocket server that records handshake headers
pub struct FakeNode {
    listener: TcpListener,
}

impl FakeNode {
    pub async fn bind() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        Self { listener }
    }

    pub fn port(&self) -> u16 {
        self.listener.local_addr().unwrap().port()
    }

    /// Accept the next client and return its socket and handshake headers
    pub async fn accept(&self) -> (ServerSocket, HeaderMap) {
        let (stream, _) = timeout(WAIT, self.listener.accept())
            .await
            .expect("no client connected")
            .unwrap();

        let mut headers = HeaderMap::new();
        let callback = |request: &Request, response: Response| -> Result<Response, ErrorResponse> {
            headers = request.headers().clone();
            Ok(response)
        };
        let ws = accept_hdr_async(stream, callback).await.unwrap();

        (ws, headers)
    }
}

pub fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

pub async fn send_json(ws: &mut ServerSocket, value: Value) {
    ws.send(Message::Text(value.to_string())).await.unwrap();
}

pub async fn send_text(ws: &mut ServerSocket, text: &str) {
    ws.send(Message::Text(text.to_string())).await.unwrap();
}

/// Next text frame from the client, parsed as JSON
pub async fn next_json(ws: &mut ServerSocket) -> Value {
    loop {
        let msg = timeout(WAIT, ws.next())
            .await
            .expect("no frame from client")
            .expect("client hung up")
            .unwrap();

        if let Message::Text(text) = msg {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

/// Keep reading so close handshakes complete
pub fn drain(mut ws: ServerSocket) {
    tokio::spawn(async move { while let Some(Ok(_)) = ws.next().await {} });
}

pub async fn wait_for_pool_event<F>(
    events: &mut EventReceiver<PoolEvent>,
    mut matches: F,
) -> PoolEvent
where
    F: FnMut(&PoolEvent) -> bool,
{
    timeout(WAIT, async {
        loop {
            let event = events.recv().await.unwrap();
            if matches(&event) {
                return event;
            }
        }
    })
    .await
    .expect("pool event never arrived")
}

pub async fn wait_for_session_event(events: &mut EventReceiver<SessionEvent>) -> SessionEvent {
    timeout(WAIT, events.recv())
        .await
        .expect("session event never arrived")
        .unwrap()
}

pub async fn wait_until<F: FnMut() -> bool>(mut condition: F) {
    timeout(WAIT, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition never became true")
}
