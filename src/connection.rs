use crate::error::{LavalinkError, Result};
use futures_util::stream::SplitStream;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

/// Close code reported when the socket dropped without a close frame
pub const ABNORMAL_CLOSE: u16 = 1006;

/// Close code reported when a close frame carried no status
pub const NO_STATUS_CLOSE: u16 = 1005;

pub(crate) type WsReader = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

/// Handshake headers for a node socket
pub(crate) struct Handshake<'a> {
    pub url: String,
    pub password: &'a str,
    pub user_id: &'a str,
    pub shards: u64,
    pub resume_key: Option<&'a str>,
}

/// Write half of an open socket
///
/// Frames are queued on an unbounded channel and drained by a writer task,
/// so sending never blocks the caller.
pub(crate) struct Transport {
    ws_tx: mpsc::UnboundedSender<Message>,
    write_handle: Option<JoinHandle<()>>,
}

impl Transport {
    /// Open a socket and spawn its writer task
    pub async fn open(handshake: Handshake<'_>) -> Result<(Self, WsReader)> {
        tracing::info!("Connecting to {}", handshake.url);

        let mut request = handshake.url.as_str().into_client_request()?;
        let headers = request.headers_mut();
        headers.insert("Authorization", HeaderValue::from_str(handshake.password)?);
        headers.insert("User-Id", HeaderValue::from_str(handshake.user_id)?);
        headers.insert("Num-Shards", HeaderValue::from(handshake.shards));
        if let Some(key) = handshake.resume_key {
            headers.insert("Resume-Key", HeaderValue::from_str(key)?);
        }

        let (ws_stream, _) = connect_async(request).await?;
        let (mut write, read) = ws_stream.split();

        let (ws_tx, mut ws_rx) = mpsc::unbounded_channel::<Message>();

        // Forward outgoing messages to the socket
        let write_handle = tokio::spawn(async move {
            while let Some(msg) = ws_rx.recv().await {
                let closing = matches!(msg, Message::Close(_));
                if let Err(e) = write.send(msg).await {
                    tracing::error!("Failed to send message: {}", e);
                    break;
                }
                if closing {
                    break;
                }
            }
        });

        Ok((
            Self {
                ws_tx,
                write_handle: Some(write_handle),
            },
            read,
        ))
    }

    /// Transport backed by a plain channel, for exercising nodes without a socket
    #[cfg(test)]
    pub fn detached() -> (Self, mpsc::UnboundedReceiver<Message>) {
        let (ws_tx, ws_rx) = mpsc::unbounded_channel();
        (
            Self {
                ws_tx,
                write_handle: None,
            },
            ws_rx,
        )
    }

    /// Queue a text frame
    pub fn send_text(&self, text: String) -> Result<()> {
        self.ws_tx
            .send(Message::Text(text))
            .map_err(|_| LavalinkError::ConnectionClosed)
    }

    /// Queue a normal close frame
    pub fn close(&self) -> Result<()> {
        self.ws_tx
            .send(Message::Close(None))
            .map_err(|_| LavalinkError::ConnectionClosed)
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        if let Some(handle) = self.write_handle.take() {
            handle.abort();
        }
    }
}

/// Code and reason carried by a close frame
pub(crate) fn close_details(frame: Option<CloseFrame<'_>>) -> (u16, String) {
    match frame {
        Some(frame) => (u16::from(frame.code), frame.reason.into_owned()),
        None => (NO_STATUS_CLOSE, String::new()),
    }
}
