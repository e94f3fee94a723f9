use thiserror::Error;

/// Result type for Lavalink operations
pub type Result<T> = std::result::Result<T, LavalinkError>;

/// Errors that can occur when talking to Lavalink nodes
#[derive(Error, Debug)]
pub enum LavalinkError {
    /// The pool was asked to connect without any configured nodes
    #[error("No nodes were provided to connect to")]
    NoNodes,

    /// A node id that is not part of the pool was referenced
    #[error("Unknown node: {0}")]
    UnknownNode(String),

    /// WebSocket connection error
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// An inbound frame could not be decoded
    #[error("Could not decode frame from node: {0}")]
    Decode(String),

    /// A frame was sent while the socket was not open
    #[error("Node {0} is not connected")]
    NotConnected(String),

    /// Connection was closed unexpectedly
    #[error("Connection closed")]
    ConnectionClosed,

    /// A handshake header could not be built from the configuration
    #[error("Invalid header value: {0}")]
    InvalidHeader(#[from] tokio_tungstenite::tungstenite::http::header::InvalidHeaderValue),

    /// REST request error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Channel receive error
    #[error("Channel error: {0}")]
    ChannelError(String),
}
