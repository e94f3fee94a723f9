use crate::error::{LavalinkError, Result};
use crate::types::{Millis, NodeId};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

/// Notification published by a [`ConnectionPool`](crate::ConnectionPool)
#[derive(Debug, Clone)]
pub enum PoolEvent {
    /// A node socket opened and is ready for frames
    NodeConnected { node_id: NodeId },

    /// A node socket closed, locally or remotely
    NodeClosed {
        node_id: NodeId,
        code: u16,
        reason: String,
    },

    /// A node reported a transport or decode failure
    NodeError {
        node_id: NodeId,
        error: Arc<LavalinkError>,
    },

    /// A closed node will try again after `delay`
    NodeReconnecting {
        node_id: NodeId,
        attempt: u32,
        delay: Duration,
    },

    /// A pool-level failure such as an empty node list
    Error(Arc<LavalinkError>),
}

/// Notification published by a [`Session`](crate::Session)
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// A track started playing
    Start { track: String },

    /// The current track ended
    End { track: Option<String>, reason: String },

    /// The node failed to play the track
    Error { track: Option<String>, message: String },

    /// The track has not produced audio for `threshold_ms`
    Stuck { track: Option<String>, threshold_ms: Millis },

    /// The node's voice connection to Discord closed
    Closed {
        code: u16,
        reason: String,
        by_remote: bool,
    },
}

/// Receiver for pool or session notifications
pub struct EventReceiver<T> {
    rx: broadcast::Receiver<T>,
}

impl<T: Clone> EventReceiver<T> {
    pub(crate) fn new(rx: broadcast::Receiver<T>) -> Self {
        Self { rx }
    }

    /// Receive the next notification
    ///
    /// Fails with `ConnectionClosed` once the publisher is gone.
    pub async fn recv(&mut self) -> Result<T> {
        self.rx.recv().await.map_err(|e| match e {
            broadcast::error::RecvError::Closed => LavalinkError::ConnectionClosed,
            broadcast::error::RecvError::Lagged(n) => {
                LavalinkError::ChannelError(format!("Lagged by {} messages", n))
            }
        })
    }

    /// Try to receive a notification without blocking
    ///
    /// Returns `None` if no message is available.
    pub fn try_recv(&mut self) -> Result<Option<T>> {
        match self.rx.try_recv() {
            Ok(event) => Ok(Some(event)),
            Err(broadcast::error::TryRecvError::Empty) => Ok(None),
            Err(broadcast::error::TryRecvError::Closed) => Err(LavalinkError::ConnectionClosed),
            Err(broadcast::error::TryRecvError::Lagged(n)) => {
                Err(LavalinkError::ChannelError(format!("Lagged by {} messages", n)))
            }
        }
    }
}
