//! Events delivered to server and client owners

use super::stream::IncomingStream;
use crate::protocol::{Message, MessageStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Why a connection ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DisconnectReason {
    /// Local or remote side closed the connection on purpose
    Normal,
    /// Server removed the client
    Removed,
    /// Idle timeout expired
    Timeout,
    /// Server shut down
    Shutdown,
    /// Pre-shared key was rejected
    AuthFailure,
    /// Socket error or EOF in the middle of a frame
    ConnectionLost,
}

impl DisconnectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Normal => "Normal",
            Self::Removed => "Removed",
            Self::Timeout => "Timeout",
            Self::Shutdown => "Shutdown",
            Self::AuthFailure => "AuthFailure",
            Self::ConnectionLost => "ConnectionLost",
        }
    }

    /// Reason announced by a control frame, if the frame ends the connection
    pub fn from_control(status: MessageStatus) -> Option<Self> {
        match status {
            MessageStatus::Removed => Some(Self::Removed),
            MessageStatus::Shutdown => Some(Self::Shutdown),
            MessageStatus::Timeout => Some(Self::Timeout),
            MessageStatus::AuthFailure => Some(Self::AuthFailure),
            _ => None,
        }
    }
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of a connected client as seen by the server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientMetadata {
    pub id: Uuid,
    pub peer_addr: SocketAddr,
    pub connected_at: DateTime<Utc>,
    pub authenticated: bool,
}

#[derive(Debug)]
pub enum ServerEvent {
    ClientConnected(ClientMetadata),
    ClientDisconnected {
        client: ClientMetadata,
        reason: DisconnectReason,
    },
    MessageReceived {
        client: ClientMetadata,
        message: Message,
    },
    /// Payload larger than `max_proxied_stream_size`; read it from `stream`
    /// before handling the next event
    StreamReceived {
        client: ClientMetadata,
        stream: IncomingStream,
    },
    AuthenticationSucceeded(ClientMetadata),
    AuthenticationFailed {
        peer_addr: SocketAddr,
    },
    Stopped,
}

#[derive(Debug)]
pub enum ClientEvent {
    Connected {
        server_addr: SocketAddr,
    },
    Disconnected {
        reason: DisconnectReason,
    },
    MessageReceived(Message),
    /// Payload larger than `max_proxied_stream_size`
    StreamReceived(IncomingStream),
    AuthenticationSucceeded,
    AuthenticationFailed,
    /// Server dropped a frame because this client has not authenticated
    AuthenticationRequired,
}

/// Sending half of an event channel. A dropped receiver discards events.
pub(crate) struct EventSink<E> {
    tx: mpsc::Sender<E>,
}

impl<E> EventSink<E> {
    pub(crate) fn new(tx: mpsc::Sender<E>) -> Self {
        Self { tx }
    }

    pub(crate) async fn emit(&self, event: E) {
        let _ = self.tx.send(event).await;
    }
}

impl<E> Clone for EventSink<E> {
    fn clone(&self) -> Self {
        Self { tx: self.tx.clone() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reason_from_control_frames() {
        assert_eq!(DisconnectReason::from_control(MessageStatus::Removed), Some(DisconnectReason::Removed));
        assert_eq!(DisconnectReason::from_control(MessageStatus::Shutdown), Some(DisconnectReason::Shutdown));
        assert_eq!(DisconnectReason::from_control(MessageStatus::Timeout), Some(DisconnectReason::Timeout));
        assert_eq!(DisconnectReason::from_control(MessageStatus::AuthFailure), Some(DisconnectReason::AuthFailure));
        assert_eq!(DisconnectReason::from_control(MessageStatus::Heartbeat), None);
        assert_eq!(DisconnectReason::from_control(MessageStatus::Normal), None);
    }

    #[tokio::test]
    async fn test_sink_ignores_closed_receiver() {
        let (tx, rx) = mpsc::channel(1);
        let sink = EventSink::new(tx);
        drop(rx);
        sink.emit(ClientEvent::AuthenticationSucceeded).await;
    }
}
