//! Synchronous request/response on top of asynchronous frames

use crate::error::Result;
use crate::protocol::{Message, Metadata};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::net::SocketAddr;
use tokio::sync::{oneshot, Mutex};
use uuid::Uuid;

/// A sync request as seen by the receiving side
#[derive(Debug, Clone)]
pub struct SyncRequest {
    pub conversation_id: Uuid,
    pub expiration: DateTime<Utc>,
    pub metadata: Option<Metadata>,
    pub payload: Bytes,
    pub peer_addr: SocketAddr,
}

/// Reply produced by a [`SyncRequestHandler`]
#[derive(Debug, Clone, Default)]
pub struct SyncResponse {
    pub metadata: Option<Metadata>,
    pub payload: Bytes,
}

impl SyncResponse {
    pub fn new<B: Into<Bytes>>(payload: B) -> Self {
        Self {
            metadata: None,
            payload: payload.into(),
        }
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// Answers sync requests. An error is sent back as a `Failure` frame.
#[async_trait]
pub trait SyncRequestHandler: Send + Sync {
    async fn handle(&self, request: SyncRequest) -> Result<SyncResponse>;
}

/// Replies with the request's own payload and metadata
#[derive(Debug, Clone, Copy, Default)]
pub struct EchoHandler;

#[async_trait]
impl SyncRequestHandler for EchoHandler {
    async fn handle(&self, request: SyncRequest) -> Result<SyncResponse> {
        Ok(SyncResponse {
            metadata: request.metadata,
            payload: request.payload,
        })
    }
}

/// Outstanding requests waiting for their response
#[derive(Default)]
pub(crate) struct PendingRequests {
    waiting: Mutex<HashMap<Uuid, oneshot::Sender<Message>>>,
}

impl PendingRequests {
    pub(crate) async fn register(&self, conversation_id: Uuid) -> oneshot::Receiver<Message> {
        let (tx, rx) = oneshot::channel();
        self.waiting.lock().await.insert(conversation_id, tx);
        rx
    }

    /// Hand a response to its waiter; false when nobody is waiting anymore
    pub(crate) async fn complete(&self, response: Message) -> bool {
        let Some(conversation_id) = response.conversation_id else {
            return false;
        };
        match self.waiting.lock().await.remove(&conversation_id) {
            Some(tx) => tx.send(response).is_ok(),
            None => false,
        }
    }

    pub(crate) async fn cancel(&self, conversation_id: &Uuid) {
        self.waiting.lock().await.remove(conversation_id);
    }

    /// Drop every waiter; their receivers observe a closed channel
    pub(crate) async fn fail_all(&self) {
        self.waiting.lock().await.clear();
    }

    #[cfg(test)]
    pub(crate) async fn len(&self) -> usize {
        self.waiting.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{FrameHeader, MessageStatus};

    fn response(conversation_id: Uuid) -> Message {
        let header = FrameHeader::new(MessageStatus::Normal, 2).into_sync_response(conversation_id);
        Message::from_parts(header, Bytes::from_static(b"ok"))
    }

    #[tokio::test]
    async fn test_complete_wakes_waiter() {
        let pending = PendingRequests::default();
        let id = Uuid::new_v4();
        let rx = pending.register(id).await;

        assert!(pending.complete(response(id)).await);
        assert_eq!(&rx.await.unwrap().payload[..], b"ok");
        assert_eq!(pending.len().await, 0);
    }

    #[tokio::test]
    async fn test_unknown_conversation_is_ignored() {
        let pending = PendingRequests::default();
        assert!(!pending.complete(response(Uuid::new_v4())).await);
    }

    #[tokio::test]
    async fn test_fail_all_closes_waiters() {
        let pending = PendingRequests::default();
        let rx = pending.register(Uuid::new_v4()).await;
        pending.fail_all().await;
        assert!(rx.await.is_err());
    }

    #[tokio::test]
    async fn test_echo_handler() {
        let request = SyncRequest {
            conversation_id: Uuid::new_v4(),
            expiration: Utc::now(),
            metadata: None,
            payload: Bytes::from_static(b"ping"),
            peer_addr: "127.0.0.1:1".parse().unwrap(),
        };
        let reply = EchoHandler.handle(request).await.unwrap();
        assert_eq!(&reply.payload[..], b"ping");
    }
}
