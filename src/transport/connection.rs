//! One framed TCP connection, shared by the server and client halves

use super::events::{ClientMetadata, DisconnectReason};
use super::stream::IncomingStream;
use super::sync::{PendingRequests, SyncRequest, SyncRequestHandler, SyncResponse};
use crate::error::{AppError, Result};
use crate::logging::NetworkLogger;
use crate::protocol::{self, FrameHeader, Message, MessageStatus, Metadata};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{mpsc, watch, Mutex};
use uuid::Uuid;

/// Message and byte counters, updated lock-free from reader and writers
#[derive(Debug)]
pub struct ConnectionStatistics {
    messages_sent: AtomicU64,
    messages_received: AtomicU64,
    bytes_sent: AtomicU64,
    bytes_received: AtomicU64,
    started_at: DateTime<Utc>,
}

/// Point-in-time copy of [`ConnectionStatistics`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatisticsSnapshot {
    pub messages_sent: u64,
    pub messages_received: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub started_at: DateTime<Utc>,
    pub uptime: Duration,
}

impl ConnectionStatistics {
    pub fn new() -> Self {
        Self {
            messages_sent: AtomicU64::new(0),
            messages_received: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            started_at: Utc::now(),
        }
    }

    pub fn record_sent(&self, bytes: u64) {
        self.messages_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn record_received(&self, bytes: u64) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
        self.bytes_received.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatisticsSnapshot {
        StatisticsSnapshot {
            messages_sent: self.messages_sent.load(Ordering::Relaxed),
            messages_received: self.messages_received.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            started_at: self.started_at,
            uptime: (Utc::now() - self.started_at).to_std().unwrap_or_default(),
        }
    }
}

impl Default for ConnectionStatistics {
    fn default() -> Self {
        Self::new()
    }
}

/// Reading half of a connection
pub(crate) struct FrameReader {
    reader: BufReader<OwnedReadHalf>,
    max_proxied_stream_size: u64,
    stream_buffer_size: usize,
}

impl FrameReader {
    pub(crate) fn new(read_half: OwnedReadHalf, max_proxied_stream_size: u64, stream_buffer_size: usize) -> Self {
        Self {
            reader: BufReader::new(read_half),
            max_proxied_stream_size,
            stream_buffer_size: stream_buffer_size.max(1),
        }
    }

    pub(crate) async fn next_header(&mut self) -> Result<Option<FrameHeader>> {
        protocol::read_header(&mut self.reader).await
    }

    pub(crate) async fn read_payload(&mut self, content_length: u64) -> Result<Bytes> {
        protocol::read_payload(&mut self.reader, content_length).await
    }

    pub(crate) async fn discard(&mut self, content_length: u64) -> Result<()> {
        if content_length > 0 {
            protocol::discard_payload(&mut self.reader, content_length).await?;
        }
        Ok(())
    }

    /// Forward `content_length` bytes to a stream consumer. Once the
    /// consumer goes away the remainder is read and dropped.
    pub(crate) async fn pump(&mut self, content_length: u64, chunks: mpsc::Sender<Bytes>) -> Result<()> {
        let mut remaining = content_length;
        let mut consumer_alive = true;
        while remaining > 0 {
            let want = remaining.min(self.stream_buffer_size as u64) as usize;
            let mut chunk = vec![0u8; want];
            let read = self.reader.read(&mut chunk).await?;
            if read == 0 {
                return Err(AppError::disconnected(format!(
                    "Connection closed after {} of {} stream bytes",
                    content_length - remaining,
                    content_length
                )));
            }
            chunk.truncate(read);
            remaining -= read as u64;
            if consumer_alive && chunks.send(Bytes::from(chunk)).await.is_err() {
                consumer_alive = false;
            }
        }
        Ok(())
    }
}

/// What a data frame turned into
pub(crate) enum Delivery {
    Message(Message),
    /// Emit the stream to the owner, then drive it with [`FrameReader::pump`]
    Stream {
        stream: IncomingStream,
        chunks: mpsc::Sender<Bytes>,
        content_length: u64,
    },
    /// Handled internally (sync traffic)
    Consumed,
}

/// Shared state of one open connection
pub(crate) struct Connection {
    pub(crate) id: Uuid,
    pub(crate) peer_addr: SocketAddr,
    pub(crate) local_addr: SocketAddr,
    pub(crate) connected_at: DateTime<Utc>,
    writer: Mutex<OwnedWriteHalf>,
    stats: ConnectionStatistics,
    aggregate: Option<Arc<ConnectionStatistics>>,
    pending: PendingRequests,
    authenticated: AtomicBool,
    close_reason: OnceLock<DisconnectReason>,
    closing: watch::Sender<bool>,
    stream_buffer_size: usize,
    logger: NetworkLogger,
}

impl Connection {
    pub(crate) fn new(
        write_half: OwnedWriteHalf,
        peer_addr: SocketAddr,
        local_addr: SocketAddr,
        aggregate: Option<Arc<ConnectionStatistics>>,
        stream_buffer_size: usize,
        logger: NetworkLogger,
    ) -> Self {
        let (closing, _) = watch::channel(false);
        Self {
            id: Uuid::new_v4(),
            peer_addr,
            local_addr,
            connected_at: Utc::now(),
            writer: Mutex::new(write_half),
            stats: ConnectionStatistics::new(),
            aggregate,
            pending: PendingRequests::default(),
            authenticated: AtomicBool::new(false),
            close_reason: OnceLock::new(),
            closing,
            stream_buffer_size: stream_buffer_size.max(1),
            logger,
        }
    }

    pub(crate) fn metadata(&self) -> ClientMetadata {
        ClientMetadata {
            id: self.id,
            peer_addr: self.peer_addr,
            connected_at: self.connected_at,
            authenticated: self.is_authenticated(),
        }
    }

    pub(crate) fn statistics(&self) -> StatisticsSnapshot {
        self.stats.snapshot()
    }

    pub(crate) fn logger(&self) -> &NetworkLogger {
        &self.logger
    }

    pub(crate) fn is_authenticated(&self) -> bool {
        self.authenticated.load(Ordering::Acquire)
    }

    pub(crate) fn set_authenticated(&self, authenticated: bool) {
        self.authenticated.store(authenticated, Ordering::Release);
    }

    pub(crate) fn is_closing(&self) -> bool {
        *self.closing.borrow()
    }

    pub(crate) fn closing_signal(&self) -> watch::Receiver<bool> {
        self.closing.subscribe()
    }

    pub(crate) fn reason(&self) -> Option<DisconnectReason> {
        self.close_reason.get().copied()
    }

    /// Ask the reader to stop. The first recorded reason wins and is returned.
    pub(crate) fn close(&self, reason: DisconnectReason) -> DisconnectReason {
        let reason = *self.close_reason.get_or_init(|| reason);
        self.closing.send_replace(true);
        reason
    }

    /// Final teardown once the reader has stopped
    pub(crate) async fn finish(&self) {
        let _ = self.writer.lock().await.shutdown().await;
        self.pending.fail_all().await;
    }

    fn record_sent(&self, header: &FrameHeader) {
        if header.status.is_control() {
            return;
        }
        self.stats.record_sent(header.content_length);
        if let Some(aggregate) = &self.aggregate {
            aggregate.record_sent(header.content_length);
        }
    }

    fn record_received(&self, header: &FrameHeader) {
        self.stats.record_received(header.content_length);
        if let Some(aggregate) = &self.aggregate {
            aggregate.record_received(header.content_length);
        }
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closing() {
            return Err(AppError::disconnected(format!("Connection to {} is closed", self.peer_addr)));
        }
        Ok(())
    }

    /// Write one frame; concurrent callers never interleave
    pub(crate) async fn send(&self, header: FrameHeader, payload: &[u8]) -> Result<()> {
        self.ensure_open()?;
        {
            let mut writer = self.writer.lock().await;
            protocol::write_frame(&mut *writer, &header, payload).await?;
        }
        self.record_sent(&header);
        self.logger
            .log_frame("send", self.peer_addr, &format!("{:?}", header.status), header.content_length)
            .await;
        Ok(())
    }

    pub(crate) async fn send_control(&self, status: MessageStatus) -> Result<()> {
        self.send(FrameHeader::control(status), &[]).await
    }

    pub(crate) async fn send_data(&self, payload: &[u8], metadata: Option<Metadata>) -> Result<()> {
        let header = FrameHeader::data(payload.len() as u64).with_metadata(metadata);
        self.send(header, payload).await
    }

    /// Copy exactly `content_length` bytes from `source` as one frame.
    /// A failure leaves a truncated frame behind, so the connection is closed.
    pub(crate) async fn send_stream<R>(
        &self,
        content_length: u64,
        source: &mut R,
        metadata: Option<Metadata>,
    ) -> Result<u64>
    where
        R: AsyncRead + Unpin + Send,
    {
        self.ensure_open()?;
        let header = FrameHeader::data(content_length).with_metadata(metadata);
        let result = {
            let mut writer = self.writer.lock().await;
            protocol::write_stream_frame(&mut *writer, &header, source, self.stream_buffer_size).await
        };
        match result {
            Ok(written) => {
                self.record_sent(&header);
                Ok(written)
            }
            Err(e) => {
                self.close(DisconnectReason::ConnectionLost);
                Err(e)
            }
        }
    }

    /// Send a sync request and wait for the matching response
    pub(crate) async fn send_and_wait(
        &self,
        timeout: Duration,
        payload: &[u8],
        metadata: Option<Metadata>,
    ) -> Result<Message> {
        if timeout.is_zero() {
            return Err(AppError::validation("Sync request timeout must be greater than zero"));
        }
        let expiration = Utc::now()
            + chrono::Duration::from_std(timeout)
                .map_err(|e| AppError::validation(format!("Sync request timeout out of range: {}", e)))?;
        let conversation_id = Uuid::new_v4();
        let response = self.pending.register(conversation_id).await;

        let header = FrameHeader::data(payload.len() as u64)
            .with_metadata(metadata)
            .into_sync_request(conversation_id, expiration);
        if let Err(e) = self.send(header, payload).await {
            self.pending.cancel(&conversation_id).await;
            return Err(e);
        }

        match tokio::time::timeout(timeout, response).await {
            Ok(Ok(message)) if message.status == MessageStatus::Failure => {
                let reason = message
                    .metadata_value("error")
                    .and_then(|v| v.as_str())
                    .unwrap_or("no handler for sync requests");
                Err(AppError::protocol(format!("Sync request rejected by {}: {}", self.peer_addr, reason)))
            }
            Ok(Ok(message)) => Ok(message),
            Ok(Err(_)) => Err(AppError::disconnected(format!(
                "Connection to {} closed while waiting for a sync response",
                self.peer_addr
            ))),
            Err(_) => {
                self.pending.cancel(&conversation_id).await;
                Err(AppError::timeout(format!(
                    "No sync response from {} within {}ms",
                    self.peer_addr,
                    timeout.as_millis()
                )))
            }
        }
    }

    /// Turn a data frame into a delivery for the owner.
    /// Sync traffic is answered or routed here and never reaches the owner.
    pub(crate) async fn receive_data(
        self: &Arc<Self>,
        reader: &mut FrameReader,
        header: FrameHeader,
        handler: Option<&Arc<dyn SyncRequestHandler>>,
    ) -> Result<Delivery> {
        self.record_received(&header);
        self.logger
            .log_frame("recv", self.peer_addr, &format!("{:?}", header.status), header.content_length)
            .await;

        if header.sync_response {
            let payload = reader.read_payload(header.content_length).await?;
            if !self.pending.complete(Message::from_parts(header, payload)).await {
                self.logger
                    .logger()
                    .debug(&format!("Dropping late or unknown sync response from {}", self.peer_addr))
                    .log()
                    .await;
            }
            return Ok(Delivery::Consumed);
        }

        if header.sync_request {
            let now = Utc::now();
            if header.is_expired_at(now) {
                reader.discard(header.content_length).await?;
                self.logger
                    .logger()
                    .debug(&format!("Dropping expired sync request from {}", self.peer_addr))
                    .field("expiration", header.expiration)
                    .log()
                    .await;
                return Ok(Delivery::Consumed);
            }
            let payload = reader.read_payload(header.content_length).await?;
            let request = SyncRequest {
                conversation_id: header.conversation_id.unwrap_or_else(Uuid::new_v4),
                expiration: header.expiration.unwrap_or(now),
                metadata: header.metadata,
                payload,
                peer_addr: self.peer_addr,
            };
            tokio::spawn(answer_sync_request(Arc::clone(self), request, handler.cloned()));
            return Ok(Delivery::Consumed);
        }

        if header.content_length > reader.max_proxied_stream_size {
            let content_length = header.content_length;
            let (stream, chunks) = IncomingStream::new(&header);
            return Ok(Delivery::Stream { stream, chunks, content_length });
        }

        let payload = reader.read_payload(header.content_length).await?;
        Ok(Delivery::Message(Message::from_parts(header, payload)))
    }
}

async fn answer_sync_request(
    connection: Arc<Connection>,
    request: SyncRequest,
    handler: Option<Arc<dyn SyncRequestHandler>>,
) {
    let conversation_id = request.conversation_id;
    let outcome = match handler {
        Some(handler) => handler.handle(request).await,
        None => Err(AppError::protocol("no handler for sync requests")),
    };

    let (header, payload) = match outcome {
        Ok(SyncResponse { metadata, payload }) => (
            FrameHeader::data(payload.len() as u64)
                .with_metadata(metadata)
                .into_sync_response(conversation_id),
            payload,
        ),
        Err(e) => {
            let mut metadata = Metadata::new();
            metadata.insert("error".to_string(), serde_json::Value::String(e.to_string()));
            (
                FrameHeader::control(MessageStatus::Failure)
                    .with_metadata(Some(metadata))
                    .into_sync_response(conversation_id),
                Bytes::new(),
            )
        }
    };

    if let Err(e) = connection.send(header, &payload).await {
        connection
            .logger()
            .logger()
            .debug(&format!("Failed to answer sync request from {}", connection.peer_addr))
            .error_info(&e)
            .log()
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_statistics_counters() {
        let stats = ConnectionStatistics::new();
        stats.record_sent(10);
        stats.record_sent(5);
        stats.record_received(7);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.messages_sent, 2);
        assert_eq!(snapshot.bytes_sent, 15);
        assert_eq!(snapshot.messages_received, 1);
        assert_eq!(snapshot.bytes_received, 7);
    }
}
