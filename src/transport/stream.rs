//! Chunked delivery of large payloads

use crate::error::{AppError, Result};
use crate::protocol::{FrameHeader, Metadata};
use bytes::{Bytes, BytesMut};
use chrono::{DateTime, Utc};
use tokio::sync::mpsc;

/// Chunks buffered between the socket reader and the stream consumer
pub(crate) const STREAM_CHANNEL_CAPACITY: usize = 16;

/// A received payload delivered as a sequence of chunks.
///
/// The connection's reader keeps filling the channel while the consumer
/// reads; dropping the stream makes the reader discard the rest of the
/// payload.
#[derive(Debug)]
pub struct IncomingStream {
    pub metadata: Option<Metadata>,
    pub content_length: u64,
    /// Sender timestamp
    pub timestamp: DateTime<Utc>,
    chunks: mpsc::Receiver<Bytes>,
}

impl IncomingStream {
    pub(crate) fn new(header: &FrameHeader) -> (Self, mpsc::Sender<Bytes>) {
        let (tx, rx) = mpsc::channel(STREAM_CHANNEL_CAPACITY);
        let stream = Self {
            metadata: header.metadata.clone(),
            content_length: header.content_length,
            timestamp: header.timestamp,
            chunks: rx,
        };
        (stream, tx)
    }

    /// Next chunk, or `None` once the payload is complete or the
    /// connection failed
    pub async fn next_chunk(&mut self) -> Option<Bytes> {
        self.chunks.recv().await
    }

    /// Collect the whole payload
    pub async fn read_to_end(mut self) -> Result<Bytes> {
        let capacity = usize::try_from(self.content_length).unwrap_or(usize::MAX);
        let mut buffer = BytesMut::with_capacity(capacity.min(64 * 1024 * 1024));
        while let Some(chunk) = self.next_chunk().await {
            buffer.extend_from_slice(&chunk);
        }
        if buffer.len() as u64 != self.content_length {
            return Err(AppError::disconnected(format!(
                "Stream ended after {} of {} bytes",
                buffer.len(),
                self.content_length
            )));
        }
        Ok(buffer.freeze())
    }
}
