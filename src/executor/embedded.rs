//! In-process server the client scenarios run against

use super::server_settings;
use crate::error::Result;
use crate::logging::Logger;
use crate::models::Config;
use crate::protocol::Message;
use crate::transport::{EchoHandler, MessageServer, ServerEvent};
use crate::types::Endpoint;
use bytes::Bytes;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Metadata key carrying the operation sequence number
pub const SEQUENCE_KEY: &str = "seq";

#[derive(Debug, Clone, Default)]
pub struct EmbeddedOptions {
    /// Echo messages back and answer sync requests
    pub echo: bool,
    /// Every payload must equal a prefix of this buffer
    pub expected_prefix: Option<Bytes>,
    /// Override for the streaming threshold
    pub max_proxied_stream_size: Option<u64>,
}

/// What the embedded server saw
#[derive(Default)]
pub struct ObservedTraffic {
    messages: AtomicU64,
    bytes: AtomicU64,
    connections: AtomicU64,
    /// Sequence numbers of payloads that failed verification
    rejected: Mutex<Vec<u64>>,
    changed: Notify,
}

impl ObservedTraffic {
    pub fn messages(&self) -> u64 {
        self.messages.load(Ordering::Acquire)
    }

    pub fn bytes(&self) -> u64 {
        self.bytes.load(Ordering::Acquire)
    }

    pub fn connections(&self) -> u64 {
        self.connections.load(Ordering::Acquire)
    }

    pub async fn rejected(&self) -> Vec<u64> {
        self.rejected.lock().await.clone()
    }

    async fn record(&self, sequence: Option<u64>, payload: &[u8], expected_prefix: Option<&Bytes>) {
        let valid = match expected_prefix {
            Some(prefix) => prefix.len() >= payload.len() && &prefix[..payload.len()] == payload,
            None => true,
        };
        if !valid {
            self.rejected.lock().await.push(sequence.unwrap_or(u64::MAX));
        }
        self.bytes.fetch_add(payload.len() as u64, Ordering::AcqRel);
        self.messages.fetch_add(1, Ordering::AcqRel);
        self.changed.notify_waiters();
    }
}

pub struct EmbeddedServer {
    server: Arc<MessageServer>,
    observed: Arc<ObservedTraffic>,
    event_task: JoinHandle<()>,
}

impl EmbeddedServer {
    /// Start a server on the configured endpoint
    pub async fn start(config: &Config, options: EmbeddedOptions) -> Result<Self> {
        let logger = Logger::with_config("EMBEDDED".to_string(), config);
        let mut settings = server_settings(config, config.endpoint()?, logger.clone());
        if options.echo {
            settings = settings.with_sync_handler(Arc::new(EchoHandler));
        }
        if let Some(size) = options.max_proxied_stream_size {
            settings = settings.with_max_proxied_stream_size(size);
        }

        let (server, mut events) = MessageServer::start(settings).await?;
        let server = Arc::new(server);
        let observed = Arc::new(ObservedTraffic::default());

        let event_task = {
            let server = Arc::clone(&server);
            let observed = Arc::clone(&observed);
            tokio::spawn(async move {
                while let Some(event) = events.recv().await {
                    match event {
                        ServerEvent::ClientConnected(_) => {
                            observed.connections.fetch_add(1, Ordering::AcqRel);
                        }
                        ServerEvent::MessageReceived { client, message } => {
                            observed
                                .record(sequence_of(&message), &message.payload, options.expected_prefix.as_ref())
                                .await;
                            if options.echo {
                                let _ = server.send(&client.id, &message.payload).await;
                            }
                        }
                        ServerEvent::StreamReceived { stream, .. } => {
                            let sequence = stream
                                .metadata
                                .as_ref()
                                .and_then(|md| md.get(SEQUENCE_KEY))
                                .and_then(|v| v.as_u64());
                            match stream.read_to_end().await {
                                Ok(payload) => {
                                    observed.record(sequence, &payload, options.expected_prefix.as_ref()).await;
                                }
                                Err(e) => {
                                    logger
                                        .warn("Embedded server lost a stream")
                                        .error_info(&e)
                                        .log()
                                        .await;
                                }
                            }
                        }
                        ServerEvent::Stopped => break,
                        _ => {}
                    }
                }
            })
        };

        Ok(Self {
            server,
            observed,
            event_task,
        })
    }

    /// Endpoint clients should connect to; resolves a requested port 0
    pub fn endpoint(&self) -> Endpoint {
        Endpoint::from(self.server.local_addr())
    }

    pub fn observed(&self) -> &ObservedTraffic {
        &self.observed
    }

    pub fn server(&self) -> &MessageServer {
        &self.server
    }

    /// Wait until the server has seen `count` messages or `timeout` passed.
    /// Returns whether the count was reached.
    pub async fn wait_for_messages(&self, count: u64, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            let changed = self.observed.changed.notified();
            if self.observed.messages() >= count {
                return true;
            }
            if tokio::time::timeout_at(deadline, changed).await.is_err() {
                return self.observed.messages() >= count;
            }
        }
    }

    pub async fn stop(self) -> Result<()> {
        self.server.stop().await?;
        let _ = self.event_task.await;
        Ok(())
    }
}

fn sequence_of(message: &Message) -> Option<u64> {
    message.metadata_value(SEQUENCE_KEY).and_then(|v| v.as_u64())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_record_verifies_prefix() {
        let observed = ObservedTraffic::default();
        let prefix = Bytes::from_static(b"abcdef");

        observed.record(Some(0), b"abc", Some(&prefix)).await;
        observed.record(Some(1), b"abx", Some(&prefix)).await;
        observed.record(Some(2), b"abcdefgh", Some(&prefix)).await;
        observed.record(None, b"anything", None).await;

        assert_eq!(observed.messages(), 4);
        assert_eq!(observed.bytes(), 3 + 3 + 8 + 8);
        assert_eq!(observed.rejected().await, vec![1, 2]);
    }
}
