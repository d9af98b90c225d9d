//! Server and client settings

use super::keepalive::KeepaliveSettings;
use super::sync::SyncRequestHandler;
use crate::logging::{LogLevel, Logger};
use crate::types::Endpoint;
use std::sync::Arc;
use std::time::Duration;

/// Payloads above this size are delivered as an [`IncomingStream`](super::IncomingStream)
pub const DEFAULT_MAX_PROXIED_STREAM_SIZE: u64 = 64 * 1024 * 1024;
pub const DEFAULT_STREAM_BUFFER_SIZE: usize = 64 * 1024;
pub const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 1024;
pub const DEFAULT_MAX_CONNECTIONS: usize = 4096;
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone)]
pub struct ServerSettings {
    pub endpoint: Endpoint,
    /// Connections beyond this count are closed right after accept
    pub max_connections: usize,
    /// Disconnect clients silent for this long; zero disables the check
    pub idle_timeout: Duration,
    pub preshared_key: Option<String>,
    pub keepalive: KeepaliveSettings,
    pub max_proxied_stream_size: u64,
    pub stream_buffer_size: usize,
    pub event_channel_capacity: usize,
    pub sync_handler: Option<Arc<dyn SyncRequestHandler>>,
    pub logger: Logger,
}

impl ServerSettings {
    pub fn new(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            max_connections: DEFAULT_MAX_CONNECTIONS,
            idle_timeout: Duration::ZERO,
            preshared_key: None,
            keepalive: KeepaliveSettings::default(),
            max_proxied_stream_size: DEFAULT_MAX_PROXIED_STREAM_SIZE,
            stream_buffer_size: DEFAULT_STREAM_BUFFER_SIZE,
            event_channel_capacity: DEFAULT_EVENT_CHANNEL_CAPACITY,
            sync_handler: None,
            logger: Logger::with_level("SERVER".to_string(), LogLevel::Warn, false),
        }
    }

    pub fn with_preshared_key<S: Into<String>>(mut self, key: Option<S>) -> Self {
        self.preshared_key = key.map(Into::into);
        self
    }

    pub fn with_sync_handler(mut self, handler: Arc<dyn SyncRequestHandler>) -> Self {
        self.sync_handler = Some(handler);
        self
    }

    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    pub fn with_max_connections(mut self, max_connections: usize) -> Self {
        self.max_connections = max_connections;
        self
    }

    pub fn with_max_proxied_stream_size(mut self, size: u64) -> Self {
        self.max_proxied_stream_size = size;
        self
    }

    pub fn with_logger(mut self, logger: Logger) -> Self {
        self.logger = logger;
        self
    }
}

#[derive(Clone)]
pub struct ClientSettings {
    pub endpoint: Endpoint,
    /// Bounds the TCP connect and, with a key, the authentication handshake
    pub connect_timeout: Duration,
    pub preshared_key: Option<String>,
    pub keepalive: KeepaliveSettings,
    pub max_proxied_stream_size: u64,
    pub stream_buffer_size: usize,
    pub event_channel_capacity: usize,
    pub sync_handler: Option<Arc<dyn SyncRequestHandler>>,
    pub logger: Logger,
}

impl ClientSettings {
    pub fn new(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            preshared_key: None,
            keepalive: KeepaliveSettings::default(),
            max_proxied_stream_size: DEFAULT_MAX_PROXIED_STREAM_SIZE,
            stream_buffer_size: DEFAULT_STREAM_BUFFER_SIZE,
            event_channel_capacity: DEFAULT_EVENT_CHANNEL_CAPACITY,
            sync_handler: None,
            logger: Logger::with_level("CLIENT".to_string(), LogLevel::Warn, false),
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_preshared_key<S: Into<String>>(mut self, key: Option<S>) -> Self {
        self.preshared_key = key.map(Into::into);
        self
    }

    pub fn with_sync_handler(mut self, handler: Arc<dyn SyncRequestHandler>) -> Self {
        self.sync_handler = Some(handler);
        self
    }

    pub fn with_max_proxied_stream_size(mut self, size: u64) -> Self {
        self.max_proxied_stream_size = size;
        self
    }

    pub fn with_logger(mut self, logger: Logger) -> Self {
        self.logger = logger;
        self
    }
}
