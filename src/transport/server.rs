//! Framed TCP server

use super::connection::{Connection, ConnectionStatistics, Delivery, FrameReader, StatisticsSnapshot};
use super::events::{ClientMetadata, DisconnectReason, EventSink, ServerEvent};
use super::keepalive;
use super::settings::ServerSettings;
use crate::error::{AppError, Result};
use crate::logging::NetworkLogger;
use crate::protocol::{FrameHeader, Message, MessageStatus, Metadata};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncRead;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::{JoinHandle, JoinSet};
use uuid::Uuid;

/// How long `stop` waits for connection tasks to wind down
const STOP_GRACE_PERIOD: Duration = Duration::from_secs(5);

struct ServerShared {
    settings: ServerSettings,
    clients: Mutex<HashMap<Uuid, Arc<Connection>>>,
    tasks: Mutex<JoinSet<()>>,
    stats: Arc<ConnectionStatistics>,
    events: EventSink<ServerEvent>,
    shutdown: watch::Sender<bool>,
    logger: NetworkLogger,
}

/// Running server. Dropping the handle stops accepting and closes every
/// connection without sending `Shutdown` frames; call [`stop`](Self::stop)
/// for an orderly shutdown.
pub struct MessageServer {
    shared: Arc<ServerShared>,
    local_addr: SocketAddr,
    accept_task: Mutex<Option<JoinHandle<()>>>,
    stopped: AtomicBool,
}

impl MessageServer {
    /// Bind the endpoint and start accepting connections
    pub async fn start(settings: ServerSettings) -> Result<(Self, mpsc::Receiver<ServerEvent>)> {
        let listener = TcpListener::bind(settings.endpoint.as_tuple())
            .await
            .map_err(|e| AppError::network(format!("Failed to bind {}: {}", settings.endpoint, e)))?;
        let local_addr = listener.local_addr()?;

        let (tx, rx) = mpsc::channel(settings.event_channel_capacity.max(1));
        let (shutdown, _) = watch::channel(false);
        let logger = NetworkLogger::from_logger(settings.logger.clone());

        logger
            .logger()
            .info(&format!("Server listening on {}", local_addr))
            .field("max_connections", settings.max_connections)
            .field("authentication", settings.preshared_key.is_some())
            .log()
            .await;

        let shared = Arc::new(ServerShared {
            settings,
            clients: Mutex::new(HashMap::new()),
            tasks: Mutex::new(JoinSet::new()),
            stats: Arc::new(ConnectionStatistics::new()),
            events: EventSink::new(tx),
            shutdown,
            logger,
        });

        let accept_task = tokio::spawn(accept_loop(Arc::clone(&shared), listener));

        Ok((
            Self {
                shared,
                local_addr,
                accept_task: Mutex::new(Some(accept_task)),
                stopped: AtomicBool::new(false),
            },
            rx,
        ))
    }

    /// Bound address; useful when the endpoint asked for port 0
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn is_running(&self) -> bool {
        !*self.shared.shutdown.borrow()
    }

    async fn client(&self, client_id: &Uuid) -> Result<Arc<Connection>> {
        self.shared
            .clients
            .lock()
            .await
            .get(client_id)
            .cloned()
            .ok_or_else(|| AppError::disconnected(format!("Client {} is not connected", client_id)))
    }

    pub async fn send(&self, client_id: &Uuid, data: &[u8]) -> Result<()> {
        self.client(client_id).await?.send_data(data, None).await
    }

    pub async fn send_with_metadata(&self, client_id: &Uuid, data: &[u8], metadata: Metadata) -> Result<()> {
        self.client(client_id).await?.send_data(data, Some(metadata)).await
    }

    /// Send exactly `content_length` bytes read from `source`
    pub async fn send_stream<R>(
        &self,
        client_id: &Uuid,
        content_length: u64,
        source: &mut R,
        metadata: Option<Metadata>,
    ) -> Result<u64>
    where
        R: AsyncRead + Unpin + Send,
    {
        self.client(client_id).await?.send_stream(content_length, source, metadata).await
    }

    pub async fn send_and_wait(
        &self,
        client_id: &Uuid,
        timeout: Duration,
        data: &[u8],
        metadata: Option<Metadata>,
    ) -> Result<Message> {
        self.client(client_id).await?.send_and_wait(timeout, data, metadata).await
    }

    /// Tell a client it was removed and close its connection
    pub async fn disconnect_client(&self, client_id: &Uuid) -> Result<()> {
        let connection = self.client(client_id).await?;
        if let Err(e) = connection.send_control(MessageStatus::Removed).await {
            self.shared
                .logger
                .logger()
                .debug(&format!("Could not notify {} of removal", connection.peer_addr))
                .error_info(&e)
                .log()
                .await;
        }
        connection.close(DisconnectReason::Removed);
        Ok(())
    }

    pub async fn list_clients(&self) -> Vec<ClientMetadata> {
        let mut clients: Vec<ClientMetadata> = self
            .shared
            .clients
            .lock()
            .await
            .values()
            .map(|c| c.metadata())
            .collect();
        clients.sort_by_key(|c| c.connected_at);
        clients
    }

    pub async fn client_count(&self) -> usize {
        self.shared.clients.lock().await.len()
    }

    pub async fn is_client_connected(&self, client_id: &Uuid) -> bool {
        self.shared.clients.lock().await.contains_key(client_id)
    }

    /// Aggregate counters across every connection since start
    pub fn statistics(&self) -> StatisticsSnapshot {
        self.shared.stats.snapshot()
    }

    /// Send `Shutdown` to every client, stop accepting and wait for the
    /// connection tasks to finish. Calling it twice is a no-op.
    pub async fn stop(&self) -> Result<()> {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        let clients: Vec<Arc<Connection>> = self.shared.clients.lock().await.values().cloned().collect();
        for connection in &clients {
            let _ = connection.send_control(MessageStatus::Shutdown).await;
            connection.close(DisconnectReason::Shutdown);
        }
        self.shared.shutdown.send_replace(true);

        if let Some(accept_task) = self.accept_task.lock().await.take() {
            let _ = accept_task.await;
        }

        let mut tasks = std::mem::take(&mut *self.shared.tasks.lock().await);
        let drained = tokio::time::timeout(STOP_GRACE_PERIOD, async {
            while tasks.join_next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            tasks.abort_all();
        }

        self.shared
            .logger
            .logger()
            .info(&format!("Server on {} stopped", self.local_addr))
            .field("connections_closed", clients.len())
            .log()
            .await;
        self.shared.events.emit(ServerEvent::Stopped).await;
        Ok(())
    }
}

impl Drop for MessageServer {
    fn drop(&mut self) {
        self.shared.shutdown.send_replace(true);
    }
}

async fn accept_loop(shared: Arc<ServerShared>, listener: TcpListener) {
    let mut shutdown = shared.shutdown.subscribe();

    loop {
        let accepted = tokio::select! {
            _ = shutdown.wait_for(|stopped| *stopped) => break,
            accepted = listener.accept() => accepted,
        };

        let (stream, peer_addr) = match accepted {
            Ok(accepted) => accepted,
            Err(e) => {
                shared
                    .logger
                    .logger()
                    .warn(&format!("Accept failed: {}", e))
                    .log()
                    .await;
                tokio::time::sleep(Duration::from_millis(10)).await;
                continue;
            }
        };

        let connected = shared.clients.lock().await.len();
        if connected >= shared.settings.max_connections {
            shared
                .logger
                .logger()
                .warn(&format!("Rejecting {}: {} connections already open", peer_addr, connected))
                .field("max_connections", shared.settings.max_connections)
                .log()
                .await;
            drop(stream);
            continue;
        }

        if let Err(e) = prepare_socket(&stream, &shared.settings) {
            shared
                .logger
                .logger()
                .warn(&format!("Could not set socket options for {}", peer_addr))
                .error_info(&e)
                .log()
                .await;
        }

        let local_addr = match stream.local_addr() {
            Ok(addr) => addr,
            Err(e) => {
                shared.logger.log_connection(&peer_addr.to_string(), false, Some(&e.to_string())).await;
                continue;
            }
        };

        let (read_half, write_half) = stream.into_split();
        let connection = Arc::new(Connection::new(
            write_half,
            peer_addr,
            local_addr,
            Some(Arc::clone(&shared.stats)),
            shared.settings.stream_buffer_size,
            shared.logger.clone(),
        ));
        connection.set_authenticated(shared.settings.preshared_key.is_none());
        let reader = FrameReader::new(
            read_half,
            shared.settings.max_proxied_stream_size,
            shared.settings.stream_buffer_size,
        );

        shared.clients.lock().await.insert(connection.id, Arc::clone(&connection));
        shared.logger.log_accept(&connection.id, peer_addr).await;
        shared.events.emit(ServerEvent::ClientConnected(connection.metadata())).await;

        let mut tasks = shared.tasks.lock().await;
        while tasks.try_join_next().is_some() {}
        tasks.spawn(handle_client(Arc::clone(&shared), connection, reader));
    }

    shared.logger.logger().debug("Accept loop finished").log().await;
}

fn prepare_socket(stream: &TcpStream, settings: &ServerSettings) -> Result<()> {
    stream.set_nodelay(true)?;
    keepalive::apply(stream, &settings.keepalive)
}

async fn handle_client(shared: Arc<ServerShared>, connection: Arc<Connection>, mut reader: FrameReader) {
    let outcome = client_loop(&shared, &connection, &mut reader).await;
    let reason = match outcome {
        Ok(reason) => reason,
        Err(e) => {
            shared
                .logger
                .logger()
                .debug(&format!("Connection with {} failed", connection.peer_addr))
                .error_info(&e)
                .log()
                .await;
            DisconnectReason::ConnectionLost
        }
    };
    let reason = connection.close(reason);
    connection.finish().await;

    shared.clients.lock().await.remove(&connection.id);
    shared.logger.log_disconnection(connection.peer_addr, reason.as_str()).await;
    shared
        .events
        .emit(ServerEvent::ClientDisconnected {
            client: connection.metadata(),
            reason,
        })
        .await;
}

enum ReadOutcome {
    Frame(FrameHeader),
    Closed,
    Idle,
}

async fn next_frame(reader: &mut FrameReader, idle_timeout: Duration) -> Result<ReadOutcome> {
    let header = if idle_timeout.is_zero() {
        reader.next_header().await?
    } else {
        match tokio::time::timeout(idle_timeout, reader.next_header()).await {
            Ok(header) => header?,
            Err(_) => return Ok(ReadOutcome::Idle),
        }
    };
    Ok(header.map(ReadOutcome::Frame).unwrap_or(ReadOutcome::Closed))
}

async fn client_loop(
    shared: &Arc<ServerShared>,
    connection: &Arc<Connection>,
    reader: &mut FrameReader,
) -> Result<DisconnectReason> {
    let mut closing = connection.closing_signal();
    let mut shutdown = shared.shutdown.subscribe();
    let settings = &shared.settings;

    loop {
        let outcome = tokio::select! {
            _ = closing.wait_for(|closed| *closed) => {
                return Ok(connection.reason().unwrap_or(DisconnectReason::Normal));
            }
            _ = shutdown.wait_for(|stopped| *stopped) => {
                return Ok(DisconnectReason::Shutdown);
            }
            outcome = next_frame(reader, settings.idle_timeout) => outcome?,
        };

        let header = match outcome {
            ReadOutcome::Frame(header) => header,
            ReadOutcome::Closed => return Ok(DisconnectReason::Normal),
            ReadOutcome::Idle => {
                shared
                    .logger
                    .logger()
                    .info(&format!("Client {} idle for {}s", connection.peer_addr, settings.idle_timeout.as_secs()))
                    .log()
                    .await;
                let _ = connection.send_control(MessageStatus::Timeout).await;
                return Ok(DisconnectReason::Timeout);
            }
        };

        match header.status {
            MessageStatus::AuthRequested => {
                reader.discard(header.content_length).await?;
                let accepted = match &settings.preshared_key {
                    None => true,
                    Some(key) => header.preshared_key.as_deref() == Some(key.as_str()),
                };
                shared.logger.log_authentication(connection.peer_addr, accepted).await;
                if accepted {
                    connection.set_authenticated(true);
                    connection.send_control(MessageStatus::AuthSuccess).await?;
                    if settings.preshared_key.is_some() {
                        shared
                            .events
                            .emit(ServerEvent::AuthenticationSucceeded(connection.metadata()))
                            .await;
                    }
                    continue;
                }
                let _ = connection.send_control(MessageStatus::AuthFailure).await;
                shared
                    .events
                    .emit(ServerEvent::AuthenticationFailed {
                        peer_addr: connection.peer_addr,
                    })
                    .await;
                return Ok(DisconnectReason::AuthFailure);
            }
            _ if !connection.is_authenticated() => {
                reader.discard(header.content_length).await?;
                connection.send_control(MessageStatus::AuthRequired).await?;
                continue;
            }
            status if status.is_control() => {
                reader.discard(header.content_length).await?;
                if status != MessageStatus::Heartbeat {
                    shared
                        .logger
                        .logger()
                        .debug(&format!("Ignoring {:?} frame from {}", status, connection.peer_addr))
                        .log()
                        .await;
                }
                continue;
            }
            _ => {}
        }

        match connection.receive_data(reader, header, settings.sync_handler.as_ref()).await? {
            Delivery::Message(message) => {
                shared
                    .events
                    .emit(ServerEvent::MessageReceived {
                        client: connection.metadata(),
                        message,
                    })
                    .await;
            }
            Delivery::Stream { stream, chunks, content_length } => {
                shared
                    .events
                    .emit(ServerEvent::StreamReceived {
                        client: connection.metadata(),
                        stream,
                    })
                    .await;
                reader.pump(content_length, chunks).await?;
            }
            Delivery::Consumed => {}
        }
    }
}
