//! Framed TCP client

use super::connection::{Connection, Delivery, FrameReader, StatisticsSnapshot};
use super::events::{ClientEvent, DisconnectReason, EventSink};
use super::keepalive;
use super::settings::ClientSettings;
use super::sync::SyncRequestHandler;
use crate::error::{AppError, Result};
use crate::logging::NetworkLogger;
use crate::protocol::{FrameHeader, Message, MessageStatus, Metadata};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncRead;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

/// How long `disconnect` waits for the reader task before aborting it
const DISCONNECT_GRACE_PERIOD: Duration = Duration::from_secs(5);

/// Connected client. Dropping it closes the connection.
pub struct MessageClient {
    connection: Arc<Connection>,
    reader_task: Mutex<Option<JoinHandle<()>>>,
}

impl MessageClient {
    /// Connect, authenticate when a pre-shared key is configured, and start
    /// the background reader
    pub async fn connect(settings: ClientSettings) -> Result<(Self, mpsc::Receiver<ClientEvent>)> {
        let logger = NetworkLogger::from_logger(settings.logger.clone());
        let target = settings.endpoint.to_string();

        let stream = match tokio::time::timeout(
            settings.connect_timeout,
            TcpStream::connect(settings.endpoint.as_tuple()),
        )
        .await
        {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                logger.log_connection(&target, false, Some(&e.to_string())).await;
                return Err(AppError::network(format!("Failed to connect to {}: {}", target, e)));
            }
            Err(_) => {
                logger.log_connection(&target, false, Some("timed out")).await;
                return Err(AppError::timeout(format!(
                    "Connecting to {} timed out after {}ms",
                    target,
                    settings.connect_timeout.as_millis()
                )));
            }
        };

        stream.set_nodelay(true)?;
        keepalive::apply(&stream, &settings.keepalive)?;
        let server_addr = stream.peer_addr()?;
        let local_addr = stream.local_addr()?;

        let (read_half, write_half) = stream.into_split();
        let connection = Arc::new(Connection::new(
            write_half,
            server_addr,
            local_addr,
            None,
            settings.stream_buffer_size,
            logger.clone(),
        ));
        let mut reader = FrameReader::new(read_half, settings.max_proxied_stream_size, settings.stream_buffer_size);

        if let Some(key) = &settings.preshared_key {
            let handshake = authenticate(&connection, &mut reader, key);
            match tokio::time::timeout(settings.connect_timeout, handshake).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    logger.log_authentication(server_addr, false).await;
                    connection.close(DisconnectReason::AuthFailure);
                    connection.finish().await;
                    return Err(e);
                }
                Err(_) => {
                    connection.close(DisconnectReason::Timeout);
                    connection.finish().await;
                    return Err(AppError::timeout(format!(
                        "No authentication reply from {} within {}ms",
                        server_addr,
                        settings.connect_timeout.as_millis()
                    )));
                }
            }
            logger.log_authentication(server_addr, true).await;
        }
        connection.set_authenticated(true);

        let (tx, rx) = mpsc::channel(settings.event_channel_capacity.max(2));
        let events = EventSink::new(tx);
        logger.log_connection(&target, true, None).await;
        events.emit(ClientEvent::Connected { server_addr }).await;
        if settings.preshared_key.is_some() {
            events.emit(ClientEvent::AuthenticationSucceeded).await;
        }

        let reader_task = tokio::spawn(run_reader(
            Arc::clone(&connection),
            reader,
            events,
            settings.sync_handler.clone(),
        ));

        Ok((
            Self {
                connection,
                reader_task: Mutex::new(Some(reader_task)),
            },
            rx,
        ))
    }

    pub async fn send(&self, data: &[u8]) -> Result<()> {
        self.connection.send_data(data, None).await
    }

    pub async fn send_with_metadata(&self, data: &[u8], metadata: Metadata) -> Result<()> {
        self.connection.send_data(data, Some(metadata)).await
    }

    /// Send exactly `content_length` bytes from `source` as one message.
    ///
    /// Bytes past `content_length` stay unread in `source`. If `source` ends
    /// early the frame cannot be completed and the connection is closed.
    pub async fn send_stream<R>(&self, content_length: u64, source: &mut R, metadata: Option<Metadata>) -> Result<u64>
    where
        R: AsyncRead + Unpin + Send,
    {
        self.connection.send_stream(content_length, source, metadata).await
    }

    /// Send a sync request and wait up to `timeout` for the response
    pub async fn send_and_wait(&self, timeout: Duration, data: &[u8], metadata: Option<Metadata>) -> Result<Message> {
        self.connection.send_and_wait(timeout, data, metadata).await
    }

    /// Close the connection and wait for the `Disconnected` event to be emitted
    pub async fn disconnect(&self) -> Result<()> {
        self.connection.close(DisconnectReason::Normal);
        let reader_task = self.reader_task.lock().await.take();
        if let Some(mut reader_task) = reader_task {
            if tokio::time::timeout(DISCONNECT_GRACE_PERIOD, &mut reader_task).await.is_err() {
                reader_task.abort();
                self.connection.finish().await;
            }
        }
        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        !self.connection.is_closing()
    }

    pub fn statistics(&self) -> StatisticsSnapshot {
        self.connection.statistics()
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.connection.local_addr
    }

    pub fn server_addr(&self) -> SocketAddr {
        self.connection.peer_addr
    }
}

impl Drop for MessageClient {
    fn drop(&mut self) {
        self.connection.close(DisconnectReason::Normal);
    }
}

async fn authenticate(connection: &Connection, reader: &mut FrameReader, key: &str) -> Result<()> {
    connection.send(FrameHeader::auth_request(key), &[]).await?;
    loop {
        let header = reader.next_header().await?.ok_or_else(|| {
            AppError::disconnected(format!("{} closed the connection during authentication", connection.peer_addr))
        })?;
        reader.discard(header.content_length).await?;
        match header.status {
            MessageStatus::AuthSuccess => return Ok(()),
            MessageStatus::AuthFailure => {
                return Err(AppError::auth(format!("{} rejected the pre-shared key", connection.peer_addr)));
            }
            _ => continue,
        }
    }
}

async fn run_reader(
    connection: Arc<Connection>,
    mut reader: FrameReader,
    events: EventSink<ClientEvent>,
    handler: Option<Arc<dyn SyncRequestHandler>>,
) {
    let reason = match read_loop(&connection, &mut reader, &events, handler.as_ref()).await {
        Ok(reason) => reason,
        Err(e) => {
            connection
                .logger()
                .logger()
                .debug(&format!("Connection to {} failed", connection.peer_addr))
                .error_info(&e)
                .log()
                .await;
            DisconnectReason::ConnectionLost
        }
    };
    let reason = connection.close(reason);
    connection.finish().await;
    connection.logger().log_disconnection(connection.peer_addr, reason.as_str()).await;
    events.emit(ClientEvent::Disconnected { reason }).await;
}

async fn read_loop(
    connection: &Arc<Connection>,
    reader: &mut FrameReader,
    events: &EventSink<ClientEvent>,
    handler: Option<&Arc<dyn SyncRequestHandler>>,
) -> Result<DisconnectReason> {
    let mut closing = connection.closing_signal();

    loop {
        let header = tokio::select! {
            _ = closing.wait_for(|closed| *closed) => {
                return Ok(connection.reason().unwrap_or(DisconnectReason::Normal));
            }
            header = reader.next_header() => header?,
        };
        // EOF at a frame boundary
        let Some(header) = header else {
            return Ok(DisconnectReason::Normal);
        };

        if let Some(reason) = DisconnectReason::from_control(header.status) {
            if reason == DisconnectReason::AuthFailure {
                events.emit(ClientEvent::AuthenticationFailed).await;
            }
            return Ok(reason);
        }

        match header.status {
            MessageStatus::AuthRequired => {
                reader.discard(header.content_length).await?;
                events.emit(ClientEvent::AuthenticationRequired).await;
                continue;
            }
            MessageStatus::AuthSuccess => {
                reader.discard(header.content_length).await?;
                connection.set_authenticated(true);
                events.emit(ClientEvent::AuthenticationSucceeded).await;
                continue;
            }
            status if status.is_control() => {
                reader.discard(header.content_length).await?;
                continue;
            }
            _ => {}
        }

        match connection.receive_data(reader, header, handler).await? {
            Delivery::Message(message) => events.emit(ClientEvent::MessageReceived(message)).await,
            Delivery::Stream { stream, chunks, content_length } => {
                events.emit(ClientEvent::StreamReceived(stream)).await;
                reader.pump(content_length, chunks).await?;
            }
            Delivery::Consumed => {}
        }
    }
}
