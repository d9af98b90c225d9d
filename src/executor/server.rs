//! Standalone server mode: accept clients until interrupted

use super::{server_settings, Interrupt};
use crate::error::Result;
use crate::logging::Logger;
use crate::models::Config;
use crate::stats::rolling::RollingStats;
use crate::transport::{ClientMetadata, DisconnectReason, EchoHandler, MessageServer, ServerEvent, StatisticsSnapshot};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;

/// Periodic server statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerReport {
    pub endpoint: String,
    pub connected_clients: usize,
    pub total_connections: u64,
    pub total_disconnections: u64,
    pub statistics: StatisticsSnapshot,
    /// Messages received per second, one sample per report interval
    pub receive_rate: RollingStats,
    /// Messages received since the previous report
    pub interval_messages: u64,
    pub interval: Duration,
}

impl ServerReport {
    pub fn last_rate(&self) -> f64 {
        self.interval_messages as f64 / self.interval.as_secs_f64().max(f64::EPSILON)
    }
}

/// Something the caller may want to print
#[derive(Debug, Clone)]
pub enum ServerActivity {
    Listening { endpoint: String },
    ClientConnected(ClientMetadata),
    ClientDisconnected { client: ClientMetadata, reason: DisconnectReason },
    AuthenticationFailed { peer: String },
    Report(ServerReport),
}

/// Run a server until `interrupt` fires, reporting activity through
/// `on_activity`. Returns the final report.
pub async fn run_server<F>(config: &Config, interrupt: &Interrupt, mut on_activity: F) -> Result<ServerReport>
where
    F: FnMut(ServerActivity) + Send,
{
    let logger = Logger::with_config("SERVER".to_string(), config);
    let mut settings = server_settings(config, config.endpoint()?, logger.clone());
    if config.echo {
        settings = settings.with_sync_handler(Arc::new(EchoHandler));
    }

    let (server, mut events) = MessageServer::start(settings).await?;
    let endpoint = server.local_addr().to_string();
    on_activity(ServerActivity::Listening {
        endpoint: endpoint.clone(),
    });

    let interval = config.stats_interval();
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut receive_rate = RollingStats::new();
    let mut total_connections = 0u64;
    let mut total_disconnections = 0u64;
    let mut last_received = 0u64;

    loop {
        tokio::select! {
            _ = interrupt.wait() => break,
            _ = ticker.tick() => {
                let statistics = server.statistics();
                let interval_messages = statistics.messages_received - last_received;
                last_received = statistics.messages_received;
                receive_rate.add_value(interval_messages as f64 / interval.as_secs_f64());

                on_activity(ServerActivity::Report(ServerReport {
                    endpoint: endpoint.clone(),
                    connected_clients: server.client_count().await,
                    total_connections,
                    total_disconnections,
                    statistics,
                    receive_rate,
                    interval_messages,
                    interval,
                }));
            }
            event = events.recv() => {
                let Some(event) = event else { break };
                match event {
                    ServerEvent::ClientConnected(client) => {
                        total_connections += 1;
                        on_activity(ServerActivity::ClientConnected(client));
                    }
                    ServerEvent::ClientDisconnected { client, reason } => {
                        total_disconnections += 1;
                        on_activity(ServerActivity::ClientDisconnected { client, reason });
                    }
                    ServerEvent::AuthenticationFailed { peer_addr } => {
                        on_activity(ServerActivity::AuthenticationFailed { peer: peer_addr.to_string() });
                    }
                    ServerEvent::MessageReceived { client, message } => {
                        if config.echo {
                            if let Err(e) = server.send(&client.id, &message.payload).await {
                                logger.debug("Echo failed").error_info(&e).log().await;
                            }
                        }
                    }
                    ServerEvent::StreamReceived { client, stream } => {
                        // Reading drains the socket; echo mode replies with the whole payload
                        match stream.read_to_end().await {
                            Ok(payload) if config.echo => {
                                if let Err(e) = server.send(&client.id, &payload).await {
                                    logger.debug("Echo failed").error_info(&e).log().await;
                                }
                            }
                            Ok(_) => {}
                            Err(e) => logger.warn("Incomplete stream").error_info(&e).log().await,
                        }
                    }
                    ServerEvent::Stopped => break,
                    ServerEvent::AuthenticationSucceeded(_) => {}
                }
            }
        }
    }

    let report = ServerReport {
        endpoint,
        connected_clients: server.client_count().await,
        total_connections,
        total_disconnections,
        statistics: server.statistics(),
        receive_rate,
        interval_messages: 0,
        interval,
    };
    server.stop().await?;
    logger
        .info("Server stopped")
        .field("connections", total_connections)
        .field("messages_received", report.statistics.messages_received)
        .log()
        .await;
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{ClientSettings, MessageClient};
    use crate::types::Endpoint;
    use std::sync::Mutex;

    #[tokio::test]
    async fn test_server_reports_activity_until_interrupted() {
        let config = Config {
            endpoint: "127.0.0.1:0".to_string(),
            stats_interval_seconds: 1,
            echo: true,
            ..Default::default()
        };
        let interrupt = Interrupt::new();
        let activity = Arc::new(Mutex::new(Vec::new()));
        let (addr_tx, addr_rx) = tokio::sync::oneshot::channel();

        let server_task = {
            let interrupt = interrupt.clone();
            let activity = Arc::clone(&activity);
            tokio::spawn(async move {
                let mut addr_tx = Some(addr_tx);
                run_server(&config, &interrupt, move |event| {
                    if let ServerActivity::Listening { endpoint } = &event {
                        if let Some(tx) = addr_tx.take() {
                            let _ = tx.send(endpoint.clone());
                        }
                    }
                    activity.lock().unwrap().push(event);
                })
                .await
            })
        };

        let endpoint = Endpoint::parse(&addr_rx.await.unwrap()).unwrap();
        let (client, mut events) = MessageClient::connect(ClientSettings::new(endpoint)).await.unwrap();
        client.send(b"ping").await.unwrap();
        loop {
            match events.recv().await.unwrap() {
                crate::transport::ClientEvent::MessageReceived(message) => {
                    assert_eq!(message.payload.as_ref(), b"ping");
                    break;
                }
                _ => continue,
            }
        }
        client.disconnect().await.unwrap();

        tokio::time::sleep(Duration::from_millis(1100)).await;
        interrupt.trigger();
        let report = server_task.await.unwrap().unwrap();

        assert_eq!(report.total_connections, 1);
        assert_eq!(report.statistics.messages_received, 1);
        let activity = activity.lock().unwrap();
        assert!(activity.iter().any(|a| matches!(a, ServerActivity::ClientConnected(_))));
        assert!(activity.iter().any(|a| matches!(a, ServerActivity::Report(_))));
    }
}
