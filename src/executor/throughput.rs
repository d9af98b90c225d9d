//! Many fixed-size messages over one or more connections

use super::embedded::{EmbeddedOptions, EmbeddedServer};
use super::{client_settings, payload_pattern, Interrupt, Scenario};
use crate::error::Result;
use crate::logging::{Logger, PerformanceLogger};
use crate::models::{Config, OperationMetrics, ScenarioResult};
use crate::transport::MessageClient;
use crate::types::{Endpoint, ScenarioKind};
use async_trait::async_trait;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Instant;

pub struct ThroughputScenario;

/// Messages per client; the first client takes the remainder
pub fn split_messages(total: u64, clients: u32) -> Vec<u64> {
    let clients = u64::from(clients.max(1));
    let share = total / clients;
    let remainder = total % clients;
    (0..clients)
        .map(|i| if i == 0 { share + remainder } else { share })
        .collect()
}

/// One client's measurements and when it sent its first message
struct Batch {
    measurements: Vec<OperationMetrics>,
    first_send: Option<Instant>,
}

/// Elapsed time runs from the earliest first send, so connect and
/// handshake time is excluded. Without any send, `fallback` is used.
fn run_start(first_sends: impl IntoIterator<Item = Option<Instant>>, fallback: Instant) -> Instant {
    first_sends.into_iter().flatten().min().unwrap_or(fallback)
}

#[async_trait]
impl Scenario for ThroughputScenario {
    fn kind(&self) -> ScenarioKind {
        ScenarioKind::Throughput
    }

    async fn run(&self, config: &Config, interrupt: &Interrupt) -> Result<ScenarioResult> {
        let logger = Logger::with_config("THROUGHPUT".to_string(), config);
        let mut performance = PerformanceLogger::new(config);

        let embedded = if config.remote {
            None
        } else {
            Some(EmbeddedServer::start(config, EmbeddedOptions::default()).await?)
        };
        let endpoint = match &embedded {
            Some(server) => server.endpoint(),
            None => config.endpoint()?,
        };

        let mut result = ScenarioResult::new(self.kind(), endpoint.to_string());
        let payload: Arc<[u8]> = payload_pattern(config.message_size).into();
        let shares = split_messages(config.message_count, config.clients);

        logger
            .info("Starting throughput run")
            .field("endpoint", endpoint.to_string())
            .field("messages", config.message_count)
            .field("size", config.message_size)
            .field("clients", config.clients)
            .log()
            .await;

        performance.start_timing(self.name()).await;
        let fallback = Instant::now();
        let runs = shares.into_iter().map(|count| {
            let endpoint = endpoint.clone();
            let payload = Arc::clone(&payload);
            let logger = logger.clone();
            async move { send_batch(config, endpoint, payload, count, logger, interrupt).await }
        });
        let batches = join_all(runs).await;
        let started = run_start(batches.iter().map(|batch| batch.first_send), fallback);
        for batch in batches {
            for metrics in batch.measurements {
                result.add_measurement(metrics);
            }
        }

        if let Some(server) = embedded {
            let expected = result.success_count;
            if !server.wait_for_messages(expected, config.timeout()).await {
                logger
                    .warn("Embedded server did not observe every message before the timeout")
                    .field("expected", expected)
                    .field("observed", server.observed().messages())
                    .log()
                    .await;
            }
            result.set_server_observed(server.observed().messages(), server.observed().bytes());
            result.finish(started.elapsed());
            server.stop().await?;
        } else {
            result.finish(started.elapsed());
        }
        performance.end_timing(self.name()).await;

        result.interrupted = interrupt.is_triggered();
        performance.log_scenario_result(&result).await;
        Ok(result)
    }
}

/// One client's share of the run. A failed connect fails every message.
async fn send_batch(
    config: &Config,
    endpoint: Endpoint,
    payload: Arc<[u8]>,
    count: u64,
    logger: Logger,
    interrupt: &Interrupt,
) -> Batch {
    let mut batch = Batch {
        measurements: Vec::with_capacity(count as usize),
        first_send: None,
    };
    if count == 0 {
        return batch;
    }

    let connect_started = Instant::now();
    let client = match MessageClient::connect(client_settings(config, endpoint, logger.clone())).await {
        Ok((client, _events)) => client,
        Err(e) => {
            let failed = OperationMetrics::failed(connect_started.elapsed(), e.to_string());
            batch.measurements.extend(std::iter::repeat(failed).take(count as usize));
            return batch;
        }
    };

    for sent in 0..count {
        if interrupt.is_triggered() {
            let remaining = (count - sent) as usize;
            batch.measurements.extend(
                std::iter::repeat(OperationMetrics::skipped("interrupted".to_string())).take(remaining),
            );
            break;
        }
        let started = Instant::now();
        batch.first_send.get_or_insert(started);
        let outcome = client.send(&payload).await;
        let metrics = OperationMetrics::from_outcome(started, payload.len() as u64, &outcome);
        if let Err(e) = &outcome {
            logger.debug("Send failed").error_info(e).log().await;
        }
        batch.measurements.push(metrics);
    }

    if let Err(e) = client.disconnect().await {
        logger.debug("Disconnect failed").error_info(&e).log().await;
    }
    batch
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_messages() {
        assert_eq!(split_messages(10, 3), vec![4, 3, 3]);
        assert_eq!(split_messages(2, 4), vec![2, 0, 0, 0]);
        assert_eq!(split_messages(7, 1), vec![7]);
        assert_eq!(split_messages(5, 0), vec![5]);
        assert_eq!(split_messages(1000, 4).iter().sum::<u64>(), 1000);
    }

    #[test]
    fn test_run_start_is_earliest_first_send() {
        let fallback = Instant::now();
        let first = fallback + std::time::Duration::from_millis(40);
        let second = fallback + std::time::Duration::from_millis(15);

        assert_eq!(run_start([Some(first), None, Some(second)], fallback), second);
        assert_eq!(run_start([None, None], fallback), fallback);
        assert_eq!(run_start(Vec::<Option<Instant>>::new(), fallback), fallback);
    }

    #[tokio::test]
    async fn test_throughput_against_embedded_server() {
        let config = Config {
            endpoint: "127.0.0.1:0".to_string(),
            message_count: 50,
            message_size: 128,
            clients: 2,
            ..Default::default()
        };

        let result = ThroughputScenario.run(&config, &Interrupt::new()).await.unwrap();
        assert_eq!(result.total_count, 50);
        assert_eq!(result.success_count, 50);
        assert_eq!(result.server_messages_received, Some(50));
        assert_eq!(result.server_bytes_received, Some(50 * 128));
        assert!(result.is_clean());
        assert!(result.statistics.is_some());
    }
}
