//! Connect, send, disconnect, sleep; repeated

use super::embedded::{EmbeddedOptions, EmbeddedServer};
use super::{client_settings, payload_pattern, Interrupt, Scenario};
use crate::error::Result;
use crate::logging::{Logger, PerformanceLogger};
use crate::models::{Config, OperationMetrics, ScenarioResult};
use crate::transport::MessageClient;
use crate::types::{Endpoint, ScenarioKind};
use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::{Duration, Instant};

pub struct ReconnectScenario;

/// Uniform delay in `[min, max]`
pub fn random_delay<R: Rng>(rng: &mut R, min: Duration, max: Duration) -> Duration {
    if max <= min {
        return min;
    }
    let millis = rng.gen_range(min.as_millis() as u64..=max.as_millis() as u64);
    Duration::from_millis(millis)
}

#[async_trait]
impl Scenario for ReconnectScenario {
    fn kind(&self) -> ScenarioKind {
        ScenarioKind::Reconnect
    }

    async fn run(&self, config: &Config, interrupt: &Interrupt) -> Result<ScenarioResult> {
        let logger = Logger::with_config("RECONNECT".to_string(), config);
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
        let payload = payload_pattern(config.message_size);
        let (min_delay, max_delay) = config.reconnect_delay_range();
        let mut rng = StdRng::from_entropy();

        performance.start_timing(self.name()).await;
        let started = Instant::now();
        let mut cycle: u64 = 0;
        while config.reconnect_cycles == 0 || cycle < config.reconnect_cycles {
            if interrupt.is_triggered() {
                break;
            }
            cycle += 1;

            let metrics = tokio::select! {
                metrics = run_cycle(config, &endpoint, &payload, &logger, cycle) => metrics,
                _ = interrupt.wait() => break,
            };
            result.add_measurement(metrics);

            let last = config.reconnect_cycles != 0 && cycle >= config.reconnect_cycles;
            if !last {
                let delay = random_delay(&mut rng, min_delay, max_delay);
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = interrupt.wait() => break,
                }
            }
        }
        let elapsed = started.elapsed();
        performance.end_timing(self.name()).await;

        if let Some(server) = embedded {
            server.wait_for_messages(result.success_count, config.timeout()).await;
            result.set_server_observed(server.observed().messages(), server.observed().bytes());
            server.stop().await?;
        }
        result.finish(elapsed);
        result.interrupted = interrupt.is_triggered();

        logger
            .info("Reconnect run finished")
            .field("cycles", result.total_count)
            .field("successful", result.success_count)
            .field("interrupted", result.interrupted)
            .log()
            .await;
        performance.log_scenario_result(&result).await;
        Ok(result)
    }
}

/// A single connect/send/disconnect cycle measured end to end
async fn run_cycle(config: &Config, endpoint: &Endpoint, payload: &[u8], logger: &Logger, cycle: u64) -> OperationMetrics {
    // Transport logs share this logger, so they carry the cycle's correlation id
    let correlation_id = logger.start_operation("reconnect cycle").await;
    let started = Instant::now();
    let client = match MessageClient::connect(client_settings(config, endpoint.clone(), logger.clone())).await {
        Ok((client, _events)) => client,
        Err(e) => {
            logger
                .warn("Connect failed, retrying")
                .field("cycle", cycle)
                .error_info(&e)
                .log()
                .await;
            logger.end_operation(&correlation_id, "reconnect cycle", false).await;
            return OperationMetrics::from_outcome(started, 0, &Err(e));
        }
    };
    logger
        .info("Connected")
        .field("cycle", cycle)
        .field("local_addr", client.local_addr().to_string())
        .log()
        .await;

    let outcome = client.send(payload).await;
    if let Err(e) = client.disconnect().await {
        logger.debug("Disconnect failed").error_info(&e).log().await;
    }
    logger.info("Disconnected").field("cycle", cycle).log().await;
    logger
        .end_operation(&correlation_id, "reconnect cycle", outcome.is_ok())
        .await;

    OperationMetrics::from_outcome(started, payload.len() as u64, &outcome)
}
