//! Request/response round trips

use super::embedded::{EmbeddedOptions, EmbeddedServer, SEQUENCE_KEY};
use super::{client_settings, payload_pattern, Interrupt, Scenario};
use crate::error::{AppError, Result};
use crate::logging::{Logger, PerformanceLogger};
use crate::models::{Config, OperationMetrics, ScenarioResult};
use crate::protocol::Metadata;
use crate::transport::MessageClient;
use crate::types::ScenarioKind;
use async_trait::async_trait;
use std::time::Instant;

pub struct SyncScenario;

#[async_trait]
impl Scenario for SyncScenario {
    fn kind(&self) -> ScenarioKind {
        ScenarioKind::SyncRequest
    }

    async fn run(&self, config: &Config, interrupt: &Interrupt) -> Result<ScenarioResult> {
        let logger = Logger::with_config("SYNC".to_string(), config);
        let mut performance = PerformanceLogger::new(config);

        let embedded = if config.remote {
            None
        } else {
            let options = EmbeddedOptions {
                echo: true,
                ..EmbeddedOptions::default()
            };
            Some(EmbeddedServer::start(config, options).await?)
        };
        let endpoint = match &embedded {
            Some(server) => server.endpoint(),
            None => config.endpoint()?,
        };

        let mut result = ScenarioResult::new(self.kind(), endpoint.to_string());
        let payload = payload_pattern(config.message_size);
        let (client, _events) = MessageClient::connect(client_settings(config, endpoint, logger.clone())).await?;

        performance.start_timing(self.name()).await;
        let started = Instant::now();
        for sequence in 0..config.message_count {
            if interrupt.is_triggered() {
                result.add_measurement(OperationMetrics::skipped("interrupted".to_string()));
                continue;
            }

            let mut metadata = Metadata::new();
            metadata.insert(SEQUENCE_KEY.to_string(), sequence.into());

            let op_started = Instant::now();
            let outcome = client
                .send_and_wait(config.timeout(), &payload, Some(metadata))
                .await
                .and_then(|response| {
                    if response.payload.as_ref() == payload.as_slice() {
                        Ok(())
                    } else {
                        Err(AppError::protocol(format!(
                            "Response of {} bytes does not match the {} byte request",
                            response.len(),
                            payload.len()
                        )))
                    }
                });
            if let Err(e) = &outcome {
                logger
                    .warn("Sync request failed")
                    .field("sequence", sequence)
                    .error_info(e)
                    .log()
                    .await;
            }
            result.add_measurement(OperationMetrics::from_outcome(op_started, payload.len() as u64, &outcome));
        }
        let elapsed = started.elapsed();
        performance.end_timing(self.name()).await;

        client.disconnect().await?;
        if let Some(server) = embedded {
            server.stop().await?;
        }
        result.finish(elapsed);
        result.interrupted = interrupt.is_triggered();

        performance.log_scenario_result(&result).await;
        Ok(result)
    }
}
