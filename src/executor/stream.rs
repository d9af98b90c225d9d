//! Partial stream: declare fewer bytes than the source holds

use super::embedded::{EmbeddedOptions, EmbeddedServer, SEQUENCE_KEY};
use super::{client_settings, payload_pattern, Interrupt, Scenario};
use crate::error::{AppError, Result};
use crate::logging::{Logger, PerformanceLogger};
use crate::models::{Config, OperationMetrics, ScenarioResult};
use crate::protocol::Metadata;
use crate::transport::MessageClient;
use crate::types::ScenarioKind;
use async_trait::async_trait;
use bytes::Bytes;
use std::io::Cursor;
use std::time::Instant;

pub struct PartialStreamScenario;

#[async_trait]
impl Scenario for PartialStreamScenario {
    fn kind(&self) -> ScenarioKind {
        ScenarioKind::PartialStream
    }

    async fn run(&self, config: &Config, interrupt: &Interrupt) -> Result<ScenarioResult> {
        let logger = Logger::with_config("STREAM".to_string(), config);
        let mut performance = PerformanceLogger::new(config);
        let source = Bytes::from(payload_pattern(config.stream_source_size as usize));
        let content_length = config.stream_content_length;

        // Payloads past half the declared length reach the server as streams
        let embedded = if config.remote {
            None
        } else {
            let options = EmbeddedOptions {
                expected_prefix: Some(source.clone()),
                max_proxied_stream_size: Some(content_length / 2),
                ..EmbeddedOptions::default()
            };
            Some(EmbeddedServer::start(config, options).await?)
        };
        let endpoint = match &embedded {
            Some(server) => server.endpoint(),
            None => config.endpoint()?,
        };

        let mut result = ScenarioResult::new(self.kind(), endpoint.to_string());
        let (client, _events) = MessageClient::connect(client_settings(config, endpoint, logger.clone())).await?;

        performance.start_timing(self.name()).await;
        let started = Instant::now();
        let mut measurements = Vec::with_capacity(config.iterations as usize);
        for sequence in 0..u64::from(config.iterations) {
            if interrupt.is_triggered() {
                measurements.push(OperationMetrics::skipped("interrupted".to_string()));
                continue;
            }

            let mut cursor = Cursor::new(source.clone());
            let mut metadata = Metadata::new();
            metadata.insert(SEQUENCE_KEY.to_string(), sequence.into());

            let op_started = Instant::now();
            let outcome = client
                .send_stream(content_length, &mut cursor, Some(metadata))
                .await
                .and_then(|sent| {
                    if sent == content_length && cursor.position() == content_length {
                        Ok(())
                    } else {
                        Err(AppError::protocol(format!(
                            "Stream sent {} bytes and consumed {} of the source, expected {}",
                            sent,
                            cursor.position(),
                            content_length
                        )))
                    }
                });
            if let Err(e) = &outcome {
                logger
                    .warn("Stream send failed")
                    .field("sequence", sequence)
                    .error_info(e)
                    .log()
                    .await;
            }
            measurements.push(OperationMetrics::from_outcome(op_started, content_length, &outcome));
        }

        if let Some(server) = &embedded {
            let delivered = measurements.iter().filter(|m| m.is_successful()).count() as u64;
            if !server.wait_for_messages(delivered, config.timeout()).await {
                logger
                    .warn("Embedded server did not receive every stream before the timeout")
                    .field("expected", delivered)
                    .field("observed", server.observed().messages())
                    .log()
                    .await;
            }
            for sequence in server.observed().rejected().await {
                if let Some(metrics) = measurements.get_mut(sequence as usize) {
                    *metrics = OperationMetrics::failed(
                        metrics.duration,
                        "Server received bytes that differ from the source prefix".to_string(),
                    );
                }
            }
        }
        let elapsed = started.elapsed();
        performance.end_timing(self.name()).await;

        for metrics in measurements {
            result.add_measurement(metrics);
        }
        client.disconnect().await?;
        if let Some(server) = embedded {
            result.set_server_observed(server.observed().messages(), server.observed().bytes());
            server.stop().await?;
        }
        result.finish(elapsed);
        result.interrupted = interrupt.is_triggered();

        performance.log_scenario_result(&result).await;
        Ok(result)
    }
}
