//! Scenario execution engine
//!
//! This module contains the driver scenarios and what they share:
//! - The [`Scenario`] trait every driver implements
//! - An embedded server the drivers run against unless `--remote` is set
//! - Ctrl-C handling through [`Interrupt`]
//! - Aggregated [`ExecutionResults`] for the output layer

pub mod embedded;
pub mod reconnect;
pub mod server;
pub mod stream;
pub mod sync;
pub mod throughput;

pub use embedded::{EmbeddedOptions, EmbeddedServer};
pub use reconnect::ReconnectScenario;
pub use server::{run_server, ServerActivity, ServerReport};
pub use stream::PartialStreamScenario;
pub use sync::SyncScenario;
pub use throughput::ThroughputScenario;

use crate::{
    error::Result,
    logging::Logger,
    models::{Config, ScenarioResult},
    stats::{StatisticalAnalysis, StatisticsEngine},
    transport::{ClientSettings, KeepaliveSettings, ServerSettings},
    types::{Endpoint, ScenarioKind, TestStatus},
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;

/// Ctrl-C (or programmatic) stop request shared by a run
#[derive(Clone)]
pub struct Interrupt {
    tx: Arc<watch::Sender<bool>>,
}

impl Interrupt {
    /// An interrupt that only fires when [`trigger`](Self::trigger) is called
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// An interrupt that also fires on Ctrl-C
    pub fn on_ctrl_c() -> Self {
        let interrupt = Self::new();
        let handle = interrupt.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                handle.trigger();
            }
        });
        interrupt
    }

    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once the interrupt fires
    pub async fn wait(&self) {
        let mut rx = self.tx.subscribe();
        let _ = rx.wait_for(|triggered| *triggered).await;
    }
}

impl Default for Interrupt {
    fn default() -> Self {
        Self::new()
    }
}

/// A driver program: connects, sends, measures and returns its metrics
#[async_trait]
pub trait Scenario: Send + Sync {
    fn kind(&self) -> ScenarioKind;

    fn name(&self) -> &'static str {
        self.kind().name()
    }

    async fn run(&self, config: &Config, interrupt: &Interrupt) -> Result<ScenarioResult>;
}

/// Create the scenario for a kind
pub fn create_scenario(kind: ScenarioKind) -> Box<dyn Scenario> {
    match kind {
        ScenarioKind::Throughput => Box::new(ThroughputScenario),
        ScenarioKind::Reconnect => Box::new(ReconnectScenario),
        ScenarioKind::PartialStream => Box::new(PartialStreamScenario),
        ScenarioKind::SyncRequest => Box::new(SyncScenario),
    }
}

/// Client settings derived from the configuration
pub fn client_settings(config: &Config, endpoint: Endpoint, logger: Logger) -> ClientSettings {
    ClientSettings {
        keepalive: keepalive_settings(config),
        ..ClientSettings::new(endpoint)
    }
    .with_connect_timeout(config.timeout())
    .with_preshared_key(config.preshared_key.clone())
    .with_logger(logger)
}

/// Server settings derived from the configuration
pub fn server_settings(config: &Config, endpoint: Endpoint, logger: Logger) -> ServerSettings {
    ServerSettings {
        keepalive: keepalive_settings(config),
        ..ServerSettings::new(endpoint)
    }
    .with_idle_timeout(config.idle_timeout())
    .with_max_connections(config.max_connections)
    .with_preshared_key(config.preshared_key.clone())
    .with_logger(logger)
}

fn keepalive_settings(config: &Config) -> KeepaliveSettings {
    KeepaliveSettings {
        enabled: config.keepalive,
        ..KeepaliveSettings::default()
    }
}

/// Deterministic payload of `size` bytes
pub fn payload_pattern(size: usize) -> Vec<u8> {
    (0..size).map(|i| (i % 251) as u8).collect()
}

/// Summary of a whole run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionSummary {
    pub total_duration: Duration,
    pub total_operations: u64,
    pub successful_operations: u64,
    pub failed_operations: u64,
    pub timeout_operations: u64,
    pub skipped_operations: u64,
    /// Overall success rate (percentage)
    pub success_rate: f64,
    pub interrupted: bool,
}

/// Complete results of a run, including the optional analysis
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResults {
    pub execution_summary: ExecutionSummary,
    /// Scenario results in execution order
    pub scenario_results: Vec<ScenarioResult>,
    pub statistical_analysis: Option<StatisticalAnalysis>,
}

impl ExecutionResults {
    pub fn new(scenario_results: Vec<ScenarioResult>, total_duration: Duration) -> Self {
        let mut summary = ExecutionSummary {
            total_duration,
            total_operations: 0,
            successful_operations: 0,
            failed_operations: 0,
            timeout_operations: 0,
            skipped_operations: 0,
            success_rate: 0.0,
            interrupted: scenario_results.iter().any(|r| r.interrupted),
        };

        for operation in scenario_results.iter().flat_map(|r| r.individual_results.iter()) {
            summary.total_operations += 1;
            match operation.status {
                TestStatus::Success => summary.successful_operations += 1,
                TestStatus::Failed => summary.failed_operations += 1,
                TestStatus::Timeout => summary.timeout_operations += 1,
                TestStatus::Skipped => summary.skipped_operations += 1,
            }
        }
        if summary.total_operations > 0 {
            summary.success_rate = summary.successful_operations as f64 / summary.total_operations as f64 * 100.0;
        }

        Self {
            execution_summary: summary,
            scenario_results,
            statistical_analysis: None,
        }
    }

    /// Attach extended statistics when at least one scenario succeeded
    pub fn with_analysis(mut self) -> Self {
        let mut engine = StatisticsEngine::with_defaults();
        engine.add_results(self.scenario_results.clone());
        self.statistical_analysis = engine.analyze().ok();
        self
    }

    pub fn has_failures(&self) -> bool {
        self.execution_summary.failed_operations > 0
            || self.execution_summary.timeout_operations > 0
            || self.scenario_results.iter().any(|r| !r.is_clean() && !r.interrupted)
    }
}

/// Runs scenarios one after another and collects their results
pub struct ScenarioExecutor {
    config: Config,
    interrupt: Interrupt,
}

impl ScenarioExecutor {
    pub fn new(config: Config, interrupt: Interrupt) -> Self {
        Self { config, interrupt }
    }

    pub async fn execute(&self, scenarios: &[Box<dyn Scenario>]) -> Result<ExecutionResults> {
        let started = Instant::now();
        let mut results = Vec::with_capacity(scenarios.len());
        for scenario in scenarios {
            if self.interrupt.is_triggered() {
                break;
            }
            results.push(scenario.run(&self.config, &self.interrupt).await?);
        }
        Ok(ExecutionResults::new(results, started.elapsed()).with_analysis())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::OperationMetrics;

    #[test]
    fn test_create_scenario_matches_kind() {
        for kind in [
            ScenarioKind::Throughput,
            ScenarioKind::Reconnect,
            ScenarioKind::PartialStream,
            ScenarioKind::SyncRequest,
        ] {
            let scenario = create_scenario(kind);
            assert_eq!(scenario.kind(), kind);
            assert_eq!(scenario.name(), kind.name());
        }
    }

    #[test]
    fn test_settings_follow_config() {
        let config = Config {
            timeout_seconds: 3,
            preshared_key: Some("secret".to_string()),
            idle_timeout_seconds: 7,
            max_connections: 2,
            keepalive: true,
            ..Default::default()
        };
        let endpoint = Endpoint::new("127.0.0.1", 0);
        let logger = Logger::new("TEST".to_string());

        let client = client_settings(&config, endpoint.clone(), logger.clone());
        assert_eq!(client.connect_timeout, Duration::from_secs(3));
        assert_eq!(client.preshared_key.as_deref(), Some("secret"));
        assert!(client.keepalive.enabled);

        let server = server_settings(&config, endpoint, logger);
        assert_eq!(server.idle_timeout, Duration::from_secs(7));
        assert_eq!(server.max_connections, 2);
        assert_eq!(server.preshared_key.as_deref(), Some("secret"));
    }

    #[test]
    fn test_payload_pattern() {
        let payload = payload_pattern(300);
        assert_eq!(payload.len(), 300);
        assert_eq!(payload[250], 250);
        assert_eq!(payload[251], 0);
    }

    #[test]
    fn test_execution_summary_counts() {
        let mut result = ScenarioResult::new(ScenarioKind::Reconnect, "127.0.0.1:1".to_string());
        result.add_measurement(OperationMetrics::success(Duration::from_millis(1), 4));
        result.add_measurement(OperationMetrics::failed(Duration::ZERO, "refused".to_string()));
        result.add_measurement(OperationMetrics::timeout(Duration::from_secs(1)));
        result.add_measurement(OperationMetrics::skipped("interrupted".to_string()));
        result.finish(Duration::from_secs(1));

        let results = ExecutionResults::new(vec![result], Duration::from_secs(1)).with_analysis();
        let summary = &results.execution_summary;
        assert_eq!(summary.total_operations, 4);
        assert_eq!(summary.successful_operations, 1);
        assert_eq!(summary.failed_operations, 1);
        assert_eq!(summary.timeout_operations, 1);
        assert_eq!(summary.skipped_operations, 1);
        assert_eq!(summary.success_rate, 25.0);
        assert!(results.has_failures());
        assert!(results.statistical_analysis.is_some());
    }

    #[tokio::test]
    async fn test_interrupt() {
        let interrupt = Interrupt::new();
        assert!(!interrupt.is_triggered());

        let waiter = {
            let interrupt = interrupt.clone();
            tokio::spawn(async move { interrupt.wait().await })
        };
        interrupt.trigger();
        tokio::time::timeout(Duration::from_secs(1), waiter).await.unwrap().unwrap();
        assert!(interrupt.is_triggered());
    }
}
