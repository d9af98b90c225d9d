//! TCP Messaging Tester
//!
//! Driver programs for a framed, message-oriented TCP transport: a
//! throughput meter, a reconnect loop, a partial stream sender and a
//! request/response timer. The transport they exercise lives in
//! [`transport`] and speaks the frame format defined in [`protocol`].

pub mod app;
pub mod cli;
pub mod config;
pub mod error;
pub mod executor;
pub mod logging;
pub mod models;
pub mod output;
pub mod protocol;
pub mod stats;
pub mod transport;
pub mod types;

pub use error::{AppError, Result};
pub use executor::{ExecutionResults, Interrupt, Scenario};
pub use models::{Config, OperationMetrics, ScenarioResult, Statistics};
pub use output::{ColoredFormatter, OutputCoordinator, OutputFormatter, OutputFormatterFactory, PlainFormatter};
pub use stats::{ExtendedStatistics, RollingStats, StatisticalAnalysis, StatisticsEngine};
pub use transport::{ClientEvent, ClientSettings, MessageClient, MessageServer, ServerEvent, ServerSettings};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const PKG_NAME: &str = env!("CARGO_PKG_NAME");
pub const PKG_DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");

/// Defaults used by `Config::default`
pub mod defaults {
    use std::time::Duration;

    pub const DEFAULT_ENDPOINT: &str = "127.0.0.1:9000";
    pub const DEFAULT_MESSAGE_COUNT: u64 = 1000;
    pub const DEFAULT_MESSAGE_SIZE: usize = 1024;
    pub const DEFAULT_CLIENTS: u32 = 1;
    pub const DEFAULT_ITERATIONS: u32 = 5;
    pub const DEFAULT_RECONNECT_CYCLES: u64 = 10;
    pub const DEFAULT_RECONNECT_MIN_DELAY_MS: u64 = 100;
    pub const DEFAULT_RECONNECT_MAX_DELAY_MS: u64 = 1000;
    pub const DEFAULT_STREAM_CONTENT_LENGTH: u64 = 64 * 1024;
    pub const DEFAULT_STREAM_SOURCE_SIZE: u64 = 128 * 1024;
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
    pub const DEFAULT_MAX_CONNECTIONS: usize = 4096;
    pub const DEFAULT_STATS_INTERVAL: Duration = Duration::from_secs(5);
    pub const DEFAULT_ENABLE_COLOR: bool = true;
}
