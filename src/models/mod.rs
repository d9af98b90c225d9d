//! Data models and structures for the messaging tester

pub mod config;
pub mod metrics;

// Re-export main model types
pub use config::Config;
pub use metrics::{OperationMetrics, ScenarioResult, Statistics};
