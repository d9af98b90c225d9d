//! Operation metrics and scenario result data models

use crate::stats::nearest_rank_percentile;
use crate::types::{PerformanceLevel, ScenarioKind, TestStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

const BYTES_PER_MEGABYTE: f64 = 1024.0 * 1024.0;

/// One measured operation: a send, a connect cycle, a stream send or a
/// sync round trip
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationMetrics {
    /// Time the operation took
    pub duration: Duration,

    /// Payload bytes moved by the operation
    pub bytes: u64,

    /// Operation outcome
    pub status: TestStatus,

    /// When the operation finished
    pub timestamp: DateTime<Utc>,

    /// Error message if the operation failed
    pub error_message: Option<String>,
}

impl OperationMetrics {
    pub fn success(duration: Duration, bytes: u64) -> Self {
        Self {
            duration,
            bytes,
            status: TestStatus::Success,
            timestamp: Utc::now(),
            error_message: None,
        }
    }

    pub fn failed(duration: Duration, error_message: String) -> Self {
        Self {
            duration,
            bytes: 0,
            status: TestStatus::Failed,
            timestamp: Utc::now(),
            error_message: Some(error_message),
        }
    }

    pub fn timeout(timeout_duration: Duration) -> Self {
        Self {
            duration: timeout_duration,
            bytes: 0,
            status: TestStatus::Timeout,
            timestamp: Utc::now(),
            error_message: Some(format!("Operation timed out after {}ms", timeout_duration.as_millis())),
        }
    }

    /// Operation that never ran, e.g. because the run was interrupted
    pub fn skipped(reason: String) -> Self {
        Self {
            duration: Duration::ZERO,
            bytes: 0,
            status: TestStatus::Skipped,
            timestamp: Utc::now(),
            error_message: Some(reason),
        }
    }

    /// Build from the outcome of a timed operation
    pub fn from_outcome(started: Instant, bytes: u64, outcome: &crate::Result<()>) -> Self {
        let duration = started.elapsed();
        match outcome {
            Ok(()) => Self::success(duration, bytes),
            Err(crate::AppError::Timeout(_)) => Self::timeout(duration),
            Err(e) => Self::failed(duration, e.to_string()),
        }
    }

    pub fn is_successful(&self) -> bool {
        matches!(self.status, TestStatus::Success)
    }

    pub fn duration_ms(&self) -> f64 {
        self.duration.as_secs_f64() * 1000.0
    }

    pub fn performance_level(&self) -> PerformanceLevel {
        PerformanceLevel::from_duration(self.duration)
    }
}

/// Results of one scenario run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioResult {
    /// Scenario name as shown in reports
    pub scenario: String,

    pub kind: ScenarioKind,

    /// Endpoint the clients connected to
    pub endpoint: String,

    /// Individual operations in execution order
    pub individual_results: Vec<OperationMetrics>,

    /// Calculated statistics from successful operations
    pub statistics: Option<Statistics>,

    pub success_count: u64,

    pub total_count: u64,

    /// Payload bytes sent by successful operations
    pub bytes_sent: u64,

    /// Messages the embedded server observed; `None` with a remote server
    pub server_messages_received: Option<u64>,

    /// Payload bytes the embedded server observed
    pub server_bytes_received: Option<u64>,

    /// Wall-clock time the scenario took
    pub elapsed: Duration,

    /// Set when the run stopped early (Ctrl-C)
    pub interrupted: bool,

    pub started_at: DateTime<Utc>,

    pub completed_at: Option<DateTime<Utc>>,
}

impl ScenarioResult {
    pub fn new(kind: ScenarioKind, endpoint: String) -> Self {
        Self {
            scenario: kind.name().to_string(),
            kind,
            endpoint,
            individual_results: Vec::new(),
            statistics: None,
            success_count: 0,
            total_count: 0,
            bytes_sent: 0,
            server_messages_received: None,
            server_bytes_received: None,
            elapsed: Duration::ZERO,
            interrupted: false,
            started_at: Utc::now(),
            completed_at: None,
        }
    }

    /// Add one measured operation
    pub fn add_measurement(&mut self, metrics: OperationMetrics) {
        if metrics.is_successful() {
            self.success_count += 1;
            self.bytes_sent += metrics.bytes;
        }
        self.total_count += 1;
        self.individual_results.push(metrics);
    }

    /// Record what the embedded server observed
    pub fn set_server_observed(&mut self, messages: u64, bytes: u64) {
        self.server_messages_received = Some(messages);
        self.server_bytes_received = Some(bytes);
    }

    /// Calculate statistics over `elapsed` and mark the result complete
    pub fn finish(&mut self, elapsed: Duration) {
        self.elapsed = elapsed;
        let successful: Vec<&OperationMetrics> = self
            .individual_results
            .iter()
            .filter(|m| m.is_successful())
            .collect();

        if !successful.is_empty() {
            self.statistics = Some(Statistics::from_measurements(&successful, self.total_count, elapsed));
        }

        self.completed_at = Some(Utc::now());
    }

    /// Success rate as a percentage
    pub fn success_rate(&self) -> f64 {
        if self.total_count == 0 {
            0.0
        } else {
            (self.success_count as f64 / self.total_count as f64) * 100.0
        }
    }

    pub fn performance_level(&self) -> Option<PerformanceLevel> {
        self.statistics.as_ref().map(|s| s.performance_level())
    }

    pub fn failure_messages(&self) -> impl Iterator<Item = &str> {
        self.individual_results
            .iter()
            .filter_map(|m| m.error_message.as_deref())
    }

    /// Whether every operation succeeded and the server saw what was sent
    pub fn is_clean(&self) -> bool {
        self.total_count > 0
            && self.success_count == self.total_count
            && self.server_bytes_received.map_or(true, |bytes| bytes >= self.bytes_sent)
    }
}

/// Latency distribution and rates for a set of operations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Statistics {
    /// Successful operations included in the latency figures
    pub sample_count: usize,

    pub avg_ms: f64,
    pub min_ms: f64,
    pub max_ms: f64,

    /// Population standard deviation
    pub std_dev_ms: f64,

    pub p50_ms: f64,
    pub p90_ms: f64,
    pub p99_ms: f64,

    /// Successful operations per second of wall-clock time
    pub messages_per_sec: f64,

    /// Successful payload MiB per second of wall-clock time
    pub megabytes_per_sec: f64,

    /// Success rate percentage (0.0-100.0) over all attempted operations
    pub success_rate: f64,
}

impl Statistics {
    /// Compute statistics from successful measurements.
    ///
    /// `total_count` includes failed operations and only affects the
    /// success rate.
    pub fn from_measurements(measurements: &[&OperationMetrics], total_count: u64, elapsed: Duration) -> Self {
        let count = measurements.len();
        if count == 0 {
            return Self::empty();
        }

        let mut durations: Vec<f64> = measurements.iter().map(|m| m.duration_ms()).collect();
        durations.sort_by(|a, b| a.total_cmp(b));

        let sum: f64 = durations.iter().sum();
        let avg = sum / count as f64;
        let variance = durations.iter().map(|&x| (x - avg).powi(2)).sum::<f64>() / count as f64;

        let bytes: u64 = measurements.iter().map(|m| m.bytes).sum();
        let seconds = elapsed.as_secs_f64();
        let (messages_per_sec, megabytes_per_sec) = if seconds > 0.0 {
            (count as f64 / seconds, bytes as f64 / BYTES_PER_MEGABYTE / seconds)
        } else {
            (0.0, 0.0)
        };

        let success_rate = if total_count == 0 {
            0.0
        } else {
            (count as f64 / total_count.max(count as u64) as f64) * 100.0
        };

        Self {
            sample_count: count,
            avg_ms: avg,
            min_ms: durations[0],
            max_ms: durations[count - 1],
            std_dev_ms: variance.sqrt(),
            p50_ms: nearest_rank_percentile(&durations, 50.0),
            p90_ms: nearest_rank_percentile(&durations, 90.0),
            p99_ms: nearest_rank_percentile(&durations, 99.0),
            messages_per_sec,
            megabytes_per_sec,
            success_rate,
        }
    }

    pub fn empty() -> Self {
        Self {
            sample_count: 0,
            avg_ms: 0.0,
            min_ms: 0.0,
            max_ms: 0.0,
            std_dev_ms: 0.0,
            p50_ms: 0.0,
            p90_ms: 0.0,
            p99_ms: 0.0,
            messages_per_sec: 0.0,
            megabytes_per_sec: 0.0,
            success_rate: 0.0,
        }
    }

    /// Performance level based on average latency
    pub fn performance_level(&self) -> PerformanceLevel {
        PerformanceLevel::from_millis(self.avg_ms)
    }

    pub fn has_poor_success_rate(&self) -> bool {
        self.success_rate < 80.0
    }
}
