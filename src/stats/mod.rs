//! Statistical analysis of scenario results

pub mod rolling;

pub use rolling::RollingStats;

use crate::{
    error::{AppError, Result},
    models::metrics::{OperationMetrics, ScenarioResult, Statistics},
    types::PerformanceLevel,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Nearest-rank percentile of an ascending slice; 0.0 for an empty slice
pub fn nearest_rank_percentile(sorted_values: &[f64], percentile: f64) -> f64 {
    if sorted_values.is_empty() {
        return 0.0;
    }
    let rank = ((percentile / 100.0) * sorted_values.len() as f64).ceil() as usize;
    sorted_values[rank.clamp(1, sorted_values.len()) - 1]
}

/// Collects scenario results and produces extended analysis
pub struct StatisticsEngine {
    /// Results grouped by scenario name
    results: BTreeMap<String, Vec<ScenarioResult>>,
    config: StatisticsConfig,
}

#[derive(Debug, Clone)]
pub struct StatisticsConfig {
    /// Minimum number of samples for a confidence interval
    pub min_samples: usize,
    /// Confidence level for intervals (e.g. 0.95)
    pub confidence_level: f64,
    /// Percentiles reported in the extended view
    pub percentiles: Vec<f64>,
    pub outlier_method: OutlierMethod,
}

/// Methods for detecting latency outliers
#[derive(Debug, Clone, Copy)]
pub enum OutlierMethod {
    /// Interquartile range method (1.5 * IQR)
    IQR,
    /// Distance from the mean in standard deviations
    StandardDeviation { threshold: f64 },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatisticalAnalysis {
    /// Extended statistics per scenario
    pub scenarios: BTreeMap<String, ExtendedStatistics>,
    pub summary: AnalysisSummary,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtendedStatistics {
    pub basic: Statistics,
    /// Keyed `p50`, `p90`, ...
    pub percentiles: BTreeMap<String, f64>,
    /// Confidence interval of the mean latency; `None` with too few samples
    pub confidence_interval: Option<(f64, f64)>,
    pub outlier_analysis: OutlierAnalysis,
    pub performance_distribution: PerformanceDistribution,
    pub reliability: ReliabilityMetrics,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutlierAnalysis {
    pub outlier_count: usize,
    pub outlier_percentage: f64,
    pub detection_method: String,
    /// Latencies above this bound count as outliers
    pub upper_bound_ms: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceDistribution {
    pub good_percentage: f64,
    pub moderate_percentage: f64,
    pub poor_percentage: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReliabilityMetrics {
    pub success_rate: f64,
    /// Coefficient of variation of latency (lower is more consistent)
    pub consistency_score: f64,
    /// Mean absolute difference between consecutive latencies
    pub jitter_ms: f64,
    /// Longest run of consecutive failed operations
    pub longest_failure_streak: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisSummary {
    pub total_operations: u64,
    pub successful_operations: u64,
    pub key_findings: Vec<String>,
    pub warnings: Vec<String>,
}

impl Default for StatisticsConfig {
    fn default() -> Self {
        Self {
            min_samples: 5,
            confidence_level: 0.95,
            percentiles: vec![50.0, 90.0, 95.0, 99.0, 99.9],
            outlier_method: OutlierMethod::IQR,
        }
    }
}

impl StatisticsEngine {
    pub fn new(config: StatisticsConfig) -> Self {
        Self {
            results: BTreeMap::new(),
            config,
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(StatisticsConfig::default())
    }

    pub fn add_results(&mut self, results: Vec<ScenarioResult>) {
        for result in results {
            self.add_result(result);
        }
    }

    pub fn add_result(&mut self, result: ScenarioResult) {
        self.results.entry(result.scenario.clone()).or_default().push(result);
    }

    /// Analyze every scenario with at least one successful operation
    pub fn analyze(&self) -> Result<StatisticalAnalysis> {
        if self.results.is_empty() {
            return Err(AppError::statistics("No scenario results available for analysis"));
        }

        let mut scenarios = BTreeMap::new();
        for (name, results) in &self.results {
            if let Some(extended) = self.calculate_extended_statistics(results) {
                scenarios.insert(name.clone(), extended);
            }
        }

        let summary = self.generate_summary(&scenarios);
        Ok(StatisticalAnalysis {
            scenarios,
            summary,
            generated_at: Utc::now(),
        })
    }

    fn calculate_extended_statistics(&self, results: &[ScenarioResult]) -> Option<ExtendedStatistics> {
        let operations: Vec<&OperationMetrics> = results.iter().flat_map(|r| r.individual_results.iter()).collect();
        let successful: Vec<&OperationMetrics> = operations.iter().copied().filter(|m| m.is_successful()).collect();
        if successful.is_empty() {
            return None;
        }

        let elapsed: Duration = results.iter().map(|r| r.elapsed).sum();
        let basic = Statistics::from_measurements(&successful, operations.len() as u64, elapsed);

        let mut latencies: Vec<f64> = successful.iter().map(|m| m.duration_ms()).collect();
        latencies.sort_by(|a, b| a.total_cmp(b));

        let percentiles = self
            .config
            .percentiles
            .iter()
            .map(|&p| (percentile_label(p), nearest_rank_percentile(&latencies, p)))
            .collect();

        Some(ExtendedStatistics {
            confidence_interval: self.confidence_interval(&basic),
            outlier_analysis: self.detect_outliers(&latencies, &basic),
            performance_distribution: performance_distribution(&latencies),
            reliability: reliability_metrics(&operations, &basic),
            percentiles,
            basic,
        })
    }

    fn confidence_interval(&self, basic: &Statistics) -> Option<(f64, f64)> {
        if basic.sample_count < self.config.min_samples {
            return None;
        }
        let z_score = z_score(self.config.confidence_level);
        let margin = z_score * basic.std_dev_ms / (basic.sample_count as f64).sqrt();
        Some(((basic.avg_ms - margin).max(0.0), basic.avg_ms + margin))
    }

    fn detect_outliers(&self, sorted: &[f64], basic: &Statistics) -> OutlierAnalysis {
        let (method, upper_bound) = match self.config.outlier_method {
            OutlierMethod::IQR => {
                let q1 = nearest_rank_percentile(sorted, 25.0);
                let q3 = nearest_rank_percentile(sorted, 75.0);
                ("IQR".to_string(), q3 + 1.5 * (q3 - q1))
            }
            OutlierMethod::StandardDeviation { threshold } => (
                format!("{}σ", threshold),
                basic.avg_ms + threshold * basic.std_dev_ms,
            ),
        };
        let outlier_count = sorted.iter().filter(|&&v| v > upper_bound).count();
        OutlierAnalysis {
            outlier_count,
            outlier_percentage: percentage(outlier_count, sorted.len()),
            detection_method: method,
            upper_bound_ms: upper_bound,
        }
    }

    fn generate_summary(&self, scenarios: &BTreeMap<String, ExtendedStatistics>) -> AnalysisSummary {
        let all_results = self.results.values().flatten();
        let (total_operations, successful_operations) =
            all_results.fold((0, 0), |(total, ok), r| (total + r.total_count, ok + r.success_count));

        let mut key_findings = Vec::new();
        let mut warnings = Vec::new();

        for (name, stats) in scenarios {
            key_findings.push(format!(
                "{}: {:.0} ops/s, p99 {:.3}ms ({})",
                name,
                stats.basic.messages_per_sec,
                stats.basic.p99_ms,
                stats.basic.performance_level().label()
            ));
            if stats.basic.has_poor_success_rate() {
                warnings.push(format!("{}: only {:.1}% of operations succeeded", name, stats.basic.success_rate));
            }
            if stats.outlier_analysis.outlier_percentage > 5.0 {
                warnings.push(format!(
                    "{}: {:.1}% of latencies are outliers (> {:.3}ms)",
                    name, stats.outlier_analysis.outlier_percentage, stats.outlier_analysis.upper_bound_ms
                ));
            }
        }

        for (name, results) in &self.results {
            if !scenarios.contains_key(name) {
                warnings.push(format!("{}: no operation succeeded", name));
            }
            let short_delivery = results.iter().any(|r| {
                r.server_bytes_received
                    .map_or(false, |observed| observed < r.bytes_sent)
            });
            if short_delivery {
                warnings.push(format!("{}: server observed fewer bytes than were sent", name));
            }
        }

        AnalysisSummary {
            total_operations,
            successful_operations,
            key_findings,
            warnings,
        }
    }
}

fn percentile_label(p: f64) -> String {
    if p.fract() == 0.0 {
        format!("p{:.0}", p)
    } else {
        format!("p{}", p)
    }
}

fn z_score(confidence_level: f64) -> f64 {
    match confidence_level {
        level if (level - 0.90).abs() < 0.01 => 1.645,
        level if (level - 0.99).abs() < 0.01 => 2.576,
        _ => 1.96,
    }
}

fn percentage(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}

fn performance_distribution(latencies: &[f64]) -> PerformanceDistribution {
    let mut counts = [0usize; 3];
    for &ms in latencies {
        let slot = match PerformanceLevel::from_millis(ms) {
            PerformanceLevel::Good => 0,
            PerformanceLevel::Moderate => 1,
            PerformanceLevel::Poor => 2,
        };
        counts[slot] += 1;
    }
    PerformanceDistribution {
        good_percentage: percentage(counts[0], latencies.len()),
        moderate_percentage: percentage(counts[1], latencies.len()),
        poor_percentage: percentage(counts[2], latencies.len()),
    }
}

fn reliability_metrics(operations: &[&OperationMetrics], basic: &Statistics) -> ReliabilityMetrics {
    let latencies: Vec<f64> = operations
        .iter()
        .filter(|m| m.is_successful())
        .map(|m| m.duration_ms())
        .collect();
    let jitter_ms = if latencies.len() > 1 {
        latencies.windows(2).map(|w| (w[1] - w[0]).abs()).sum::<f64>() / (latencies.len() - 1) as f64
    } else {
        0.0
    };

    let mut longest_failure_streak = 0;
    let mut streak = 0;
    for operation in operations {
        if operation.is_successful() {
            streak = 0;
        } else {
            streak += 1;
            longest_failure_streak = longest_failure_streak.max(streak);
        }
    }

    ReliabilityMetrics {
        success_rate: basic.success_rate,
        consistency_score: if basic.avg_ms > 0.0 { basic.std_dev_ms / basic.avg_ms } else { 0.0 },
        jitter_ms,
        longest_failure_streak,
    }
}
