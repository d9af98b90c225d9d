//! The formatter trait, the plain text formatter and shared helpers

use crate::{
    error::{AppError, Result},
    executor::{ExecutionResults, ExecutionSummary, ServerActivity},
    models::ScenarioResult,
    stats::StatisticalAnalysis,
    types::TestStatus,
};
use std::fmt::Write as _;

/// Renders each report section to a string
pub trait OutputFormatter: Send + Sync {
    fn format_header(&self, title: &str) -> Result<String>;

    /// Totals across every scenario of the run
    fn format_execution_summary(&self, summary: &ExecutionSummary) -> Result<String>;

    /// One row per scenario with rates and latency
    fn format_scenario_table(&self, results: &[ScenarioResult]) -> Result<String>;

    /// Per-operation detail for verbose mode
    fn format_scenario_detail(&self, result: &ScenarioResult) -> Result<String>;

    fn format_statistical_analysis(&self, analysis: &StatisticalAnalysis) -> Result<String>;

    /// Findings derived from the results, or a note that there are none
    fn format_recommendations(&self, results: &ExecutionResults) -> Result<String>;

    /// Single line for `--quiet`
    fn format_quick_summary(&self, results: &ExecutionResults) -> Result<String>;

    /// Connection-state changes and periodic reports of the server mode
    fn format_server_activity(&self, activity: &ServerActivity) -> Result<String>;

    fn format_warning(&self, warning: &str) -> Result<String>;

    fn format_success(&self, message: &str) -> Result<String>;
}

#[derive(Debug, Clone)]
pub struct FormattingOptions {
    pub enable_color: bool,
    /// Adds confidence intervals and outliers to the analysis
    pub verbose_mode: bool,
    /// List operations in the per-scenario detail
    pub show_individual_results: bool,
    pub table_borders: bool,
    /// Operations listed per scenario when individual results are shown
    pub max_detail_rows: usize,
}

impl Default for FormattingOptions {
    fn default() -> Self {
        Self {
            enable_color: true,
            verbose_mode: false,
            show_individual_results: false,
            table_borders: true,
            max_detail_rows: 50,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Align {
    Left,
    Right,
    Center,
}

/// Plain text table, each column as wide as its widest cell
#[derive(Debug, Clone)]
pub struct Table {
    columns: Vec<(&'static str, Align)>,
    rows: Vec<Vec<String>>,
    borders: bool,
}

impl Table {
    pub fn new(columns: &[(&'static str, Align)], borders: bool) -> Self {
        Self {
            columns: columns.to_vec(),
            rows: Vec::new(),
            borders,
        }
    }

    pub fn push_row(&mut self, row: Vec<String>) {
        self.rows.push(row);
    }

    pub fn render(&self) -> String {
        let widths: Vec<usize> = self
            .columns
            .iter()
            .enumerate()
            .map(|(i, (header, _))| {
                self.rows
                    .iter()
                    .filter_map(|row| row.get(i))
                    .map(|cell| cell.chars().count())
                    .fold(header.chars().count(), usize::max)
            })
            .collect();

        let header: Vec<&str> = self.columns.iter().map(|(h, _)| *h).collect();
        let mut lines = vec![self.render_line(&header, &widths)];
        lines.extend(self.rows.iter().map(|row| {
            let cells: Vec<&str> = row.iter().map(String::as_str).collect();
            self.render_line(&cells, &widths)
        }));

        if self.borders {
            let rule: Vec<String> = widths.iter().map(|w| "-".repeat(w + 2)).collect();
            let rule = format!("+{}+", rule.join("+"));
            lines.insert(1, rule.clone());
            lines.insert(0, rule.clone());
            lines.push(rule);
        }
        lines.join("\n")
    }

    fn render_line(&self, cells: &[&str], widths: &[usize]) -> String {
        let padded: Vec<String> = cells
            .iter()
            .zip(widths)
            .zip(&self.columns)
            .map(|((cell, &width), (_, align))| match align {
                Align::Left => format!("{:<width$}", cell),
                Align::Right => format!("{:>width$}", cell),
                Align::Center => format!("{:^width$}", cell),
            })
            .collect();
        if self.borders {
            format!("| {} |", padded.join(" | "))
        } else {
            padded.join("  ").trim_end().to_string()
        }
    }
}

pub(crate) fn fmt_error(e: std::fmt::Error) -> AppError {
    AppError::io(format!("Failed to format output: {}", e))
}

/// µs below a millisecond, then ms, s and minutes
pub fn format_duration(duration_ms: f64) -> String {
    if duration_ms < 1.0 {
        format!("{:.0}µs", duration_ms * 1000.0)
    } else if duration_ms < 1000.0 {
        format!("{:.2}ms", duration_ms)
    } else if duration_ms < 60000.0 {
        format!("{:.2}s", duration_ms / 1000.0)
    } else {
        let minutes = (duration_ms / 60000.0) as u32;
        let seconds = (duration_ms % 60000.0) / 1000.0;
        format!("{}m{:.1}s", minutes, seconds)
    }
}

/// One decimal, with values that would round to 100 or 0 shown as such
pub fn format_percentage(percentage: f64) -> String {
    if percentage >= 99.95 {
        "100.0%".to_string()
    } else if percentage < 0.05 {
        "0.0%".to_string()
    } else {
        format!("{:.1}%", percentage)
    }
}

/// Format a byte count with binary units
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", bytes)
    } else {
        format!("{:.2} {}", value, UNITS[unit])
    }
}

pub(crate) fn status_label(status: TestStatus) -> &'static str {
    match status {
        TestStatus::Success => "OK",
        TestStatus::Failed => "FAILED",
        TestStatus::Timeout => "TIMEOUT",
        TestStatus::Skipped => "SKIPPED",
    }
}

pub struct PlainFormatter {
    options: FormattingOptions,
}

const SCENARIO_COLUMNS: [(&str, Align); 8] = [
    ("Scenario", Align::Left),
    ("Ops", Align::Right),
    ("Success", Align::Right),
    ("Msg/s", Align::Right),
    ("MB/s", Align::Right),
    ("Avg", Align::Right),
    ("p99", Align::Right),
    ("Level", Align::Center),
];

impl PlainFormatter {
    pub fn new(options: FormattingOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &FormattingOptions {
        &self.options
    }

    fn scenario_row(result: &ScenarioResult) -> Vec<String> {
        let na = || "N/A".to_string();
        let (rate, throughput, avg, p99) = match &result.statistics {
            Some(stats) => (
                format!("{:.0}", stats.messages_per_sec),
                format!("{:.2}", stats.megabytes_per_sec),
                format_duration(stats.avg_ms),
                format_duration(stats.p99_ms),
            ),
            None => (na(), na(), na(), na()),
        };
        let level = result.performance_level().map_or_else(na, |p| p.label().to_string());

        vec![
            result.scenario.clone(),
            format!("{}/{}", result.success_count, result.total_count),
            format_percentage(result.success_rate()),
            rate,
            throughput,
            avg,
            p99,
            level,
        ]
    }
}

impl OutputFormatter for PlainFormatter {
    fn format_header(&self, title: &str) -> Result<String> {
        let mut output = String::new();
        let border = "=".repeat(title.len() + 4);
        writeln!(output, "{}", border).map_err(fmt_error)?;
        writeln!(output, "  {}  ", title).map_err(fmt_error)?;
        write!(output, "{}", border).map_err(fmt_error)?;
        Ok(output)
    }

    fn format_execution_summary(&self, summary: &ExecutionSummary) -> Result<String> {
        let mut output = String::new();
        writeln!(output, "Execution Summary:").map_err(fmt_error)?;
        writeln!(output, "-----------------").map_err(fmt_error)?;
        writeln!(output, "Total Duration:   {}", format_duration(summary.total_duration.as_secs_f64() * 1000.0))
            .map_err(fmt_error)?;
        writeln!(output, "Operations:       {}", summary.total_operations).map_err(fmt_error)?;
        writeln!(
            output,
            "Successful:       {} ({})",
            summary.successful_operations,
            format_percentage(summary.success_rate)
        )
        .map_err(fmt_error)?;
        writeln!(output, "Failed:           {}", summary.failed_operations).map_err(fmt_error)?;
        writeln!(output, "Timeout:          {}", summary.timeout_operations).map_err(fmt_error)?;
        write!(output, "Skipped:          {}", summary.skipped_operations).map_err(fmt_error)?;
        if summary.interrupted {
            write!(output, "\nInterrupted:      yes").map_err(fmt_error)?;
        }
        Ok(output)
    }

    fn format_scenario_table(&self, results: &[ScenarioResult]) -> Result<String> {
        if results.is_empty() {
            return Ok("No scenario results available.".to_string());
        }
        let mut table = Table::new(&SCENARIO_COLUMNS, self.options.table_borders);
        for result in results {
            table.push_row(Self::scenario_row(result));
        }
        Ok(table.render())
    }

    fn format_scenario_detail(&self, result: &ScenarioResult) -> Result<String> {
        let mut output = String::new();
        writeln!(output, "{} against {}:", result.scenario, result.endpoint).map_err(fmt_error)?;
        writeln!(
            output,
            "  Elapsed {} | sent {}",
            format_duration(result.elapsed.as_secs_f64() * 1000.0),
            format_bytes(result.bytes_sent)
        )
        .map_err(fmt_error)?;
        if let (Some(messages), Some(bytes)) = (result.server_messages_received, result.server_bytes_received) {
            writeln!(output, "  Server observed {} messages, {}", messages, format_bytes(bytes)).map_err(fmt_error)?;
        }
        if let Some(stats) = &result.statistics {
            writeln!(
                output,
                "  Latency min {} / p50 {} / p90 {} / p99 {} / max {} (σ {})",
                format_duration(stats.min_ms),
                format_duration(stats.p50_ms),
                format_duration(stats.p90_ms),
                format_duration(stats.p99_ms),
                format_duration(stats.max_ms),
                format_duration(stats.std_dev_ms)
            )
            .map_err(fmt_error)?;
        }

        if self.options.show_individual_results {
            for (idx, op) in result.individual_results.iter().take(self.options.max_detail_rows).enumerate() {
                write!(output, "  #{:<5} {:<8} {:>10}", idx + 1, status_label(op.status), format_duration(op.duration_ms()))
                    .map_err(fmt_error)?;
                if let Some(error) = &op.error_message {
                    write!(output, "  {}", error).map_err(fmt_error)?;
                }
                output.push('\n');
            }
            let hidden = result.individual_results.len().saturating_sub(self.options.max_detail_rows);
            if hidden > 0 {
                writeln!(output, "  ... {} more operations", hidden).map_err(fmt_error)?;
            }
        }
        Ok(output.trim_end().to_string())
    }

    fn format_statistical_analysis(&self, analysis: &StatisticalAnalysis) -> Result<String> {
        let mut output = String::new();
        writeln!(output, "Statistical Analysis:").map_err(fmt_error)?;
        write!(output, "--------------------").map_err(fmt_error)?;

        for (name, stats) in &analysis.scenarios {
            write!(
                output,
                "\n  {}: {} success, jitter {}, consistency {:.0}/100",
                name,
                format_percentage(stats.reliability.success_rate),
                format_duration(stats.reliability.jitter_ms),
                stats.reliability.consistency_score
            )
            .map_err(fmt_error)?;
            if self.options.verbose_mode {
                if let Some((low, high)) = stats.confidence_interval {
                    write!(output, "\n    95% CI of mean: {} .. {}", format_duration(low), format_duration(high))
                        .map_err(fmt_error)?;
                }
                write!(
                    output,
                    "\n    Outliers: {} ({:.1}%, {})",
                    stats.outlier_analysis.outlier_count,
                    stats.outlier_analysis.outlier_percentage,
                    stats.outlier_analysis.detection_method
                )
                .map_err(fmt_error)?;
            }
        }
        for finding in &analysis.summary.key_findings {
            write!(output, "\n  • {}", finding).map_err(fmt_error)?;
        }
        for warning in &analysis.summary.warnings {
            write!(output, "\n  ! {}", warning).map_err(fmt_error)?;
        }
        Ok(output)
    }

    fn format_recommendations(&self, results: &ExecutionResults) -> Result<String> {
        let mut output = String::new();
        writeln!(output, "Recommendations:").map_err(fmt_error)?;
        write!(output, "---------------").map_err(fmt_error)?;

        let mut any = false;
        if results.execution_summary.total_operations > 0 && results.execution_summary.success_rate < 95.0 {
            write!(output, "\n• Success rate is below 95% - check the endpoint and the server logs").map_err(fmt_error)?;
            any = true;
        }
        for result in &results.scenario_results {
            if let (Some(observed), true) = (result.server_bytes_received, result.bytes_sent > 0) {
                if observed < result.bytes_sent {
                    write!(
                        output,
                        "\n• {}: server observed {} of {} sent - raise --timeout to let it drain",
                        result.scenario,
                        format_bytes(observed),
                        format_bytes(result.bytes_sent)
                    )
                    .map_err(fmt_error)?;
                    any = true;
                }
            }
            if result.statistics.as_ref().map_or(false, |s| s.p99_ms > 10.0 * s.p50_ms.max(0.001)) {
                write!(output, "\n• {}: p99 latency is over ten times the median", result.scenario).map_err(fmt_error)?;
                any = true;
            }
        }
        if !any {
            write!(output, "\n• No issues detected").map_err(fmt_error)?;
        }
        Ok(output)
    }

    fn format_quick_summary(&self, results: &ExecutionResults) -> Result<String> {
        let summary = &results.execution_summary;
        Ok(format!(
            "Operations: {}/{} successful ({:.1}%) | Duration: {:.2}s{}",
            summary.successful_operations,
            summary.total_operations,
            summary.success_rate,
            summary.total_duration.as_secs_f64(),
            if summary.interrupted { " | interrupted" } else { "" }
        ))
    }

    fn format_server_activity(&self, activity: &ServerActivity) -> Result<String> {
        Ok(match activity {
            ServerActivity::Listening { endpoint } => format!("Listening on {} (Ctrl-C to stop)", endpoint),
            ServerActivity::ClientConnected(client) => format!("Client connected: {} [{}]", client.peer_addr, client.id),
            ServerActivity::ClientDisconnected { client, reason } => {
                format!("Client disconnected: {} ({})", client.peer_addr, reason)
            }
            ServerActivity::AuthenticationFailed { peer } => format!("Authentication failed: {}", peer),
            ServerActivity::Report(report) => format!(
                "[stats] clients {} | received {} msgs ({}) | {:.1} msg/s (avg {:.1}) | sent {} msgs",
                report.connected_clients,
                report.statistics.messages_received,
                format_bytes(report.statistics.bytes_received),
                report.last_rate(),
                report.receive_rate.average(),
                report.statistics.messages_sent
            ),
        })
    }

    fn format_warning(&self, warning: &str) -> Result<String> {
        Ok(format!("WARNING: {}", warning))
    }

    fn format_success(&self, message: &str) -> Result<String> {
        Ok(format!("SUCCESS: {}", message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::OperationMetrics;
    use crate::types::ScenarioKind;
    use std::time::Duration;

    fn sample_result() -> ScenarioResult {
        let mut result = ScenarioResult::new(ScenarioKind::Throughput, "127.0.0.1:9000".to_string());
        for ms in [1, 2, 3] {
            result.add_measurement(OperationMetrics::success(Duration::from_millis(ms), 1024));
        }
        result.add_measurement(OperationMetrics::failed(Duration::from_millis(1), "broken pipe".to_string()));
        result.set_server_observed(3, 3072);
        result.finish(Duration::from_secs(1));
        result
    }

    #[test]
    fn test_format_helpers() {
        assert_eq!(format_duration(0.5), "500µs");
        assert_eq!(format_duration(12.345), "12.35ms");
        assert_eq!(format_duration(1500.0), "1.50s");
        assert_eq!(format_percentage(99.99), "100.0%");
        assert_eq!(format_percentage(75.0), "75.0%");
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.00 KiB");
        assert_eq!(format_bytes(3 * 1024 * 1024), "3.00 MiB");
    }

    #[test]
    fn test_scenario_table() {
        let formatter = PlainFormatter::new(FormattingOptions::default());
        let table = formatter.format_scenario_table(&[sample_result()]).unwrap();
        assert!(table.contains("Scenario"));
        assert!(table.contains("throughput"));
        assert!(table.contains("3/4"));
        assert!(table.contains("75.0%"));
        assert!(table.starts_with('+'));
    }

    #[test]
    fn test_scenario_detail_lists_operations_in_verbose_mode() {
        let formatter = PlainFormatter::new(FormattingOptions {
            show_individual_results: true,
            max_detail_rows: 2,
            ..Default::default()
        });
        let detail = formatter.format_scenario_detail(&sample_result()).unwrap();
        assert!(detail.contains("Server observed 3 messages"));
        assert!(detail.contains("#1"));
        assert!(!detail.contains("#3"));
        assert!(detail.contains("2 more operations"));
    }

    #[test]
    fn test_table_alignment() {
        let mut table = Table::new(&[("Name", Align::Left), ("N", Align::Right), ("Mid", Align::Center)], false);
        table.push_row(vec!["a".to_string(), "12345".to_string(), "x".to_string()]);
        assert_eq!(table.render(), "Name      N  Mid\na     12345   x");

        let mut bordered = Table::new(&[("Col", Align::Left)], true);
        bordered.push_row(vec!["value".to_string()]);
        assert_eq!(bordered.render(), "+-------+\n| Col   |\n+-------+\n| value |\n+-------+");
    }

    #[test]
    fn test_empty_table() {
        let formatter = PlainFormatter::new(FormattingOptions::default());
        assert_eq!(formatter.format_scenario_table(&[]).unwrap(), "No scenario results available.");
    }
}
