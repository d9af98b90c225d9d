//! Colored formatter implementation with terminal color support
//!
//! This module provides a colored output formatter that uses ANSI colors
//! and a few Unicode symbols for visual presentation.

use super::formatter::{
    fmt_error, format_bytes, format_duration, format_percentage, status_label, FormattingOptions, OutputFormatter,
    PlainFormatter,
};
use crate::{
    error::Result,
    executor::{ExecutionResults, ExecutionSummary, ServerActivity},
    models::ScenarioResult,
    stats::StatisticalAnalysis,
    transport::DisconnectReason,
    types::{PerformanceLevel, TestStatus},
};
use colored::*;
use std::fmt::Write as _;

/// Terminal color for a performance level
pub fn level_color(level: PerformanceLevel) -> Color {
    match level {
        PerformanceLevel::Good => Color::Green,
        PerformanceLevel::Moderate => Color::Yellow,
        PerformanceLevel::Poor => Color::Red,
    }
}

/// Color scheme configuration
#[derive(Debug, Clone)]
pub struct ColorScheme {
    pub header: Color,
    pub success: Color,
    pub warning: Color,
    pub error: Color,
    pub info: Color,
    pub muted: Color,
    pub border: Color,
}

impl Default for ColorScheme {
    fn default() -> Self {
        Self {
            header: Color::Blue,
            success: Color::Green,
            warning: Color::Yellow,
            error: Color::Red,
            info: Color::Cyan,
            muted: Color::BrightBlack,
            border: Color::BrightBlack,
        }
    }
}

/// Colored formatter implementation
pub struct ColoredFormatter {
    plain_formatter: PlainFormatter,
    options: FormattingOptions,
    color_scheme: ColorScheme,
}

impl ColoredFormatter {
    pub fn new(options: FormattingOptions) -> Self {
        Self::with_color_scheme(options, ColorScheme::default())
    }

    /// Create a colored formatter with custom color scheme
    pub fn with_color_scheme(options: FormattingOptions, color_scheme: ColorScheme) -> Self {
        Self {
            plain_formatter: PlainFormatter::new(options.clone()),
            options,
            color_scheme,
        }
    }

    /// Apply color to text if colors are enabled
    fn colorize(&self, text: &str, color: Color) -> ColoredString {
        if self.options.enable_color {
            text.color(color)
        } else {
            text.normal()
        }
    }

    fn bold(&self, text: &str) -> ColoredString {
        if self.options.enable_color {
            text.bold()
        } else {
            text.normal()
        }
    }

    fn dimmed(&self, text: &str) -> ColoredString {
        if self.options.enable_color {
            text.dimmed()
        } else {
            text.normal()
        }
    }

    fn format_duration_colored(&self, duration_ms: f64) -> ColoredString {
        let level = PerformanceLevel::from_millis(duration_ms);
        self.colorize(&format_duration(duration_ms), level_color(level))
    }

    /// Format percentage with color coding based on value
    fn format_percentage_colored(&self, percentage: f64) -> ColoredString {
        let color = if percentage >= 95.0 {
            self.color_scheme.success
        } else if percentage >= 80.0 {
            self.color_scheme.warning
        } else {
            self.color_scheme.error
        };
        self.colorize(&format_percentage(percentage), color)
    }

    fn status_colored(&self, status: TestStatus) -> ColoredString {
        let color = match status {
            TestStatus::Success => self.color_scheme.success,
            TestStatus::Failed => self.color_scheme.error,
            TestStatus::Timeout => self.color_scheme.warning,
            TestStatus::Skipped => self.color_scheme.muted,
        };
        self.colorize(status_label(status), color)
    }

    fn create_section_header(&self, title: &str) -> String {
        format!("{} {}", self.colorize("▶", self.color_scheme.border), self.bold(title).color(self.color_scheme.header))
    }

    fn rule(&self, width: usize) -> ColoredString {
        self.colorize(&"─".repeat(width), self.color_scheme.border)
    }
}

impl OutputFormatter for ColoredFormatter {
    fn format_header(&self, title: &str) -> Result<String> {
        let mut output = String::new();
        let border = "═".repeat(title.chars().count() + 4);
        writeln!(output, "{}", self.colorize(&border, self.color_scheme.border)).map_err(fmt_error)?;
        writeln!(output, "  {}  ", self.bold(title).color(self.color_scheme.header)).map_err(fmt_error)?;
        write!(output, "{}", self.colorize(&border, self.color_scheme.border)).map_err(fmt_error)?;
        Ok(output)
    }

    fn format_execution_summary(&self, summary: &ExecutionSummary) -> Result<String> {
        let mut output = String::new();
        writeln!(output, "{}", self.create_section_header("Execution Summary")).map_err(fmt_error)?;
        writeln!(
            output,
            "  Duration:     {}",
            self.colorize(&format_duration(summary.total_duration.as_secs_f64() * 1000.0), self.color_scheme.info)
        )
        .map_err(fmt_error)?;
        writeln!(output, "  Operations:   {}", summary.total_operations).map_err(fmt_error)?;
        write!(
            output,
            "  Successful:   {} ({})",
            self.colorize(&summary.successful_operations.to_string(), self.color_scheme.success),
            self.format_percentage_colored(summary.success_rate)
        )
        .map_err(fmt_error)?;
        if summary.failed_operations > 0 {
            write!(
                output,
                "\n  Failed:       {}",
                self.colorize(&summary.failed_operations.to_string(), self.color_scheme.error)
            )
            .map_err(fmt_error)?;
        }
        if summary.timeout_operations > 0 {
            write!(
                output,
                "\n  Timeout:      {}",
                self.colorize(&summary.timeout_operations.to_string(), self.color_scheme.warning)
            )
            .map_err(fmt_error)?;
        }
        if summary.skipped_operations > 0 {
            write!(output, "\n  Skipped:      {}", self.dimmed(&summary.skipped_operations.to_string()))
                .map_err(fmt_error)?;
        }
        if summary.interrupted {
            write!(output, "\n  {}", self.colorize("Interrupted by Ctrl-C", self.color_scheme.warning))
                .map_err(fmt_error)?;
        }
        Ok(output)
    }

    fn format_scenario_table(&self, results: &[ScenarioResult]) -> Result<String> {
        let mut output = String::new();
        writeln!(output, "{}", self.create_section_header("Scenario Results")).map_err(fmt_error)?;
        if results.is_empty() {
            write!(output, "{}", self.dimmed("No scenario results available.")).map_err(fmt_error)?;
            return Ok(output);
        }

        let header = format!(
            "{:<12} {:>12} {:>8} {:>12} {:>10} {:>10} {:>10}  {}",
            "Scenario", "Ops", "Success", "Msg/s", "MB/s", "Avg", "p99", "Level"
        );
        writeln!(output, "{}", self.bold(&header)).map_err(fmt_error)?;
        writeln!(output, "{}", self.rule(header.len() + 4)).map_err(fmt_error)?;

        for result in results {
            let ops = format!("{}/{}", result.success_count, result.total_count);
            // Pad before coloring so ANSI codes do not disturb alignment
            let success = self.format_percentage_colored(result.success_rate());
            let success = format!("{}{}", " ".repeat(8usize.saturating_sub(format_percentage(result.success_rate()).len())), success);
            let line = match &result.statistics {
                Some(stats) => {
                    let level = stats.performance_level();
                    format!(
                        "{:<12} {:>12} {} {:>12.0} {:>10.2} {:>10} {:>10}  {}",
                        result.scenario,
                        ops,
                        success,
                        stats.messages_per_sec,
                        stats.megabytes_per_sec,
                        format_duration(stats.avg_ms),
                        format_duration(stats.p99_ms),
                        self.colorize(level.label(), level_color(level))
                    )
                }
                None => format!(
                    "{:<12} {:>12} {} {:>12} {:>10} {:>10} {:>10}  {}",
                    result.scenario,
                    ops,
                    success,
                    "N/A",
                    "N/A",
                    "N/A",
                    "N/A",
                    self.dimmed("N/A")
                ),
            };
            writeln!(output, "{}", line).map_err(fmt_error)?;
        }
        Ok(output.trim_end().to_string())
    }

    fn format_scenario_detail(&self, result: &ScenarioResult) -> Result<String> {
        let mut output = String::new();
        writeln!(
            output,
            "{} {}",
            self.create_section_header(&result.scenario),
            self.dimmed(&format!("({})", result.endpoint))
        )
        .map_err(fmt_error)?;
        write!(
            output,
            "  Elapsed {} | sent {}",
            format_duration(result.elapsed.as_secs_f64() * 1000.0),
            format_bytes(result.bytes_sent)
        )
        .map_err(fmt_error)?;
        if let (Some(messages), Some(bytes)) = (result.server_messages_received, result.server_bytes_received) {
            let color = if bytes >= result.bytes_sent {
                self.color_scheme.success
            } else {
                self.color_scheme.error
            };
            write!(
                output,
                "\n  Server observed {}",
                self.colorize(&format!("{} messages, {}", messages, format_bytes(bytes)), color)
            )
            .map_err(fmt_error)?;
        }
        if let Some(stats) = &result.statistics {
            write!(
                output,
                "\n  Latency min {} / p50 {} / p90 {} / p99 {} / max {}",
                self.format_duration_colored(stats.min_ms),
                self.format_duration_colored(stats.p50_ms),
                self.format_duration_colored(stats.p90_ms),
                self.format_duration_colored(stats.p99_ms),
                self.format_duration_colored(stats.max_ms)
            )
            .map_err(fmt_error)?;
        }

        if self.options.show_individual_results {
            for (idx, op) in result.individual_results.iter().take(self.options.max_detail_rows).enumerate() {
                write!(
                    output,
                    "\n  {:<6} {:<8} {:>10}",
                    self.dimmed(&format!("#{}", idx + 1)),
                    self.status_colored(op.status),
                    format_duration(op.duration_ms())
                )
                .map_err(fmt_error)?;
                if let Some(error) = &op.error_message {
                    write!(output, "  {}", self.dimmed(error)).map_err(fmt_error)?;
                }
            }
            let hidden = result.individual_results.len().saturating_sub(self.options.max_detail_rows);
            if hidden > 0 {
                write!(output, "\n  {}", self.dimmed(&format!("... {} more operations", hidden))).map_err(fmt_error)?;
            }
        }
        Ok(output)
    }

    fn format_statistical_analysis(&self, analysis: &StatisticalAnalysis) -> Result<String> {
        let mut output = String::new();
        write!(output, "{}", self.create_section_header("Statistical Analysis")).map_err(fmt_error)?;
        for (name, stats) in &analysis.scenarios {
            write!(
                output,
                "\n  {}: {} success, jitter {}, consistency {:.0}/100",
                self.bold(name),
                self.format_percentage_colored(stats.reliability.success_rate),
                self.format_duration_colored(stats.reliability.jitter_ms),
                stats.reliability.consistency_score
            )
            .map_err(fmt_error)?;
            if self.options.verbose_mode {
                if let Some((low, high)) = stats.confidence_interval {
                    write!(output, "\n    95% CI of mean: {} .. {}", format_duration(low), format_duration(high))
                        .map_err(fmt_error)?;
                }
            }
        }
        for finding in &analysis.summary.key_findings {
            write!(output, "\n  {} {}", self.colorize("•", self.color_scheme.info), finding).map_err(fmt_error)?;
        }
        for warning in &analysis.summary.warnings {
            write!(output, "\n  {} {}", self.colorize("!", self.color_scheme.warning), warning).map_err(fmt_error)?;
        }
        Ok(output)
    }

    fn format_recommendations(&self, results: &ExecutionResults) -> Result<String> {
        // Same findings as plain output, with a colored heading
        let plain = self.plain_formatter.format_recommendations(results)?;
        let body: Vec<&str> = plain.lines().skip(2).collect();
        let mut output = self.create_section_header("Recommendations");
        for line in body {
            output.push('\n');
            output.push_str(line);
        }
        Ok(output)
    }

    fn format_quick_summary(&self, results: &ExecutionResults) -> Result<String> {
        let summary = &results.execution_summary;
        Ok(format!(
            "{} {}/{} successful ({}) in {:.2}s{}",
            self.colorize("✓", self.color_scheme.success),
            summary.successful_operations,
            summary.total_operations,
            self.format_percentage_colored(summary.success_rate),
            summary.total_duration.as_secs_f64(),
            if summary.interrupted {
                self.colorize(" (interrupted)", self.color_scheme.warning).to_string()
            } else {
                String::new()
            }
        ))
    }

    fn format_server_activity(&self, activity: &ServerActivity) -> Result<String> {
        let line = self.plain_formatter.format_server_activity(activity)?;
        Ok(match activity {
            ServerActivity::Listening { .. } => self.bold(&line).color(self.color_scheme.header).to_string(),
            ServerActivity::ClientConnected(_) => self.colorize(&line, self.color_scheme.success).to_string(),
            ServerActivity::ClientDisconnected { reason, .. } => {
                let color = match reason {
                    DisconnectReason::Normal | DisconnectReason::Shutdown => self.color_scheme.muted,
                    _ => self.color_scheme.warning,
                };
                self.colorize(&line, color).to_string()
            }
            ServerActivity::AuthenticationFailed { .. } => self.colorize(&line, self.color_scheme.error).to_string(),
            ServerActivity::Report(_) => self.colorize(&line, self.color_scheme.info).to_string(),
        })
    }

    fn format_warning(&self, warning: &str) -> Result<String> {
        Ok(format!("{} {}", self.colorize("! WARNING:", self.color_scheme.warning).bold(), warning))
    }

    fn format_success(&self, message: &str) -> Result<String> {
        Ok(format!("{} {}", self.colorize("✓", self.color_scheme.success).bold(), message))
    }
}
