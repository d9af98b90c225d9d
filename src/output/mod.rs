//! Report rendering for scenario runs and server mode
//!
//! Formatters turn results into strings; the coordinator decides which
//! sections a report has. Nothing here prints.

mod colored;
mod formatter;

pub use colored::{level_color, ColorScheme, ColoredFormatter};
pub use formatter::{
    format_bytes, format_duration, format_percentage, Align, FormattingOptions, OutputFormatter, PlainFormatter, Table,
};

use crate::{
    error::Result,
    executor::{ExecutionResults, ServerActivity},
};

pub struct OutputFormatterFactory;

impl OutputFormatterFactory {
    /// Per-operation rows are only rendered in verbose mode
    pub fn create_formatter(enable_color: bool, verbose: bool) -> Box<dyn OutputFormatter> {
        let options = FormattingOptions {
            enable_color,
            verbose_mode: verbose,
            show_individual_results: verbose,
            ..FormattingOptions::default()
        };

        if enable_color {
            Box::new(ColoredFormatter::new(options))
        } else {
            Box::new(PlainFormatter::new(options))
        }
    }

    /// Uncolored and verbose, for logs and benchmarks
    pub fn create_plain_formatter() -> Box<dyn OutputFormatter> {
        Self::create_formatter(false, true)
    }
}

pub struct OutputCoordinator {
    formatter: Box<dyn OutputFormatter>,
    verbose: bool,
}

impl OutputCoordinator {
    pub fn new(formatter: Box<dyn OutputFormatter>) -> Self {
        Self {
            formatter,
            verbose: false,
        }
    }

    /// Include per-scenario detail and per-operation rows
    pub fn with_verbose(formatter: Box<dyn OutputFormatter>, verbose: bool) -> Self {
        Self { formatter, verbose }
    }

    /// Header, summary, scenario table, then per-scenario detail when
    /// verbose, analysis and recommendations
    pub fn display_results(&self, results: &ExecutionResults) -> Result<String> {
        let f = &self.formatter;
        let mut sections = vec![
            f.format_header("TCP Messaging Test Results")?,
            f.format_execution_summary(&results.execution_summary)?,
            f.format_scenario_table(&results.scenario_results)?,
        ];
        if self.verbose {
            for result in &results.scenario_results {
                sections.push(f.format_scenario_detail(result)?);
            }
        }
        if let Some(analysis) = &results.statistical_analysis {
            sections.push(f.format_statistical_analysis(analysis)?);
        }
        sections.push(f.format_recommendations(results)?);

        Ok(sections.join("\n\n"))
    }

    /// One-line summary
    pub fn display_quick_summary(&self, results: &ExecutionResults) -> Result<String> {
        self.formatter.format_quick_summary(results)
    }

    pub fn display_server_activity(&self, activity: &ServerActivity) -> Result<String> {
        self.formatter.format_server_activity(activity)
    }

    pub fn display_warning(&self, warning: &str) -> Result<String> {
        self.formatter.format_warning(warning)
    }

    pub fn display_success(&self, message: &str) -> Result<String> {
        self.formatter.format_success(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{OperationMetrics, ScenarioResult};
    use crate::types::ScenarioKind;
    use std::time::Duration;

    fn results() -> ExecutionResults {
        let mut result = ScenarioResult::new(ScenarioKind::Throughput, "127.0.0.1:9000".to_string());
        for _ in 0..10 {
            result.add_measurement(OperationMetrics::success(Duration::from_micros(200), 1024));
        }
        result.set_server_observed(10, 10 * 1024);
        result.finish(Duration::from_millis(5));
        ExecutionResults::new(vec![result], Duration::from_millis(5)).with_analysis()
    }

    #[test]
    fn test_display_results_sections() {
        let coordinator = OutputCoordinator::new(OutputFormatterFactory::create_formatter(false, false));
        let output = coordinator.display_results(&results()).unwrap();
        assert!(output.contains("TCP Messaging Test Results"));
        assert!(output.contains("Execution Summary"));
        assert!(output.contains("throughput"));
        assert!(output.contains("Recommendations"));
        assert!(!output.contains("Server observed"));
    }

    #[test]
    fn test_verbose_includes_detail() {
        let coordinator = OutputCoordinator::with_verbose(OutputFormatterFactory::create_formatter(false, true), true);
        let output = coordinator.display_results(&results()).unwrap();
        assert!(output.contains("Server observed 10 messages"));
        assert!(output.contains("#10"));
    }

    #[test]
    fn test_quick_summary() {
        let coordinator = OutputCoordinator::new(OutputFormatterFactory::create_plain_formatter());
        let summary = coordinator.display_quick_summary(&results()).unwrap();
        assert!(summary.starts_with("Operations: 10/10 successful"));
    }
}
