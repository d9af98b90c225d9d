//! Configuration validation utilities and rules

use crate::{error::Result, models::Config, types::ScenarioKind};
use colored::Colorize;

/// Configuration validator with advisory checks on top of `Config::validate`
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the configuration and collect warnings that apply to `kind`
    /// (`None` for server mode)
    pub fn validate_comprehensive(config: &Config, kind: Option<ScenarioKind>) -> Result<Vec<ValidationWarning>> {
        config.validate()?;

        let mut warnings = Vec::new();
        warnings.extend(Self::validate_endpoint(config)?);
        match kind {
            Some(ScenarioKind::Throughput) => warnings.extend(Self::validate_throughput(config)),
            Some(ScenarioKind::Reconnect) => warnings.extend(Self::validate_reconnect(config)),
            Some(ScenarioKind::PartialStream) => warnings.extend(Self::validate_stream(config)),
            Some(ScenarioKind::SyncRequest) => {}
            None => warnings.extend(Self::validate_server(config)),
        }
        Ok(warnings)
    }

    fn validate_endpoint(config: &Config) -> Result<Vec<ValidationWarning>> {
        let endpoint = config.endpoint()?;
        let mut warnings = Vec::new();

        if !endpoint.is_loopback() && config.preshared_key.is_none() {
            warnings.push(ValidationWarning::warning(format!(
                "Endpoint {} is not loopback and no pre-shared key is set",
                endpoint
            )));
        }
        match endpoint.port {
            0 if config.remote => warnings.push(ValidationWarning::error(
                "Port 0 only works with the embedded server; --remote needs a real port",
            )),
            1..=1023 => warnings.push(ValidationWarning::info(format!(
                "Port {} is privileged; binding may require elevated rights",
                endpoint.port
            ))),
            _ => {}
        }
        Ok(warnings)
    }

    fn validate_throughput(config: &Config) -> Vec<ValidationWarning> {
        let mut warnings = Vec::new();
        if u64::from(config.clients) > config.message_count {
            warnings.push(ValidationWarning::warning(format!(
                "{} clients but only {} messages; some clients will send nothing",
                config.clients, config.message_count
            )));
        }
        let total_bytes = config.message_count.saturating_mul(config.message_size as u64);
        if total_bytes > 1024 * 1024 * 1024 {
            warnings.push(ValidationWarning::info(format!(
                "Run will send {} MiB in total",
                total_bytes / (1024 * 1024)
            )));
        }
        if config.message_size == 0 {
            warnings.push(ValidationWarning::info("Message size is 0; throughput in MB/s will be zero"));
        }
        warnings
    }

    fn validate_reconnect(config: &Config) -> Vec<ValidationWarning> {
        let mut warnings = Vec::new();
        if config.reconnect_cycles == 0 {
            warnings.push(ValidationWarning::info("Reconnect cycles is 0; the loop runs until Ctrl-C"));
        }
        if config.reconnect_max_delay_ms == 0 {
            warnings.push(ValidationWarning::warning(
                "Reconnect delay is 0; the loop will reconnect as fast as possible",
            ));
        }
        warnings
    }

    fn validate_stream(config: &Config) -> Vec<ValidationWarning> {
        let mut warnings = Vec::new();
        if config.stream_content_length == config.stream_source_size {
            warnings.push(ValidationWarning::info(
                "Stream content length equals the source size; the stream is not partial",
            ));
        }
        if config.stream_content_length == 0 {
            warnings.push(ValidationWarning::warning("Stream content length is 0; every stream is empty"));
        }
        warnings
    }

    fn validate_server(config: &Config) -> Vec<ValidationWarning> {
        let mut warnings = Vec::new();
        if config.idle_timeout_seconds > 0 && config.idle_timeout_seconds < config.stats_interval_seconds {
            warnings.push(ValidationWarning::info("Idle timeout is shorter than the statistics interval"));
        }
        if config.remote {
            warnings.push(ValidationWarning::info("--remote has no effect in server mode"));
        }
        warnings
    }
}

/// Validation warning levels
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationLevel {
    Info,
    Warning,
    Error,
}

impl ValidationLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "INFO",
            Self::Warning => "WARNING",
            Self::Error => "ERROR",
        }
    }

    /// Get color for terminal display
    pub fn color(&self) -> &'static str {
        match self {
            Self::Info => "blue",
            Self::Warning => "yellow",
            Self::Error => "red",
        }
    }
}

/// Configuration validation warning
#[derive(Debug, Clone)]
pub struct ValidationWarning {
    pub level: ValidationLevel,
    pub message: String,
}

impl ValidationWarning {
    pub fn new(level: ValidationLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::new(ValidationLevel::Info, message)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(ValidationLevel::Warning, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(ValidationLevel::Error, message)
    }

    /// Format warning for display
    pub fn format(&self, use_color: bool) -> String {
        let tag = format!("[{}]", self.level.as_str());
        if use_color {
            format!("{} {}", tag.color(self.level.color()), self.message)
        } else {
            format!("{} {}", tag, self.message)
        }
    }
}

/// Convenience function for comprehensive configuration validation
pub fn validate_config(config: &Config, kind: Option<ScenarioKind>) -> Result<Vec<ValidationWarning>> {
    ConfigValidator::validate_comprehensive(config, kind)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_has_no_warnings() {
        let warnings = validate_config(&Config::default(), Some(ScenarioKind::Throughput)).unwrap();
        assert!(warnings.is_empty(), "{:?}", warnings);
    }

    #[test]
    fn test_invalid_config_is_an_error() {
        let config = Config {
            clients: 0,
            ..Default::default()
        };
        assert!(validate_config(&config, None).is_err());
    }

    #[test]
    fn test_remote_endpoint_without_key_warns() {
        let config = Config {
            endpoint: "10.0.0.5:9000".to_string(),
            ..Default::default()
        };
        let warnings = validate_config(&config, Some(ScenarioKind::SyncRequest)).unwrap();
        assert!(warnings
            .iter()
            .any(|w| w.level == ValidationLevel::Warning && w.message.contains("pre-shared key")));
    }

    #[test]
    fn test_scenario_specific_warnings() {
        let config = Config {
            clients: 8,
            message_count: 4,
            reconnect_cycles: 0,
            stream_content_length: 100,
            stream_source_size: 100,
            ..Default::default()
        };
        assert!(validate_config(&config, Some(ScenarioKind::Throughput))
            .unwrap()
            .iter()
            .any(|w| w.message.contains("send nothing")));
        assert!(validate_config(&config, Some(ScenarioKind::Reconnect))
            .unwrap()
            .iter()
            .any(|w| w.message.contains("Ctrl-C")));
        assert!(validate_config(&config, Some(ScenarioKind::PartialStream))
            .unwrap()
            .iter()
            .any(|w| w.message.contains("not partial")));
    }

    #[test]
    fn test_warning_format() {
        let warning = ValidationWarning::info("hello".to_string());
        assert_eq!(warning.format(false), "[INFO] hello");
    }
}
