//! Configuration data model and validation

use crate::logging::LogLevel;
use crate::types::{AppError, Endpoint, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Largest message the drivers will allocate
pub const MAX_MESSAGE_SIZE: usize = 64 * 1024 * 1024;
/// Largest partial stream source buffer
pub const MAX_STREAM_SOURCE_SIZE: u64 = 1024 * 1024 * 1024;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server endpoint as `host:port` or `tcp://host:port`
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Messages per throughput or sync run
    #[serde(default = "default_message_count")]
    pub message_count: u64,

    /// Payload size in bytes
    #[serde(default = "default_message_size")]
    pub message_size: usize,

    /// Concurrent client connections for throughput runs
    #[serde(default = "default_clients")]
    pub clients: u32,

    /// Partial stream repetitions
    #[serde(default = "default_iterations")]
    pub iterations: u32,

    /// Reconnect cycles; 0 runs until interrupted
    #[serde(default = "default_reconnect_cycles")]
    pub reconnect_cycles: u64,

    #[serde(default = "default_reconnect_min_delay_ms")]
    pub reconnect_min_delay_ms: u64,

    #[serde(default = "default_reconnect_max_delay_ms")]
    pub reconnect_max_delay_ms: u64,

    /// Bytes declared and sent by the partial stream scenario
    #[serde(default = "default_stream_content_length")]
    pub stream_content_length: u64,

    /// Size of the source the partial stream reads from
    #[serde(default = "default_stream_source_size")]
    pub stream_source_size: u64,

    /// Connect, sync and drain timeout
    #[serde(default = "default_timeout_secs")]
    pub timeout_seconds: u64,

    #[serde(default)]
    pub preshared_key: Option<String>,

    /// Server idle timeout; 0 disables it
    #[serde(default)]
    pub idle_timeout_seconds: u64,

    #[serde(default = "default_max_connections")]
    pub max_connections: usize,

    /// Period of the server's statistics report
    #[serde(default = "default_stats_interval_secs")]
    pub stats_interval_seconds: u64,

    /// Enable TCP keep-alive probes
    #[serde(default)]
    pub keepalive: bool,

    /// Enable colored terminal output
    #[serde(default = "default_enable_color")]
    pub enable_color: bool,

    /// Connect to an existing server instead of starting an embedded one
    #[serde(default)]
    pub remote: bool,

    /// Server answers messages and sync requests with their own payload
    #[serde(default)]
    pub echo: bool,

    #[serde(default)]
    pub verbose: bool,

    #[serde(default)]
    pub debug: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            message_count: default_message_count(),
            message_size: default_message_size(),
            clients: default_clients(),
            iterations: default_iterations(),
            reconnect_cycles: default_reconnect_cycles(),
            reconnect_min_delay_ms: default_reconnect_min_delay_ms(),
            reconnect_max_delay_ms: default_reconnect_max_delay_ms(),
            stream_content_length: default_stream_content_length(),
            stream_source_size: default_stream_source_size(),
            timeout_seconds: default_timeout_secs(),
            preshared_key: None,
            idle_timeout_seconds: 0,
            max_connections: default_max_connections(),
            stats_interval_seconds: default_stats_interval_secs(),
            keepalive: false,
            enable_color: default_enable_color(),
            remote: false,
            echo: false,
            verbose: false,
            debug: false,
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_seconds)
    }

    pub fn stats_interval(&self) -> Duration {
        Duration::from_secs(self.stats_interval_seconds.max(1))
    }

    /// Parsed endpoint
    pub fn endpoint(&self) -> Result<Endpoint> {
        Endpoint::parse(&self.endpoint)
            .map_err(|e| AppError::config(format!("Invalid endpoint '{}': {}", self.endpoint, e)))
    }

    /// Inclusive reconnect delay bounds
    pub fn reconnect_delay_range(&self) -> (Duration, Duration) {
        (
            Duration::from_millis(self.reconnect_min_delay_ms),
            Duration::from_millis(self.reconnect_max_delay_ms),
        )
    }

    /// Minimum level for the structured logger
    pub fn log_level(&self) -> LogLevel {
        if self.debug {
            LogLevel::Debug
        } else if self.verbose {
            LogLevel::Info
        } else {
            LogLevel::Warn
        }
    }

    /// Validate the configuration and return the first error
    pub fn validate(&self) -> Result<()> {
        self.endpoint()?;

        if self.message_count == 0 {
            return Err(AppError::config("Message count must be greater than 0"));
        }
        if self.message_count > 10_000_000 {
            return Err(AppError::config("Message count cannot exceed 10000000"));
        }

        if self.message_size > MAX_MESSAGE_SIZE {
            return Err(AppError::config(format!("Message size cannot exceed {} bytes", MAX_MESSAGE_SIZE)));
        }

        if self.clients == 0 {
            return Err(AppError::config("Client count must be greater than 0"));
        }
        if self.clients > 256 {
            return Err(AppError::config("Client count cannot exceed 256"));
        }

        if self.iterations == 0 {
            return Err(AppError::config("Iterations must be greater than 0"));
        }
        if self.iterations > 10_000 {
            return Err(AppError::config("Iterations cannot exceed 10000"));
        }

        if self.reconnect_max_delay_ms > 600_000 {
            return Err(AppError::config("Reconnect max delay cannot exceed 600000ms"));
        }
        if self.reconnect_min_delay_ms > self.reconnect_max_delay_ms {
            return Err(AppError::config(format!(
                "Reconnect min delay ({}ms) cannot exceed max delay ({}ms)",
                self.reconnect_min_delay_ms, self.reconnect_max_delay_ms
            )));
        }

        if self.stream_source_size > MAX_STREAM_SOURCE_SIZE {
            return Err(AppError::config(format!(
                "Stream source size cannot exceed {} bytes",
                MAX_STREAM_SOURCE_SIZE
            )));
        }
        if self.stream_content_length > self.stream_source_size {
            return Err(AppError::config(format!(
                "Stream content length ({}) cannot exceed the source size ({})",
                self.stream_content_length, self.stream_source_size
            )));
        }

        if self.timeout_seconds == 0 {
            return Err(AppError::config("Timeout must be greater than 0"));
        }
        if self.timeout_seconds > 300 {
            return Err(AppError::config("Timeout cannot exceed 300 seconds"));
        }

        if let Some(key) = &self.preshared_key {
            if key.is_empty() {
                return Err(AppError::config("Pre-shared key cannot be empty"));
            }
        }

        if self.max_connections == 0 {
            return Err(AppError::config("Max connections must be greater than 0"));
        }

        Ok(())
    }

    /// Merge `TMT_*` environment variables into this configuration
    pub fn merge_from_env(&mut self) -> Result<()> {
        if let Ok(endpoint) = std::env::var("TMT_ENDPOINT") {
            let endpoint = endpoint.trim();
            if !endpoint.is_empty() {
                self.endpoint = endpoint.to_string();
            }
        }

        read_env("TMT_MESSAGE_COUNT", &mut self.message_count)?;
        read_env("TMT_MESSAGE_SIZE", &mut self.message_size)?;
        read_env("TMT_CLIENTS", &mut self.clients)?;
        read_env("TMT_ITERATIONS", &mut self.iterations)?;
        read_env("TMT_RECONNECT_CYCLES", &mut self.reconnect_cycles)?;
        read_env("TMT_RECONNECT_MIN_DELAY_MS", &mut self.reconnect_min_delay_ms)?;
        read_env("TMT_RECONNECT_MAX_DELAY_MS", &mut self.reconnect_max_delay_ms)?;
        read_env("TMT_STREAM_CONTENT_LENGTH", &mut self.stream_content_length)?;
        read_env("TMT_STREAM_SOURCE_SIZE", &mut self.stream_source_size)?;
        read_env("TMT_TIMEOUT_SECONDS", &mut self.timeout_seconds)?;
        read_env("TMT_IDLE_TIMEOUT_SECONDS", &mut self.idle_timeout_seconds)?;
        read_env("TMT_MAX_CONNECTIONS", &mut self.max_connections)?;
        read_env("TMT_STATS_INTERVAL_SECONDS", &mut self.stats_interval_seconds)?;
        read_env("TMT_KEEPALIVE", &mut self.keepalive)?;
        read_env("TMT_ENABLE_COLOR", &mut self.enable_color)?;

        if let Ok(key) = std::env::var("TMT_PRESHARED_KEY") {
            self.preshared_key = Some(key);
        }

        Ok(())
    }
}

fn read_env<T>(name: &str, target: &mut T) -> Result<()>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    if let Ok(raw) = std::env::var(name) {
        *target = raw
            .trim()
            .parse()
            .map_err(|e| AppError::config(format!("Invalid {} value '{}': {}", name, raw, e)))?;
    }
    Ok(())
}

// Default value functions for serde
fn default_endpoint() -> String {
    crate::defaults::DEFAULT_ENDPOINT.to_string()
}

fn default_message_count() -> u64 {
    crate::defaults::DEFAULT_MESSAGE_COUNT
}

fn default_message_size() -> usize {
    crate::defaults::DEFAULT_MESSAGE_SIZE
}

fn default_clients() -> u32 {
    crate::defaults::DEFAULT_CLIENTS
}

fn default_iterations() -> u32 {
    crate::defaults::DEFAULT_ITERATIONS
}

fn default_reconnect_cycles() -> u64 {
    crate::defaults::DEFAULT_RECONNECT_CYCLES
}

fn default_reconnect_min_delay_ms() -> u64 {
    crate::defaults::DEFAULT_RECONNECT_MIN_DELAY_MS
}

fn default_reconnect_max_delay_ms() -> u64 {
    crate::defaults::DEFAULT_RECONNECT_MAX_DELAY_MS
}

fn default_stream_content_length() -> u64 {
    crate::defaults::DEFAULT_STREAM_CONTENT_LENGTH
}

fn default_stream_source_size() -> u64 {
    crate::defaults::DEFAULT_STREAM_SOURCE_SIZE
}

fn default_timeout_secs() -> u64 {
    crate::defaults::DEFAULT_TIMEOUT.as_secs()
}

fn default_max_connections() -> usize {
    crate::defaults::DEFAULT_MAX_CONNECTIONS
}

fn default_stats_interval_secs() -> u64 {
    crate::defaults::DEFAULT_STATS_INTERVAL.as_secs()
}

fn default_enable_color() -> bool {
    crate::defaults::DEFAULT_ENABLE_COLOR
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.endpoint().unwrap(), Endpoint::new("127.0.0.1", 9000));
    }

    #[test]
    fn test_invalid_endpoint() {
        let config = Config {
            endpoint: "no-port".to_string(),
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert_eq!(err.category(), "CONFIG");
    }

    #[test]
    fn test_numeric_bounds() {
        let cases: Vec<fn(&mut Config)> = vec![
            |c: &mut Config| c.message_count = 0,
            |c: &mut Config| c.message_count = 10_000_001,
            |c: &mut Config| c.message_size = MAX_MESSAGE_SIZE + 1,
            |c: &mut Config| c.clients = 0,
            |c: &mut Config| c.clients = 257,
            |c: &mut Config| c.iterations = 0,
            |c: &mut Config| c.timeout_seconds = 0,
            |c: &mut Config| c.timeout_seconds = 301,
            |c: &mut Config| c.reconnect_max_delay_ms = 600_001,
            |c: &mut Config| c.max_connections = 0,
        ];
        for mutate in cases {
            let mut config = Config::default();
            mutate(&mut config);
            assert!(config.validate().is_err(), "{:?} should be rejected", config);
        }
    }

    #[test]
    fn test_zero_message_size_is_allowed() {
        let config = Config {
            message_size: 0,
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_reconnect_delay_order() {
        let config = Config {
            reconnect_min_delay_ms: 500,
            reconnect_max_delay_ms: 100,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = Config {
            reconnect_min_delay_ms: 100,
            reconnect_max_delay_ms: 100,
            ..Default::default()
        };
        assert!(config.validate().is_ok());
        assert_eq!(config.reconnect_delay_range(), (Duration::from_millis(100), Duration::from_millis(100)));
    }

    #[test]
    fn test_stream_length_cannot_exceed_source() {
        let config = Config {
            stream_content_length: 10,
            stream_source_size: 5,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_preshared_key_invalid() {
        let config = Config {
            preshared_key: Some(String::new()),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_log_level_follows_flags() {
        let mut config = Config::default();
        assert_eq!(config.log_level(), LogLevel::Warn);
        config.verbose = true;
        assert_eq!(config.log_level(), LogLevel::Info);
        config.debug = true;
        assert_eq!(config.log_level(), LogLevel::Debug);
    }
}
