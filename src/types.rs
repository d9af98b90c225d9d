//! Type definitions and aliases

use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;
use std::time::Duration;
use serde::{Deserialize, Serialize};

// Re-export commonly used types
pub use crate::error::{AppError, Result};

/// TCP endpoint a server binds to or a client connects to
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Endpoint {
    /// Host name or IP literal
    pub host: String,
    /// TCP port
    pub port: u16,
}

impl Endpoint {
    /// Create a new endpoint
    pub fn new<S: Into<String>>(host: S, port: u16) -> Self {
        Self { host: host.into(), port }
    }

    /// Parse `host:port`, `[v6]:port` or `tcp://host:port`
    pub fn parse(input: &str) -> Result<Self> {
        let input = input.trim();
        if input.is_empty() {
            return Err(AppError::validation("Endpoint cannot be empty"));
        }

        if input.contains("://") {
            let parsed = url::Url::parse(input)?;
            if parsed.scheme() != "tcp" {
                return Err(AppError::validation(format!(
                    "Unsupported endpoint scheme '{}', expected tcp://", parsed.scheme()
                )));
            }
            let host = parsed
                .host_str()
                .ok_or_else(|| AppError::validation(format!("Endpoint '{}' has no host", input)))?;
            let port = parsed
                .port()
                .ok_or_else(|| AppError::validation(format!("Endpoint '{}' has no port", input)))?;
            let host = host.trim_start_matches('[').trim_end_matches(']');
            return Ok(Self::new(host, port));
        }

        let (host, port) = input
            .rsplit_once(':')
            .ok_or_else(|| AppError::validation(format!("Endpoint '{}' must be host:port", input)))?;
        let host = host.trim_start_matches('[').trim_end_matches(']');
        if host.is_empty() {
            return Err(AppError::validation(format!("Endpoint '{}' has no host", input)));
        }
        if host.contains(':') && host.parse::<IpAddr>().is_err() {
            return Err(AppError::validation(format!("Endpoint '{}' has an invalid host", input)));
        }
        let port: u16 = port
            .parse()
            .map_err(|e| AppError::validation(format!("Endpoint '{}' has an invalid port: {}", input, e)))?;

        Ok(Self::new(host, port))
    }

    /// Whether the host is a loopback address or `localhost`
    pub fn is_loopback(&self) -> bool {
        if self.host.eq_ignore_ascii_case("localhost") {
            return true;
        }
        self.host.parse::<IpAddr>().map(|ip| ip.is_loopback()).unwrap_or(false)
    }

    /// Address tuple accepted by tokio's bind/connect
    pub fn as_tuple(&self) -> (&str, u16) {
        (self.host.as_str(), self.port)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

impl FromStr for Endpoint {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl From<std::net::SocketAddr> for Endpoint {
    fn from(addr: std::net::SocketAddr) -> Self {
        Self::new(addr.ip().to_string(), addr.port())
    }
}

/// Performance classification based on average operation latency
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum PerformanceLevel {
    /// Good performance (< 1 ms)
    Good,
    /// Moderate performance (1-10 ms)
    Moderate,
    /// Poor performance (> 10 ms)
    Poor,
}

impl PerformanceLevel {
    /// Classify performance based on a latency
    pub fn from_duration(duration: Duration) -> Self {
        Self::from_millis(duration.as_secs_f64() * 1000.0)
    }

    /// Classify performance based on a latency in milliseconds
    pub fn from_millis(ms: f64) -> Self {
        if ms < 1.0 {
            Self::Good
        } else if ms < 10.0 {
            Self::Moderate
        } else {
            Self::Poor
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Good => "GOOD",
            Self::Moderate => "MODERATE",
            Self::Poor => "POOR",
        }
    }
}

/// Outcome of a single measured operation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum TestStatus {
    /// Operation completed successfully
    Success,
    /// Operation failed due to a network or protocol error
    Failed,
    /// Operation was skipped (e.g., run interrupted)
    Skipped,
    /// Operation timed out
    Timeout,
}

/// Driver scenarios the CLI can run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScenarioKind {
    /// Send many fixed-size messages and measure rate
    Throughput,
    /// Connect/disconnect repeatedly with randomized delays
    Reconnect,
    /// Send a stream whose declared length is shorter than its source
    PartialStream,
    /// Request/response round trips
    SyncRequest,
}

impl ScenarioKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Throughput => "throughput",
            Self::Reconnect => "reconnect",
            Self::PartialStream => "stream",
            Self::SyncRequest => "sync",
        }
    }
}

impl fmt::Display for ScenarioKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_parse_forms() {
        assert_eq!(Endpoint::parse("127.0.0.1:9000").unwrap(), Endpoint::new("127.0.0.1", 9000));
        assert_eq!(Endpoint::parse("tcp://localhost:8080").unwrap(), Endpoint::new("localhost", 8080));
        assert_eq!(Endpoint::parse("[::1]:9000").unwrap(), Endpoint::new("::1", 9000));
        assert_eq!(Endpoint::parse(" example.com:1 ").unwrap(), Endpoint::new("example.com", 1));
    }

    #[test]
    fn test_endpoint_parse_rejects_bad_input() {
        assert!(Endpoint::parse("").is_err());
        assert!(Endpoint::parse("localhost").is_err());
        assert!(Endpoint::parse(":9000").is_err());
        assert!(Endpoint::parse("localhost:99999").is_err());
        assert!(Endpoint::parse("http://localhost:80").is_err());
        assert!(Endpoint::parse("tcp://localhost").is_err());
    }

    #[test]
    fn test_endpoint_display_round_trips() {
        for input in ["127.0.0.1:9000", "[::1]:9000", "host.example:42"] {
            let endpoint = Endpoint::parse(input).unwrap();
            assert_eq!(endpoint.to_string(), input);
        }
    }

    #[test]
    fn test_endpoint_loopback() {
        assert!(Endpoint::new("127.0.0.1", 1).is_loopback());
        assert!(Endpoint::new("LOCALHOST", 1).is_loopback());
        assert!(Endpoint::new("::1", 1).is_loopback());
        assert!(!Endpoint::new("10.0.0.1", 1).is_loopback());
    }

    #[test]
    fn test_performance_level_thresholds() {
        assert_eq!(PerformanceLevel::from_millis(0.4), PerformanceLevel::Good);
        assert_eq!(PerformanceLevel::from_millis(5.0), PerformanceLevel::Moderate);
        assert_eq!(PerformanceLevel::from_duration(Duration::from_millis(25)), PerformanceLevel::Poor);
    }
}
