//! Command-line interface

use crate::models::Config;
use crate::types::ScenarioKind;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// TCP Messaging Tester - drive a framed TCP messaging transport and measure it
#[derive(Parser, Debug, Clone)]
#[command(name = "tmt")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Server endpoint (host:port or tcp://host:port)
    #[arg(short, long, global = true)]
    pub endpoint: Option<String>,

    /// Connect, sync and drain timeout in seconds
    #[arg(short, long, global = true, value_parser = parse_duration)]
    pub timeout: Option<u64>,

    /// Pre-shared key for connection authentication
    #[arg(long = "psk", global = true, value_name = "KEY")]
    pub preshared_key: Option<String>,

    /// Enable TCP keep-alive probes
    #[arg(long, global = true)]
    pub keepalive: bool,

    /// Force colored output
    #[arg(long, global = true)]
    pub color: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Enable verbose output
    #[arg(long, global = true)]
    pub verbose: bool,

    /// Print a one-line summary instead of the full report
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Enable debug output
    #[arg(long, global = true)]
    pub debug: bool,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Run a server until Ctrl-C, printing connection events and statistics
    Server(ServerArgs),
    /// Send many fixed-size messages and measure the rate
    Throughput(ThroughputArgs),
    /// Connect and disconnect repeatedly with randomized delays
    Reconnect(ReconnectArgs),
    /// Send streams that declare fewer bytes than their source holds
    Stream(StreamArgs),
    /// Measure request/response round trips
    Sync(SyncArgs),
    /// List, generate or check TMT_* configuration variables
    Env(EnvArgs),
}

#[derive(Args, Debug, Clone, Default)]
pub struct ServerArgs {
    /// Echo every message back and answer sync requests
    #[arg(long)]
    pub echo: bool,

    /// Disconnect clients idle for this many seconds (0 disables)
    #[arg(long, value_name = "SECONDS")]
    pub idle_timeout: Option<u64>,

    /// Maximum concurrent connections
    #[arg(long)]
    pub max_connections: Option<usize>,

    /// Seconds between statistics reports
    #[arg(long, value_name = "SECONDS")]
    pub stats_interval: Option<u64>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct RemoteArgs {
    /// Connect to an existing server instead of starting an embedded one
    #[arg(long)]
    pub remote: bool,
}

#[derive(Args, Debug, Clone, Default)]
pub struct ThroughputArgs {
    /// Total messages to send
    #[arg(short = 'c', long)]
    pub count: Option<u64>,

    /// Payload size in bytes
    #[arg(short = 's', long)]
    pub size: Option<usize>,

    /// Concurrent client connections
    #[arg(long)]
    pub clients: Option<u32>,

    #[command(flatten)]
    pub remote: RemoteArgs,
}

#[derive(Args, Debug, Clone, Default)]
pub struct ReconnectArgs {
    /// Connect/disconnect cycles (0 runs until Ctrl-C)
    #[arg(long)]
    pub cycles: Option<u64>,

    /// Minimum delay between cycles in milliseconds
    #[arg(long, value_name = "MS")]
    pub min_delay: Option<u64>,

    /// Maximum delay between cycles in milliseconds
    #[arg(long, value_name = "MS")]
    pub max_delay: Option<u64>,

    /// Payload size sent on each connection
    #[arg(short = 's', long)]
    pub size: Option<usize>,

    #[command(flatten)]
    pub remote: RemoteArgs,
}

#[derive(Args, Debug, Clone, Default)]
pub struct StreamArgs {
    /// Bytes declared and sent per stream
    #[arg(long)]
    pub content_length: Option<u64>,

    /// Size of the source buffer the stream reads from
    #[arg(long)]
    pub source_size: Option<u64>,

    /// Streams to send
    #[arg(short = 'n', long)]
    pub iterations: Option<u32>,

    #[command(flatten)]
    pub remote: RemoteArgs,
}

#[derive(Args, Debug, Clone, Default)]
pub struct SyncArgs {
    /// Round trips to perform
    #[arg(short = 'c', long)]
    pub count: Option<u64>,

    /// Request size in bytes
    #[arg(short = 's', long)]
    pub size: Option<usize>,

    #[command(flatten)]
    pub remote: RemoteArgs,
}

#[derive(Args, Debug, Clone)]
pub struct EnvArgs {
    /// Print an example .env file
    #[arg(long)]
    pub example: bool,

    /// Write an example .env file to PATH
    #[arg(long, value_name = "PATH")]
    pub write: Option<PathBuf>,

    /// Check the environment and the .env file for invalid values
    #[arg(long)]
    pub check: bool,

    /// .env file to check
    #[arg(long, value_name = "PATH", default_value = ".env")]
    pub file: PathBuf,
}

impl Cli {
    /// Validate CLI arguments for conflicts
    pub fn validate(&self) -> Result<(), String> {
        if self.color && self.no_color {
            return Err("Cannot specify both --color and --no-color".to_string());
        }
        if let Some(key) = &self.preshared_key {
            if key.is_empty() {
                return Err("--psk cannot be empty".to_string());
            }
        }
        Ok(())
    }

    /// Scenario the subcommand runs; `None` for `server` and `env`
    pub fn scenario_kind(&self) -> Option<ScenarioKind> {
        match self.command {
            Command::Server(_) | Command::Env(_) => None,
            Command::Throughput(_) => Some(ScenarioKind::Throughput),
            Command::Reconnect(_) => Some(ScenarioKind::Reconnect),
            Command::Stream(_) => Some(ScenarioKind::PartialStream),
            Command::Sync(_) => Some(ScenarioKind::SyncRequest),
        }
    }

    /// Check if colors should be enabled
    pub fn use_colors(&self) -> bool {
        if self.color {
            true
        } else if self.no_color {
            false
        } else {
            supports_color()
        }
    }

    /// Apply flags that were given on the command line; absent flags keep
    /// the value from defaults, `.env` or the environment
    pub fn apply_to(&self, config: &mut Config) {
        if let Some(endpoint) = &self.endpoint {
            config.endpoint = endpoint.clone();
        }
        if let Some(timeout) = self.timeout {
            config.timeout_seconds = timeout;
        }
        if let Some(key) = &self.preshared_key {
            config.preshared_key = Some(key.clone());
        }
        if self.keepalive {
            config.keepalive = true;
        }
        if self.no_color {
            config.enable_color = false;
        } else if self.color {
            config.enable_color = true;
        }
        config.verbose = self.verbose;
        config.debug = self.debug;

        match &self.command {
            Command::Server(args) => {
                config.echo = args.echo;
                set(&mut config.idle_timeout_seconds, args.idle_timeout);
                set(&mut config.max_connections, args.max_connections);
                set(&mut config.stats_interval_seconds, args.stats_interval);
            }
            Command::Throughput(args) => {
                set(&mut config.message_count, args.count);
                set(&mut config.message_size, args.size);
                set(&mut config.clients, args.clients);
                config.remote = args.remote.remote;
            }
            Command::Reconnect(args) => {
                set(&mut config.reconnect_cycles, args.cycles);
                set(&mut config.reconnect_min_delay_ms, args.min_delay);
                set(&mut config.reconnect_max_delay_ms, args.max_delay);
                set(&mut config.message_size, args.size);
                config.remote = args.remote.remote;
            }
            Command::Stream(args) => {
                set(&mut config.stream_content_length, args.content_length);
                set(&mut config.stream_source_size, args.source_size);
                set(&mut config.iterations, args.iterations);
                config.remote = args.remote.remote;
            }
            Command::Sync(args) => {
                set(&mut config.message_count, args.count);
                set(&mut config.message_size, args.size);
                config.remote = args.remote.remote;
            }
            Command::Env(_) => {}
        }
    }
}

fn set<T>(field: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *field = value;
    }
}

/// Parse duration from seconds string
fn parse_duration(s: &str) -> Result<u64, String> {
    if s.starts_with('+') || s.starts_with("0x") || s.starts_with("0X") {
        return Err(format!("Invalid duration: {}", s));
    }

    s.parse::<u64>()
        .map_err(|_| format!("Invalid duration: {}", s))
        .and_then(|secs| {
            if secs == 0 {
                Err("Duration must be greater than 0".to_string())
            } else if secs > 300 {
                Err("Duration cannot exceed 300 seconds".to_string())
            } else {
                Ok(secs)
            }
        })
}

/// Check if the terminal supports color output
fn supports_color() -> bool {
    if let Ok(term) = std::env::var("TERM") {
        if term == "dumb" {
            return false;
        }
    }

    if std::env::var("NO_COLOR").is_ok() {
        return false;
    }

    if std::env::var("FORCE_COLOR").is_ok() {
        return true;
    }

    #[cfg(target_os = "windows")]
    {
        if std::env::var("ANSICON").is_ok() || std::env::var("ConEmuANSI").is_ok() {
            return true;
        }
    }

    #[cfg(unix)]
    {
        true
    }
    #[cfg(not(unix))]
    {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_throughput_parsing() {
        let cli = Cli::parse_from(["tmt", "throughput", "--count", "500", "-s", "64", "--clients", "4", "--remote"]);
        assert_eq!(cli.scenario_kind(), Some(ScenarioKind::Throughput));
        match &cli.command {
            Command::Throughput(args) => {
                assert_eq!(args.count, Some(500));
                assert_eq!(args.size, Some(64));
                assert_eq!(args.clients, Some(4));
                assert!(args.remote.remote);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::parse_from([
            "tmt", "sync", "--endpoint", "127.0.0.1:7000", "--psk", "secret", "--timeout", "3", "--no-color",
        ]);
        assert_eq!(cli.endpoint.as_deref(), Some("127.0.0.1:7000"));
        assert_eq!(cli.preshared_key.as_deref(), Some("secret"));
        assert_eq!(cli.timeout, Some(3));
        assert!(!cli.use_colors());
    }

    #[test]
    fn test_apply_to_only_overrides_given_flags() {
        let mut config = Config {
            message_count: 42,
            ..Default::default()
        };
        let cli = Cli::parse_from(["tmt", "reconnect", "--cycles", "0", "--max-delay", "50", "--min-delay", "10"]);
        cli.apply_to(&mut config);

        assert_eq!(config.reconnect_cycles, 0);
        assert_eq!(config.reconnect_min_delay_ms, 10);
        assert_eq!(config.reconnect_max_delay_ms, 50);
        assert_eq!(config.message_count, 42);
        assert!(!config.remote);
    }

    #[test]
    fn test_server_args() {
        let mut config = Config::default();
        let cli = Cli::parse_from(["tmt", "server", "--echo", "--idle-timeout", "30", "--stats-interval", "2"]);
        assert_eq!(cli.scenario_kind(), None);
        cli.apply_to(&mut config);
        assert!(config.echo);
        assert_eq!(config.idle_timeout_seconds, 30);
        assert_eq!(config.stats_interval_seconds, 2);
    }

    #[test]
    fn test_env_args() {
        let cli = Cli::parse_from(["tmt", "env", "--check", "--file", "custom.env"]);
        assert_eq!(cli.scenario_kind(), None);
        match &cli.command {
            Command::Env(args) => {
                assert!(args.check);
                assert!(!args.example);
                assert_eq!(args.file, PathBuf::from("custom.env"));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_validate_conflicts() {
        let cli = Cli::parse_from(["tmt", "stream", "--color", "--no-color"]);
        assert!(cli.validate().is_err());

        let cli = Cli::parse_from(["tmt", "stream", "--psk", ""]);
        assert!(cli.validate().is_err());

        let cli = Cli::parse_from(["tmt", "stream", "-n", "3"]);
        assert!(cli.validate().is_ok());
    }

    #[test]
    fn test_duration_parsing() {
        assert_eq!(parse_duration("1").unwrap(), 1);
        assert_eq!(parse_duration("300").unwrap(), 300);
        assert!(parse_duration("0").is_err());
        assert!(parse_duration("301").is_err());
        assert!(parse_duration("abc").is_err());
        assert!(parse_duration("+10").is_err());
        assert!(parse_duration("0x10").is_err());
        assert!(parse_duration("-5").is_err());
    }

    #[test]
    fn test_color_support_detection() {
        std::env::set_var("NO_COLOR", "1");
        assert!(!supports_color());
        std::env::remove_var("NO_COLOR");
    }
}
