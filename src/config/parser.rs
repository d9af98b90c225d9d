//! Configuration parsing from CLI arguments and environment variables

use crate::{cli::Cli, config::env::EnvManager, error::Result, models::Config};
use std::path::PathBuf;

/// Configuration parser that combines CLI arguments with environment variables
pub struct ConfigParser {
    cli: Cli,
    env_file: PathBuf,
}

impl ConfigParser {
    pub fn new(cli: Cli) -> Self {
        Self {
            cli,
            env_file: PathBuf::from(".env"),
        }
    }

    /// Read defaults from a different env file
    pub fn with_env_file<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.env_file = path.into();
        self
    }

    /// Parse and build the complete configuration:
    /// defaults, then `.env`, then `TMT_*` variables, then CLI flags
    pub fn parse(&self) -> Result<Config> {
        let mut config = Config::default();

        EnvManager::load_env_file_from(&self.env_file, self.cli.debug)?;
        config.merge_from_env()?;
        self.cli.apply_to(&mut config);

        config.validate()?;

        if config.debug {
            eprintln!("{}", display_config_summary(&config));
        }
        Ok(config)
    }
}

/// Convenience function to load complete configuration from CLI arguments
pub fn load_config(cli: Cli) -> Result<Config> {
    ConfigParser::new(cli).parse()
}

/// Display configuration summary for debug purposes
pub fn display_config_summary(config: &Config) -> String {
    let summary = [
        format!("Endpoint: {}", config.endpoint),
        format!("Embedded server: {}", !config.remote),
        format!("Messages: {} x {} bytes over {} client(s)", config.message_count, config.message_size, config.clients),
        format!(
            "Reconnect: {} cycle(s), {}-{}ms delay",
            config.reconnect_cycles, config.reconnect_min_delay_ms, config.reconnect_max_delay_ms
        ),
        format!(
            "Stream: {} of {} bytes, {} iteration(s)",
            config.stream_content_length, config.stream_source_size, config.iterations
        ),
        format!("Timeout: {}s", config.timeout_seconds),
        format!("Pre-shared key: {}", if config.preshared_key.is_some() { "set" } else { "none" }),
        format!("Keep-alive: {}", config.keepalive),
        format!("Color Output: {}", config.enable_color),
        format!("Verbose: {}", config.verbose),
        format!("Debug: {}", config.debug),
    ];
    summary.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::env;
    use std::io::Write;
    use std::sync::Mutex;
    use tempfile::NamedTempFile;

    // Tests below touch process-wide environment variables
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn missing_env_file() -> PathBuf {
        PathBuf::from("/nonexistent/tmt-test.env")
    }

    #[test]
    fn test_cli_overrides() {
        let _guard = ENV_LOCK.lock().unwrap();
        env::remove_var("TMT_MESSAGE_COUNT");

        let cli = Cli::parse_from(["tmt", "throughput", "--count", "10", "--timeout", "5", "--no-color", "--verbose"]);
        let config = ConfigParser::new(cli).with_env_file(missing_env_file()).parse().unwrap();

        assert_eq!(config.message_count, 10);
        assert_eq!(config.timeout_seconds, 5);
        assert!(!config.enable_color);
        assert!(config.verbose);
    }

    #[test]
    fn test_cli_overrides_env_vars() {
        let _guard = ENV_LOCK.lock().unwrap();
        env::set_var("TMT_MESSAGE_COUNT", "8");
        env::set_var("TMT_MESSAGE_SIZE", "16");

        let cli = Cli::parse_from(["tmt", "sync", "--count", "12"]);
        let config = ConfigParser::new(cli).with_env_file(missing_env_file()).parse().unwrap();

        assert_eq!(config.message_count, 12);
        assert_eq!(config.message_size, 16);

        env::remove_var("TMT_MESSAGE_COUNT");
        env::remove_var("TMT_MESSAGE_SIZE");
    }

    #[test]
    fn test_env_file_supplies_defaults() {
        let _guard = ENV_LOCK.lock().unwrap();
        env::remove_var("TMT_ITERATIONS");

        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "TMT_ITERATIONS=7").unwrap();
        file.flush().unwrap();

        let cli = Cli::parse_from(["tmt", "stream"]);
        let config = ConfigParser::new(cli).with_env_file(file.path()).parse().unwrap();
        assert_eq!(config.iterations, 7);

        env::remove_var("TMT_ITERATIONS");
    }

    #[test]
    fn test_invalid_combination_is_rejected() {
        let _guard = ENV_LOCK.lock().unwrap();
        let cli = Cli::parse_from(["tmt", "stream", "--content-length", "10", "--source-size", "5"]);
        assert!(ConfigParser::new(cli).with_env_file(missing_env_file()).parse().is_err());
    }

    #[test]
    fn test_config_summary() {
        let summary = display_config_summary(&Config::default());
        assert!(summary.contains("Endpoint: 127.0.0.1:9000"));
        assert!(summary.contains("Pre-shared key: none"));
        assert!(summary.contains("Timeout: 10s"));
    }
}
