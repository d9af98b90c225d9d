//! Environment variable handling and .env file management

use crate::error::{AppError, ErrorContext, Result};
use crate::types::Endpoint;
use std::path::Path;

/// Environment variable configuration manager
pub struct EnvManager;

impl EnvManager {
    /// Load a specific env file if it exists. Variables already set in the
    /// environment keep their value.
    pub fn load_env_file_from(path: &Path, debug: bool) -> Result<()> {
        if path.exists() {
            dotenv::from_path(path).with_context(|| format!("Failed to load {}", path.display()))?;
            if debug {
                eprintln!("Loaded configuration from {}", path.display());
            }
        } else if debug {
            eprintln!("No {} file found, using defaults and CLI arguments", path.display());
        }
        Ok(())
    }

    /// Create example .env file content
    pub fn create_example_env_content() -> String {
        r#"# TCP Messaging Tester Configuration
#
# Values here are defaults for every tmt subcommand. Environment variables
# override this file and command-line flags override both.

# Server endpoint (host:port or tcp://host:port)
# TMT_ENDPOINT=127.0.0.1:9000

# Messages per throughput or sync run (1-10000000)
# TMT_MESSAGE_COUNT=1000

# Payload size in bytes (up to 64 MiB)
# TMT_MESSAGE_SIZE=1024

# Concurrent throughput clients (1-256)
# TMT_CLIENTS=1

# Partial stream repetitions (1-10000)
# TMT_ITERATIONS=5

# Reconnect cycles, 0 runs until Ctrl-C
# TMT_RECONNECT_CYCLES=10
# TMT_RECONNECT_MIN_DELAY_MS=100
# TMT_RECONNECT_MAX_DELAY_MS=1000

# Partial stream: bytes declared and the size of the source buffer
# TMT_STREAM_CONTENT_LENGTH=65536
# TMT_STREAM_SOURCE_SIZE=131072

# Connect, sync and drain timeout in seconds (1-300)
# TMT_TIMEOUT_SECONDS=10

# Pre-shared key; both sides must use the same value
# TMT_PRESHARED_KEY=change-me

# Server only: idle timeout (0 disables), connection limit, report period
# TMT_IDLE_TIMEOUT_SECONDS=0
# TMT_MAX_CONNECTIONS=4096
# TMT_STATS_INTERVAL_SECONDS=5

# TCP keep-alive probes (true/false)
# TMT_KEEPALIVE=false

# Enable colored output (true/false)
# TMT_ENABLE_COLOR=true
"#
        .to_string()
    }

    /// Save example .env file to disk
    pub fn save_example_env_file(path: &Path) -> Result<()> {
        std::fs::write(path, Self::create_example_env_content())
            .with_context(|| format!("Failed to write {}", path.display()))
    }

    /// Validate environment variable format before parsing
    pub fn validate_env_var(key: &str, value: &str) -> Result<()> {
        let value = value.trim();
        match key {
            "TMT_ENDPOINT" => {
                Endpoint::parse(value)
                    .map_err(|e| AppError::config(format!("Invalid TMT_ENDPOINT value '{}': {}", value, e)))?;
            }
            "TMT_MESSAGE_COUNT" => check_range(key, value, 1, 10_000_000)?,
            "TMT_MESSAGE_SIZE" => check_range(key, value, 0, crate::models::config::MAX_MESSAGE_SIZE as u64)?,
            "TMT_CLIENTS" => check_range(key, value, 1, 256)?,
            "TMT_ITERATIONS" => check_range(key, value, 1, 10_000)?,
            "TMT_RECONNECT_CYCLES" | "TMT_IDLE_TIMEOUT_SECONDS" | "TMT_STREAM_CONTENT_LENGTH" => {
                check_range(key, value, 0, u64::MAX)?
            }
            "TMT_RECONNECT_MIN_DELAY_MS" | "TMT_RECONNECT_MAX_DELAY_MS" => check_range(key, value, 0, 600_000)?,
            "TMT_STREAM_SOURCE_SIZE" => check_range(key, value, 0, crate::models::config::MAX_STREAM_SOURCE_SIZE)?,
            "TMT_TIMEOUT_SECONDS" => check_range(key, value, 1, 300)?,
            "TMT_MAX_CONNECTIONS" | "TMT_STATS_INTERVAL_SECONDS" => check_range(key, value, 1, u64::MAX)?,
            "TMT_PRESHARED_KEY" => {
                if value.is_empty() {
                    return Err(AppError::config("TMT_PRESHARED_KEY cannot be empty"));
                }
            }
            "TMT_KEEPALIVE" | "TMT_ENABLE_COLOR" => {
                value
                    .parse::<bool>()
                    .map_err(|e| AppError::config(format!("Invalid {} value '{}': {}", key, value, e)))?;
            }
            _ => {}
        }
        Ok(())
    }

    /// Get list of all supported environment variables with descriptions
    pub fn get_supported_env_vars() -> Vec<(&'static str, &'static str, &'static str)> {
        vec![
            ("TMT_ENDPOINT", "Server endpoint", "127.0.0.1:9000"),
            ("TMT_MESSAGE_COUNT", "Messages per throughput or sync run", "1000"),
            ("TMT_MESSAGE_SIZE", "Payload size in bytes", "1024"),
            ("TMT_CLIENTS", "Concurrent throughput clients (1-256)", "4"),
            ("TMT_ITERATIONS", "Partial stream repetitions", "5"),
            ("TMT_RECONNECT_CYCLES", "Reconnect cycles, 0 = until Ctrl-C", "0"),
            ("TMT_RECONNECT_MIN_DELAY_MS", "Minimum reconnect delay", "100"),
            ("TMT_RECONNECT_MAX_DELAY_MS", "Maximum reconnect delay", "1000"),
            ("TMT_STREAM_CONTENT_LENGTH", "Bytes declared per partial stream", "65536"),
            ("TMT_STREAM_SOURCE_SIZE", "Partial stream source size", "131072"),
            ("TMT_TIMEOUT_SECONDS", "Connect, sync and drain timeout (1-300)", "10"),
            ("TMT_PRESHARED_KEY", "Pre-shared authentication key", "change-me"),
            ("TMT_IDLE_TIMEOUT_SECONDS", "Server idle timeout, 0 disables", "60"),
            ("TMT_MAX_CONNECTIONS", "Server connection limit", "4096"),
            ("TMT_STATS_INTERVAL_SECONDS", "Server report period", "5"),
            ("TMT_KEEPALIVE", "Enable TCP keep-alive", "true"),
            ("TMT_ENABLE_COLOR", "Enable colored output", "true"),
        ]
    }

    /// Display environment variable help
    pub fn display_env_help() -> String {
        let mut help = String::new();
        help.push_str("Supported Environment Variables:\n\n");

        for (var, description, example) in Self::get_supported_env_vars() {
            help.push_str(&format!("  {:<28} {}\n", var, description));
            help.push_str(&format!("  {:<28} Example: {}\n\n", "", example));
        }

        help.push_str("Configuration Priority (highest to lowest):\n");
        help.push_str("  1. Command-line arguments\n");
        help.push_str("  2. Environment variables\n");
        help.push_str("  3. .env file values\n");
        help.push_str("  4. Default values\n");
        help
    }

    /// Validate all currently set environment variables
    pub fn validate_current_env() -> Vec<String> {
        Self::get_supported_env_vars()
            .into_iter()
            .filter_map(|(name, _, _)| {
                let value = std::env::var(name).ok()?;
                Self::validate_env_var(name, &value).err().map(|e| format!("Warning: {}", e))
            })
            .collect()
    }

    /// Check an env file and return one warning per invalid line;
    /// `None` when the file does not exist
    pub fn check_env_file(path: &Path) -> Result<Option<Vec<String>>> {
        if !path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;

        let warnings = content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .filter_map(|line| {
                let (key, value) = line.split_once('=')?;
                Self::validate_env_var(key.trim(), value)
                    .err()
                    .map(|e| format!("Line '{}': {}", line, e))
            })
            .collect();
        Ok(Some(warnings))
    }
}

fn check_range(key: &str, value: &str, min: u64, max: u64) -> Result<()> {
    let parsed: u64 = value
        .parse()
        .map_err(|e| AppError::config(format!("Invalid {} value '{}': {}", key, value, e)))?;
    if parsed < min || parsed > max {
        return Err(AppError::config(format!(
            "{} must be between {} and {}, got: {}",
            key, min, max, parsed
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_example_content_lists_every_variable() {
        let content = EnvManager::create_example_env_content();
        for (name, _, _) in EnvManager::get_supported_env_vars() {
            assert!(content.contains(&format!("{}=", name)), "missing {}", name);
        }
    }

    #[test]
    fn test_save_example_file() {
        let temp_file = NamedTempFile::new().unwrap();
        EnvManager::save_example_env_file(temp_file.path()).unwrap();

        let content = std::fs::read_to_string(temp_file.path()).unwrap();
        assert!(content.contains("TCP Messaging Tester Configuration"));
    }

    #[test]
    fn test_validate_env_var() {
        assert!(EnvManager::validate_env_var("TMT_ENDPOINT", "tcp://localhost:9000").is_ok());
        assert!(EnvManager::validate_env_var("TMT_MESSAGE_COUNT", "5").is_ok());
        assert!(EnvManager::validate_env_var("TMT_CLIENTS", "256").is_ok());
        assert!(EnvManager::validate_env_var("TMT_RECONNECT_CYCLES", "0").is_ok());
        assert!(EnvManager::validate_env_var("TMT_KEEPALIVE", "true").is_ok());
        assert!(EnvManager::validate_env_var("UNRELATED", "whatever").is_ok());

        assert!(EnvManager::validate_env_var("TMT_ENDPOINT", "no-port").is_err());
        assert!(EnvManager::validate_env_var("TMT_MESSAGE_COUNT", "0").is_err());
        assert!(EnvManager::validate_env_var("TMT_CLIENTS", "257").is_err());
        assert!(EnvManager::validate_env_var("TMT_TIMEOUT_SECONDS", "301").is_err());
        assert!(EnvManager::validate_env_var("TMT_PRESHARED_KEY", "  ").is_err());
        assert!(EnvManager::validate_env_var("TMT_ENABLE_COLOR", "maybe").is_err());
    }

    #[test]
    fn test_check_env_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "# comment").unwrap();
        writeln!(file, "TMT_MESSAGE_COUNT=10").unwrap();
        writeln!(file, "TMT_CLIENTS=0").unwrap();
        file.flush().unwrap();

        let warnings = EnvManager::check_env_file(file.path()).unwrap().unwrap();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("TMT_CLIENTS"));

        assert!(EnvManager::check_env_file(Path::new("/nonexistent/.env")).unwrap().is_none());
    }

    #[test]
    fn test_display_env_help() {
        let help = EnvManager::display_env_help();
        assert!(help.contains("Supported Environment Variables:"));
        assert!(help.contains("TMT_PRESHARED_KEY"));
        assert!(help.contains("Configuration Priority"));
    }
}
