//! Error type shared by the transport, the drivers and the CLI

use colored::{ColoredString, Colorize};
use std::io::ErrorKind;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    /// Connect refused, address unavailable and similar socket failures
    #[error("Network error: {0}")]
    Network(String),

    /// Malformed or unexpected frames
    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Timeout error: {0}")]
    Timeout(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Parsing error: {0}")]
    Parse(String),

    /// Pre-shared key rejected or missing
    #[error("Authentication error: {0}")]
    Auth(String),

    /// The peer closed or reset the connection
    #[error("Disconnected: {0}")]
    Disconnected(String),

    /// A run finished with failed operations
    #[error("Test execution error: {0}")]
    TestExecution(String),

    #[error("Statistics error: {0}")]
    Statistics(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

macro_rules! constructors {
    ($($name:ident => $variant:ident),* $(,)?) => {
        impl AppError {
            $(
                pub fn $name<S: Into<String>>(message: S) -> Self {
                    Self::$variant(message.into())
                }
            )*
        }
    };
}

constructors! {
    config => Config,
    network => Network,
    protocol => Protocol,
    timeout => Timeout,
    validation => Validation,
    io => Io,
    parse => Parse,
    auth => Auth,
    disconnected => Disconnected,
    test_execution => TestExecution,
    statistics => Statistics,
    internal => Internal,
}

impl AppError {
    /// Message without the variant prefix
    pub fn detail(&self) -> &str {
        match self {
            Self::Config(m)
            | Self::Network(m)
            | Self::Protocol(m)
            | Self::Timeout(m)
            | Self::Validation(m)
            | Self::Io(m)
            | Self::Parse(m)
            | Self::Auth(m)
            | Self::Disconnected(m)
            | Self::TestExecution(m)
            | Self::Statistics(m)
            | Self::Internal(m) => m,
        }
    }

    /// Same variant, different message
    fn with_detail(&self, detail: String) -> Self {
        match self {
            Self::Config(_) => Self::Config(detail),
            Self::Network(_) => Self::Network(detail),
            Self::Protocol(_) => Self::Protocol(detail),
            Self::Timeout(_) => Self::Timeout(detail),
            Self::Validation(_) => Self::Validation(detail),
            Self::Io(_) => Self::Io(detail),
            Self::Parse(_) => Self::Parse(detail),
            Self::Auth(_) => Self::Auth(detail),
            Self::Disconnected(_) => Self::Disconnected(detail),
            Self::TestExecution(_) => Self::TestExecution(detail),
            Self::Statistics(_) => Self::Statistics(detail),
            Self::Internal(_) => Self::Internal(detail),
        }
    }

    /// Short tag used in logs and console output
    pub fn category(&self) -> &'static str {
        match self {
            Self::Config(_) => "CONFIG",
            Self::Network(_) => "NETWORK",
            Self::Protocol(_) => "PROTOCOL",
            Self::Timeout(_) => "TIMEOUT",
            Self::Validation(_) => "VALIDATION",
            Self::Io(_) => "IO",
            Self::Parse(_) => "PARSE",
            Self::Auth(_) => "AUTH",
            Self::Disconnected(_) => "DISCONNECTED",
            Self::TestExecution(_) => "TEST",
            Self::Statistics(_) => "STATS",
            Self::Internal(_) => "INTERNAL",
        }
    }

    /// Whether retrying the connection can help
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Timeout(_) | Self::Disconnected(_))
    }

    pub fn suggestion(&self) -> &'static str {
        match self {
            Self::Config(_) => "Check your .env file, TMT_* variables and command line arguments.",
            Self::Network(_) => {
                "Make sure a server is listening on the endpoint, or drop --remote to use the embedded server."
            }
            Self::Protocol(_) => "Both peers must speak the same framing. Check that the endpoint is a tmt server.",
            Self::Timeout(_) => "Increase --timeout or reduce the message count.",
            Self::Validation(_) => "Check the endpoint format and the size and count arguments.",
            Self::Io(_) => "Check file permissions and socket limits (ulimit -n).",
            Self::Parse(_) => "Check the format of the value or configuration file.",
            Self::Auth(_) => "Client and server must use the same --psk value.",
            Self::Disconnected(_) => "The server may have removed this client or shut down.",
            Self::TestExecution(_) => "Rerun with --verbose to see which operations failed.",
            Self::Statistics(_) => "The run produced no usable measurements.",
            Self::Internal(_) => "This is likely a bug. Please report it with the command line used.",
        }
    }

    pub fn user_friendly_message(&self) -> String {
        format!("{}\n\nSuggestion: {}", self, self.suggestion())
    }

    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) | Self::Validation(_) | Self::Parse(_) => 1,
            Self::Network(_) | Self::Protocol(_) | Self::Disconnected(_) => 2,
            Self::Timeout(_) => 3,
            Self::Auth(_) => 4,
            Self::Io(_) => 5,
            Self::TestExecution(_) | Self::Statistics(_) => 6,
            Self::Internal(_) => 99,
        }
    }

    fn paint(&self, text: &str) -> ColoredString {
        match self {
            Self::Config(_) | Self::Validation(_) | Self::Parse(_) => text.red(),
            Self::Network(_) | Self::Protocol(_) | Self::Disconnected(_) => text.yellow(),
            Self::Timeout(_) => text.blue(),
            Self::Auth(_) => text.magenta(),
            Self::Io(_) | Self::TestExecution(_) | Self::Statistics(_) => text.cyan(),
            Self::Internal(_) => text.bright_red(),
        }
    }

    /// `[CATEGORY] message`, colored by category when asked
    pub fn format_for_console(&self, use_color: bool) -> String {
        let message = self.to_string();
        if use_color {
            format!("[{}] {}", self.paint(self.category()).bold(), self.paint(&message))
        } else {
            format!("[{}] {}", self.category(), message)
        }
    }
}

// Split by kind so the reconnect loop can tell a refused connection from a
// reset one
impl From<std::io::Error> for AppError {
    fn from(error: std::io::Error) -> Self {
        let message = error.to_string();
        match error.kind() {
            ErrorKind::TimedOut | ErrorKind::WouldBlock => Self::Timeout(message),
            ErrorKind::ConnectionRefused
            | ErrorKind::ConnectionAborted
            | ErrorKind::AddrNotAvailable
            | ErrorKind::AddrInUse
            | ErrorKind::NotConnected => Self::Network(message),
            ErrorKind::ConnectionReset | ErrorKind::BrokenPipe | ErrorKind::UnexpectedEof => {
                Self::Disconnected(message)
            }
            _ => Self::Io(message),
        }
    }
}

impl From<tokio::time::error::Elapsed> for AppError {
    fn from(error: tokio::time::error::Elapsed) -> Self {
        Self::Timeout(error.to_string())
    }
}

impl From<tokio::task::JoinError> for AppError {
    fn from(error: tokio::task::JoinError) -> Self {
        Self::Internal(format!("Task failed: {}", error))
    }
}

impl From<url::ParseError> for AppError {
    fn from(error: url::ParseError) -> Self {
        Self::Parse(format!("URL parse error: {}", error))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(error: serde_json::Error) -> Self {
        Self::Parse(format!("JSON parse error: {}", error))
    }
}

impl From<dotenv::Error> for AppError {
    fn from(error: dotenv::Error) -> Self {
        Self::Config(format!("Environment file error: {}", error))
    }
}

impl From<std::num::ParseIntError> for AppError {
    fn from(error: std::num::ParseIntError) -> Self {
        Self::Parse(format!("Integer parse error: {}", error))
    }
}

impl From<std::net::AddrParseError> for AppError {
    fn from(error: std::net::AddrParseError) -> Self {
        Self::Parse(format!("Socket address parse error: {}", error))
    }
}

impl From<anyhow::Error> for AppError {
    fn from(error: anyhow::Error) -> Self {
        Self::Internal(format!("{:#}", error))
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

/// Prefix an error with what was being attempted. The variant, and so the
/// exit code, is kept.
pub trait ErrorContext<T> {
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;

    fn context(self, message: &'static str) -> Result<T>;
}

impl<T, E> ErrorContext<T> for std::result::Result<T, E>
where
    E: Into<AppError>,
{
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| {
            let error = e.into();
            error.with_detail(format!("{}: {}", f(), error.detail()))
        })
    }

    fn context(self, message: &'static str) -> Result<T> {
        self.with_context(|| message.to_string())
    }
}

/// Detailed error output for `--verbose` runs
pub struct ErrorReporter {
    pub use_color: bool,
    pub verbose: bool,
}

impl ErrorReporter {
    pub fn new(use_color: bool, verbose: bool) -> Self {
        Self { use_color, verbose }
    }

    pub fn report_error(&self, error: &AppError) {
        eprintln!("{}", error.format_for_console(self.use_color));
        if !self.verbose {
            return;
        }

        eprintln!();
        eprintln!("{}", error.user_friendly_message());
        if error.is_recoverable() {
            let hint = "This error might be temporary. You can try running the command again.";
            eprintln!();
            if self.use_color {
                eprintln!("{}", hint.green());
            } else {
                eprintln!("{}", hint);
            }
        }
    }
}

impl Default for ErrorReporter {
    fn default() -> Self {
        Self::new(true, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categories_and_exit_codes() {
        let cases = [
            (AppError::config("x"), "CONFIG", 1),
            (AppError::network("x"), "NETWORK", 2),
            (AppError::protocol("x"), "PROTOCOL", 2),
            (AppError::timeout("x"), "TIMEOUT", 3),
            (AppError::validation("x"), "VALIDATION", 1),
            (AppError::io("x"), "IO", 5),
            (AppError::parse("x"), "PARSE", 1),
            (AppError::auth("x"), "AUTH", 4),
            (AppError::disconnected("x"), "DISCONNECTED", 2),
            (AppError::test_execution("x"), "TEST", 6),
            (AppError::statistics("x"), "STATS", 6),
            (AppError::internal("x"), "INTERNAL", 99),
        ];
        for (error, category, code) in cases {
            assert_eq!(error.category(), category);
            assert_eq!(error.exit_code(), code, "{}", category);
            assert_eq!(error.detail(), "x");
        }
    }

    #[test]
    fn test_only_connection_errors_are_recoverable() {
        assert!(AppError::network("refused").is_recoverable());
        assert!(AppError::timeout("slow").is_recoverable());
        assert!(AppError::disconnected("reset").is_recoverable());
        assert!(!AppError::auth("wrong key").is_recoverable());
        assert!(!AppError::protocol("bad header").is_recoverable());
    }

    #[test]
    fn test_io_error_kinds_are_classified() {
        let classify = |kind| AppError::from(std::io::Error::new(kind, "boom")).category();
        assert_eq!(classify(ErrorKind::ConnectionRefused), "NETWORK");
        assert_eq!(classify(ErrorKind::ConnectionReset), "DISCONNECTED");
        assert_eq!(classify(ErrorKind::UnexpectedEof), "DISCONNECTED");
        assert_eq!(classify(ErrorKind::TimedOut), "TIMEOUT");
        assert_eq!(classify(ErrorKind::NotFound), "IO");
    }

    #[tokio::test]
    async fn test_elapsed_conversion() {
        let elapsed = tokio::time::timeout(std::time::Duration::from_millis(1), std::future::pending::<()>())
            .await
            .unwrap_err();
        assert_eq!(AppError::from(elapsed).category(), "TIMEOUT");
    }

    #[test]
    fn test_parse_conversions() {
        let error: AppError = "nope".parse::<std::net::SocketAddr>().unwrap_err().into();
        assert!(error.to_string().contains("Socket address parse error"));

        let error: AppError = serde_json::from_str::<serde_json::Value>("{").unwrap_err().into();
        assert!(error.to_string().contains("JSON parse error"));

        let error: AppError = anyhow::anyhow!("outer").context("wrapped").into();
        assert_eq!(error.category(), "INTERNAL");
        assert!(error.detail().contains("wrapped"));
    }

    #[test]
    fn test_context_keeps_variant() {
        let result: Result<()> = Err(AppError::network("Connection refused"));
        let error = result.context("Connecting to 127.0.0.1:9000").unwrap_err();
        assert_eq!(error.category(), "NETWORK");
        assert_eq!(error.detail(), "Connecting to 127.0.0.1:9000: Connection refused");

        let io: std::result::Result<(), std::io::Error> =
            Err(std::io::Error::new(ErrorKind::PermissionDenied, "denied"));
        let error = io.with_context(|| "Writing out.env".to_string()).unwrap_err();
        assert_eq!(error.exit_code(), 5);
        assert!(error.to_string().starts_with("I/O error: Writing out.env: "));
    }

    #[test]
    fn test_console_formatting() {
        let error = AppError::auth("key mismatch");
        assert_eq!(error.format_for_console(false), "[AUTH] Authentication error: key mismatch");
        assert!(error.format_for_console(true).contains("key mismatch"));

        let message = error.user_friendly_message();
        assert!(message.starts_with("Authentication error: key mismatch"));
        assert!(message.contains("--psk"));
    }
}
