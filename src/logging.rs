//! Structured logging for the messaging engine and the test drivers
//!
//! Entries carry a level, the emitting component, optional correlation id
//! and a sorted set of fields. They are rendered in one of three formats
//! and always written to stderr, leaving stdout to the reports.

use crate::error::{AppError, Result};
use crate::models::{Config, OperationMetrics, ScenarioResult};
use chrono::{DateTime, Utc};
use colored::{ColoredString, Colorize};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::io::Write;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    /// Per-frame traffic
    Trace,
    Debug,
    /// Connection-state changes and scenario summaries
    Info,
    Warn,
    Error,
}

impl LogLevel {
    fn label(self) -> &'static str {
        match self {
            LogLevel::Trace => "TRACE",
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
        }
    }

    fn paint(self, text: &str) -> ColoredString {
        match self {
            LogLevel::Trace => text.dimmed(),
            LogLevel::Debug => text.cyan(),
            LogLevel::Info => text.green(),
            LogLevel::Warn => text.yellow(),
            LogLevel::Error => text.red().bold(),
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl std::str::FromStr for LogLevel {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            other => Err(AppError::parse(format!("Invalid log level: {}", other))),
        }
    }
}

/// One structured log record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub component: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    /// `file:line` of the call site, set by the `log_*!` macros
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub fields: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Timestamped, aligned, optionally colored
    Console,
    /// One JSON object per line
    Json,
    /// Time, level initial, component and message only
    Compact,
}

#[derive(Debug, Default)]
struct Scope {
    session_id: Option<String>,
    operation_id: Option<String>,
}

/// Cheap to clone. Clones share the session and the current operation, so
/// one logger can be handed to every connection task.
#[derive(Clone)]
pub struct Logger {
    component: String,
    min_level: LogLevel,
    format: LogFormat,
    use_color: bool,
    show_source: bool,
    scope: Arc<RwLock<Scope>>,
}

impl Logger {
    pub fn new(component: String) -> Self {
        Self {
            component,
            min_level: LogLevel::Info,
            format: LogFormat::Console,
            use_color: true,
            show_source: false,
            scope: Arc::new(RwLock::new(Scope::default())),
        }
    }

    /// Console logger at a fixed level, the default for transport settings
    pub fn with_level(component: String, min_level: LogLevel, use_color: bool) -> Self {
        Self {
            min_level,
            use_color,
            ..Self::new(component)
        }
    }

    /// `--debug` logs JSON with call sites, `--verbose` the console format,
    /// everything else the compact one
    pub fn with_config(component: String, config: &Config) -> Self {
        let format = match (config.debug, config.verbose) {
            (true, _) => LogFormat::Json,
            (false, true) => LogFormat::Console,
            (false, false) => LogFormat::Compact,
        };
        Self {
            min_level: config.log_level(),
            format,
            use_color: config.enable_color,
            show_source: config.debug,
            ..Self::new(component)
        }
    }

    pub fn name(&self) -> &str {
        &self.component
    }

    pub async fn set_session_id(&self, session_id: String) {
        self.scope.write().await.session_id = Some(session_id);
    }

    /// Open an operation; entries logged until [`end_operation`](Self::end_operation)
    /// inherit its correlation id
    pub async fn start_operation(&self, operation: &str) -> String {
        let id = Uuid::new_v4().to_string();
        self.scope.write().await.operation_id = Some(id.clone());
        self.info(&format!("{} started", operation))
            .correlation_id(&id)
            .field("operation", operation)
            .log()
            .await;
        id
    }

    pub async fn end_operation(&self, correlation_id: &str, operation: &str, success: bool) {
        self.info(&format!("{} finished", operation))
            .correlation_id(correlation_id)
            .field("operation", operation)
            .field("success", success)
            .log()
            .await;

        let mut scope = self.scope.write().await;
        if scope.operation_id.as_deref() == Some(correlation_id) {
            scope.operation_id = None;
        }
    }

    pub fn log(&self, level: LogLevel, message: &str) -> EntryBuilder<'_> {
        EntryBuilder {
            logger: self,
            entry: LogEntry {
                timestamp: Utc::now(),
                level,
                component: self.component.clone(),
                message: message.to_string(),
                session_id: None,
                correlation_id: None,
                source: None,
                fields: BTreeMap::new(),
            },
        }
    }

    pub fn trace(&self, message: &str) -> EntryBuilder<'_> {
        self.log(LogLevel::Trace, message)
    }

    pub fn debug(&self, message: &str) -> EntryBuilder<'_> {
        self.log(LogLevel::Debug, message)
    }

    pub fn info(&self, message: &str) -> EntryBuilder<'_> {
        self.log(LogLevel::Info, message)
    }

    pub fn warn(&self, message: &str) -> EntryBuilder<'_> {
        self.log(LogLevel::Warn, message)
    }

    pub fn error(&self, message: &str) -> EntryBuilder<'_> {
        self.log(LogLevel::Error, message)
    }

    pub fn would_log(&self, level: LogLevel) -> bool {
        level >= self.min_level
    }

    async fn emit(&self, mut entry: LogEntry) {
        if !self.would_log(entry.level) {
            return;
        }
        {
            let scope = self.scope.read().await;
            entry.session_id = scope.session_id.clone();
            if entry.correlation_id.is_none() {
                entry.correlation_id = scope.operation_id.clone();
            }
        }

        let line = self.render(&entry);
        let _ = writeln!(std::io::stderr().lock(), "{}", line);
    }

    fn render(&self, entry: &LogEntry) -> String {
        match self.format {
            LogFormat::Console => render_console(entry, self.use_color, self.show_source),
            LogFormat::Json => render_json(entry),
            LogFormat::Compact => render_compact(entry),
        }
    }
}

fn render_console(entry: &LogEntry, use_color: bool, show_source: bool) -> String {
    let label = format!("{:>5}", entry.level.label());
    let level = if use_color {
        entry.level.paint(&label).to_string()
    } else {
        label
    };

    let mut line = format!(
        "{} {} [{}] {}",
        entry.timestamp.format("%Y-%m-%d %H:%M:%S%.3f"),
        level,
        entry.component,
        entry.message
    );
    if let Some(id) = &entry.correlation_id {
        let short: String = id.chars().take(8).collect();
        line.push_str(&format!(" [{}]", short));
    }
    if !entry.fields.is_empty() {
        let fields: Vec<String> = entry.fields.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
        line.push_str(&format!(" {{{}}}", fields.join(", ")));
    }
    if let (true, Some(source)) = (show_source, &entry.source) {
        line.push_str(&format!(" @ {}", source));
    }
    line
}

fn render_json(entry: &LogEntry) -> String {
    serde_json::to_string(entry)
        .unwrap_or_else(|e| format!("{{\"level\":\"ERROR\",\"message\":\"unserializable log entry: {}\"}}", e))
}

fn render_compact(entry: &LogEntry) -> String {
    format!(
        "{} {} {}: {}",
        entry.timestamp.format("%H:%M:%S"),
        &entry.level.label()[..1],
        entry.component,
        entry.message
    )
}

/// An entry being assembled; nothing is written until [`log`](Self::log)
pub struct EntryBuilder<'a> {
    logger: &'a Logger,
    entry: LogEntry,
}

impl EntryBuilder<'_> {
    pub fn correlation_id(mut self, id: &str) -> Self {
        self.entry.correlation_id = Some(id.to_string());
        self
    }

    /// Values that fail to serialize are skipped
    pub fn field<T: Serialize>(mut self, key: &str, value: T) -> Self {
        if let Ok(value) = serde_json::to_value(value) {
            self.entry.fields.insert(key.to_string(), value);
        }
        self
    }

    pub fn source(mut self, file: &str, line: u32) -> Self {
        self.entry.source = Some(format!("{}:{}", file, line));
        self
    }

    /// Duration, byte count and outcome of one measured operation
    pub fn operation(self, metrics: &OperationMetrics) -> Self {
        self.field("duration_ms", metrics.duration_ms())
            .field("bytes", metrics.bytes)
            .field("status", metrics.status)
    }

    pub fn error_info(self, error: &AppError) -> Self {
        self.field("error", error.to_string())
            .field("error_category", error.category())
            .field("recoverable", error.is_recoverable())
    }

    pub async fn log(self) {
        self.logger.emit(self.entry).await;
    }
}

/// Wall-clock timing of whole scenarios
pub struct PerformanceLogger {
    logger: Logger,
    running: HashMap<String, Instant>,
}

impl PerformanceLogger {
    pub fn new(config: &Config) -> Self {
        Self {
            logger: Logger::with_config("PERF".to_string(), config),
            running: HashMap::new(),
        }
    }

    pub async fn start_timing(&mut self, operation: &str) {
        self.running.insert(operation.to_string(), Instant::now());
        self.logger
            .debug(&format!("Timing {}", operation))
            .field("operation", operation)
            .log()
            .await;
    }

    /// `None` if `operation` was never started
    pub async fn end_timing(&mut self, operation: &str) -> Option<Duration> {
        let Some(started) = self.running.remove(operation) else {
            self.logger
                .warn(&format!("No timing in progress for {}", operation))
                .log()
                .await;
            return None;
        };

        let elapsed = started.elapsed();
        self.logger
            .info(&format!("{} took {:.1}ms", operation, elapsed.as_secs_f64() * 1000.0))
            .field("operation", operation)
            .field("elapsed_ms", elapsed.as_secs_f64() * 1000.0)
            .log()
            .await;
        Some(elapsed)
    }

    /// Failed operations at debug level, then one summary entry
    pub async fn log_scenario_result(&self, result: &ScenarioResult) {
        let failures = result
            .individual_results
            .iter()
            .enumerate()
            .filter(|(_, op)| !op.is_successful());
        for (index, op) in failures {
            self.logger
                .debug(&format!("{} operation #{} failed", result.scenario, index + 1))
                .field("error", &op.error_message)
                .operation(op)
                .log()
                .await;
        }

        let mut summary = self
            .logger
            .info(&format!(
                "{} against {}: {}/{} operations succeeded",
                result.scenario, result.endpoint, result.success_count, result.total_count
            ))
            .field("scenario", &result.scenario)
            .field("bytes_sent", result.bytes_sent)
            .field("elapsed_ms", result.elapsed.as_secs_f64() * 1000.0);
        if let Some(stats) = &result.statistics {
            summary = summary
                .field("avg_ms", stats.avg_ms)
                .field("p99_ms", stats.p99_ms)
                .field("messages_per_sec", stats.messages_per_sec);
        }
        summary.log().await;
    }
}

/// Connection-state events for clients and servers
#[derive(Clone)]
pub struct NetworkLogger {
    logger: Logger,
}

impl NetworkLogger {
    pub fn from_logger(logger: Logger) -> Self {
        Self { logger }
    }

    pub fn logger(&self) -> &Logger {
        &self.logger
    }

    pub async fn log_connection(&self, target: &str, success: bool, error: Option<&str>) {
        let builder = if success {
            self.logger.info(&format!("Connected to {}", target))
        } else {
            self.logger
                .warn(&format!("Connection to {} failed: {}", target, error.unwrap_or("unknown error")))
        };
        builder.field("target", target).log().await;
    }

    pub async fn log_accept(&self, client_id: &Uuid, peer: SocketAddr) {
        self.logger
            .info(&format!("Accepted {}", peer))
            .field("client_id", client_id)
            .log()
            .await;
    }

    pub async fn log_disconnection(&self, peer: SocketAddr, reason: &str) {
        self.logger
            .info(&format!("Disconnected from {} ({})", peer, reason))
            .field("reason", reason)
            .log()
            .await;
    }

    pub async fn log_authentication(&self, peer: SocketAddr, success: bool) {
        if success {
            self.logger.debug(&format!("{} authenticated", peer)).log().await;
        } else {
            self.logger
                .warn(&format!("Authentication failed for {}", peer))
                .field("peer", peer.to_string())
                .log()
                .await;
        }
    }

    /// Trace only; skipped before formatting when trace is off
    pub async fn log_frame(&self, direction: &str, peer: SocketAddr, status: &str, bytes: u64) {
        if !self.logger.would_log(LogLevel::Trace) {
            return;
        }
        self.logger
            .trace(&format!("{} {} {} ({} bytes)", direction, status, peer, bytes))
            .log()
            .await;
    }
}

/// Final error of a run, logged with its category before `main` prints it
pub struct ErrorEventLogger {
    logger: Logger,
}

impl ErrorEventLogger {
    pub fn new(config: &Config) -> Self {
        Self {
            logger: Logger::with_config("ERR".to_string(), config),
        }
    }

    pub async fn log_error(&self, error: &AppError, context: Option<&str>, correlation_id: Option<&str>) {
        let message = match context {
            Some(context) => format!("{} failed: {}", context, error),
            None => error.to_string(),
        };
        let mut builder = self.logger.error(&message).error_info(error).field("exit_code", error.exit_code());
        if let Some(id) = correlation_id {
            builder = builder.correlation_id(id);
        }
        builder.log().await;
    }
}

/// Hands out loggers that share one session id
pub struct LoggerFactory {
    config: Config,
    session_id: String,
}

impl LoggerFactory {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            session_id: Uuid::new_v4().to_string(),
        }
    }

    pub async fn create_logger(&self, component: &str) -> Logger {
        let logger = Logger::with_config(component.to_string(), &self.config);
        logger.set_session_id(self.session_id.clone()).await;
        logger
    }

    pub fn create_error_logger(&self) -> ErrorEventLogger {
        ErrorEventLogger::new(&self.config)
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }
}

#[macro_export]
macro_rules! log_debug {
    ($logger:expr, $($arg:tt)*) => {
        $logger.debug(&format!($($arg)*)).source(file!(), line!()).log().await
    };
}

#[macro_export]
macro_rules! log_info {
    ($logger:expr, $($arg:tt)*) => {
        $logger.info(&format!($($arg)*)).source(file!(), line!()).log().await
    };
}

#[macro_export]
macro_rules! log_warn {
    ($logger:expr, $($arg:tt)*) => {
        $logger.warn(&format!($($arg)*)).source(file!(), line!()).log().await
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn entry(level: LogLevel) -> LogEntry {
        let mut fields = BTreeMap::new();
        fields.insert("peer".to_string(), Value::String("127.0.0.1:1".to_string()));
        LogEntry {
            timestamp: Utc::now(),
            level,
            component: "NET".to_string(),
            message: "Connected".to_string(),
            session_id: None,
            correlation_id: Some("0123456789abcdef".to_string()),
            source: Some("src/net.rs:10".to_string()),
            fields,
        }
    }

    #[test]
    fn test_level_parsing_and_order() {
        assert_eq!(LogLevel::from_str("DEBUG").unwrap(), LogLevel::Debug);
        assert_eq!(LogLevel::from_str(" warning ").unwrap(), LogLevel::Warn);
        assert!(LogLevel::from_str("fatal").is_err());
        assert!(LogLevel::Trace < LogLevel::Debug && LogLevel::Warn < LogLevel::Error);
        assert_eq!(LogLevel::Info.to_string(), "INFO");
    }

    #[test]
    fn test_format_follows_flags() {
        let debug = Logger::with_config(
            "T".to_string(),
            &Config {
                debug: true,
                enable_color: false,
                ..Default::default()
            },
        );
        assert_eq!(debug.format, LogFormat::Json);
        assert_eq!(debug.min_level, LogLevel::Debug);
        assert!(debug.show_source);

        let verbose = Logger::with_config(
            "T".to_string(),
            &Config {
                verbose: true,
                ..Default::default()
            },
        );
        assert_eq!(verbose.format, LogFormat::Console);

        let quiet = Logger::with_config("T".to_string(), &Config::default());
        assert_eq!(quiet.format, LogFormat::Compact);
        assert!(!quiet.would_log(LogLevel::Info));
        assert!(quiet.would_log(LogLevel::Warn));
    }

    #[test]
    fn test_renderers() {
        let entry = entry(LogLevel::Info);

        let console = render_console(&entry, false, true);
        assert!(console.contains(" INFO [NET] Connected [01234567]"));
        assert!(console.contains("{peer=\"127.0.0.1:1\"}"));
        assert!(console.ends_with("@ src/net.rs:10"));
        assert!(!render_console(&entry, false, false).contains('@'));

        let json: Value = serde_json::from_str(&render_json(&entry)).unwrap();
        assert_eq!(json["level"], "INFO");
        assert_eq!(json["component"], "NET");
        assert!(json.get("session_id").is_none());

        assert!(render_compact(&entry).ends_with(" I NET: Connected"));
    }

    #[test]
    fn test_clones_share_session() {
        let logger = Logger::with_level("NET".to_string(), LogLevel::Debug, false);
        let clone = logger.clone();
        tokio_test::block_on(logger.set_session_id("abc".to_string()));
        let scope = tokio_test::block_on(clone.scope.read());
        assert_eq!(scope.session_id.as_deref(), Some("abc"));
    }

    #[tokio::test]
    async fn test_operation_scope() {
        let logger = Logger::with_level("T".to_string(), LogLevel::Error, false);
        let id = logger.start_operation("reconnect cycle").await;
        assert_eq!(logger.scope.read().await.operation_id.as_deref(), Some(id.as_str()));

        // Closing a stale id leaves the current operation alone
        logger.end_operation("stale", "reconnect cycle", true).await;
        assert!(logger.scope.read().await.operation_id.is_some());

        logger.end_operation(&id, "reconnect cycle", true).await;
        assert!(logger.scope.read().await.operation_id.is_none());
    }

    #[tokio::test]
    async fn test_performance_timing() {
        let mut perf = PerformanceLogger::new(&Config::default());
        perf.start_timing("throughput").await;
        tokio::time::sleep(Duration::from_millis(2)).await;
        assert!(perf.end_timing("throughput").await.unwrap() >= Duration::from_millis(2));
        assert!(perf.end_timing("throughput").await.is_none());
    }

    #[tokio::test]
    async fn test_network_events_at_trace() {
        let net = NetworkLogger::from_logger(Logger::with_level("NET".to_string(), LogLevel::Trace, false));
        let peer: SocketAddr = "127.0.0.1:9000".parse().unwrap();

        net.log_connection("127.0.0.1:9000", true, None).await;
        net.log_connection("127.0.0.1:9001", false, Some("Connection refused")).await;
        net.log_accept(&Uuid::new_v4(), peer).await;
        net.log_authentication(peer, false).await;
        net.log_frame("recv", peer, "Normal", 12).await;
        net.log_disconnection(peer, "Normal").await;
    }

    #[tokio::test]
    async fn test_factory_shares_session() {
        let factory = LoggerFactory::new(Config::default());
        let a = factory.create_logger("A").await;
        let b = factory.create_logger("B").await;
        assert_eq!(a.name(), "A");
        assert_eq!(a.scope.read().await.session_id.as_deref(), Some(factory.session_id()));
        assert_eq!(b.scope.read().await.session_id.as_deref(), Some(factory.session_id()));
    }
}
