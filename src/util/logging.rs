//! Structured logging setup for kubelift
//!
//! Initializes the `tracing` subscriber once per process. Logs go to stderr
//! and, when a log file is configured, are appended to that file as well.
//!
//! # Example
//!
//! ```no_run
//! use kubelift::util::logging;
//!
//! logging::init_from_env();
//!
//! use tracing::{info, warn};
//! info!(plan = "shop", "Starting transform");
//! warn!(transformer = "Jboss", "No Java version found, using default");
//! ```

use std::env;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, Once};
use tracing::Level;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry};

/// Ensures logging is only initialized once
static INIT: Once = Once::new();

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Configuration for logging initialization
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Minimum log level for kubelift's own targets
    pub level: Level,

    /// Use JSON output format
    pub use_json: bool,

    /// Include the module target (e.g., kubelift::engine) in logs
    pub include_target: bool,

    /// Include file and line number information
    pub include_location: bool,

    /// Append logs to this file in addition to stderr
    pub log_file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            use_json: false,
            include_target: false,
            include_location: false,
            log_file: None,
        }
    }
}

impl LoggingConfig {
    pub fn with_level(level: Level) -> Self {
        Self {
            level,
            ..Default::default()
        }
    }

    /// Verbose output with targets and source locations
    pub fn development() -> Self {
        Self {
            level: Level::DEBUG,
            use_json: false,
            include_target: true,
            include_location: true,
            log_file: None,
        }
    }

    pub fn with_log_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_file = Some(path.into());
        self
    }
}

/// Parses a log level, case-insensitively; anything unknown becomes INFO
/// with a warning on stderr.
///
/// ```
/// use kubelift::util::logging::parse_level;
/// use tracing::Level;
///
/// assert_eq!(parse_level("debug"), Level::DEBUG);
/// assert_eq!(parse_level("WARN"), Level::WARN);
/// assert_eq!(parse_level("loud"), Level::INFO);
/// ```
pub fn parse_level(level_str: &str) -> Level {
    match level_str.trim().to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" | "warning" => Level::WARN,
        "error" => Level::ERROR,
        _ => {
            eprintln!(
                "Invalid log level '{}', defaulting to INFO. Valid levels: trace, debug, info, warn, error",
                level_str
            );
            Level::INFO
        }
    }
}

fn open_log_file(path: &Path) -> Option<File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        if let Err(e) = std::fs::create_dir_all(parent) {
            eprintln!("Cannot create log directory {}: {}", parent.display(), e);
            return None;
        }
    }
    match OpenOptions::new().create(true).append(true).open(path) {
        Ok(file) => Some(file),
        Err(e) => {
            eprintln!("Cannot open log file {}: {}", path.display(), e);
            None
        }
    }
}

fn build_filter(level: Level) -> EnvFilter {
    let mut filter = EnvFilter::from_default_env();
    if let Ok(directive) = format!("kubelift={}", level).parse() {
        filter = filter.add_directive(directive);
    }
    if env::var("RUST_LOG").is_err() {
        if let Ok(directive) = "handlebars=warn".parse() {
            filter = filter.add_directive(directive);
        }
    }
    filter
}

fn stderr_layer(config: &LoggingConfig) -> BoxedLayer {
    let layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(config.include_target)
        .with_file(config.include_location)
        .with_line_number(config.include_location);
    if config.use_json {
        layer.json().boxed()
    } else {
        layer.boxed()
    }
}

fn file_layer(config: &LoggingConfig, file: File) -> BoxedLayer {
    let layer = fmt::layer()
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .with_target(config.include_target)
        .with_file(config.include_location)
        .with_line_number(config.include_location);
    if config.use_json {
        layer.json().boxed()
    } else {
        layer.boxed()
    }
}

/// Initializes the logging system; later calls are ignored
pub fn init_logging(config: LoggingConfig) {
    INIT.call_once(|| {
        let mut layers = vec![stderr_layer(&config)];
        if let Some(file) = config.log_file.as_deref().and_then(open_log_file) {
            layers.push(file_layer(&config, file));
        }

        tracing_subscriber::registry()
            .with(layers)
            .with(build_filter(config.level))
            .init();
    });
}

pub fn init_default() {
    init_logging(LoggingConfig::default());
}

/// Initializes logging from `KUBELIFT_LOG_LEVEL` and `KUBELIFT_LOG_JSON`;
/// `RUST_LOG` still applies on top.
pub fn init_from_env() {
    init_logging(config_from_env());
}

fn config_from_env() -> LoggingConfig {
    let level = env::var("KUBELIFT_LOG_LEVEL")
        .map(|l| parse_level(&l))
        .unwrap_or(Level::INFO);

    let use_json = env::var("KUBELIFT_LOG_JSON")
        .ok()
        .and_then(|v| v.parse::<bool>().ok())
        .unwrap_or(false);

    LoggingConfig {
        level,
        use_json,
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("trace"), Level::TRACE);
        assert_eq!(parse_level("debug"), Level::DEBUG);
        assert_eq!(parse_level("info"), Level::INFO);
        assert_eq!(parse_level("warn"), Level::WARN);
        assert_eq!(parse_level("error"), Level::ERROR);
    }

    #[test]
    fn test_parse_level_case_insensitive() {
        assert_eq!(parse_level("TRACE"), Level::TRACE);
        assert_eq!(parse_level("Debug"), Level::DEBUG);
        assert_eq!(parse_level(" info "), Level::INFO);
    }

    #[test]
    fn test_parse_level_invalid() {
        assert_eq!(parse_level("invalid"), Level::INFO);
        assert_eq!(parse_level(""), Level::INFO);
    }

    #[test]
    fn test_default_config() {
        let config = LoggingConfig::default();
        assert_eq!(config.level, Level::INFO);
        assert!(!config.use_json);
        assert!(config.log_file.is_none());
    }

    #[test]
    fn test_development_config() {
        let config = LoggingConfig::development().with_log_file("/tmp/k.log");
        assert_eq!(config.level, Level::DEBUG);
        assert!(config.include_location);
        assert_eq!(config.log_file, Some(PathBuf::from("/tmp/k.log")));
    }

    #[test]
    #[serial]
    fn test_config_from_env() {
        env::set_var("KUBELIFT_LOG_LEVEL", "error");
        env::set_var("KUBELIFT_LOG_JSON", "true");
        let config = config_from_env();
        env::remove_var("KUBELIFT_LOG_LEVEL");
        env::remove_var("KUBELIFT_LOG_JSON");
        assert_eq!(config.level, Level::ERROR);
        assert!(config.use_json);
    }

    #[test]
    fn test_log_file_opened_for_append() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("logs").join("kubelift.log");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "earlier\n").unwrap();

        let mut file = open_log_file(&path).unwrap();
        std::io::Write::write_all(&mut file, b"later\n").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "earlier\nlater\n");
    }
}
