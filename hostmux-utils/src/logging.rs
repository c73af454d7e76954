//! Logging infrastructure for hostmux
//!
//! Provides unified logging setup using the tracing ecosystem.

use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

use crate::{paths, HostmuxError, Result};

/// Environment variable holding the log filter
pub const LOG_ENV: &str = "HOSTMUX_LOG";

/// Log output destination
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogOutput {
    /// Log to stderr
    Stderr,
    /// Log to a file under the state directory
    File,
    /// Log to both stderr and file
    Both,
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Output destination
    pub output: LogOutput,
    /// Log level filter (e.g., "info", "debug", "hostmux=debug,tokio=warn")
    pub filter: String,
    /// Include span events (enter/exit)
    pub span_events: bool,
    /// Include file/line in logs
    pub file_line: bool,
    /// Optional custom log file name (defaults to "hostmux.log")
    pub file_name: Option<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            output: LogOutput::Stderr,
            filter: "info".into(),
            span_events: false,
            file_line: false,
            file_name: None,
        }
    }
}

impl LogConfig {
    /// Config for the command line tool
    ///
    /// stdout carries command output, so logs go to stderr.
    pub fn cli() -> Self {
        Self {
            output: LogOutput::Stderr,
            filter: filter_from_env(LOG_ENV, "warn"),
            span_events: false,
            file_line: false,
            file_name: None,
        }
    }

    /// Config for long-running embedders (file logging)
    pub fn service() -> Self {
        Self {
            output: LogOutput::File,
            filter: filter_from_env(LOG_ENV, "info"),
            span_events: true,
            file_line: true,
            file_name: None,
        }
    }

    /// Create config for development (verbose stderr)
    pub fn development() -> Self {
        Self {
            output: LogOutput::Stderr,
            filter: "debug".into(),
            span_events: true,
            file_line: true,
            file_name: None,
        }
    }

    /// Raise the filter by `verbosity` steps above the current one
    ///
    /// Used for repeated `-v` flags; an explicit env filter wins.
    pub fn with_verbosity(mut self, verbosity: u8) -> Self {
        if verbosity == 0 || std::env::var(LOG_ENV).is_ok() {
            return self;
        }
        self.filter = match verbosity {
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
        .into();
        self
    }
}

fn filter_from_env(var: &str, default: &str) -> String {
    std::env::var(var).unwrap_or_else(|_| default.into())
}

/// Initialize logging with default configuration
pub fn init_logging() -> Result<()> {
    init_logging_with_config(LogConfig::default())
}

/// Initialize logging with custom configuration
pub fn init_logging_with_config(config: LogConfig) -> Result<()> {
    let filter = EnvFilter::try_new(&config.filter)
        .map_err(|e| HostmuxError::internal(format!("Invalid log filter: {}", e)))?;

    let fmt_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(false)
        .with_thread_names(false);

    let fmt_layer = if config.span_events {
        fmt_layer.with_span_events(FmtSpan::ENTER | FmtSpan::EXIT)
    } else {
        fmt_layer
    };

    let fmt_layer = if config.file_line {
        fmt_layer.with_file(true).with_line_number(true)
    } else {
        fmt_layer.with_file(false).with_line_number(false)
    };

    let file_name = config.file_name.as_deref().unwrap_or("hostmux.log");

    match config.output {
        LogOutput::Stderr => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt_layer.with_writer(std::io::stderr))
                .try_init()
                .map_err(|e| HostmuxError::internal(format!("Failed to init logging: {}", e)))?;
        }
        LogOutput::File => {
            let file = open_log_file(file_name)?;

            tracing_subscriber::registry()
                .with(filter)
                .with(fmt_layer.with_writer(file).with_ansi(false))
                .try_init()
                .map_err(|e| HostmuxError::internal(format!("Failed to init logging: {}", e)))?;
        }
        LogOutput::Both => {
            let file = open_log_file(file_name)?;

            let file_layer = fmt::layer()
                .with_writer(file)
                .with_ansi(false)
                .with_target(true);

            tracing_subscriber::registry()
                .with(filter)
                .with(fmt_layer.with_writer(std::io::stderr))
                .with(file_layer)
                .try_init()
                .map_err(|e| HostmuxError::internal(format!("Failed to init logging: {}", e)))?;
        }
    }

    Ok(())
}

fn open_log_file(file_name: &str) -> Result<std::fs::File> {
    let log_dir = paths::log_dir();
    paths::ensure_dir(&log_dir).map_err(|e| HostmuxError::FileWrite {
        path: log_dir.clone(),
        source: e,
    })?;

    let log_path = log_dir.join(file_name);
    std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .map_err(|e| HostmuxError::FileWrite {
            path: log_path,
            source: e,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    // ==================== LogConfig Preset Tests ====================

    #[test]
    fn test_log_config_defaults() {
        let config = LogConfig::default();
        assert_eq!(config.output, LogOutput::Stderr);
        assert_eq!(config.filter, "info");
        assert!(!config.span_events);
        assert!(!config.file_line);
        assert!(config.file_name.is_none());
    }

    #[test]
    fn test_log_config_cli_uses_stderr() {
        let config = LogConfig::cli();
        assert_eq!(config.output, LogOutput::Stderr);
        assert!(!config.span_events);
    }

    #[test]
    fn test_log_config_service_uses_file() {
        let config = LogConfig::service();
        assert_eq!(config.output, LogOutput::File);
        assert!(config.span_events);
        assert!(config.file_line);
    }

    #[test]
    fn test_log_config_development() {
        let config = LogConfig::development();
        assert_eq!(config.output, LogOutput::Stderr);
        assert_eq!(config.filter, "debug");
        assert!(config.span_events);
        assert!(config.file_line);
    }

    // ==================== Filter Tests ====================

    #[test]
    fn test_filter_from_env_default() {
        assert_eq!(
            filter_from_env("HOSTMUX_TEST_FILTER_UNSET", "warn"),
            "warn"
        );
    }

    #[test]
    fn test_filter_from_env_set() {
        std::env::set_var("HOSTMUX_TEST_FILTER_SET", "hostmux_client=trace");
        assert_eq!(
            filter_from_env("HOSTMUX_TEST_FILTER_SET", "warn"),
            "hostmux_client=trace"
        );
        std::env::remove_var("HOSTMUX_TEST_FILTER_SET");
    }

    #[test]
    fn test_verbosity_zero_keeps_filter() {
        let config = LogConfig {
            filter: "error".into(),
            ..LogConfig::default()
        };
        assert_eq!(config.with_verbosity(0).filter, "error");
    }

    #[test]
    fn test_verbosity_steps() {
        if std::env::var(LOG_ENV).is_ok() {
            return;
        }
        assert_eq!(LogConfig::cli().with_verbosity(1).filter, "info");
        assert_eq!(LogConfig::cli().with_verbosity(2).filter, "debug");
        assert_eq!(LogConfig::cli().with_verbosity(5).filter, "trace");
    }

    #[test]
    fn test_filters_parse() {
        for filter in ["warn", "hostmux_client=debug,tokio=warn", "hostmux_protocol::codec=trace"] {
            assert!(EnvFilter::try_new(filter).is_ok(), "{}", filter);
        }
    }

    // Note: init_logging() installs a global subscriber once per process,
    // so it is not exercised from unit tests.
}
