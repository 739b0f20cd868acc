//! Logging infrastructure - structured tracing for binding and dispatch
//!
//! Design: Uses `tracing` for structured, contextual logging with:
//! - Configurable log level, overridable through `RUST_LOG`
//! - Zero-cost when no subscriber is installed
//! - Console or daily-rotated file output, human-readable or JSON

use crate::descriptor::CallDescriptor;
use crate::error::MaterializationError;
use once_cell::sync::OnceCell;
use std::path::PathBuf;
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Global logging state; holds the file writer guard when logging to a file
static LOGGER: OnceCell<Option<WorkerGuard>> = OnceCell::new();

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Default log level
    pub level: Level,
    /// Log file (daily rotation); stderr when unset
    pub log_path: Option<PathBuf>,
    /// Enable JSON format (vs human-readable)
    pub json_format: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::WARN,
            log_path: None,
            json_format: false,
        }
    }
}

impl LogConfig {
    /// Create config from environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        // PYCH_LOG_LEVEL: trace, debug, info, warn, error
        if let Some(level) = lookup("PYCH_LOG_LEVEL") {
            config.level = parse_level(&level).unwrap_or(Level::WARN);
        }

        // PYCH_LOG_FILE: path to log file
        config.log_path = lookup("PYCH_LOG_FILE").map(PathBuf::from);

        config.json_format = lookup("PYCH_LOG_JSON").is_some();

        config
    }

    /// Verbose config for debugging materialization problems
    pub fn debug() -> Self {
        Self {
            level: Level::TRACE,
            ..Self::default()
        }
    }
}

fn parse_level(text: &str) -> Option<Level> {
    match text.to_lowercase().as_str() {
        "trace" => Some(Level::TRACE),
        "debug" => Some(Level::DEBUG),
        "info" => Some(Level::INFO),
        "warn" => Some(Level::WARN),
        "error" => Some(Level::ERROR),
        _ => None,
    }
}

/// Initialize logging with configuration from the environment
pub fn init() {
    init_with_config(LogConfig::from_env());
}

/// Initialize logging with custom configuration
///
/// Only the first call installs a subscriber.
pub fn init_with_config(config: LogConfig) {
    LOGGER.get_or_init(|| {
        let env_filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(format!("pych={}", config.level.as_str().to_lowercase())));

        let (writer, guard) = match &config.log_path {
            Some(path) => {
                let directory = path.parent().filter(|p| !p.as_os_str().is_empty());
                let prefix = path.file_name().map(|n| n.to_os_string()).unwrap_or_else(|| "pych.log".into());
                let appender = tracing_appender::rolling::daily(
                    directory.unwrap_or_else(|| std::path::Path::new(".")),
                    prefix,
                );
                let (writer, guard) = tracing_appender::non_blocking(appender);
                (writer, Some(guard))
            }
            None => {
                let (writer, guard) = tracing_appender::non_blocking(std::io::stderr());
                (writer, Some(guard))
            }
        };

        let registry = tracing_subscriber::registry().with(env_filter);
        let result = if config.json_format {
            registry
                .with(fmt::layer().json().with_writer(writer).with_target(true))
                .try_init()
        } else {
            registry
                .with(fmt::layer().compact().with_writer(writer).with_target(true))
                .try_init()
        };

        // Another subscriber may already be installed by the host program
        result.ok().and(guard)
    });
}

/// Check if logging is initialized
pub fn is_initialized() -> bool {
    LOGGER.get().is_some()
}

// ============================================================================
// Binding and dispatch events
// ============================================================================

/// Log a completed declaration binding
pub fn log_bind(descriptor: &CallDescriptor) {
    tracing::debug!(
        event = "bind",
        function = %descriptor.host_name,
        symbol = %descriptor.external_symbol_name,
        library = ?descriptor.library_name,
        signature = %descriptor.signature(),
        "Declaration bound"
    );
}

/// Log a runtime hint
pub fn log_hint(descriptor: &CallDescriptor) {
    tracing::trace!(
        event = "hint",
        function = %descriptor.host_name,
        library = ?descriptor.library_name,
        "Runtime hinted"
    );
}

/// Log a materialization request
pub fn log_materialize(descriptor: &CallDescriptor) {
    tracing::debug!(
        event = "materialize",
        symbol = %descriptor.external_symbol_name,
        library = ?descriptor.library_name,
        "Materializing native handle"
    );
}

/// Log a failed materialization
pub fn log_materialize_error(error: &MaterializationError) {
    tracing::error!(
        event = "materialize_error",
        symbol = %error.symbol,
        library = ?error.library,
        reason = %error.reason,
        "Materialization failed"
    );
}

/// Log a library load
pub fn log_library_loaded(path: &std::path::Path) {
    tracing::debug!(
        event = "library_loaded",
        path = %path.display(),
        "Shared library loaded"
    );
}

/// Log FFI function call
pub fn log_ffi_call(fn_name: &str, arg_count: usize) {
    tracing::trace!(
        event = "ffi_call",
        function = fn_name,
        args = arg_count,
        "FFI function called"
    );
}

/// Log FFI function return
pub fn log_ffi_return(fn_name: &str) {
    tracing::trace!(
        event = "ffi_return",
        function = fn_name,
        "FFI function returned"
    );
}

/// Log FFI error
pub fn log_ffi_error(fn_name: &str, error: &str) {
    tracing::error!(
        event = "ffi_error",
        function = fn_name,
        error = error,
        "FFI function error"
    );
}

/// Performance tracking utilities
pub mod perf {
    use std::time::Instant;
    use tracing::debug;

    /// Track operation duration (returns guard that logs on drop)
    #[must_use]
    pub fn track(operation: &'static str) -> PerformanceGuard {
        PerformanceGuard {
            operation,
            start: Instant::now(),
        }
    }

    pub struct PerformanceGuard {
        operation: &'static str,
        start: Instant,
    }

    impl Drop for PerformanceGuard {
        fn drop(&mut self) {
            let elapsed = self.start.elapsed();
            debug!(
                operation = self.operation,
                duration_us = elapsed.as_micros() as u64,
                "operation completed"
            );
        }
    }
}
