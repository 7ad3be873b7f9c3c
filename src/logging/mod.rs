//! Logging module for git-shell-gateway
//!
//! Diagnostics go through tracing-subscriber to stderr or a log file, as
//! text or JSON. Stderr is also the operator's channel, so without a log
//! file only warnings and errors are printed there. The JSONL audit log is
//! separate and opened here so the caller can hand it to the dispatcher.

pub mod jsonl;

pub use jsonl::{Decision, JsonlWriter, LogEvent, LogEventKind};

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::Level;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

use crate::config::LogFormat;

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Verbosity level adjustment: -1 for quiet, 0 for normal, +1 for verbose
    pub verbosity: i8,
    /// Diagnostic log file; stderr when unset
    pub log_file: Option<PathBuf>,
    pub format: LogFormat,
    /// JSONL audit log
    pub audit_log: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            verbosity: 0,
            log_file: None,
            format: LogFormat::Text,
            audit_log: None,
        }
    }
}

impl LogConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set verbose mode (+1 verbosity)
    pub fn verbose(mut self) -> Self {
        self.verbosity = 1;
        self
    }

    /// Set quiet mode (-1 verbosity)
    pub fn quiet(mut self) -> Self {
        self.verbosity = -1;
        self
    }

    pub fn with_log_file<P: AsRef<Path>>(mut self, path: Option<P>) -> Self {
        self.log_file = path.map(|p| p.as_ref().to_path_buf());
        self
    }

    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_audit_log<P: AsRef<Path>>(mut self, path: Option<P>) -> Self {
        self.audit_log = path.map(|p| p.as_ref().to_path_buf());
        self
    }

    /// Minimum level from verbosity and output target
    fn min_level(&self) -> Level {
        match self.verbosity {
            v if v < 0 => Level::ERROR,
            0 if self.log_file.is_some() => Level::INFO,
            0 => Level::WARN,
            _ => Level::DEBUG,
        }
    }
}

/// Initialize the logging subsystem
///
/// Fails if the log file cannot be opened or a subscriber is already set.
pub fn init_with_config(config: LogConfig) -> crate::Result<LogGuard> {
    let level = config.min_level();

    // RUST_LOG overrides the computed level
    let env_filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();

    let writer = match &config.log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| {
                    crate::Error::Config(format!(
                        "Failed to open log file '{}': {}",
                        path.display(),
                        e
                    ))
                })?;
            BoxMakeWriter::new(Mutex::new(file))
        }
        None => BoxMakeWriter::new(std::io::stderr),
    };

    let layer = match config.format {
        LogFormat::Text => fmt::layer()
            .with_writer(writer)
            .with_target(false)
            .with_ansi(config.log_file.is_none())
            .boxed(),
        LogFormat::Json => fmt::layer()
            .json()
            .with_writer(writer)
            .with_current_span(false)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(layer)
        .try_init()
        .map_err(|e| crate::Error::Other(format!("Failed to set tracing subscriber: {}", e)))?;

    let audit = match &config.audit_log {
        Some(path) => Some(Arc::new(JsonlWriter::new(path).map_err(|e| {
            crate::Error::Config(format!(
                "Failed to open audit log '{}': {}",
                path.display(),
                e
            ))
        })?)),
        None => None,
    };

    Ok(LogGuard { audit })
}

/// Keeps logging resources alive for the life of the process
#[must_use = "LogGuard must be kept alive for logging to work"]
pub struct LogGuard {
    audit: Option<Arc<JsonlWriter>>,
}

impl LogGuard {
    /// Shared handle to the audit log, if configured
    pub fn audit(&self) -> Option<Arc<JsonlWriter>> {
        self.audit.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_config_default() {
        let config = LogConfig::default();
        assert_eq!(config.verbosity, 0);
        assert!(config.log_file.is_none());
        assert_eq!(config.min_level(), Level::WARN);
    }

    #[test]
    fn test_log_config_with_file_logs_info() {
        let config = LogConfig::new().with_log_file(Some("/tmp/gateway.log"));
        assert_eq!(config.min_level(), Level::INFO);
    }

    #[test]
    fn test_log_config_verbose() {
        let config = LogConfig::new().verbose();
        assert_eq!(config.verbosity, 1);
        assert_eq!(config.min_level(), Level::DEBUG);
    }

    #[test]
    fn test_log_config_quiet() {
        let config = LogConfig::new()
            .quiet()
            .with_log_file(Some("/tmp/gateway.log"));
        assert_eq!(config.min_level(), Level::ERROR);
    }
}
