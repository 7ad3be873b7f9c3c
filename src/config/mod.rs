//! Configuration module for git-shell-gateway
//!
//! This module handles loading and parsing of the gateway configuration,
//! including environment variable expansion, duration parsing and reading
//! the shared secret used to authenticate against the internal API.

mod file;

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

pub use file::{
    ConfigFile, ConfigPath, config_search_paths, find_config_file, load_config,
    load_config_from_path_or_default,
};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Base URL of the internal API
    /// `http://`, `https://` or `http+unix://<socket path>`
    #[serde(default = "default_gitlab_url")]
    pub gitlab_url: String,

    /// File holding the shared secret for the internal API
    #[serde(default)]
    pub secret_file: Option<String>,

    /// Diagnostic log file; stderr is used when unset
    #[serde(default)]
    pub log_file: Option<String>,

    /// "text" or "json"
    #[serde(default = "default_log_format")]
    pub log_format: String,

    /// JSONL audit log of access decisions
    #[serde(default)]
    pub audit_log: Option<String>,

    /// Root of on-disk repositories for local execution
    #[serde(default = "default_repos_path")]
    pub repos_path: String,

    /// git executable used for local execution
    #[serde(default = "default_git_bin")]
    pub git_bin: String,

    /// HTTP client settings
    #[serde(default)]
    pub http_settings: HttpSettings,

    /// Storage backend session settings
    #[serde(default)]
    pub backend: BackendConfig,
}

/// HTTP client settings for the internal API
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HttpSettings {
    /// Basic auth user
    #[serde(default)]
    pub user: Option<String>,

    /// Basic auth password
    #[serde(default)]
    pub password: Option<String>,

    /// Whole-request timeout, e.g. "30s"
    #[serde(default = "default_read_timeout")]
    pub read_timeout: String,

    /// Extra CA certificate (PEM) for https
    #[serde(default)]
    pub ca_file: Option<String>,
}

/// Storage backend settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BackendConfig {
    /// Timeout for opening a backend session, e.g. "10s"
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            gitlab_url: default_gitlab_url(),
            secret_file: None,
            http_settings: HttpSettings::default(),
            log_file: None,
            log_format: default_log_format(),
            audit_log: None,
            repos_path: default_repos_path(),
            git_bin: default_git_bin(),
            backend: BackendConfig::default(),
        }
    }
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            user: None,
            password: None,
            read_timeout: default_read_timeout(),
            ca_file: None,
        }
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            connect_timeout: default_connect_timeout(),
        }
    }
}

fn default_gitlab_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

fn default_repos_path() -> String {
    "/var/opt/gitlab/git-data/repositories".to_string()
}

fn default_git_bin() -> String {
    "git".to_string()
}

fn default_read_timeout() -> String {
    "300s".to_string()
}

fn default_connect_timeout() -> String {
    "10s".to_string()
}

/// Output format of the diagnostic log
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

impl Config {
    /// Expand paths, parse durations and read the shared secret
    pub fn resolve(&self) -> crate::Result<ResolvedConfig> {
        let secret = match &self.secret_file {
            Some(path) => {
                let path = expand_path(path)?;
                let content = std::fs::read_to_string(&path).map_err(|e| {
                    crate::Error::Config(format!("Failed to read secret file '{}': {}", path, e))
                })?;
                Some(content.trim().to_string())
            }
            None => None,
        };

        let log_format = match self.log_format.as_str() {
            "text" => LogFormat::Text,
            "json" => LogFormat::Json,
            other => {
                return Err(crate::Error::Config(format!(
                    "Unknown log_format '{}': expected 'text' or 'json'",
                    other
                )));
            }
        };

        let gitlab_url = self.gitlab_url.trim_end_matches('/').to_string();
        if !(gitlab_url.starts_with("http://")
            || gitlab_url.starts_with("https://")
            || gitlab_url.starts_with("http+unix://"))
        {
            return Err(crate::Error::Config(format!(
                "Unsupported gitlab_url scheme: '{}'",
                self.gitlab_url
            )));
        }

        Ok(ResolvedConfig {
            gitlab_url,
            secret,
            http: ResolvedHttpSettings {
                user: self.http_settings.user.clone(),
                password: self.http_settings.password.clone(),
                read_timeout: parse_duration(&self.http_settings.read_timeout)?,
                ca_file: self
                    .http_settings
                    .ca_file
                    .as_deref()
                    .map(expand_path)
                    .transpose()?
                    .map(PathBuf::from),
            },
            log_file: self
                .log_file
                .as_deref()
                .map(expand_path)
                .transpose()?
                .map(PathBuf::from),
            log_format,
            audit_log: self
                .audit_log
                .as_deref()
                .map(expand_path)
                .transpose()?
                .map(PathBuf::from),
            repos_path: PathBuf::from(expand_path(&self.repos_path)?),
            git_bin: self.git_bin.clone(),
            backend_connect_timeout: parse_duration(&self.backend.connect_timeout)?,
        })
    }
}

/// Configuration ready for use: paths expanded, durations parsed
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// Internal API base URL without trailing slash
    pub gitlab_url: String,

    /// Shared secret contents
    pub secret: Option<String>,

    /// HTTP client settings
    pub http: ResolvedHttpSettings,

    /// Diagnostic log file
    pub log_file: Option<PathBuf>,

    /// Diagnostic log format
    pub log_format: LogFormat,

    /// JSONL audit log
    pub audit_log: Option<PathBuf>,

    /// Root of local repositories
    pub repos_path: PathBuf,

    /// git executable
    pub git_bin: String,

    /// Backend session open timeout
    pub backend_connect_timeout: Duration,
}

/// HTTP settings with parsed timeout
#[derive(Debug, Clone)]
pub struct ResolvedHttpSettings {
    pub user: Option<String>,
    pub password: Option<String>,
    pub read_timeout: Duration,
    pub ca_file: Option<PathBuf>,
}

impl ResolvedConfig {
    /// Configuration pointing at the given internal API URL, everything else default
    pub fn for_url(gitlab_url: impl Into<String>) -> Self {
        Self {
            gitlab_url: gitlab_url.into(),
            secret: None,
            http: ResolvedHttpSettings {
                user: None,
                password: None,
                read_timeout: Duration::from_secs(300),
                ca_file: None,
            },
            log_file: None,
            log_format: LogFormat::Text,
            audit_log: None,
            repos_path: PathBuf::from(default_repos_path()),
            git_bin: default_git_bin(),
            backend_connect_timeout: Duration::from_secs(10),
        }
    }
}

/// Expand environment variables and tilde in a path string
pub fn expand_path(path: &str) -> crate::Result<String> {
    shellexpand::full(path)
        .map(|s| s.into_owned())
        .map_err(|e| crate::Error::Config(format!("Failed to expand path '{}': {}", path, e)))
}

/// Parse a duration string like "300s", "5m", "1h"
pub fn parse_duration(s: &str) -> crate::Result<Duration> {
    let s = s.trim();
    if s.is_empty() {
        return Err(crate::Error::Config("Empty duration string".to_string()));
    }

    let split = s.find(|c: char| c.is_alphabetic()).unwrap_or(s.len());
    let (num_str, unit) = s.split_at(split);

    let num: u64 = num_str.trim().parse().map_err(|e| {
        crate::Error::Config(format!("Invalid duration number '{}': {}", num_str, e))
    })?;

    let multiplier = match unit.to_lowercase().as_str() {
        "ms" => return Ok(Duration::from_millis(num)),
        "" | "s" | "sec" | "secs" | "seconds" => 1,
        "m" | "min" | "mins" | "minutes" => 60,
        "h" | "hr" | "hrs" | "hours" => 60 * 60,
        _ => {
            return Err(crate::Error::Config(format!(
                "Unknown duration unit '{}' in '{}'",
                unit, s
            )));
        }
    };

    Ok(Duration::from_secs(num * multiplier))
}
