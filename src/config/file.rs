//! Configuration file discovery and loading

use std::path::{Path, PathBuf};

use super::Config;

/// Configuration file wrapper with path information
#[derive(Debug, Clone)]
pub struct ConfigFile {
    /// Path where the configuration was loaded from (empty for defaults)
    pub path: PathBuf,

    /// The parsed configuration
    pub config: Config,
}

/// Configuration file search path with description
#[derive(Debug, Clone)]
pub struct ConfigPath {
    /// The actual file path
    pub path: PathBuf,
    /// Human-readable description for display
    pub description: &'static str,
}

const CONFIG_FILE_NAME: &str = "config.toml";

const APP_NAME: &str = "git-shell-gateway";

/// Get all configuration search paths (in priority order)
///
/// 1. `$XDG_CONFIG_HOME/git-shell-gateway/config.toml` (if env var set)
/// 2. `~/.config/git-shell-gateway/config.toml`
/// 3. `/etc/git-shell-gateway/config.toml`
pub fn config_search_paths() -> Vec<ConfigPath> {
    let mut paths = Vec::new();

    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        paths.push(ConfigPath {
            path: PathBuf::from(xdg).join(APP_NAME).join(CONFIG_FILE_NAME),
            description: "$XDG_CONFIG_HOME/git-shell-gateway/config.toml",
        });
    }

    if let Some(home) = dirs::home_dir() {
        let dotconfig = home.join(".config").join(APP_NAME).join(CONFIG_FILE_NAME);
        if !paths.iter().any(|p| p.path == dotconfig) {
            paths.push(ConfigPath {
                path: dotconfig,
                description: "~/.config/git-shell-gateway/config.toml",
            });
        }
    }

    paths.push(ConfigPath {
        path: PathBuf::from("/etc").join(APP_NAME).join(CONFIG_FILE_NAME),
        description: "/etc/git-shell-gateway/config.toml",
    });

    paths
}

/// Find the configuration file in standard locations
pub fn find_config_file() -> Option<PathBuf> {
    for cp in config_search_paths() {
        if cp.path.is_file() {
            tracing::debug!(path = %cp.path.display(), "Found configuration file");
            return Some(cp.path);
        }
    }

    tracing::debug!("No configuration file found in standard locations");
    None
}

/// Load configuration from the specified path
pub fn load_config(path: &Path) -> crate::Result<ConfigFile> {
    tracing::debug!("Loading configuration from: {}", path.display());

    let content = std::fs::read_to_string(path).map_err(|e| {
        crate::Error::Config(format!(
            "Failed to read configuration file '{}': {}",
            path.display(),
            e
        ))
    })?;

    let config: Config = toml::from_str(&content).map_err(|e| {
        crate::Error::Config(format!(
            "Failed to parse configuration file '{}': {}",
            path.display(),
            e
        ))
    })?;

    Ok(ConfigFile {
        path: path.to_path_buf(),
        config,
    })
}

/// Load configuration from a specific path or fall back to default locations
///
/// Returns the built-in defaults if no file is found.
pub fn load_config_from_path_or_default(path: Option<&Path>) -> crate::Result<ConfigFile> {
    if let Some(p) = path {
        return load_config(p);
    }

    match find_config_file() {
        Some(p) => load_config(&p),
        None => Ok(ConfigFile {
            path: PathBuf::new(),
            config: Config::default(),
        }),
    }
}
