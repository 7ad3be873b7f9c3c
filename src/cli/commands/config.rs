//! Config command - show or validate configuration

use anyhow::{Context, Result};
use std::path::Path;

use crate::cli::ExitCode;
use crate::cli::args::ConfigArgs;
use crate::config::{Config, config_search_paths, find_config_file};

/// Example configuration content
fn example_config() -> &'static str {
    r#"# git-shell-gateway configuration file

# Internal API base URL: http://, https:// or http+unix://<socket path>
gitlab_url = "http+unix:///var/opt/gitlab/gitlab-workhorse/sockets/socket"

# Shared secret for the internal API
secret_file = "/var/opt/gitlab/gitlab-shell/.gitlab_shell_secret"

# Diagnostic log; stderr when unset
# log_file = "/var/log/git-shell-gateway/gateway.log"
# log_format = "json"

# JSONL audit log of access decisions and command results
# audit_log = "/var/log/git-shell-gateway/audit.jsonl"

# Local execution when the API returns no storage backend
repos_path = "/var/opt/gitlab/git-data/repositories"
git_bin = "git"

[http_settings]
read_timeout = "300s"
# user = "api"
# password = "secret"
# ca_file = "/etc/ssl/certs/internal-ca.pem"

[backend]
connect_timeout = "10s"
"#
}

/// Execute the config command
pub async fn execute(args: ConfigArgs, config_path: Option<&Path>) -> Result<ExitCode> {
    if args.paths {
        println!("Config search paths (in priority order):");
        for (i, cp) in config_search_paths().iter().enumerate() {
            let exists = if cp.path.exists() { "[exists]" } else { "" };
            println!("  {}. {} {}", i + 1, cp.description, exists);
            println!("     {}", cp.path.display());
        }
        return Ok(ExitCode::Success);
    }

    if args.example {
        match args.format.as_str() {
            "json" => {
                let config: toml::Value =
                    toml::from_str(example_config()).context("Failed to parse example config")?;
                println!("{}", serde_json::to_string_pretty(&config)?);
            }
            _ => print!("{}", example_config()),
        }
        return Ok(ExitCode::Success);
    }

    let path = config_path.map(Path::to_path_buf).or_else(find_config_file);

    let Some(path) = path else {
        if args.validate {
            eprintln!("No configuration file found.");
            eprintln!("Searched locations (use --paths for details):");
            for cp in config_search_paths() {
                eprintln!("  - {}", cp.path.display());
            }
            return Ok(ExitCode::Config);
        }
        println!("# No configuration file found, built-in defaults in effect");
        println!();
        print!("{}", toml::to_string_pretty(&Config::default())?);
        return Ok(ExitCode::Success);
    };

    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    if args.validate {
        let checked = toml::from_str::<Config>(&content)
            .map_err(crate::Error::from)
            .and_then(|config| config.resolve());
        return match checked {
            Ok(_) => {
                println!("Configuration file is valid: {}", path.display());
                Ok(ExitCode::Success)
            }
            Err(e) => {
                eprintln!("Configuration file is invalid: {}", path.display());
                eprintln!("Error: {}", e);
                Ok(ExitCode::Config)
            }
        };
    }

    let config: Config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
    match args.format.as_str() {
        "json" => println!("{}", serde_json::to_string_pretty(&config)?),
        _ => {
            println!("# Configuration from: {}", path.display());
            println!();
            print!("{}", toml::to_string_pretty(&config)?);
        }
    }

    Ok(ExitCode::Success)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_example_config_parses() {
        let config: Config = toml::from_str(example_config()).unwrap();
        assert!(config.gitlab_url.starts_with("http+unix://"));
        assert_eq!(config.backend.connect_timeout, "10s");
    }
}
