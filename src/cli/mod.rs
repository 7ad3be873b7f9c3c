//! CLI module for git-shell-gateway
//!
//! This module provides the command-line interface using clap derive macros.

pub mod args;
pub mod commands;
pub mod exit_code;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub use exit_code::ExitCode;

use args::{CompletionArgs, ConfigArgs, ExecArgs};

/// SSH entry point for git hosting: access checks, command dispatch and
/// storage backend proxying
#[derive(Parser, Debug)]
#[command(name = "git-shell-gateway")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Configuration file path
    #[arg(long, global = true, env = "GIT_SHELL_GATEWAY_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(long, global = true, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Only log errors
    #[arg(long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Handle one SSH command (use as the authorized_keys command)
    Exec(ExecArgs),

    /// Check that the internal API is reachable
    Check,

    /// Show or validate configuration
    Config(ConfigArgs),

    /// Show version information
    Version {
        /// Show build details
        #[arg(long)]
        verbose: bool,
    },

    /// Generate shell completions
    Completion(CompletionArgs),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_exec() {
        let cli = Cli::try_parse_from([
            "git-shell-gateway",
            "--config",
            "/etc/git-shell-gateway/config.toml",
            "exec",
            "key-42",
        ])
        .unwrap();

        assert_eq!(
            cli.config,
            Some(PathBuf::from("/etc/git-shell-gateway/config.toml"))
        );
        match cli.command {
            Commands::Exec(args) => assert_eq!(args.who, "key-42"),
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_verbose_conflicts_with_quiet() {
        let result = Cli::try_parse_from(["git-shell-gateway", "--verbose", "--quiet", "check"]);
        assert!(result.is_err());
    }
}
