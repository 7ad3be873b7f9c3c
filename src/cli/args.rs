//! Argument structures for CLI commands

use clap::Args;
use clap_complete::Shell;

/// Arguments for the `exec` command
#[derive(Args, Debug, Clone)]
pub struct ExecArgs {
    /// Actor: key-<id>, user-<id> or username-<name>
    pub who: String,

    /// SSH command line requested by the client
    #[arg(long, env = "SSH_ORIGINAL_COMMAND", hide_env_values = true)]
    pub original_command: Option<String>,

    /// Git wire protocol hint
    #[arg(long, env = "GIT_PROTOCOL")]
    pub git_protocol: Option<String>,

    /// "client_ip client_port server_ip server_port" as set by sshd
    #[arg(long, env = "SSH_CONNECTION")]
    pub ssh_connection: Option<String>,
}

/// Arguments for the `config` command
#[derive(Args, Debug, Clone)]
pub struct ConfigArgs {
    /// Validate configuration only
    #[arg(long)]
    pub validate: bool,

    /// Show config search paths
    #[arg(long)]
    pub paths: bool,

    /// Show an example configuration
    #[arg(long)]
    pub example: bool,

    /// Output format
    #[arg(short, long, default_value = "toml", value_parser = ["toml", "json"])]
    pub format: String,
}

/// Arguments for the `completion` command
#[derive(Args, Debug, Clone)]
pub struct CompletionArgs {
    /// Target shell
    #[arg(value_enum)]
    pub shell: Shell,
}
