//! git-shell-gateway - SSH entry point for git hosting

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use clap_complete::env::CompleteEnv;
use std::path::Path;

use git_shell_gateway::cli::commands::{check, completion, config, exec, version};
use git_shell_gateway::cli::{Cli, Commands, ExitCode};
use git_shell_gateway::config::{ResolvedConfig, load_config_from_path_or_default};
use git_shell_gateway::logging::{self, LogConfig, LogGuard};

fn main() -> std::process::ExitCode {
    // Handle dynamic shell completion if COMPLETE env var is set
    CompleteEnv::with_factory(Cli::command).complete();

    let cli = Cli::parse();

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Error: failed to start async runtime: {}", e);
            return ExitCode::Config.into();
        }
    };

    let result = runtime.block_on(run(cli));

    // A pending stdin read sits on a blocking thread and only returns when
    // the client sends more data or closes the channel. The client waits
    // for our exit first, so the runtime must not wait for it.
    runtime.shutdown_background();

    match result {
        Ok(code) => code.into(),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::Config.into()
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    match cli.command {
        Commands::Version { verbose } => {
            version::print_version(verbose);
            Ok(ExitCode::Success)
        }
        Commands::Completion(args) => {
            completion::execute(args);
            Ok(ExitCode::Success)
        }
        Commands::Config(args) => config::execute(args, cli.config.as_deref()).await,
        Commands::Check => {
            let (config, _guard) = bootstrap(cli.config.as_deref(), cli.verbose, cli.quiet)?;
            check::execute(config).await
        }
        Commands::Exec(args) => {
            let (config, guard) = bootstrap(cli.config.as_deref(), cli.verbose, cli.quiet)?;
            exec::execute(args, config, guard.audit()).await
        }
    }
}

/// Load configuration and start logging
fn bootstrap(
    config_path: Option<&Path>,
    verbose: bool,
    quiet: bool,
) -> Result<(ResolvedConfig, LogGuard)> {
    let file =
        load_config_from_path_or_default(config_path).context("Failed to load configuration")?;
    let config = file.config.resolve().context("Invalid configuration")?;

    let mut log_config = LogConfig::new()
        .with_log_file(config.log_file.as_ref())
        .with_format(config.log_format)
        .with_audit_log(config.audit_log.as_ref());
    if verbose {
        log_config = log_config.verbose();
    } else if quiet {
        log_config = log_config.quiet();
    }

    let guard = logging::init_with_config(log_config).context("Failed to initialize logging")?;
    tracing::debug!(path = %file.path.display(), "Configuration loaded");

    Ok((config, guard))
}
