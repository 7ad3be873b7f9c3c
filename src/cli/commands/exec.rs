//! Exec command - handle one SSH command from sshd

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::io::BufReader;
use tokio::signal::unix::{SignalKind, signal};
use tracing::{debug, warn};

use crate::cli::ExitCode;
use crate::cli::args::ExecArgs;
use crate::command::{ActorIdentity, CommandArgs, Dispatcher, ReadWriter};
use crate::config::ResolvedConfig;
use crate::logging::JsonlWriter;

/// Execute the exec command
///
/// SIGHUP or SIGTERM (the SSH client went away) cancels the running
/// command, which closes any backend session.
pub async fn execute(
    args: ExecArgs,
    config: ResolvedConfig,
    audit: Option<Arc<JsonlWriter>>,
) -> Result<ExitCode> {
    let dispatcher = Dispatcher::new(config)
        .context("Failed to set up internal API client")?
        .with_audit(audit);

    let mut hangup = signal(SignalKind::hangup()).context("Failed to listen for SIGHUP")?;
    let mut terminate = signal(SignalKind::terminate()).context("Failed to listen for SIGTERM")?;

    let mut rw = ReadWriter::new(
        BufReader::new(tokio::io::stdin()),
        tokio::io::stdout(),
        tokio::io::stderr(),
    );

    debug!(who = %args.who, command = ?args.original_command, "Handling SSH command");

    let run = async {
        match CommandArgs::parse(&args.who, args.original_command.as_deref()) {
            Ok(parsed) => {
                let parsed = parsed
                    .with_git_protocol(args.git_protocol.clone())
                    .with_ssh_connection(args.ssh_connection.as_deref());
                dispatcher.dispatch(&parsed, &mut rw).await
            }
            Err(e) => {
                let identity = ActorIdentity::parse(&args.who);
                dispatcher.reject(identity.as_ref(), &e, &mut rw).await
            }
        }
    };

    let code = tokio::select! {
        code = run => code,
        _ = hangup.recv() => {
            warn!("Client hung up, aborting command");
            ExitCode::GatewayLost
        }
        _ = terminate.recv() => {
            warn!("Terminated, aborting command");
            ExitCode::GatewayLost
        }
    };

    Ok(code)
}
