//! Routes one parsed SSH command to its handler
//!
//! Exactly one handler runs per invocation. Any error ends up as a single
//! line on the operator's error stream and a defined exit code.

use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncWrite};
use tracing::{info, warn};

use super::args::{CommandArgs, CommandKind};
use super::readwriter::ReadWriter;
use super::{ActorIdentity, CommandError};
use super::{discover, lfsauthenticate, personalaccesstoken, twofactorrecover};
use crate::access::{AccessCheckRequest, AccessDecision, AccessResolver};
use crate::api::ApiClient;
use crate::backend::{Backend, GitExecutor};
use crate::cli::ExitCode;
use crate::config::ResolvedConfig;
use crate::logging::{Decision, JsonlWriter, LogEvent};
use crate::protocol::SessionRequest;

/// Command router for one gateway process
pub struct Dispatcher {
    config: ResolvedConfig,
    client: ApiClient,
    audit: Option<Arc<JsonlWriter>>,
}

impl Dispatcher {
    pub fn new(config: ResolvedConfig) -> crate::Result<Self> {
        let client = ApiClient::new(&config)?;
        Ok(Self {
            config,
            client,
            audit: None,
        })
    }

    /// Record decisions and results in the audit log
    pub fn with_audit(mut self, audit: Option<Arc<JsonlWriter>>) -> Self {
        self.audit = audit;
        self
    }

    pub fn client(&self) -> &ApiClient {
        &self.client
    }

    /// Run a parsed command and return the process exit code
    pub async fn dispatch<R, W, E>(
        &self,
        args: &CommandArgs,
        rw: &mut ReadWriter<R, W, E>,
    ) -> ExitCode
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
        E: AsyncWrite + Unpin,
    {
        match self.execute(args, rw).await {
            Ok(code) => code,
            Err(e) => self.reject(args.identity.as_ref(), &e, rw).await,
        }
    }

    /// Report a failure to the operator and pick the exit code
    pub async fn reject<R, W, E>(
        &self,
        identity: Option<&ActorIdentity>,
        error: &CommandError,
        rw: &mut ReadWriter<R, W, E>,
    ) -> ExitCode
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
        E: AsyncWrite + Unpin,
    {
        match error {
            CommandError::Disallowed
            | CommandError::Usage(_)
            | CommandError::InvalidArgument(_)
            | CommandError::Denied(_) => {
                info!(kind = error.kind(), message = %error, "Command refused");
            }
            _ => {
                warn!(kind = error.kind(), detail = %error.log_detail(), "Command failed");
            }
        }

        let mut event = LogEvent::error(error.to_string()).with_reason(error.kind());
        if let Some(identity) = identity {
            event = event.with_identity(identity.to_string());
        }
        self.record(event);

        if let Err(e) = rw.write_err(&format!("{}\n", error)).await {
            warn!(error = %e, "Failed to write error to operator");
        }
        error.exit_code()
    }

    async fn execute<R, W, E>(
        &self,
        args: &CommandArgs,
        rw: &mut ReadWriter<R, W, E>,
    ) -> Result<ExitCode, CommandError>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
        E: AsyncWrite + Unpin,
    {
        let command = &args.command;

        // Identity is checked after the prompt for this one
        if command.kind() == CommandKind::TwoFactorRecover {
            let code = twofactorrecover::Command::new(&self.client, args.identity.as_ref())
                .execute(rw)
                .await?;
            self.record(LogEvent::custom_command(command.verb(), code.code().into()));
            return Ok(code);
        }

        let identity = args
            .identity
            .as_ref()
            .ok_or(CommandError::MissingIdentity)?;

        match command.kind() {
            CommandKind::UploadPack | CommandKind::ReceivePack | CommandKind::UploadArchive => {
                self.run_git(identity, args, rw).await
            }
            CommandKind::LfsAuthenticate => {
                let code = lfsauthenticate::Command {
                    client: &self.client,
                    identity,
                    repository: &command.args[0],
                    operation: &command.args[1],
                    remote_ip: args.remote_ip.as_deref(),
                }
                .execute(rw)
                .await?;
                self.record(LogEvent::custom_command(command.verb(), code.code().into()));
                Ok(code)
            }
            CommandKind::PersonalAccessToken => {
                let code = personalaccesstoken::Command {
                    client: &self.client,
                    identity,
                    args: &command.args,
                }
                .execute(rw)
                .await?;
                self.record(LogEvent::custom_command(command.verb(), code.code().into()));
                Ok(code)
            }
            CommandKind::Discover => discover::Command::new(&self.client, identity).execute(rw).await,
            CommandKind::TwoFactorRecover => Err(CommandError::Disallowed),
        }
    }

    /// Access check, then backend session or local git
    async fn run_git<R, W, E>(
        &self,
        identity: &ActorIdentity,
        args: &CommandArgs,
        rw: &mut ReadWriter<R, W, E>,
    ) -> Result<ExitCode, CommandError>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
        E: AsyncWrite + Unpin,
    {
        let service = args.command.verb();
        let repository = args.command.repository().ok_or(CommandError::Disallowed)?;

        let request = AccessCheckRequest::new(identity.clone(), service, repository)
            .with_check_ip(args.remote_ip.clone());
        self.record(
            LogEvent::access_check(identity.to_string(), service, repository)
                .with_remote_ip(args.remote_ip.clone()),
        );

        let decision = AccessResolver::new(self.client.clone()).check(&request).await;
        self.record_decision(identity, service, repository, &decision);

        match decision {
            AccessDecision::AllowedLocal(_) => {
                let executor = GitExecutor::new(&self.config.git_bin, &self.config.repos_path);
                let status = executor
                    .run(
                        service,
                        repository,
                        args.git_protocol.as_deref(),
                        &mut rw.input,
                        &mut rw.out,
                        &mut rw.err_out,
                    )
                    .await?;
                self.record(LogEvent::backend_session(service, status).with_backend("local"));
                Ok(ExitCode::from_status(status))
            }
            AccessDecision::AllowedWithBackend { response, backend } => {
                let mut session_request = SessionRequest::new(service, &backend);
                session_request.gl_id = response.gl_id.unwrap_or_default();
                session_request.gl_username = response.gl_username.unwrap_or_default();
                if let Some(gl_repository) = response.gl_repository {
                    session_request.gl_repository = gl_repository;
                }
                if let Some(gl_project_path) = response.gl_project_path {
                    session_request.gl_project_path = gl_project_path;
                }
                session_request.git_protocol = args.git_protocol.clone();
                session_request.git_config_options = response.git_config_options;

                let target = Backend::from_descriptor(&backend, self.config.backend_connect_timeout)?;
                let session = target.open(&session_request).await?;
                let status = session
                    .relay(&mut rw.input, &mut rw.out, &mut rw.err_out)
                    .await?;

                self.record(
                    LogEvent::backend_session(service, status).with_backend(target.address().to_string()),
                );
                Ok(ExitCode::from_status(status))
            }
            AccessDecision::Denied(message) => Err(CommandError::Denied(message)),
            AccessDecision::Error(e) => Err(e.into()),
        }
    }

    fn record_decision(
        &self,
        identity: &ActorIdentity,
        service: &str,
        repository: &str,
        decision: &AccessDecision,
    ) {
        let (outcome, reason) = match decision {
            AccessDecision::AllowedLocal(_) => (Decision::AllowedLocal, None),
            AccessDecision::AllowedWithBackend { .. } => (Decision::AllowedWithBackend, None),
            AccessDecision::Denied(message) => (Decision::Denied, Some(message.clone())),
            AccessDecision::Error(e) => (Decision::Error, Some(e.kind().to_string())),
        };
        let mut event = LogEvent::access_decision(identity.to_string(), service, repository, outcome);
        if let Some(reason) = reason {
            event = event.with_reason(reason);
        }
        self.record(event);
    }

    fn record(&self, event: LogEvent) {
        if let Some(audit) = &self.audit {
            if let Err(e) = audit.write(&event) {
                warn!(error = %e, "Failed to write audit event");
            }
        }
    }
}
