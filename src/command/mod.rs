//! SSH command handling
//!
//! [`CommandArgs`] is parsed once per connection, then the [`Dispatcher`]
//! routes it to a git handler (access check, then backend or local git) or
//! to one of the interactive custom commands.

pub mod args;
pub mod discover;
pub mod dispatcher;
pub mod lfsauthenticate;
pub mod messages;
pub mod personalaccesstoken;
pub mod readwriter;
pub mod twofactorrecover;

pub use args::{ActorIdentity, COMMANDS, CommandArgs, CommandKind, CommandSpec, ShellCommand};
pub use dispatcher::Dispatcher;
pub use readwriter::{Confirmation, ReadWriter};

use thiserror::Error;

use crate::api::ApiError;
use crate::backend::ProxyError;
use crate::cli::ExitCode;

/// Failure of one command invocation
///
/// `Display` is the single line written to the operator's error stream.
#[derive(Error, Debug)]
pub enum CommandError {
    /// Verb not in the command table, or malformed arguments
    #[error("{}", messages::DISALLOWED_COMMAND)]
    Disallowed,

    /// Known verb with wrong arity
    #[error("{0}")]
    Usage(&'static str),

    /// No actor identity; raised before any network call
    #[error("{}", messages::MISSING_IDENTITY)]
    MissingIdentity,

    #[error("{0}")]
    InvalidArgument(String),

    /// The API said no; message shown verbatim
    #[error("{0}")]
    Denied(String),

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Proxy(#[from] ProxyError),

    /// Operator stream or local process failure
    #[error("Internal error")]
    Io(#[from] std::io::Error),
}

impl CommandError {
    /// Exit code of an invocation that ended with this error
    pub fn exit_code(&self) -> ExitCode {
        match self {
            CommandError::Proxy(_) => ExitCode::GatewayLost,
            _ => ExitCode::Failure,
        }
    }

    /// Audit and log category
    pub fn kind(&self) -> &'static str {
        match self {
            CommandError::Disallowed => "disallowed",
            CommandError::Usage(_) => "usage",
            CommandError::MissingIdentity => "invalid_identity",
            CommandError::InvalidArgument(_) => "invalid_argument",
            CommandError::Denied(_) => "domain_denial",
            CommandError::Api(e) => e.kind(),
            CommandError::Proxy(ProxyError::Stream(_)) => "backend_stream_error",
            CommandError::Proxy(_) => "backend_connect_error",
            CommandError::Io(_) => "io",
        }
    }

    /// Full diagnostic text for logs
    pub fn log_detail(&self) -> String {
        match self {
            CommandError::Api(e) => e.log_detail(),
            CommandError::Proxy(e) => e.log_detail(),
            CommandError::Io(e) => format!("I/O error: {}", e),
            other => other.to_string(),
        }
    }
}
