//! Actor identity and SSH command line parsing
//!
//! The set of accepted verbs is the [`COMMANDS`] table. Anything not in it
//! is refused before any network call.

use regex::Regex;
use serde::Serialize;
use std::sync::LazyLock;

use super::CommandError;

const IDENTITY_PATTERN: &str =
    r"^(?:key-(?P<key>\d+)|user-(?P<user>\d+)|username-(?P<name>[A-Za-z0-9_][A-Za-z0-9_.\-]*))$";

static IDENTITY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(IDENTITY_PATTERN).expect("identity pattern is a valid regex"));

/// The authenticated principal a command runs for
///
/// Serializes as a single request field: `{"key_id": "1"}`,
/// `{"user_id": "7"}` or `{"username": "alice"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorIdentity {
    KeyId(String),
    UserId(String),
    Username(String),
}

impl ActorIdentity {
    /// Parse the `key-<id>`, `user-<id>` or `username-<name>` argument
    /// that sshd passes through authorized_keys
    pub fn parse(who: &str) -> Option<Self> {
        let caps = IDENTITY.captures(who)?;
        if let Some(m) = caps.name("key") {
            Some(ActorIdentity::KeyId(m.as_str().to_string()))
        } else if let Some(m) = caps.name("user") {
            Some(ActorIdentity::UserId(m.as_str().to_string()))
        } else {
            caps.name("name")
                .map(|m| ActorIdentity::Username(m.as_str().to_string()))
        }
    }

    /// Build an identity from a key id, rejecting the empty string
    pub fn key_id(id: impl Into<String>) -> Option<Self> {
        let id = id.into();
        (!id.is_empty()).then_some(ActorIdentity::KeyId(id))
    }

    /// `name=value` query parameter for GET endpoints
    pub fn query_param(&self) -> String {
        match self {
            ActorIdentity::KeyId(id) => format!("key_id={}", id),
            ActorIdentity::UserId(id) => format!("user_id={}", id),
            ActorIdentity::Username(name) => format!("username={}", name),
        }
    }
}

impl std::fmt::Display for ActorIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActorIdentity::KeyId(id) => write!(f, "key-{}", id),
            ActorIdentity::UserId(id) => write!(f, "user-{}", id),
            ActorIdentity::Username(name) => write!(f, "username-{}", name),
        }
    }
}

/// Handler family of a verb
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    UploadPack,
    ReceivePack,
    UploadArchive,
    LfsAuthenticate,
    TwoFactorRecover,
    PersonalAccessToken,
    Discover,
}

impl CommandKind {
    /// Whether the command moves repository data
    pub fn is_data_plane(&self) -> bool {
        matches!(
            self,
            CommandKind::UploadPack | CommandKind::ReceivePack | CommandKind::UploadArchive
        )
    }
}

/// One accepted verb
#[derive(Debug)]
pub struct CommandSpec {
    /// Verb as it appears on the SSH command line
    pub verb: &'static str,
    pub kind: CommandKind,
    pub min_args: usize,
    pub max_args: usize,
    /// Shown instead of the generic refusal on wrong arity
    pub usage: Option<&'static str>,
}

pub const PERSONAL_ACCESS_TOKEN_USAGE: &str =
    "Usage: personal_access_token <name> <scope1[,scope2,...]> [ttl_days]";

/// Every verb the gateway accepts
pub static COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        verb: "git-upload-pack",
        kind: CommandKind::UploadPack,
        min_args: 1,
        max_args: 1,
        usage: None,
    },
    CommandSpec {
        verb: "git-receive-pack",
        kind: CommandKind::ReceivePack,
        min_args: 1,
        max_args: 1,
        usage: None,
    },
    CommandSpec {
        verb: "git-upload-archive",
        kind: CommandKind::UploadArchive,
        min_args: 1,
        max_args: 1,
        usage: None,
    },
    CommandSpec {
        verb: "git-lfs-authenticate",
        kind: CommandKind::LfsAuthenticate,
        min_args: 2,
        max_args: 3,
        usage: None,
    },
    CommandSpec {
        verb: "2fa_recovery_codes",
        kind: CommandKind::TwoFactorRecover,
        min_args: 0,
        max_args: 0,
        usage: None,
    },
    CommandSpec {
        verb: "personal_access_token",
        kind: CommandKind::PersonalAccessToken,
        min_args: 2,
        max_args: 3,
        usage: Some(PERSONAL_ACCESS_TOKEN_USAGE),
    },
];

/// Spec used when the SSH command line is empty
pub static DISCOVER: CommandSpec = CommandSpec {
    verb: "discover",
    kind: CommandKind::Discover,
    min_args: 0,
    max_args: 0,
    usage: None,
};

/// Look up a verb in the command table
pub fn lookup(verb: &str) -> Option<&'static CommandSpec> {
    COMMANDS.iter().find(|spec| spec.verb == verb)
}

/// A parsed, allow-listed SSH command
#[derive(Debug, Clone)]
pub struct ShellCommand {
    pub spec: &'static CommandSpec,
    pub args: Vec<String>,
}

impl ShellCommand {
    /// Parse the raw SSH command line
    pub fn parse(line: Option<&str>) -> Result<Self, CommandError> {
        let line = line.unwrap_or("").trim();
        if line.is_empty() {
            return Ok(Self {
                spec: &DISCOVER,
                args: Vec::new(),
            });
        }

        let mut tokens = shlex::split(line).ok_or(CommandError::Disallowed)?;
        if tokens.is_empty() {
            return Err(CommandError::Disallowed);
        }

        // `git upload-pack repo` is the same as `git-upload-pack repo`
        if tokens[0] == "git" && tokens.len() > 1 {
            let sub = tokens.remove(1);
            tokens[0] = format!("git-{}", sub);
        }

        let verb = tokens.remove(0);
        let spec = lookup(&verb).ok_or(CommandError::Disallowed)?;

        if tokens.len() < spec.min_args || tokens.len() > spec.max_args {
            return Err(match spec.usage {
                Some(usage) => CommandError::Usage(usage),
                None => CommandError::Disallowed,
            });
        }

        if spec.kind.is_data_plane() || spec.kind == CommandKind::LfsAuthenticate {
            validate_repository_path(&tokens[0])?;
        }

        Ok(Self { spec, args: tokens })
    }

    pub fn kind(&self) -> CommandKind {
        self.spec.kind
    }

    pub fn verb(&self) -> &'static str {
        self.spec.verb
    }

    /// Repository argument of git and LFS commands
    pub fn repository(&self) -> Option<&str> {
        match self.spec.kind {
            CommandKind::UploadPack
            | CommandKind::ReceivePack
            | CommandKind::UploadArchive
            | CommandKind::LfsAuthenticate => self.args.first().map(String::as_str),
            _ => None,
        }
    }
}

fn validate_repository_path(path: &str) -> Result<(), CommandError> {
    let trimmed = path.trim_matches('/');
    if trimmed.is_empty()
        || path.contains('\0')
        || trimmed.split('/').any(|segment| segment == ".." || segment.is_empty())
    {
        return Err(CommandError::Disallowed);
    }
    Ok(())
}

/// Everything known about one SSH invocation
#[derive(Debug, Clone)]
pub struct CommandArgs {
    /// `None` when sshd handed us no usable identity
    pub identity: Option<ActorIdentity>,
    pub command: ShellCommand,
    /// Value of GIT_PROTOCOL
    pub git_protocol: Option<String>,
    /// Client address from SSH_CONNECTION
    pub remote_ip: Option<String>,
}

impl CommandArgs {
    /// Parse the identity argument and the SSH command line
    pub fn parse(who: &str, original_command: Option<&str>) -> Result<Self, CommandError> {
        Ok(Self {
            identity: ActorIdentity::parse(who),
            command: ShellCommand::parse(original_command)?,
            git_protocol: None,
            remote_ip: None,
        })
    }

    pub fn with_git_protocol(mut self, git_protocol: Option<String>) -> Self {
        self.git_protocol = git_protocol.filter(|p| !p.is_empty());
        self
    }

    /// Take the client address from an SSH_CONNECTION value
    /// (`client_ip client_port server_ip server_port`)
    pub fn with_ssh_connection(mut self, ssh_connection: Option<&str>) -> Self {
        self.remote_ip = ssh_connection
            .and_then(|c| c.split_whitespace().next())
            .map(str::to_string);
        self
    }
}
