//! Exit code definitions for git-shell-gateway
//!
//! The SSH client sees these as the remote command's exit status.

/// Exit codes for the application
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    /// Successful execution, or an explicit decline at a prompt
    Success,
    /// Denial, API error, usage error
    Failure,
    /// Configuration or bootstrap error
    Config,
    /// Status reported by the storage backend or local git, passed through
    Backend(i32),
    /// Connection to the storage backend failed or was lost
    GatewayLost,
}

impl ExitCode {
    /// Sentinel status for a lost backend; distinct from backend statuses
    pub const GATEWAY_LOST: u8 = 255;

    /// Exit code for a reported process status
    pub fn from_status(status: i32) -> Self {
        if status == 0 {
            ExitCode::Success
        } else {
            ExitCode::Backend(status)
        }
    }

    /// Numeric process exit status
    pub fn code(&self) -> u8 {
        match self {
            ExitCode::Success => 0,
            ExitCode::Failure => 1,
            ExitCode::Config => 2,
            ExitCode::Backend(status) => u8::try_from(*status).unwrap_or(1),
            ExitCode::GatewayLost => Self::GATEWAY_LOST,
        }
    }
}

impl From<ExitCode> for u8 {
    fn from(code: ExitCode) -> Self {
        code.code()
    }
}

impl From<ExitCode> for std::process::ExitCode {
    fn from(code: ExitCode) -> Self {
        std::process::ExitCode::from(code.code())
    }
}
