//! Data-plane execution
//!
//! Allowed git commands either run against the storage service through a
//! framed session ([`Backend`], [`BackendSession`]) or, when the access check
//! returned no backend descriptor, as a local git process ([`GitExecutor`]).

pub mod local;
pub mod proxy;
pub mod upstream;

pub use local::GitExecutor;
pub use proxy::{BackendSession, SessionState};
pub use upstream::{Backend, BackendAddress, Connection};

use thiserror::Error;

/// Data-plane failure
///
/// `Display` is generic; the cause is only available through
/// [`ProxyError::log_detail`].
#[derive(Error, Debug)]
pub enum ProxyError {
    /// Address unusable, connect failed or timed out
    #[error("Failed to connect to storage backend")]
    Connect(String),

    /// Backend answered the session request with `Reject`
    #[error("Storage backend refused the session")]
    Rejected(String),

    /// I/O or framing error after the session was accepted
    #[error("Lost connection to storage backend")]
    Stream(String),
}

impl ProxyError {
    pub fn log_detail(&self) -> String {
        match self {
            ProxyError::Connect(cause) => format!("backend connect failed: {}", cause),
            ProxyError::Rejected(reason) => format!("backend rejected session: {}", reason),
            ProxyError::Stream(cause) => format!("backend stream failed: {}", cause),
        }
    }

    pub(crate) fn stream(e: impl std::fmt::Display) -> Self {
        ProxyError::Stream(e.to_string())
    }
}
