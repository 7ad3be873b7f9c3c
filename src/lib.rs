//! git-shell-gateway - SSH entry point for git hosting
//!
//! sshd runs the gateway once per connection with the SSH command line in
//! `SSH_ORIGINAL_COMMAND`. The gateway asks the internal API whether the
//! actor may run it, then either proxies the git streams to the storage
//! backend, runs git locally, or runs one of the interactive custom
//! commands such as two-factor recovery code regeneration.

pub mod access;
pub mod api;
pub mod backend;
pub mod cli;
pub mod command;
pub mod config;
pub mod error;
pub mod logging;
pub mod protocol;

pub use error::{Error, Result};

/// Package version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Package name
pub const NAME: &str = env!("CARGO_PKG_NAME");
