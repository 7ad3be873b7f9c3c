//! Command implementations for the git-shell-gateway CLI

pub mod check;
pub mod completion;
pub mod config;
pub mod exec;
pub mod version;
