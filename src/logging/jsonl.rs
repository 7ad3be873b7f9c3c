//! JSONL audit log
//!
//! One JSON object per line for every access check, access decision,
//! custom command result and backend session. Secrets and tokens are never
//! recorded.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Mutex;

/// Audit event kinds
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LogEventKind {
    /// Access check sent to the internal API
    AccessCheck,
    /// Outcome of an access check
    AccessDecision,
    /// Result of an interactive custom command
    CustomCommand,
    /// End of a backend or local git session
    BackendSession,
    Error,
}

impl std::fmt::Display for LogEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogEventKind::AccessCheck => write!(f, "access_check"),
            LogEventKind::AccessDecision => write!(f, "access_decision"),
            LogEventKind::CustomCommand => write!(f, "custom_command"),
            LogEventKind::BackendSession => write!(f, "backend_session"),
            LogEventKind::Error => write!(f, "error"),
        }
    }
}

/// Recorded outcome
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    AllowedLocal,
    AllowedWithBackend,
    Denied,
    Error,
}

impl std::fmt::Display for Decision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Decision::AllowedLocal => write!(f, "allowed_local"),
            Decision::AllowedWithBackend => write!(f, "allowed_with_backend"),
            Decision::Denied => write!(f, "denied"),
            Decision::Error => write!(f, "error"),
        }
    }
}

/// A structured audit event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEvent {
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,

    pub kind: LogEventKind,

    /// Actor, e.g. "key-42"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identity: Option<String>,

    /// Command verb
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub repository: Option<String>,

    /// Client address from SSH_CONNECTION
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_ip: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub decision: Option<Decision>,

    /// Denial message or error category
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    /// Storage backend address
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backend: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Additional context as key-value pairs
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<serde_json::Value>,
}

impl LogEvent {
    /// Create a new log event with the current timestamp
    pub fn new(kind: LogEventKind) -> Self {
        Self {
            timestamp: Utc::now(),
            kind,
            identity: None,
            command: None,
            repository: None,
            remote_ip: None,
            decision: None,
            reason: None,
            backend: None,
            exit_code: None,
            error: None,
            context: None,
        }
    }

    pub fn with_identity(mut self, identity: impl Into<String>) -> Self {
        self.identity = Some(identity.into());
        self
    }

    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.command = Some(command.into());
        self
    }

    pub fn with_repository(mut self, repository: impl Into<String>) -> Self {
        self.repository = Some(repository.into());
        self
    }

    pub fn with_remote_ip(mut self, ip: Option<impl Into<String>>) -> Self {
        self.remote_ip = ip.map(Into::into);
        self
    }

    pub fn with_decision(mut self, decision: Decision) -> Self {
        self.decision = Some(decision);
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn with_backend(mut self, address: impl Into<String>) -> Self {
        self.backend = Some(address.into());
        self
    }

    pub fn with_exit_code(mut self, code: i32) -> Self {
        self.exit_code = Some(code);
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    pub fn with_context(mut self, context: serde_json::Value) -> Self {
        self.context = Some(context);
        self
    }

    /// Access check about to be sent
    pub fn access_check(
        identity: impl Into<String>,
        command: impl Into<String>,
        repository: impl Into<String>,
    ) -> Self {
        Self::new(LogEventKind::AccessCheck)
            .with_identity(identity)
            .with_command(command)
            .with_repository(repository)
    }

    /// Outcome of an access check
    pub fn access_decision(
        identity: impl Into<String>,
        command: impl Into<String>,
        repository: impl Into<String>,
        decision: Decision,
    ) -> Self {
        Self::new(LogEventKind::AccessDecision)
            .with_identity(identity)
            .with_command(command)
            .with_repository(repository)
            .with_decision(decision)
    }

    /// Finished custom command
    pub fn custom_command(command: impl Into<String>, exit_code: i32) -> Self {
        Self::new(LogEventKind::CustomCommand)
            .with_command(command)
            .with_exit_code(exit_code)
    }

    /// Finished backend or local session
    pub fn backend_session(command: impl Into<String>, exit_code: i32) -> Self {
        Self::new(LogEventKind::BackendSession)
            .with_command(command)
            .with_exit_code(exit_code)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(LogEventKind::Error).with_error(message)
    }

    /// Serialize the event to a JSON string
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// JSONL file writer with thread-safe buffered output
pub struct JsonlWriter {
    writer: Mutex<BufWriter<File>>,
}

impl JsonlWriter {
    /// Open the file for appending, creating it if needed
    pub fn new<P: AsRef<Path>>(path: P) -> std::io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;

        Ok(Self {
            writer: Mutex::new(BufWriter::new(file)),
        })
    }

    /// Append one event as a line
    pub fn write(&self, event: &LogEvent) -> std::io::Result<()> {
        let json = event
            .to_json()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

        let mut writer = self
            .writer
            .lock()
            .map_err(|_| std::io::Error::other("Lock poisoned"))?;

        writeln!(writer, "{}", json)?;
        writer.flush()
    }

    pub fn flush(&self) -> std::io::Result<()> {
        let mut writer = self
            .writer
            .lock()
            .map_err(|_| std::io::Error::other("Lock poisoned"))?;

        writer.flush()
    }
}

impl Drop for JsonlWriter {
    fn drop(&mut self) {
        let _ = self.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufRead, BufReader};
    use tempfile::NamedTempFile;

    #[test]
    fn test_log_event_builder() {
        let event = LogEvent::access_decision(
            "key-1",
            "git-upload-pack",
            "group/project.git",
            Decision::Denied,
        )
        .with_reason("Disallowed by API call")
        .with_remote_ip(Some("10.0.0.5"));

        assert_eq!(event.kind, LogEventKind::AccessDecision);
        assert_eq!(event.identity.as_deref(), Some("key-1"));
        assert_eq!(event.decision, Some(Decision::Denied));
        assert_eq!(event.remote_ip.as_deref(), Some("10.0.0.5"));
    }

    #[test]
    fn test_log_event_serialize_skips_empty_fields() {
        let event = LogEvent::custom_command("2fa_recovery_codes", 0);
        let json = event.to_json().unwrap();

        assert!(json.contains("\"kind\":\"custom_command\""));
        assert!(json.contains("\"exit_code\":0"));
        assert!(json.contains("\"timestamp\":"));
        assert!(!json.contains("repository"));
    }

    #[test]
    fn test_jsonl_writer() {
        let temp_file = NamedTempFile::new().unwrap();
        let path = temp_file.path().to_path_buf();

        {
            let writer = JsonlWriter::new(&path).unwrap();
            writer
                .write(&LogEvent::access_check("key-1", "git-upload-pack", "a/b.git"))
                .unwrap();
            writer
                .write(&LogEvent::backend_session("git-upload-pack", 0).with_backend("unix:/tmp/s"))
                .unwrap();
        }

        let file = File::open(&path).unwrap();
        let lines: Vec<String> = BufReader::new(file).lines().map(|l| l.unwrap()).collect();

        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("\"kind\":\"access_check\""));
        assert!(lines[1].contains("\"backend\":\"unix:/tmp/s\""));
    }

    #[test]
    fn test_log_event_kind_display() {
        assert_eq!(LogEventKind::AccessDecision.to_string(), "access_decision");
        assert_eq!(LogEventKind::BackendSession.to_string(), "backend_session");
        assert_eq!(Decision::AllowedWithBackend.to_string(), "allowed_with_backend");
    }

    #[test]
    fn test_log_event_deserialize() {
        let event = LogEvent::error("Internal API unreachable").with_reason("transport_failure");
        let parsed: LogEvent = serde_json::from_str(&event.to_json().unwrap()).unwrap();

        assert_eq!(parsed.kind, LogEventKind::Error);
        assert_eq!(parsed.reason.as_deref(), Some("transport_failure"));
    }
}
