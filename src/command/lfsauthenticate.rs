//! `git-lfs-authenticate <repo> <download|upload> [oid]`
//!
//! Authorizes the matching git service first, then asks the API for a
//! short-lived LFS token and prints the JSON document git-lfs expects.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufRead, AsyncWrite};
use tracing::debug;

use super::messages;
use super::readwriter::ReadWriter;
use super::{ActorIdentity, CommandError};
use crate::access::{AccessCheckRequest, AccessDecision, AccessResolver};
use crate::api::{ApiClient, INTERNAL_API_PREFIX};
use crate::cli::ExitCode;

/// LFS transfer direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LfsOperation {
    Download,
    Upload,
}

impl LfsOperation {
    pub fn parse(operation: &str) -> Result<Self, CommandError> {
        match operation {
            "download" => Ok(LfsOperation::Download),
            "upload" => Ok(LfsOperation::Upload),
            other => Err(CommandError::InvalidArgument(
                messages::unknown_lfs_operation(other),
            )),
        }
    }

    /// git service authorized for this direction
    pub fn access_action(&self) -> &'static str {
        match self {
            LfsOperation::Download => "git-upload-pack",
            LfsOperation::Upload => "git-receive-pack",
        }
    }
}

#[derive(Debug, Serialize)]
struct LfsAuthenticateRequest<'a> {
    operation: LfsOperation,
    project: &'a str,
    #[serde(flatten)]
    identity: &'a ActorIdentity,
}

#[derive(Debug, Deserialize)]
struct LfsAuthenticateReply {
    username: String,
    lfs_token: String,
    repository_http_path: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

#[derive(Debug, Serialize)]
struct LfsHeader {
    #[serde(rename = "Authorization")]
    authorization: String,
}

/// Document printed for git-lfs
#[derive(Debug, Serialize)]
struct LfsResponse {
    header: LfsHeader,
    href: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    expires_in: Option<u64>,
}

impl LfsResponse {
    fn from_reply(reply: LfsAuthenticateReply) -> Self {
        let credentials = format!("{}:{}", reply.username, reply.lfs_token);
        Self {
            header: LfsHeader {
                authorization: format!("Basic {}", BASE64.encode(credentials)),
            },
            href: format!(
                "{}/info/lfs",
                reply.repository_http_path.trim_end_matches('/')
            ),
            expires_in: reply.expires_in,
        }
    }
}

pub struct Command<'a> {
    pub client: &'a ApiClient,
    pub identity: &'a ActorIdentity,
    pub repository: &'a str,
    pub operation: &'a str,
    pub remote_ip: Option<&'a str>,
}

impl Command<'_> {
    pub async fn execute<R, W, E>(
        &self,
        rw: &mut ReadWriter<R, W, E>,
    ) -> Result<ExitCode, CommandError>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
        E: AsyncWrite + Unpin,
    {
        let operation = LfsOperation::parse(self.operation)?;

        let access = AccessCheckRequest::new(
            self.identity.clone(),
            operation.access_action(),
            self.repository,
        )
        .with_check_ip(self.remote_ip.map(str::to_string));

        match AccessResolver::new(self.client.clone()).check(&access).await {
            AccessDecision::AllowedLocal(_) | AccessDecision::AllowedWithBackend { .. } => {}
            AccessDecision::Denied(message) => return Err(CommandError::Denied(message)),
            AccessDecision::Error(e) => return Err(e.into()),
        }

        let path = format!("{}/lfs_authenticate", INTERNAL_API_PREFIX);
        let reply: LfsAuthenticateReply = self
            .client
            .post(
                &path,
                &LfsAuthenticateRequest {
                    operation,
                    project: self.repository,
                    identity: self.identity,
                },
            )
            .await?;

        debug!(username = %reply.username, "LFS token issued");
        let document = serde_json::to_string(&LfsResponse::from_reply(reply))
            .map_err(|e| CommandError::Io(std::io::Error::other(e)))?;
        rw.write_out(&format!("{}\n", document)).await?;
        Ok(ExitCode::Success)
    }
}
