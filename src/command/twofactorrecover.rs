//! `2fa_recovery_codes`: regenerate two-factor recovery codes
//!
//! Prompt, then on an explicit `yes` call the API once and render the
//! result. Declining never touches the network. The call is not retried.

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufRead, AsyncWrite};
use tracing::{info, warn};

use super::messages;
use super::readwriter::{Confirmation, ReadWriter};
use super::{ActorIdentity, CommandError};
use crate::api::{ApiClient, ApiError, INTERNAL_API_PREFIX};
use crate::cli::ExitCode;

#[derive(Debug, Serialize)]
struct RecoveryCodesRequest<'a> {
    #[serde(flatten)]
    identity: &'a ActorIdentity,
}

/// Reply of the recovery codes endpoint
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RecoveryCodesResult {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub recovery_codes: Vec<String>,
    #[serde(default)]
    pub message: Option<String>,
}

pub struct Command<'a> {
    pub client: &'a ApiClient,
    pub identity: Option<&'a ActorIdentity>,
}

impl<'a> Command<'a> {
    pub fn new(client: &'a ApiClient, identity: Option<&'a ActorIdentity>) -> Self {
        Self { client, identity }
    }

    /// Run the prompt and render the transcript to the output stream
    ///
    /// Every failure after confirmation is rendered here, so the only
    /// error returned is a broken operator stream.
    pub async fn execute<R, W, E>(
        &self,
        rw: &mut ReadWriter<R, W, E>,
    ) -> Result<ExitCode, CommandError>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
        E: AsyncWrite + Unpin,
    {
        if rw.confirm(messages::TWO_FACTOR_QUESTION).await? == Confirmation::Declined {
            info!("Recovery code regeneration declined");
            rw.write_out(&messages::recovery_codes_declined()).await?;
            return Ok(ExitCode::Success);
        }

        match self.request().await {
            Ok(codes) => {
                info!(count = codes.len(), "Recovery codes regenerated");
                rw.write_out(&messages::recovery_codes(&codes)).await?;
                Ok(ExitCode::Success)
            }
            Err(detail) => {
                warn!(detail = %detail, "Recovery code regeneration failed");
                rw.write_out(&messages::recovery_codes_error(&detail)).await?;
                Ok(ExitCode::Failure)
            }
        }
    }

    /// Call the API; `Err` holds the detail line under the error header
    async fn request(&self) -> Result<Vec<String>, String> {
        let identity = self
            .identity
            .ok_or_else(|| CommandError::MissingIdentity.to_string())?;

        let path = format!("{}/two_factor_recovery_codes", INTERNAL_API_PREFIX);
        let reply: Result<Option<RecoveryCodesResult>, ApiError> = self
            .client
            .post(&path, &RecoveryCodesRequest { identity })
            .await;

        match reply {
            Ok(Some(result)) if result.success => Ok(result.recovery_codes),
            Ok(Some(result)) => Err(result.message.unwrap_or_default()),
            // Unknown key ids get an empty reply
            Ok(None) => Err(String::new()),
            Err(ApiError::ProtocolViolation { .. }) => Err(String::new()),
            Err(e) => Err(e.to_string()),
        }
    }
}
