//! Empty SSH command: greet the authenticated user

use serde::Deserialize;
use tokio::io::{AsyncBufRead, AsyncWrite};

use super::messages;
use super::readwriter::ReadWriter;
use super::{ActorIdentity, CommandError};
use crate::api::{ApiClient, INTERNAL_API_PREFIX};
use crate::cli::ExitCode;

/// User as reported by the discover endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct DiscoveredUser {
    #[serde(default)]
    pub id: Option<u64>,
    pub username: String,
    #[serde(default)]
    pub name: Option<String>,
}

pub struct Command<'a> {
    pub client: &'a ApiClient,
    pub identity: &'a ActorIdentity,
}

impl<'a> Command<'a> {
    pub fn new(client: &'a ApiClient, identity: &'a ActorIdentity) -> Self {
        Self { client, identity }
    }

    pub async fn execute<R, W, E>(
        &self,
        rw: &mut ReadWriter<R, W, E>,
    ) -> Result<ExitCode, CommandError>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
        E: AsyncWrite + Unpin,
    {
        let path = format!(
            "{}/discover?{}",
            INTERNAL_API_PREFIX,
            self.identity.query_param()
        );
        let user: Option<DiscoveredUser> = self.client.get(&path).await?;

        let greeting = match user {
            Some(user) => messages::welcome(&user.username),
            None => messages::WELCOME_ANONYMOUS.to_string(),
        };
        rw.write_out(&format!("{}\n", greeting)).await?;
        Ok(ExitCode::Success)
    }
}
