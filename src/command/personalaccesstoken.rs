//! `personal_access_token <name> <scope[,scope...]> [ttl_days]`

use chrono::{Days, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufRead, AsyncWrite};
use tracing::info;

use super::messages;
use super::readwriter::ReadWriter;
use super::{ActorIdentity, CommandError};
use crate::api::{ApiClient, INTERNAL_API_PREFIX};
use crate::cli::ExitCode;

#[derive(Debug, Serialize)]
struct TokenRequest<'a> {
    #[serde(flatten)]
    identity: &'a ActorIdentity,
    name: &'a str,
    scopes: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    expires_at: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenReply {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    scopes: Vec<String>,
    #[serde(default)]
    expires_at: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// Validated command arguments
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenArgs {
    pub name: String,
    pub scopes: Vec<String>,
    pub expires_at: Option<NaiveDate>,
}

impl TokenArgs {
    /// Parse the positional arguments relative to `today`
    pub fn parse(args: &[String], today: NaiveDate) -> Result<Self, CommandError> {
        let (name, scopes) = match args {
            [name, scopes] | [name, scopes, _] => (name, scopes),
            _ => return Err(CommandError::Usage(super::args::PERSONAL_ACCESS_TOKEN_USAGE)),
        };

        let expires_at = match args.get(2) {
            Some(ttl) => {
                let days: u64 = ttl
                    .parse()
                    .map_err(|_| CommandError::InvalidArgument(messages::invalid_ttl(ttl)))?;
                Some(
                    today
                        .checked_add_days(Days::new(days))
                        .ok_or_else(|| CommandError::InvalidArgument(messages::invalid_ttl(ttl)))?,
                )
            }
            None => None,
        };

        Ok(Self {
            name: name.clone(),
            scopes: scopes
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
            expires_at,
        })
    }
}

pub struct Command<'a> {
    pub client: &'a ApiClient,
    pub identity: &'a ActorIdentity,
    pub args: &'a [String],
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
        let args = TokenArgs::parse(self.args, Utc::now().date_naive())?;

        let path = format!("{}/personal_access_token", INTERNAL_API_PREFIX);
        let reply: TokenReply = self
            .client
            .post(
                &path,
                &TokenRequest {
                    identity: self.identity,
                    name: &args.name,
                    scopes: args.scopes.clone(),
                    expires_at: args.expires_at.map(|d| d.format("%Y-%m-%d").to_string()),
                },
            )
            .await?;

        if !reply.success {
            let message = reply
                .message
                .filter(|m| !m.trim().is_empty())
                .unwrap_or_else(|| messages::TOKEN_CREATION_FAILED.to_string());
            return Err(CommandError::Denied(message));
        }

        info!(name = %args.name, "Personal access token created");
        rw.write_out(&render(&reply)).await?;
        Ok(ExitCode::Success)
    }
}

fn render(reply: &TokenReply) -> String {
    format!(
        "Token:   {}\nScopes:  {}\nExpires: {}\n",
        reply.token.as_deref().unwrap_or(""),
        reply.scopes.join(","),
        reply.expires_at.as_deref().unwrap_or("never")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 30).unwrap()
    }

    #[test]
    fn test_parse_with_ttl() {
        let parsed = TokenArgs::parse(&args(&["ci", "read_api,read_repository", "5"]), today())
            .unwrap();
        assert_eq!(parsed.name, "ci");
        assert_eq!(parsed.scopes, vec!["read_api", "read_repository"]);
        assert_eq!(parsed.expires_at, NaiveDate::from_ymd_opt(2024, 2, 4));
    }

    #[test]
    fn test_parse_without_ttl() {
        let parsed = TokenArgs::parse(&args(&["ci", "api"]), today()).unwrap();
        assert!(parsed.expires_at.is_none());
    }

    #[test]
    fn test_parse_bad_ttl() {
        let err = TokenArgs::parse(&args(&["ci", "api", "soon"]), today()).unwrap_err();
        assert_eq!(err.to_string(), "Invalid value for days_ttl: 'soon'");
    }

    #[test]
    fn test_parse_wrong_arity() {
        let err = TokenArgs::parse(&args(&["ci"]), today()).unwrap_err();
        assert!(err.to_string().starts_with("Usage: personal_access_token"));
    }

    #[test]
    fn test_render() {
        let reply = TokenReply {
            success: true,
            token: Some("glpat-abc".to_string()),
            scopes: vec!["api".to_string(), "read_user".to_string()],
            expires_at: None,
            message: None,
        };
        assert_eq!(
            render(&reply),
            "Token:   glpat-abc\nScopes:  api,read_user\nExpires: never\n"
        );
    }
}
