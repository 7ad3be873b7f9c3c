//! Internal API client
//!
//! Issues authenticated JSON requests to the control-plane API and decodes
//! typed responses. Every outcome funnels through [`classify`], so callers
//! only ever see a decoded value or an [`ApiError`].
//!
//! The client holds no per-call mutable state and never retries; retry
//! policy belongs to callers.

mod error;
mod transport;

pub use error::{API_UNREACHABLE, ApiError};

use bytes::Bytes;
use serde::Deserialize;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::config::ResolvedConfig;
use transport::Transport;

/// Path prefix of all internal endpoints
pub const INTERNAL_API_PREFIX: &str = "/api/v4/internal";

/// Header carrying the base64-encoded shared secret
pub const SECRET_HEADER: &str = "Gitlab-Shared-Secret";

/// Status and body of a completed HTTP exchange
#[derive(Debug)]
pub(crate) struct RawReply {
    pub status: u16,
    pub body: Bytes,
}

/// Client for the internal API
#[derive(Debug, Clone)]
pub struct ApiClient {
    transport: Transport,
}

impl ApiClient {
    /// Build a client for the configured base URL
    pub fn new(config: &ResolvedConfig) -> crate::Result<Self> {
        Ok(Self {
            transport: Transport::from_config(config)?,
        })
    }

    /// POST a JSON body to an internal endpoint and decode the reply
    pub async fn post<B, T>(&self, path: &str, body: &B) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let payload = serde_json::to_vec(body).map_err(|e| ApiError::ProtocolViolation {
            status: 0,
            detail: format!("failed to encode request body: {}", e),
        })?;

        let reply = self
            .transport
            .send(http::Method::POST, path, Some(Bytes::from(payload)))
            .await;
        Self::finish(path, reply)
    }

    /// GET an internal endpoint and decode the reply
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let reply = self.transport.send(http::Method::GET, path, None).await;
        Self::finish(path, reply)
    }

    fn finish<T: DeserializeOwned>(
        path: &str,
        reply: Result<RawReply, ApiError>,
    ) -> Result<T, ApiError> {
        let result = reply.and_then(|r| {
            debug!(path = %path, status = r.status, bytes = r.body.len(), "Internal API replied");
            classify(r.status, &r.body)
        });

        if let Err(e) = &result {
            warn!(path = %path, kind = e.kind(), detail = %e.log_detail(), "Internal API call failed");
        }
        result
    }
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
}

/// Map an HTTP status and body to a decoded value or an [`ApiError`]
pub(crate) fn classify<T: DeserializeOwned>(status: u16, body: &[u8]) -> Result<T, ApiError> {
    if (200..300).contains(&status) {
        return serde_json::from_slice(body).map_err(|e| ApiError::ProtocolViolation {
            status,
            detail: e.to_string(),
        });
    }

    match serde_json::from_slice::<ErrorBody>(body) {
        Ok(ErrorBody {
            message: Some(message),
        }) => Err(ApiError::DecodedMessage(message)),
        _ => Err(ApiError::HttpStatus(status)),
    }
}
