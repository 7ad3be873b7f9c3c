//! HTTP transports for the internal API
//!
//! `http://` and `https://` go through reqwest. `http+unix://` opens a
//! fresh Unix socket per request and speaks HTTP/1.1 over it with hyper.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use bytes::Bytes;
use http::header::{AUTHORIZATION, CONTENT_TYPE, HOST, USER_AGENT};
use http_body_util::{BodyExt, Full};
use hyper_util::rt::TokioIo;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::net::UnixStream;
use tracing::{debug, trace};

use super::{ApiError, RawReply, SECRET_HEADER};
use crate::config::ResolvedConfig;

const UNIX_SCHEME: &str = "http+unix://";

/// Headers attached to every request
#[derive(Debug, Clone)]
struct CommonHeaders {
    user_agent: String,
    secret: Option<String>,
    basic_auth: Option<String>,
}

#[derive(Debug, Clone)]
enum Endpoint {
    Tcp {
        client: reqwest::Client,
        base_url: String,
    },
    Unix {
        socket: PathBuf,
        timeout: Duration,
    },
}

/// Transport selected from the configured base URL
#[derive(Debug, Clone)]
pub(crate) struct Transport {
    endpoint: Endpoint,
    headers: CommonHeaders,
}

impl Transport {
    pub(crate) fn from_config(config: &ResolvedConfig) -> crate::Result<Self> {
        let headers = CommonHeaders {
            user_agent: format!("{}/{}", crate::NAME, crate::VERSION),
            secret: config.secret.as_ref().map(|s| BASE64.encode(s.as_bytes())),
            basic_auth: config.http.user.as_ref().map(|user| {
                let password = config.http.password.as_deref().unwrap_or("");
                format!("Basic {}", BASE64.encode(format!("{}:{}", user, password)))
            }),
        };

        let endpoint = if let Some(socket) = config.gitlab_url.strip_prefix(UNIX_SCHEME) {
            if socket.is_empty() {
                return Err(crate::Error::Config(
                    "gitlab_url has an empty socket path".to_string(),
                ));
            }
            Endpoint::Unix {
                socket: PathBuf::from(socket),
                timeout: config.http.read_timeout,
            }
        } else {
            let mut builder = reqwest::Client::builder().timeout(config.http.read_timeout);
            if let Some(ca_file) = &config.http.ca_file {
                let pem = std::fs::read(ca_file).map_err(|e| {
                    crate::Error::Config(format!(
                        "Failed to read CA file '{}': {}",
                        ca_file.display(),
                        e
                    ))
                })?;
                let cert = reqwest::Certificate::from_pem(&pem).map_err(|e| {
                    crate::Error::Config(format!("Invalid CA file '{}': {}", ca_file.display(), e))
                })?;
                builder = builder.add_root_certificate(cert);
            }
            let client = builder
                .build()
                .map_err(|e| crate::Error::Config(format!("Failed to build HTTP client: {}", e)))?;
            Endpoint::Tcp {
                client,
                base_url: config.gitlab_url.clone(),
            }
        };

        Ok(Self { endpoint, headers })
    }

    pub(crate) async fn send(
        &self,
        method: http::Method,
        path: &str,
        body: Option<Bytes>,
    ) -> Result<RawReply, ApiError> {
        trace!(method = %method, path = %path, "Sending internal API request");
        match &self.endpoint {
            Endpoint::Tcp { client, base_url } => {
                self.send_tcp(client, base_url, method, path, body).await
            }
            Endpoint::Unix { socket, timeout } => {
                tokio::time::timeout(*timeout, self.send_unix(socket, method, path, body))
                    .await
                    .map_err(|_| {
                        ApiError::Transport(format!(
                            "request to {} timed out after {:?}",
                            socket.display(),
                            timeout
                        ))
                    })?
            }
        }
    }

    async fn send_tcp(
        &self,
        client: &reqwest::Client,
        base_url: &str,
        method: http::Method,
        path: &str,
        body: Option<Bytes>,
    ) -> Result<RawReply, ApiError> {
        let mut request = client
            .request(method, format!("{}{}", base_url, path))
            .header(USER_AGENT, &self.headers.user_agent);
        if let Some(secret) = &self.headers.secret {
            request = request.header(SECRET_HEADER, secret);
        }
        if let Some(auth) = &self.headers.basic_auth {
            request = request.header(AUTHORIZATION, auth);
        }
        if let Some(body) = body {
            request = request.header(CONTENT_TYPE, "application/json").body(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ApiError::Transport(e.to_string()))?;
        let status = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .map_err(|e| ApiError::Transport(e.to_string()))?;

        Ok(RawReply { status, body })
    }

    async fn send_unix(
        &self,
        socket: &Path,
        method: http::Method,
        path: &str,
        body: Option<Bytes>,
    ) -> Result<RawReply, ApiError> {
        let mut builder = http::Request::builder()
            .method(method)
            .uri(path)
            .header(HOST, "localhost")
            .header(USER_AGENT, &self.headers.user_agent);
        if let Some(secret) = &self.headers.secret {
            builder = builder.header(SECRET_HEADER, secret);
        }
        if let Some(auth) = &self.headers.basic_auth {
            builder = builder.header(AUTHORIZATION, auth);
        }
        if body.is_some() {
            builder = builder.header(CONTENT_TYPE, "application/json");
        }
        let request = builder
            .body(Full::new(body.unwrap_or_default()))
            .map_err(|e| ApiError::Transport(format!("invalid request for {}: {}", path, e)))?;

        let stream = UnixStream::connect(socket).await.map_err(|e| {
            ApiError::Transport(format!("failed to connect to {}: {}", socket.display(), e))
        })?;

        let (mut sender, conn) =
            hyper::client::conn::http1::handshake::<_, Full<Bytes>>(TokioIo::new(stream))
                .await
                .map_err(|e| ApiError::Transport(format!("HTTP handshake failed: {}", e)))?;

        tokio::spawn(async move {
            if let Err(e) = conn.await {
                debug!(error = %e, "Internal API connection closed with error");
            }
        });

        let response = sender
            .send_request(request)
            .await
            .map_err(|e| ApiError::Transport(e.to_string()))?;
        let status = response.status().as_u16();
        let body = response
            .into_body()
            .collect()
            .await
            .map_err(|e| ApiError::Transport(e.to_string()))?
            .to_bytes();

        Ok(RawReply { status, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unix_endpoint_selected() {
        let config = ResolvedConfig::for_url("http+unix:///tmp/gitlab.socket");
        let transport = Transport::from_config(&config).unwrap();
        assert!(matches!(
            transport.endpoint,
            Endpoint::Unix { ref socket, .. } if socket == &PathBuf::from("/tmp/gitlab.socket")
        ));
    }

    #[test]
    fn test_tcp_endpoint_selected() {
        let config = ResolvedConfig::for_url("http://localhost:8080");
        let transport = Transport::from_config(&config).unwrap();
        assert!(matches!(transport.endpoint, Endpoint::Tcp { .. }));
    }

    #[test]
    fn test_empty_socket_path_rejected() {
        let config = ResolvedConfig::for_url("http+unix://");
        assert!(Transport::from_config(&config).is_err());
    }

    #[test]
    fn test_secret_is_base64_encoded() {
        let mut config = ResolvedConfig::for_url("http://localhost:8080");
        config.secret = Some("secret".to_string());
        let transport = Transport::from_config(&config).unwrap();
        assert_eq!(transport.headers.secret.as_deref(), Some("c2VjcmV0"));
    }

    #[tokio::test]
    async fn test_unreachable_socket_is_transport_failure() {
        let dir = tempfile::tempdir().unwrap();
        let socket = dir.path().join("missing.socket");
        let config = ResolvedConfig::for_url(format!("http+unix://{}", socket.display()));
        let transport = Transport::from_config(&config).unwrap();

        let err = transport
            .send(http::Method::GET, "/api/v4/internal/check", None)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Transport(_)));
        assert_eq!(err.to_string(), "Internal API unreachable");
    }
}
