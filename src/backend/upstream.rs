//! Storage backend connection
//!
//! Opens the socket named by a backend descriptor and performs the
//! `Request` / `Accept` handshake.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpStream, UnixStream};
use tracing::{debug, trace};

use super::ProxyError;
use super::proxy::{BackendSession, SessionState, SessionTracker};
use crate::access::BackendDescriptor;
use crate::protocol::{Frame, FrameCodec, FrameKind, SessionRequest};

/// Byte stream to a backend, TCP or Unix
pub trait Connection: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> Connection for T {}

/// Parsed backend address
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendAddress {
    /// `tcp://host:port`
    Tcp(String),
    /// `unix:/path` or `unix:///path`
    Unix(PathBuf),
}

impl BackendAddress {
    pub fn parse(address: &str) -> Result<Self, ProxyError> {
        let address = address.trim();
        if let Some(host) = address.strip_prefix("tcp://") {
            if host.is_empty() || !host.contains(':') {
                return Err(ProxyError::Connect(format!(
                    "tcp address needs host:port: '{}'",
                    address
                )));
            }
            return Ok(BackendAddress::Tcp(host.to_string()));
        }

        if let Some(rest) = address.strip_prefix("unix:") {
            let path = match rest.strip_prefix("//") {
                Some(p) => p,
                None => rest,
            };
            if path.is_empty() {
                return Err(ProxyError::Connect(format!(
                    "unix address has no path: '{}'",
                    address
                )));
            }
            return Ok(BackendAddress::Unix(PathBuf::from(path)));
        }

        Err(ProxyError::Connect(format!(
            "unsupported backend address: '{}'",
            address
        )))
    }
}

impl fmt::Display for BackendAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendAddress::Tcp(host) => write!(f, "tcp://{}", host),
            BackendAddress::Unix(path) => write!(f, "unix:{}", path.display()),
        }
    }
}

/// Storage backend for one session
#[derive(Debug, Clone)]
pub struct Backend {
    address: BackendAddress,
    connect_timeout: Duration,
}

impl Backend {
    pub fn new(address: BackendAddress, connect_timeout: Duration) -> Self {
        Self {
            address,
            connect_timeout,
        }
    }

    /// Backend named by an access check descriptor
    pub fn from_descriptor(
        descriptor: &BackendDescriptor,
        connect_timeout: Duration,
    ) -> Result<Self, ProxyError> {
        Ok(Self::new(
            BackendAddress::parse(&descriptor.address)?,
            connect_timeout,
        ))
    }

    pub fn address(&self) -> &BackendAddress {
        &self.address
    }

    async fn connect(&self) -> Result<Box<dyn Connection>, ProxyError> {
        let conn: Box<dyn Connection> = match &self.address {
            BackendAddress::Tcp(host) => {
                let stream = TcpStream::connect(host)
                    .await
                    .map_err(|e| ProxyError::Connect(format!("{}: {}", self.address, e)))?;
                stream.set_nodelay(true).ok();
                Box::new(stream)
            }
            BackendAddress::Unix(path) => Box::new(
                UnixStream::connect(path)
                    .await
                    .map_err(|e| ProxyError::Connect(format!("{}: {}", self.address, e)))?,
            ),
        };
        trace!(address = %self.address, "Connected to storage backend");
        Ok(conn)
    }

    /// Connect, send the session header and wait for the verdict
    pub async fn open(&self, request: &SessionRequest) -> Result<BackendSession, ProxyError> {
        let mut tracker = SessionTracker::new(self.address.to_string());
        tracker.transition(SessionState::Connecting);

        let handshake = async {
            let mut conn = self.connect().await?;
            let frame = Frame::request(request)
                .map_err(|e| ProxyError::Connect(format!("encode session request: {}", e)))?;
            FrameCodec::write(&mut conn, &frame)
                .await
                .map_err(|e| ProxyError::Connect(format!("send session request: {}", e)))?;

            let reply = FrameCodec::read(&mut conn)
                .await
                .map_err(|e| ProxyError::Connect(format!("read session reply: {}", e)))?
                .ok_or_else(|| {
                    ProxyError::Connect("backend closed before accepting".to_string())
                })?;

            match reply.kind {
                FrameKind::Accept => Ok(conn),
                FrameKind::Reject => Err(ProxyError::Rejected(reply.reject_reason())),
                other => Err(ProxyError::Connect(format!(
                    "expected Accept or Reject, got {:?}",
                    other
                ))),
            }
        };

        let result = tokio::time::timeout(self.connect_timeout, handshake)
            .await
            .unwrap_or_else(|_| {
                Err(ProxyError::Connect(format!(
                    "{} timed out after {:?}",
                    self.address, self.connect_timeout
                )))
            });

        match result {
            Ok(conn) => {
                debug!(address = %self.address, service = %request.service, "Backend session accepted");
                Ok(BackendSession::new(conn, tracker))
            }
            Err(e) => {
                tracker.fail(&e);
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::UnixListener;

    #[test]
    fn test_parse_tcp() {
        assert_eq!(
            BackendAddress::parse("tcp://gitaly.internal:8075").unwrap(),
            BackendAddress::Tcp("gitaly.internal:8075".to_string())
        );
        assert!(BackendAddress::parse("tcp://nohost").is_err());
    }

    #[test]
    fn test_parse_unix_forms() {
        let expected = BackendAddress::Unix(PathBuf::from("/var/run/gitaly.socket"));
        assert_eq!(
            BackendAddress::parse("unix:/var/run/gitaly.socket").unwrap(),
            expected
        );
        assert_eq!(
            BackendAddress::parse("unix:///var/run/gitaly.socket").unwrap(),
            expected
        );
    }

    #[test]
    fn test_parse_rejects_unknown() {
        assert!(BackendAddress::parse("").is_err());
        assert!(BackendAddress::parse("unix:").is_err());
        assert!(BackendAddress::parse("http://localhost").is_err());
    }

    fn request() -> SessionRequest {
        serde_json::from_value(serde_json::json!({
            "service": "git-upload-pack",
            "token": "token",
            "repository": {"storage_name": "default", "relative_path": "repo.git"}
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_open_missing_socket() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Backend::new(
            BackendAddress::Unix(dir.path().join("missing.sock")),
            Duration::from_secs(1),
        );
        let err = backend.open(&request()).await.unwrap_err();
        assert!(matches!(err, ProxyError::Connect(_)));
    }

    #[tokio::test]
    async fn test_open_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("backend.sock");
        let listener = UnixListener::bind(&path).unwrap();

        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let frame = FrameCodec::read(&mut stream).await.unwrap().unwrap();
            assert_eq!(frame.parse_request().unwrap().token, "token");
            FrameCodec::write(&mut stream, &Frame::reject("bad token"))
                .await
                .unwrap();
        });

        let backend = Backend::new(BackendAddress::Unix(path), Duration::from_secs(5));
        let err = backend.open(&request()).await.unwrap_err();
        assert!(matches!(err, ProxyError::Rejected(ref r) if r == "bad token"));
    }

    #[tokio::test]
    async fn test_open_times_out_without_reply() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("silent.sock");
        let listener = UnixListener::bind(&path).unwrap();

        tokio::spawn(async move {
            let (_stream, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
        });

        let backend = Backend::new(BackendAddress::Unix(path), Duration::from_millis(100));
        let err = backend.open(&request()).await.unwrap_err();
        assert!(err.log_detail().contains("timed out"));
    }
}
