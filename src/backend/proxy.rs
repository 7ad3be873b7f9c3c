//! Backend stream relay
//!
//! A [`BackendSession`] owns one accepted connection to the storage
//! service. [`BackendSession::relay`] pumps operator stdin to the backend
//! and backend stdout/stderr frames to the operator until the backend
//! reports an exit status. Every relay half lives inside the one future, so
//! dropping the session (or failing any half) closes the socket and the
//! backend sees the session end.

use bytes::Bytes;
use std::fmt;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, trace, warn};

use super::ProxyError;
use super::upstream::Connection;
use crate::protocol::{CHUNK_SIZE, Frame, FrameCodec, FrameKind};

/// Lifecycle of a backend session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Connecting,
    Streaming,
    /// Backend reported an exit status
    Closed,
    /// Connection or stream error
    Failed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionState::Idle => "idle",
            SessionState::Connecting => "connecting",
            SessionState::Streaming => "streaming",
            SessionState::Closed => "closed",
            SessionState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Records and logs state transitions of one session
#[derive(Debug)]
pub(crate) struct SessionTracker {
    address: String,
    state: SessionState,
}

impl SessionTracker {
    pub(crate) fn new(address: String) -> Self {
        Self {
            address,
            state: SessionState::Idle,
        }
    }

    pub(crate) fn transition(&mut self, to: SessionState) {
        trace!(address = %self.address, from = %self.state, to = %to, "Backend session state");
        self.state = to;
    }

    pub(crate) fn fail(&mut self, error: &ProxyError) {
        warn!(
            address = %self.address,
            state = %self.state,
            detail = %error.log_detail(),
            "Backend session failed"
        );
        self.state = SessionState::Failed;
    }

    pub(crate) fn state(&self) -> SessionState {
        self.state
    }
}

/// An accepted backend session
pub struct BackendSession {
    conn: Box<dyn Connection>,
    tracker: SessionTracker,
}

impl std::fmt::Debug for BackendSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendSession")
            .field("state", &self.tracker.state())
            .finish_non_exhaustive()
    }
}

impl BackendSession {
    pub(crate) fn new(conn: Box<dyn Connection>, tracker: SessionTracker) -> Self {
        Self { conn, tracker }
    }

    pub fn state(&self) -> SessionState {
        self.tracker.state()
    }

    /// Relay the operator streams until the backend exits
    ///
    /// Returns the backend's exit status. Stdin reaching end of input only
    /// sends `StdinEof`; the session keeps streaming output until `Exit`.
    pub async fn relay<I, O, E>(
        mut self,
        stdin: I,
        mut stdout: O,
        mut stderr: E,
    ) -> Result<i32, ProxyError>
    where
        I: AsyncRead + Unpin,
        O: AsyncWrite + Unpin,
        E: AsyncWrite + Unpin,
    {
        self.tracker.transition(SessionState::Streaming);

        let result = {
            let (mut reader, mut writer) = tokio::io::split(&mut self.conn);

            let input = pump_stdin(stdin, &mut writer);
            let output = pump_output(&mut reader, &mut stdout, &mut stderr);
            tokio::pin!(input);
            tokio::pin!(output);

            let mut input_open = true;
            loop {
                tokio::select! {
                    res = &mut input, if input_open => match res {
                        Ok(bytes) => {
                            debug!(bytes, "Operator stdin exhausted");
                            input_open = false;
                        }
                        Err(e) => break Err(e),
                    },
                    res = &mut output => break res,
                }
            }
        };

        match result {
            Ok(status) => {
                self.tracker.transition(SessionState::Closed);
                info!(status, "Backend session closed");
                Ok(status)
            }
            Err(e) => {
                self.tracker.fail(&e);
                Err(e)
            }
        }
    }
}

/// Forward operator stdin as `Stdin` frames, then `StdinEof`
async fn pump_stdin<I, W>(mut stdin: I, writer: &mut W) -> Result<u64, ProxyError>
where
    I: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut total = 0u64;
    loop {
        let n = stdin.read(&mut buf).await.map_err(ProxyError::stream)?;
        if n == 0 {
            FrameCodec::write(writer, &Frame::stdin_eof())
                .await
                .map_err(ProxyError::stream)?;
            return Ok(total);
        }
        total += n as u64;
        FrameCodec::write(writer, &Frame::stdin(Bytes::copy_from_slice(&buf[..n])))
            .await
            .map_err(ProxyError::stream)?;
    }
}

/// Forward backend output frames until `Exit`
async fn pump_output<R, O, E>(reader: &mut R, stdout: &mut O, stderr: &mut E) -> Result<i32, ProxyError>
where
    R: AsyncRead + Unpin,
    O: AsyncWrite + Unpin,
    E: AsyncWrite + Unpin,
{
    loop {
        let frame = FrameCodec::read(reader)
            .await
            .map_err(ProxyError::stream)?
            .ok_or_else(|| ProxyError::Stream("backend closed without exit status".to_string()))?;

        match frame.kind {
            FrameKind::Stdout => {
                stdout.write_all(&frame.payload).await.map_err(ProxyError::stream)?;
                stdout.flush().await.map_err(ProxyError::stream)?;
            }
            FrameKind::Stderr => {
                stderr.write_all(&frame.payload).await.map_err(ProxyError::stream)?;
                stderr.flush().await.map_err(ProxyError::stream)?;
            }
            FrameKind::Exit => return frame.parse_exit_status().map_err(ProxyError::stream),
            other => {
                return Err(ProxyError::Stream(format!(
                    "unexpected {:?} frame while streaming",
                    other
                )));
            }
        }
    }
}
