//! Storage backend session frames

use crate::access::{BackendDescriptor, RepositoryCoordinates};
use crate::error::{Error, Result};
use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};

/// Frame kinds on a backend session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FrameKind {
    // Gateway to backend
    Request = 1,
    Stdin = 2,
    StdinEof = 3,

    // Backend to gateway
    Stdout = 4,
    Stderr = 5,
    Exit = 6,
    Accept = 7,
    Reject = 8,

    Unknown = 0,
}

impl From<u8> for FrameKind {
    fn from(value: u8) -> Self {
        match value {
            1 => FrameKind::Request,
            2 => FrameKind::Stdin,
            3 => FrameKind::StdinEof,
            4 => FrameKind::Stdout,
            5 => FrameKind::Stderr,
            6 => FrameKind::Exit,
            7 => FrameKind::Accept,
            8 => FrameKind::Reject,
            _ => FrameKind::Unknown,
        }
    }
}

impl From<FrameKind> for u8 {
    fn from(value: FrameKind) -> Self {
        value as u8
    }
}

/// Session header sent as the payload of the `Request` frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRequest {
    /// git service, e.g. "git-upload-pack"
    pub service: String,
    /// Authentication token from the access check
    pub token: String,
    /// Repository coordinates on the storage service
    pub repository: RepositoryCoordinates,
    #[serde(default)]
    pub gl_id: String,
    #[serde(default)]
    pub gl_username: String,
    #[serde(default)]
    pub gl_repository: String,
    #[serde(default)]
    pub gl_project_path: String,
    /// Value of GIT_PROTOCOL from the client
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git_protocol: Option<String>,
    #[serde(default)]
    pub git_config_options: Vec<String>,
}

impl SessionRequest {
    /// Header for a service on the repository named by a descriptor
    pub fn new(service: impl Into<String>, descriptor: &BackendDescriptor) -> Self {
        Self {
            service: service.into(),
            token: descriptor.token.clone(),
            gl_repository: descriptor.repository.gl_repository.clone(),
            gl_project_path: descriptor.repository.gl_project_path.clone(),
            repository: descriptor.repository.clone(),
            gl_id: String::new(),
            gl_username: String::new(),
            git_protocol: None,
            git_config_options: Vec::new(),
        }
    }
}

/// A single frame: kind byte plus payload
#[derive(Debug, Clone)]
pub struct Frame {
    pub kind: FrameKind,
    pub payload: Bytes,
}

impl Frame {
    pub fn new(kind: FrameKind, payload: Bytes) -> Self {
        Self { kind, payload }
    }

    /// Session header frame
    pub fn request(request: &SessionRequest) -> Result<Self> {
        let payload = serde_json::to_vec(request)?;
        Ok(Self::new(FrameKind::Request, Bytes::from(payload)))
    }

    pub fn stdin(data: Bytes) -> Self {
        Self::new(FrameKind::Stdin, data)
    }

    pub fn stdin_eof() -> Self {
        Self::new(FrameKind::StdinEof, Bytes::new())
    }

    pub fn stdout(data: Bytes) -> Self {
        Self::new(FrameKind::Stdout, data)
    }

    pub fn stderr(data: Bytes) -> Self {
        Self::new(FrameKind::Stderr, data)
    }

    pub fn accept() -> Self {
        Self::new(FrameKind::Accept, Bytes::new())
    }

    pub fn reject(reason: &str) -> Self {
        Self::new(FrameKind::Reject, Bytes::copy_from_slice(reason.as_bytes()))
    }

    /// Exit status frame (big-endian i32)
    pub fn exit(status: i32) -> Self {
        let mut payload = BytesMut::with_capacity(4);
        payload.put_i32(status);
        Self::new(FrameKind::Exit, payload.freeze())
    }

    /// Parse the session header from a `Request` frame
    pub fn parse_request(&self) -> Result<SessionRequest> {
        if self.kind != FrameKind::Request {
            return Err(Error::InvalidFrame(format!(
                "Expected Request, got {:?}",
                self.kind
            )));
        }
        Ok(serde_json::from_slice(&self.payload)?)
    }

    /// Parse the status from an `Exit` frame
    pub fn parse_exit_status(&self) -> Result<i32> {
        if self.kind != FrameKind::Exit {
            return Err(Error::InvalidFrame(format!(
                "Expected Exit, got {:?}",
                self.kind
            )));
        }
        let bytes: [u8; 4] = self.payload[..]
            .try_into()
            .map_err(|_| Error::InvalidFrame("Exit status must be 4 bytes".to_string()))?;
        Ok(i32::from_be_bytes(bytes))
    }

    /// Reason text of a `Reject` frame
    pub fn reject_reason(&self) -> String {
        String::from_utf8_lossy(&self.payload).into_owned()
    }

    /// Encode the frame to bytes (including length prefix)
    pub fn encode(&self) -> Bytes {
        let total_len = 1 + self.payload.len();
        let mut buf = BytesMut::with_capacity(4 + total_len);
        buf.put_u32(total_len as u32);
        buf.put_u8(self.kind.into());
        buf.put_slice(&self.payload);
        buf.freeze()
    }

    /// Decode a frame from bytes (excluding length prefix)
    pub fn decode(data: &[u8]) -> Result<Self> {
        let (&kind, payload) = data
            .split_first()
            .ok_or_else(|| Error::InvalidFrame("Empty frame".to_string()))?;

        Ok(Self {
            kind: FrameKind::from(kind),
            payload: Bytes::copy_from_slice(payload),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor() -> BackendDescriptor {
        BackendDescriptor {
            repository: RepositoryCoordinates {
                storage_name: "default".to_string(),
                relative_path: "@hashed/ab/cd.git".to_string(),
                git_object_directory: String::new(),
                git_alternate_object_directories: Vec::new(),
                gl_repository: "project-1".to_string(),
                gl_project_path: "group/project".to_string(),
            },
            address: "unix:/tmp/gitaly.socket".to_string(),
            token: "token".to_string(),
            features: Default::default(),
        }
    }

    #[test]
    fn test_exit_frame() {
        let frame = Frame::exit(128);
        assert_eq!(frame.kind, FrameKind::Exit);
        assert_eq!(frame.parse_exit_status().unwrap(), 128);
    }

    #[test]
    fn test_exit_status_wrong_length() {
        let frame = Frame::new(FrameKind::Exit, Bytes::from_static(&[0, 1]));
        let err = frame.parse_exit_status().unwrap_err();
        assert!(err.to_string().contains("4 bytes"));
    }

    #[test]
    fn test_exit_status_wrong_kind() {
        let err = Frame::stdout(Bytes::new()).parse_exit_status().unwrap_err();
        assert!(err.to_string().contains("Expected Exit"));
    }

    #[test]
    fn test_request_carries_descriptor_fields() {
        let request = SessionRequest::new("git-upload-pack", &descriptor());
        let frame = Frame::request(&request).unwrap();
        let parsed = frame.parse_request().unwrap();

        assert_eq!(parsed.service, "git-upload-pack");
        assert_eq!(parsed.token, "token");
        assert_eq!(parsed.repository.relative_path, "@hashed/ab/cd.git");
        assert_eq!(parsed.gl_repository, "project-1");
        assert_eq!(parsed.gl_project_path, "group/project");
    }

    #[test]
    fn test_encode_layout() {
        let encoded = Frame::stderr(Bytes::from_static(b"hi")).encode();
        assert_eq!(&encoded[..], &[0, 0, 0, 3, 5, b'h', b'i']);
    }

    #[test]
    fn test_decode_empty() {
        assert!(Frame::decode(&[]).is_err());
    }

    #[test]
    fn test_decode_unknown_kind() {
        let frame = Frame::decode(&[42, 1, 2]).unwrap();
        assert_eq!(frame.kind, FrameKind::Unknown);
        assert_eq!(&frame.payload[..], &[1, 2]);
    }

    #[test]
    fn test_reject_reason() {
        assert_eq!(Frame::reject("bad token").reject_reason(), "bad token");
    }
}
