//! Length-prefixed frame codec for tokio

use crate::error::{Error, Result};
use crate::protocol::frame::Frame;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Maximum frame size (kind byte plus payload)
pub const MAX_FRAME_SIZE: u32 = 1024 * 1024;

/// Largest data payload the gateway puts in one frame
pub const CHUNK_SIZE: usize = 32 * 1024;

/// Codec for reading and writing backend session frames
pub struct FrameCodec;

impl FrameCodec {
    /// Read a frame; `None` on a clean end of stream
    pub async fn read<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Option<Frame>> {
        let mut len_buf = [0u8; 4];
        match reader.read_exact(&mut len_buf).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e.into()),
        }

        let len = u32::from_be_bytes(len_buf);
        if len == 0 {
            return Err(Error::InvalidFrame("Zero-length frame".to_string()));
        }
        if len > MAX_FRAME_SIZE {
            return Err(Error::InvalidFrame(format!("Frame too large: {} bytes", len)));
        }

        let mut buf = vec![0u8; len as usize];
        reader.read_exact(&mut buf).await?;

        Ok(Some(Frame::decode(&buf)?))
    }

    /// Write a frame and flush
    pub async fn write<W: AsyncWrite + Unpin>(writer: &mut W, frame: &Frame) -> Result<()> {
        writer.write_all(&frame.encode()).await?;
        writer.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::FrameKind;
    use bytes::Bytes;

    #[tokio::test]
    async fn test_write_then_read() {
        let mut buf = Vec::new();
        FrameCodec::write(&mut buf, &Frame::stdout(Bytes::from_static(b"0008NAK\n")))
            .await
            .unwrap();
        FrameCodec::write(&mut buf, &Frame::exit(0)).await.unwrap();

        let mut reader = &buf[..];
        let first = FrameCodec::read(&mut reader).await.unwrap().unwrap();
        assert_eq!(first.kind, FrameKind::Stdout);
        assert_eq!(&first.payload[..], b"0008NAK\n");

        let second = FrameCodec::read(&mut reader).await.unwrap().unwrap();
        assert_eq!(second.parse_exit_status().unwrap(), 0);

        assert!(FrameCodec::read(&mut reader).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_zero_length_rejected() {
        let data = [0u8, 0, 0, 0];
        let mut reader = &data[..];
        let err = FrameCodec::read(&mut reader).await.unwrap_err();
        assert!(err.to_string().contains("Zero-length"));
    }

    #[tokio::test]
    async fn test_oversized_rejected() {
        let data = (MAX_FRAME_SIZE + 1).to_be_bytes();
        let mut reader = &data[..];
        let err = FrameCodec::read(&mut reader).await.unwrap_err();
        assert!(err.to_string().contains("too large"));
    }

    #[tokio::test]
    async fn test_truncated_body_is_error() {
        let data = [0u8, 0, 0, 5, 4, b'a'];
        let mut reader = &data[..];
        assert!(FrameCodec::read(&mut reader).await.is_err());
    }
}
