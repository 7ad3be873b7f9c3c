//! Storage backend session protocol
//!
//! A session is a byte stream of length-prefixed frames:
//! `u32 length | u8 kind | payload`, big-endian. The gateway opens with a
//! `Request` frame and the backend answers `Accept` or `Reject`; after
//! that stdin, stdout and stderr travel as separate frame kinds until the
//! backend sends `Exit`.

pub mod codec;
pub mod frame;

pub use codec::{CHUNK_SIZE, FrameCodec, MAX_FRAME_SIZE};
pub use frame::{Frame, FrameKind, SessionRequest};
