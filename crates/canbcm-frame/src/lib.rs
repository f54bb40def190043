//! Broadcast manager control messages and their wire codec.
//!
//! Every message is a fixed 44-byte little-endian header followed by
//! `nframes` 16-byte CAN frames:
//! - opcode, flags and phase-1 count (`u32` each)
//! - two intervals as seconds (`u64`) plus microseconds (`u32`)
//! - the operation's CAN identifier and the frame count (`u32` each)
//!
//! [`MessageReader`] and [`MessageWriter`] move whole messages over any
//! blocking `Read`/`Write` stream.

pub mod codec;
pub mod error;
pub mod message;
pub mod reader;
pub mod writer;

pub use codec::{
    decode_message, decode_message_slice, encode_can_frame, encode_message, message_size,
    CodecConfig, DEFAULT_MAX_FRAMES, FRAME_SIZE, HEAD_SIZE,
};
pub use error::{FrameError, Result};
pub use message::{BcmMessage, Flags, MsgHead, Opcode, Timeval};
pub use reader::MessageReader;
pub use writer::MessageWriter;
