use bytes::{Buf, BufMut, BytesMut};
use canbcm_transport::{CanFrame, CanId, CAN_MAX_DLEN};

use crate::error::{FrameError, Result};
use crate::message::{BcmMessage, Flags, MsgHead, Opcode, Timeval};

/// Header: opcode (4) + flags (4) + count (4) + ival1 (12) + ival2 (12) + can_id (4) + nframes (4).
pub const HEAD_SIZE: usize = 44;

/// Frame: can_id (4) + len (1) + pad (3) + data (8).
pub const FRAME_SIZE: usize = 16;

/// Default maximum number of frames per message.
pub const DEFAULT_MAX_FRAMES: u32 = 256;

/// Wire size of a message with `nframes` frames.
pub fn message_size(nframes: usize) -> usize {
    HEAD_SIZE + nframes * FRAME_SIZE
}

/// Encode a message into the wire format.
///
/// Wire format (all fields little-endian):
/// ```text
/// ┌────────┬───────┬───────┬──────────────┬──────────────┬────────┬─────────┐
/// │ opcode │ flags │ count │ ival1        │ ival2        │ can_id │ nframes │
/// │ u32    │ u32   │ u32   │ u64 s,u32 us │ u64 s,u32 us │ u32    │ u32     │
/// └────────┴───────┴───────┴──────────────┴──────────────┴────────┴─────────┘
/// followed by nframes × ┌────────┬─────┬─────────┬──────────┐
///                       │ can_id │ len │ pad (3) │ data (8) │
///                       └────────┴─────┴─────────┴──────────┘
/// ```
/// `nframes` is always written as `frames.len()`.
pub fn encode_message(msg: &BcmMessage, dst: &mut BytesMut) {
    let head = &msg.head;
    dst.reserve(message_size(msg.frames.len()));
    dst.put_u32_le(head.opcode as u32);
    dst.put_u32_le(head.flags.bits());
    dst.put_u32_le(head.count);
    put_timeval(dst, head.ival1);
    put_timeval(dst, head.ival2);
    dst.put_u32_le(head.can_id.raw());
    dst.put_u32_le(msg.frames.len() as u32);
    for frame in &msg.frames {
        encode_can_frame(frame, dst);
    }
}

/// Encode a single CAN frame.
pub fn encode_can_frame(frame: &CanFrame, dst: &mut BytesMut) {
    dst.put_u32_le(frame.id.raw());
    dst.put_u8(frame.len());
    dst.put_bytes(0, 3);
    dst.put_slice(&frame.data);
}

fn put_timeval(dst: &mut BytesMut, tv: Timeval) {
    dst.put_u64_le(tv.sec);
    dst.put_u32_le(tv.usec);
}

/// Decode a message from a buffer.
///
/// Returns `Ok(None)` if the buffer doesn't contain a complete message yet.
/// A frame count above `max_frames` is rejected as soon as the header is
/// available. Once the whole message is buffered it is consumed, even when
/// its content turns out to be invalid, so the stream stays aligned.
pub fn decode_message(src: &mut BytesMut, max_frames: u32) -> Result<Option<BcmMessage>> {
    if src.len() < HEAD_SIZE {
        return Ok(None); // Need more data
    }

    let nframes = u32::from_le_bytes([src[40], src[41], src[42], src[43]]);
    if nframes > max_frames {
        return Err(FrameError::TooManyFrames {
            count: nframes,
            max: max_frames,
        });
    }

    let total = message_size(nframes as usize);
    if src.len() < total {
        return Ok(None); // Need more data
    }

    let mut buf = src.split_to(total);
    let raw_opcode = buf.get_u32_le();
    let flags = Flags::from_bits(buf.get_u32_le());
    let count = buf.get_u32_le();
    let ival1 = get_timeval(&mut buf)?;
    let ival2 = get_timeval(&mut buf)?;
    let can_id = CanId(buf.get_u32_le());
    let nframes = buf.get_u32_le();
    let opcode = Opcode::try_from(raw_opcode)?;

    let mut frames = Vec::with_capacity(nframes as usize);
    for _ in 0..nframes {
        frames.push(decode_can_frame(&mut buf)?);
    }

    Ok(Some(BcmMessage {
        head: MsgHead {
            opcode,
            flags,
            count,
            ival1,
            ival2,
            can_id,
            nframes,
        },
        frames,
    }))
}

/// Decode exactly one message from a complete byte slice.
///
/// Trailing bytes beyond the announced frames are ignored; a short slice is
/// reported as [`FrameError::ConnectionClosed`].
pub fn decode_message_slice(bytes: &[u8], max_frames: u32) -> Result<BcmMessage> {
    let mut buf = BytesMut::from(bytes);
    decode_message(&mut buf, max_frames)?.ok_or(FrameError::ConnectionClosed)
}

fn get_timeval(buf: &mut BytesMut) -> Result<Timeval> {
    let sec = buf.get_u64_le();
    let usec = buf.get_u32_le();
    Timeval::new(sec, usec)
}

fn decode_can_frame(buf: &mut BytesMut) -> Result<CanFrame> {
    let id = buf.get_u32_le();
    let len = buf.get_u8();
    buf.advance(3);
    let mut data = [0u8; CAN_MAX_DLEN];
    buf.copy_to_slice(&mut data);
    CanFrame::from_parts(id, len, data).map_err(|_| FrameError::InvalidFrameLength(len))
}

/// Configuration for the message codec.
#[derive(Debug, Clone)]
pub struct CodecConfig {
    /// Maximum frames per message. Default: 256.
    pub max_frames: u32,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            max_frames: DEFAULT_MAX_FRAMES,
        }
    }
}
