use std::io::{ErrorKind, Read};

use bytes::BytesMut;

use crate::codec::{decode_message, CodecConfig, HEAD_SIZE};
use crate::error::{FrameError, Result};
use crate::message::BcmMessage;

const INITIAL_BUFFER_CAPACITY: usize = 4 * 1024;
const READ_CHUNK_SIZE: usize = 4 * 1024;

/// Reads complete broadcast manager messages from any `Read` stream.
///
/// Partial reads are buffered internally; callers only ever see whole
/// messages.
pub struct MessageReader<T> {
    inner: T,
    buf: BytesMut,
    config: CodecConfig,
}

impl<T: Read> MessageReader<T> {
    /// Create a new message reader with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, CodecConfig::default())
    }

    /// Create a new message reader with explicit configuration.
    pub fn with_config(inner: T, config: CodecConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            config,
        }
    }

    /// Read the next complete message (blocking).
    ///
    /// Returns `Err(FrameError::ConnectionClosed)` when EOF is reached.
    pub fn read_message(&mut self) -> Result<BcmMessage> {
        self.next_message()?.ok_or(FrameError::ConnectionClosed)
    }

    /// Read the next complete message, or `None` on EOF at a message boundary.
    ///
    /// EOF in the middle of a message is still reported as
    /// [`FrameError::ConnectionClosed`].
    pub fn next_message(&mut self) -> Result<Option<BcmMessage>> {
        loop {
            if let Some(msg) = decode_message(&mut self.buf, self.config.max_frames)? {
                return Ok(Some(msg));
            }

            let mut chunk = [0u8; READ_CHUNK_SIZE];
            let read = match self.inner.read(&mut chunk) {
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            };

            if read == 0 {
                if self.buf.is_empty() {
                    return Ok(None);
                }
                tracing::debug!(
                    buffered = self.buf.len(),
                    header = HEAD_SIZE,
                    "stream ended inside a message"
                );
                return Err(FrameError::ConnectionClosed);
            }

            self.buf.extend_from_slice(&chunk[..read]);
        }
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the reader and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Update the frame limit for subsequent decoding.
    pub fn set_max_frames(&mut self, max_frames: u32) {
        self.config.max_frames = max_frames;
    }

    /// Current reader configuration.
    pub fn config(&self) -> &CodecConfig {
        &self.config
    }
}

impl<T: Read> Iterator for MessageReader<T> {
    type Item = Result<BcmMessage>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_message().transpose()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use canbcm_transport::CanFrame;

    use super::*;
    use crate::codec::encode_message;
    use crate::message::{MsgHead, Opcode, Timeval};

    fn wire_of(msgs: &[BcmMessage]) -> Vec<u8> {
        let mut wire = BytesMut::new();
        for msg in msgs {
            encode_message(msg, &mut wire);
        }
        wire.to_vec()
    }

    fn tx_setup(id: u32, payloads: &[&[u8]]) -> BcmMessage {
        let frames = payloads
            .iter()
            .map(|p| CanFrame::new(id, p).unwrap())
            .collect();
        BcmMessage::new(MsgHead::new(Opcode::TxSetup, id), frames).with_timers(
            0,
            Timeval::ZERO,
            Timeval::from_millis(100),
        )
    }

    #[test]
    fn read_single_message() {
        let msg = tx_setup(0x100, &[b"hello"]);
        let mut reader = MessageReader::new(Cursor::new(wire_of(&[msg.clone()])));

        assert_eq!(reader.read_message().unwrap(), msg);
    }

    #[test]
    fn read_multiple_messages() {
        let msgs = vec![
            tx_setup(0x1, &[b"one"]),
            BcmMessage::header_only(MsgHead::new(Opcode::RxDelete, 0x2)),
            tx_setup(0x3, &[b"a", b"b", b"c"]),
        ];
        let mut reader = MessageReader::new(Cursor::new(wire_of(&msgs)));

        for expected in &msgs {
            assert_eq!(&reader.read_message().unwrap(), expected);
        }
    }

    #[test]
    fn read_message_with_many_frames() {
        let payloads: Vec<[u8; 8]> = (0..200u8).map(|i| [i; 8]).collect();
        let refs: Vec<&[u8]> = payloads.iter().map(|p| p.as_slice()).collect();
        let msg = tx_setup(0x7FF, &refs);
        let mut reader = MessageReader::new(Cursor::new(wire_of(&[msg.clone()])));

        let decoded = reader.read_message().unwrap();
        assert_eq!(decoded.frames.len(), 200);
        assert_eq!(decoded, msg);
    }

    #[test]
    fn partial_read_handling() {
        let msg = tx_setup(0x44, &[b"slow"]);
        let byte_reader = ByteByByteReader {
            bytes: wire_of(&[msg.clone()]),
            pos: 0,
        };
        let mut reader = MessageReader::new(byte_reader);

        assert_eq!(reader.read_message().unwrap(), msg);
    }

    #[test]
    fn connection_closed_cleanly() {
        let mut reader = MessageReader::new(Cursor::new(Vec::<u8>::new()));
        let err = reader.read_message().unwrap_err();
        assert!(matches!(err, FrameError::ConnectionClosed));
    }

    #[test]
    fn next_message_none_at_boundary() {
        let msg = tx_setup(0x5, &[b"x"]);
        let mut reader = MessageReader::new(Cursor::new(wire_of(&[msg])));

        assert!(reader.next_message().unwrap().is_some());
        assert!(reader.next_message().unwrap().is_none());
    }

    #[test]
    fn connection_closed_mid_message() {
        let mut wire = wire_of(&[tx_setup(0x5, &[b"partial"])]);
        wire.truncate(HEAD_SIZE + 6);

        let mut reader = MessageReader::new(Cursor::new(wire));
        let err = reader.next_message().unwrap_err();
        assert!(matches!(err, FrameError::ConnectionClosed));
    }

    #[test]
    fn unknown_opcode_in_stream() {
        let mut wire = wire_of(&[tx_setup(0x5, &[b"x"])]);
        wire[0..4].copy_from_slice(&99u32.to_le_bytes());

        let mut reader = MessageReader::new(Cursor::new(wire));
        let err = reader.read_message().unwrap_err();
        assert!(matches!(err, FrameError::UnknownOpcode(99)));
    }

    #[test]
    fn too_many_frames_in_stream() {
        let wire = wire_of(&[tx_setup(0x5, &[b"a", b"b", b"c"])]);
        let cfg = CodecConfig { max_frames: 2 };
        let mut reader = MessageReader::with_config(Cursor::new(wire), cfg);

        let err = reader.read_message().unwrap_err();
        assert!(matches!(
            err,
            FrameError::TooManyFrames { count: 3, max: 2 }
        ));
    }

    #[test]
    fn set_max_frames_applies() {
        let wire = wire_of(&[tx_setup(0x5, &[b"a", b"b"])]);
        let mut reader = MessageReader::new(Cursor::new(wire));
        reader.set_max_frames(1);

        assert_eq!(reader.config().max_frames, 1);
        assert!(reader.read_message().is_err());
    }

    #[test]
    fn iterator_yields_all_messages() {
        let msgs = vec![tx_setup(0x1, &[b"1"]), tx_setup(0x2, &[b"2"])];
        let reader = MessageReader::new(Cursor::new(wire_of(&msgs)));

        let read: Vec<BcmMessage> = reader.map(|m| m.unwrap()).collect();
        assert_eq!(read, msgs);
    }

    #[derive(Debug)]
    struct ByteByByteReader {
        bytes: Vec<u8>,
        pos: usize,
    }

    impl Read for ByteByByteReader {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if self.pos >= self.bytes.len() || buf.is_empty() {
                return Ok(0);
            }

            buf[0] = self.bytes[self.pos];
            self.pos += 1;
            Ok(1)
        }
    }

    #[test]
    fn roundtrip_over_pipe() {
        let (left, right) = std::os::unix::net::UnixStream::pair().unwrap();
        let mut writer = crate::writer::MessageWriter::new(left);
        let mut reader = MessageReader::new(right);

        let msg = BcmMessage::header_only(MsgHead::new(Opcode::TxRead, 0x123));
        writer.write_message(&msg).unwrap();

        assert_eq!(reader.read_message().unwrap(), msg);
    }

    #[test]
    fn accessors_and_into_inner() {
        let cursor = Cursor::new(Vec::<u8>::new());
        let mut reader = MessageReader::new(cursor);

        let _ = reader.get_ref();
        let _ = reader.get_mut();
        let _inner = reader.into_inner();
    }

    #[test]
    fn read_would_block_propagates_io_error() {
        let reader = FlakyReader {
            first: Some(ErrorKind::WouldBlock),
            bytes: wire_of(&[tx_setup(0x7, &[b"ok"])]),
            pos: 0,
        };
        let mut framed = MessageReader::new(reader);
        let err = framed.read_message().unwrap_err();
        assert!(matches!(err, FrameError::Io(e) if e.kind() == ErrorKind::WouldBlock));
    }

    #[test]
    fn interrupted_read_retries() {
        let msg = tx_setup(0x8, &[b"ok"]);
        let reader = FlakyReader {
            first: Some(ErrorKind::Interrupted),
            bytes: wire_of(&[msg.clone()]),
            pos: 0,
        };
        let mut framed = MessageReader::new(reader);

        assert_eq!(framed.read_message().unwrap(), msg);
    }

    struct FlakyReader {
        first: Option<ErrorKind>,
        bytes: Vec<u8>,
        pos: usize,
    }

    impl Read for FlakyReader {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if let Some(kind) = self.first.take() {
                return Err(std::io::Error::from(kind));
            }
            let n = (self.bytes.len() - self.pos).min(buf.len());
            buf[..n].copy_from_slice(&self.bytes[self.pos..self.pos + n]);
            self.pos += n;
            Ok(n)
        }
    }
}
