/// Errors that can occur while encoding or decoding broadcast manager messages.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The opcode field holds an unknown value.
    #[error("unknown opcode {0}")]
    UnknownOpcode(u32),

    /// A frame declares more than eight payload bytes.
    #[error("invalid frame length {0} (max 8)")]
    InvalidFrameLength(u8),

    /// An interval carries a microsecond field outside `0..1_000_000`.
    #[error("invalid interval: {usec} microseconds")]
    InvalidTimeval { usec: u32 },

    /// The header announces more frames than the configured maximum.
    #[error("too many frames ({count}, max {max})")]
    TooManyFrames { count: u32, max: u32 },

    /// An I/O error occurred while reading or writing messages.
    #[error("message I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The stream was closed before a complete message was received.
    #[error("connection closed (incomplete message)")]
    ConnectionClosed,
}

pub type Result<T> = std::result::Result<T, FrameError>;
