use canbcm_transport::{CanId, IfIndex};

use crate::op::Direction;

/// Errors returned by broadcast manager channels.
///
/// None of these tear the channel down; the caller may keep using it.
#[derive(Debug, thiserror::Error)]
pub enum BcmError {
    /// Malformed message, unknown opcode or frame count above the limit.
    #[error("protocol error: {0}")]
    Protocol(#[from] canbcm_frame::FrameError),

    /// Well-formed message that cannot be applied.
    #[error("invalid message: {0}")]
    InvalidMessage(String),

    /// An update supplies more frames than the operation was created with.
    #[error("frame buffer capacity exceeded ({requested} frames, capacity {capacity})")]
    Capacity { requested: usize, capacity: usize },

    /// Delete or read of an operation that does not exist.
    #[error("no {direction} operation for {can_id} on {ifindex}")]
    NotFound {
        direction: Direction,
        can_id: CanId,
        ifindex: IfIndex,
    },

    /// Transmission needs a concrete interface and none was resolved.
    #[error("no interface bound and none supplied")]
    TransportUnavailable,

    /// Control message before `connect`.
    #[error("channel is not connected")]
    NotBound,

    /// Second `connect` on the same channel.
    #[error("channel is already connected")]
    AlreadyBound,

    /// Configuration value out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),

    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] canbcm_transport::TransportError),

    /// The channel has been closed.
    #[error("channel closed")]
    Closed,
}

pub type Result<T> = std::result::Result<T, BcmError>;
