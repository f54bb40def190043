use crate::traits::{IfIndex, MatcherId, SubscriptionId};

/// Errors that can occur in CAN transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// No interface with the given index exists.
    #[error("no such interface: {0}")]
    NoSuchInterface(IfIndex),

    /// The interface exists but is administratively down.
    #[error("interface {0} is down")]
    InterfaceDown(IfIndex),

    /// An interface with the same name is already registered.
    #[error("interface name already in use: {0}")]
    DuplicateInterface(String),

    /// A frame payload longer than eight bytes was supplied.
    #[error("payload too long ({0} bytes, max 8)")]
    PayloadTooLong(usize),

    /// The matcher registration is unknown (already removed).
    #[error("unknown matcher registration {0:?}")]
    UnknownMatcher(MatcherId),

    /// The interface-event subscription is unknown.
    #[error("unknown event subscription {0:?}")]
    UnknownSubscription(SubscriptionId),

    /// The transport has been shut down.
    #[error("transport shut down")]
    Shutdown,
}

pub type Result<T> = std::result::Result<T, TransportError>;
