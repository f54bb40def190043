use std::fmt;
use std::sync::Arc;
use std::time::SystemTime;

use crate::can::{CanFrame, CanId};
use crate::error::Result;

/// Interface handle. Index 0 is the wildcard meaning "any interface".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct IfIndex(pub u32);

impl IfIndex {
    /// The "any interface" wildcard.
    pub const ANY: IfIndex = IfIndex(0);

    /// True for the wildcard handle.
    pub fn is_any(self) -> bool {
        self.0 == 0
    }
}

impl From<u32> for IfIndex {
    fn from(raw: u32) -> Self {
        Self(raw)
    }
}

impl fmt::Display for IfIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_any() {
            f.write_str("any")
        } else {
            write!(f, "if{}", self.0)
        }
    }
}

/// Reception metadata handed to frame handlers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RxInfo {
    /// Interface the frame was received on.
    pub ifindex: IfIndex,
    /// Reception time stamp.
    pub timestamp: SystemTime,
}

/// Handle of a registered frame matcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MatcherId(pub u64);

/// Handle of an interface-event subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(pub u64);

/// Interface lifecycle notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterfaceEvent {
    /// The interface went administratively down.
    Down(IfIndex),
    /// The interface was removed from the system.
    Removed(IfIndex),
}

impl InterfaceEvent {
    /// The interface this event refers to.
    pub fn ifindex(&self) -> IfIndex {
        match self {
            InterfaceEvent::Down(ifindex) | InterfaceEvent::Removed(ifindex) => *ifindex,
        }
    }
}

/// Callback invoked for every frame matching a registration.
///
/// Handlers run on the delivering thread and must not block.
pub type FrameHandler = Arc<dyn Fn(&CanFrame, RxInfo) + Send + Sync>;

/// Callback invoked for interface lifecycle events.
pub type EventHandler = Arc<dyn Fn(InterfaceEvent) + Send + Sync>;

/// A frame-oriented bus transport.
///
/// Implementations must allow registration and unregistration from many
/// channels concurrently, and must not hold internal locks while invoking
/// handlers.
pub trait CanTransport: Send + Sync {
    /// Transmit `frame` on `ifindex`. With `loopback`, local matchers on that
    /// interface receive the frame as well.
    fn send(&self, frame: &CanFrame, ifindex: IfIndex, loopback: bool) -> Result<()>;

    /// Register `handler` for frames whose identifier matches `can_id` under `mask`.
    ///
    /// `IfIndex::ANY` receives from every interface.
    fn register_matcher(
        &self,
        ifindex: IfIndex,
        can_id: CanId,
        mask: u32,
        handler: FrameHandler,
    ) -> Result<MatcherId>;

    /// Remove a registration created by [`CanTransport::register_matcher`].
    fn unregister_matcher(&self, id: MatcherId) -> Result<()>;

    /// True if `ifindex` names an existing interface.
    fn interface_exists(&self, ifindex: IfIndex) -> bool;

    /// Subscribe to interface lifecycle events.
    fn subscribe_interface_events(&self, handler: EventHandler) -> Result<SubscriptionId>;

    /// Cancel an interface-event subscription.
    fn unsubscribe_interface_events(&self, id: SubscriptionId) -> Result<()>;
}
