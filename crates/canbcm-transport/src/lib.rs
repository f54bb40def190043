//! CAN bus transport abstraction.
//!
//! This is the lowest layer of canbcm. It defines the frame types carried on
//! the bus and the [`CanTransport`] trait the broadcast manager drives:
//! transmitting frames, registering identifier matchers and observing
//! interface lifecycle events.
//!
//! [`VirtualBus`] is an in-memory implementation with any number of virtual
//! interfaces, used for simulation and tests.

pub mod can;
pub mod error;
pub mod traits;
pub mod vbus;

pub use can::{
    CanFrame, CanId, CAN_EFF_FLAG, CAN_EFF_MASK, CAN_ERR_FLAG, CAN_MAX_DLEN, CAN_RTR_FLAG,
    CAN_SFF_MASK,
};
pub use error::{Result, TransportError};
pub use traits::{
    CanTransport, EventHandler, FrameHandler, IfIndex, InterfaceEvent, MatcherId, RxInfo,
    SubscriptionId,
};
pub use vbus::VirtualBus;
