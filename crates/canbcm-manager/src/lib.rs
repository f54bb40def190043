//! CAN broadcast manager.
//!
//! A [`BcmChannel`] owns cyclic transmit operations and content-filtering
//! receive operations on top of a [`CanTransport`](canbcm_transport::CanTransport).
//! It is driven by control messages from `canbcm-frame` and answers with
//! notifications: `TX_STATUS`, `TX_EXPIRED`, `RX_STATUS`, `RX_TIMEOUT` and
//! `RX_CHANGED`.
//!
//! The channel itself is synchronous and clock-free; time is passed in as
//! scheduler ticks. [`BcmSocket`] wraps it in a tokio task that feeds it
//! received frames and fires its timers on the runtime clock.

pub mod channel;
pub mod config;
pub mod error;
pub mod notify;
pub mod op;
pub mod report;
mod rx;
pub mod socket;
mod table;
pub mod ticks;
mod timer;
mod tx;

pub use channel::{BcmChannel, ChannelQueues, Inbound};
pub use config::{BcmConfig, DEFAULT_INBOUND_QUEUE_DEPTH, DEFAULT_NOTIFY_QUEUE_DEPTH, DEFAULT_TICK_HZ};
pub use error::{BcmError, Result};
pub use notify::{Delivery, Fault, Notification};
pub use op::{Counters, Direction, MirrorSlot, OpId, OpKey, Operation};
pub use report::{ChannelReport, RxOpReport, TxOpReport};
pub use socket::BcmSocket;
pub use ticks::{duration_to_ticks, elapsed_ticks, ticks_to_duration};
