use std::time::SystemTime;

use canbcm_frame::BcmMessage;
use canbcm_transport::IfIndex;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::debug;

/// A message queued for the owning application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub message: BcmMessage,
    /// Reception interface for RX notifications, operation interface for TX.
    pub ifindex: IfIndex,
    /// Reception time of the frame carried by `RX_CHANGED`.
    pub timestamp: Option<SystemTime>,
}

/// Asynchronous channel error caused by an interface event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// The bound interface went down.
    InterfaceDown(IfIndex),
    /// The bound interface was removed; the channel is no longer connected.
    InterfaceRemoved(IfIndex),
}

/// Everything the owner can receive from a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    Message(Notification),
    Fault(Fault),
}

impl Delivery {
    pub fn as_message(&self) -> Option<&BcmMessage> {
        match self {
            Delivery::Message(notification) => Some(&notification.message),
            Delivery::Fault(_) => None,
        }
    }
}

/// Sending half of the owner queue. Never blocks; overflow is counted.
#[derive(Debug)]
pub(crate) struct Outbox {
    tx: Option<mpsc::Sender<Delivery>>,
    dropped: u64,
}

impl Outbox {
    pub(crate) fn new(tx: mpsc::Sender<Delivery>) -> Self {
        Self {
            tx: Some(tx),
            dropped: 0,
        }
    }

    pub(crate) fn push(&mut self, delivery: Delivery) {
        let Some(tx) = &self.tx else {
            self.dropped += 1;
            return;
        };
        match tx.try_send(delivery) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                self.dropped += 1;
                debug!(dropped = self.dropped, "notification queue full");
            }
            Err(TrySendError::Closed(_)) => {
                self.dropped += 1;
            }
        }
    }

    pub(crate) fn message(
        &mut self,
        message: BcmMessage,
        ifindex: IfIndex,
        timestamp: Option<SystemTime>,
    ) {
        self.push(Delivery::Message(Notification {
            message,
            ifindex,
            timestamp,
        }));
    }

    pub(crate) fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Drop the sender so the owner sees end-of-stream after draining.
    pub(crate) fn close(&mut self) {
        self.tx = None;
    }
}
