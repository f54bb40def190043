use std::fmt;
use std::time::SystemTime;

use canbcm_frame::{Flags, MsgHead, Opcode, Timeval};
use canbcm_transport::{CanFrame, CanId, IfIndex, MatcherId, RxInfo};
use serde::Serialize;

/// Which table an operation lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Tx,
    Rx,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Tx => f.write_str("tx"),
            Direction::Rx => f.write_str("rx"),
        }
    }
}

/// Stable handle of an operation. Never reused within a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OpId(pub(crate) u64);

impl fmt::Display for OpId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "op{}", self.0)
    }
}

/// Uniqueness key of an operation within one direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OpKey {
    pub can_id: CanId,
    pub ifindex: IfIndex,
}

impl OpKey {
    pub fn new(can_id: CanId, ifindex: IfIndex) -> Self {
        Self { can_id, ifindex }
    }
}

/// Last observed frame for one receive slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MirrorSlot {
    pub frame: CanFrame,
    /// A frame has been stored since creation or the last reset.
    pub received: bool,
    /// A change is waiting for the throttle timer.
    pub throttled: bool,
    pub ifindex: IfIndex,
    pub timestamp: Option<SystemTime>,
}

impl Default for MirrorSlot {
    fn default() -> Self {
        Self {
            frame: CanFrame::default(),
            received: false,
            throttled: false,
            ifindex: IfIndex::ANY,
            timestamp: None,
        }
    }
}

impl MirrorSlot {
    /// Back to "never received".
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Processed/notified statistics of an operation.
///
/// Both counters are reset together so the reduction ratio never mixes
/// values from different epochs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Counters {
    pub(crate) processed: u64,
    pub(crate) notified: u64,
}

impl Counters {
    /// Frames received (RX) or sent (TX).
    pub fn processed(&self) -> u64 {
        self.processed
    }

    /// Change notifications emitted (RX only).
    pub fn notified(&self) -> u64 {
        self.notified
    }

    pub(crate) fn record_processed(&mut self) {
        match self.processed.checked_add(1) {
            Some(next) => self.processed = next,
            None => *self = Self::default(),
        }
    }

    pub(crate) fn record_notified(&mut self) {
        self.notified += 1;
        if self.notified > u64::MAX / 100 {
            *self = Self::default();
        }
    }

    /// Percentage of processed frames that did not cause a notification.
    pub fn reduction(&self) -> u64 {
        if self.processed == 0 {
            return 0;
        }
        let notified = u128::from(self.notified) * 100 / u128::from(self.processed);
        100u64.saturating_sub(u64::try_from(notified).unwrap_or(u64::MAX))
    }
}

/// One managed transmit or receive rule.
#[derive(Debug, Clone)]
pub struct Operation {
    pub(crate) id: OpId,
    pub(crate) direction: Direction,
    pub(crate) key: OpKey,
    pub(crate) flags: Flags,
    /// Fixed-capacity frame buffer; only `..active` is in use.
    pub(crate) frames: Vec<CanFrame>,
    pub(crate) active: usize,
    /// Receive baselines, same length as `frames`. Empty for TX.
    pub(crate) mirrors: Vec<MirrorSlot>,
    pub(crate) count: u32,
    pub(crate) ival1: Timeval,
    pub(crate) ival2: Timeval,
    pub(crate) ticks1: u64,
    pub(crate) ticks2: u64,
    pub(crate) cursor: usize,
    pub(crate) last_notify: Option<u64>,
    pub(crate) counters: Counters,
    pub(crate) matcher: Option<MatcherId>,
    /// Origin of the most recent reception (RX).
    pub(crate) last_rx: Option<RxInfo>,
}

impl Operation {
    pub(crate) fn new(direction: Direction, key: OpKey, capacity: usize) -> Self {
        let mirrors = match direction {
            Direction::Tx => Vec::new(),
            Direction::Rx => vec![MirrorSlot::default(); capacity],
        };
        Self {
            id: OpId(0),
            direction,
            key,
            flags: Flags::empty(),
            frames: vec![CanFrame::default(); capacity],
            active: 0,
            mirrors,
            count: 0,
            ival1: Timeval::ZERO,
            ival2: Timeval::ZERO,
            ticks1: 0,
            ticks2: 0,
            cursor: 0,
            last_notify: None,
            counters: Counters::default(),
            matcher: None,
            last_rx: None,
        }
    }

    pub fn id(&self) -> OpId {
        self.id
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn key(&self) -> OpKey {
        self.key
    }

    pub fn can_id(&self) -> CanId {
        self.key.can_id
    }

    pub fn ifindex(&self) -> IfIndex {
        self.key.ifindex
    }

    pub fn flags(&self) -> Flags {
        self.flags
    }

    /// Frame buffer size fixed at creation.
    pub fn capacity(&self) -> usize {
        self.frames.len()
    }

    /// Frames currently in use.
    pub fn active_frames(&self) -> &[CanFrame] {
        &self.frames[..self.active]
    }

    pub fn mirrors(&self) -> &[MirrorSlot] {
        &self.mirrors
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn ticks(&self) -> (u64, u64) {
        (self.ticks1, self.ticks2)
    }

    pub fn counters(&self) -> Counters {
        self.counters
    }

    /// Interface a notification about this operation is attributed to.
    pub(crate) fn origin(&self) -> IfIndex {
        match self.last_rx {
            Some(info) => info.ifindex,
            None => self.key.ifindex,
        }
    }

    /// Notification header echoing this operation's state.
    pub(crate) fn head(&self, opcode: Opcode, nframes: usize) -> MsgHead {
        MsgHead {
            opcode,
            flags: self.flags,
            count: self.count,
            ival1: self.ival1,
            ival2: self.ival2,
            can_id: self.key.can_id,
            nframes: nframes as u32,
        }
    }

    pub(crate) fn reset_mirrors(&mut self) {
        for slot in &mut self.mirrors {
            slot.reset();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notified_overflow_resets_both() {
        let mut counters = Counters {
            processed: u64::MAX - 1,
            notified: u64::MAX / 100,
        };
        counters.record_notified();
        assert_eq!(counters, Counters::default());
    }

    #[test]
    fn processed_overflow_resets_both() {
        let mut counters = Counters {
            processed: u64::MAX,
            notified: 7,
        };
        counters.record_processed();
        assert_eq!(counters, Counters::default());
    }

    #[test]
    fn reduction_percentage() {
        let counters = Counters {
            processed: 200,
            notified: 50,
        };
        assert_eq!(counters.reduction(), 75);
        assert_eq!(Counters::default().reduction(), 0);
        let none_filtered = Counters {
            processed: 10,
            notified: 10,
        };
        assert_eq!(none_filtered.reduction(), 0);
    }

    #[test]
    fn rx_ops_get_mirrors() {
        let key = OpKey::new(CanId(0x123), IfIndex(1));
        let rx = Operation::new(Direction::Rx, key, 3);
        let tx = Operation::new(Direction::Tx, key, 3);
        assert_eq!(rx.mirrors().len(), 3);
        assert!(rx.mirrors().iter().all(|m| !m.received && !m.throttled));
        assert!(tx.mirrors().is_empty());
        assert_eq!(rx.capacity(), 3);
        assert!(rx.active_frames().is_empty());
    }
}
