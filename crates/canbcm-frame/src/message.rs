//! Broadcast manager message types.
//!
//! A message is a fixed header followed by `nframes` CAN frames. Commands
//! flow from the owning application to the manager; notifications flow back
//! with the same layout.

use std::fmt;
use std::ops::{BitOr, BitOrAssign};
use std::time::Duration;

use canbcm_transport::{CanFrame, CanId};

use crate::error::{FrameError, Result};

/// Message opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum Opcode {
    /// Create or update a cyclic transmission.
    TxSetup = 1,
    /// Remove a cyclic transmission.
    TxDelete = 2,
    /// Read back a cyclic transmission (answered with `TxStatus`).
    TxRead = 3,
    /// Send one frame immediately.
    TxSend = 4,
    /// Create or update a receive filter.
    RxSetup = 5,
    /// Remove a receive filter.
    RxDelete = 6,
    /// Read back a receive filter (answered with `RxStatus`).
    RxRead = 7,
    /// Reply to `TxRead`.
    TxStatus = 8,
    /// Phase-1 count of a cyclic transmission ran out.
    TxExpired = 9,
    /// Reply to `RxRead`.
    RxStatus = 10,
    /// No matching frame arrived within interval 1.
    RxTimeout = 11,
    /// Relevant content change of a received frame.
    RxChanged = 12,
}

impl Opcode {
    pub const ALL: [Opcode; 12] = [
        Opcode::TxSetup,
        Opcode::TxDelete,
        Opcode::TxRead,
        Opcode::TxSend,
        Opcode::RxSetup,
        Opcode::RxDelete,
        Opcode::RxRead,
        Opcode::TxStatus,
        Opcode::TxExpired,
        Opcode::RxStatus,
        Opcode::RxTimeout,
        Opcode::RxChanged,
    ];

    /// Parse a canonical name, case-insensitively (`tx_setup`, `RX_READ`).
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|op| op.name().eq_ignore_ascii_case(name))
    }

    /// True for opcodes the owning application may send.
    pub fn is_command(self) -> bool {
        matches!(
            self,
            Opcode::TxSetup
                | Opcode::TxDelete
                | Opcode::TxRead
                | Opcode::TxSend
                | Opcode::RxSetup
                | Opcode::RxDelete
                | Opcode::RxRead
        )
    }

    /// Canonical upper-case name.
    pub fn name(self) -> &'static str {
        match self {
            Opcode::TxSetup => "TX_SETUP",
            Opcode::TxDelete => "TX_DELETE",
            Opcode::TxRead => "TX_READ",
            Opcode::TxSend => "TX_SEND",
            Opcode::RxSetup => "RX_SETUP",
            Opcode::RxDelete => "RX_DELETE",
            Opcode::RxRead => "RX_READ",
            Opcode::TxStatus => "TX_STATUS",
            Opcode::TxExpired => "TX_EXPIRED",
            Opcode::RxStatus => "RX_STATUS",
            Opcode::RxTimeout => "RX_TIMEOUT",
            Opcode::RxChanged => "RX_CHANGED",
        }
    }
}

impl TryFrom<u32> for Opcode {
    type Error = FrameError;

    fn try_from(raw: u32) -> Result<Self> {
        Ok(match raw {
            1 => Opcode::TxSetup,
            2 => Opcode::TxDelete,
            3 => Opcode::TxRead,
            4 => Opcode::TxSend,
            5 => Opcode::RxSetup,
            6 => Opcode::RxDelete,
            7 => Opcode::RxRead,
            8 => Opcode::TxStatus,
            9 => Opcode::TxExpired,
            10 => Opcode::RxStatus,
            11 => Opcode::RxTimeout,
            12 => Opcode::RxChanged,
            other => return Err(FrameError::UnknownOpcode(other)),
        })
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Behavior flags of a message header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Flags(u32);

impl Flags {
    /// Take count and intervals from the header.
    pub const SET_TIMER: Flags = Flags(0x0001);
    /// Start the timer with the current intervals.
    pub const START_TIMER: Flags = Flags(0x0002);
    /// Emit `TxExpired` when the phase-1 count runs out.
    pub const TX_COUNT_EVENT: Flags = Flags(0x0004);
    /// Send the current frame immediately.
    pub const TX_ANNOUNCE: Flags = Flags(0x0008);
    /// Overwrite frame identifiers with the header identifier.
    pub const TX_COPY_ID_INTO_FRAME: Flags = Flags(0x0010);
    /// Notify on every reception, without content comparison.
    pub const RX_FILTER_BY_ID_ONLY: Flags = Flags(0x0020);
    /// Treat a payload length change as a relevant change.
    pub const RX_CHECK_LENGTH: Flags = Flags(0x0040);
    /// Do not restart the timeout monitor on reception.
    pub const RX_NO_AUTO_TIMER: Flags = Flags(0x0080);
    /// Forget received content on timeout so the next frame is announced.
    pub const RX_ANNOUNCE_ON_RESUME: Flags = Flags(0x0100);
    /// Restart a multi-frame sequence at index 0.
    pub const TX_RESET_CYCLE_INDEX: Flags = Flags(0x0200);
    /// Answer remote requests with the stored frame.
    pub const RX_REPLY_MODE: Flags = Flags(0x0400);

    const NAMES: [(Flags, &'static str); 11] = [
        (Flags::SET_TIMER, "SET_TIMER"),
        (Flags::START_TIMER, "START_TIMER"),
        (Flags::TX_COUNT_EVENT, "TX_COUNT_EVENT"),
        (Flags::TX_ANNOUNCE, "TX_ANNOUNCE"),
        (Flags::TX_COPY_ID_INTO_FRAME, "TX_COPY_ID_INTO_FRAME"),
        (Flags::RX_FILTER_BY_ID_ONLY, "RX_FILTER_BY_ID_ONLY"),
        (Flags::RX_CHECK_LENGTH, "RX_CHECK_LENGTH"),
        (Flags::RX_NO_AUTO_TIMER, "RX_NO_AUTO_TIMER"),
        (Flags::RX_ANNOUNCE_ON_RESUME, "RX_ANNOUNCE_ON_RESUME"),
        (Flags::TX_RESET_CYCLE_INDEX, "TX_RESET_CYCLE_INDEX"),
        (Flags::RX_REPLY_MODE, "RX_REPLY_MODE"),
    ];

    /// No flags set.
    pub const fn empty() -> Self {
        Flags(0)
    }

    /// Flags from raw bits. Unknown bits are preserved.
    pub const fn from_bits(bits: u32) -> Self {
        Flags(bits)
    }

    /// Raw bit value.
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// True if every bit of `other` is set.
    pub const fn contains(self, other: Flags) -> bool {
        self.0 & other.0 == other.0
    }

    /// Set the bits of `other`.
    pub fn insert(&mut self, other: Flags) {
        self.0 |= other.0;
    }

    /// Clear the bits of `other`.
    pub fn remove(&mut self, other: Flags) {
        self.0 &= !other.0;
    }

    /// Parse a flag name as printed by `Display` (e.g. `START_TIMER`).
    pub fn from_name(name: &str) -> Option<Self> {
        Self::NAMES
            .iter()
            .find(|(_, candidate)| candidate.eq_ignore_ascii_case(name))
            .map(|(flag, _)| *flag)
    }
}

impl BitOr for Flags {
    type Output = Flags;

    fn bitor(self, rhs: Flags) -> Flags {
        Flags(self.0 | rhs.0)
    }
}

impl BitOrAssign for Flags {
    fn bitor_assign(&mut self, rhs: Flags) {
        self.0 |= rhs.0;
    }
}

impl fmt::Display for Flags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        let mut rest = self.0;
        for (flag, name) in Self::NAMES {
            if self.contains(flag) {
                if !first {
                    f.write_str("|")?;
                }
                f.write_str(name)?;
                first = false;
                rest &= !flag.0;
            }
        }
        if rest != 0 {
            if !first {
                f.write_str("|")?;
            }
            write!(f, "{rest:#x}")?;
        } else if first {
            f.write_str("-")?;
        }
        Ok(())
    }
}

/// Wire representation of an interval: seconds plus microseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Timeval {
    pub sec: u64,
    pub usec: u32,
}

impl Timeval {
    /// The zero interval ("timer disabled").
    pub const ZERO: Timeval = Timeval { sec: 0, usec: 0 };

    /// Build from seconds and microseconds, rejecting `usec >= 1_000_000`.
    pub fn new(sec: u64, usec: u32) -> Result<Self> {
        if usec >= 1_000_000 {
            return Err(FrameError::InvalidTimeval { usec });
        }
        Ok(Self { sec, usec })
    }

    /// Whole-microsecond value of a duration (sub-microsecond parts are dropped).
    pub fn from_duration(duration: Duration) -> Self {
        Self {
            sec: duration.as_secs(),
            usec: duration.subsec_micros(),
        }
    }

    pub fn from_millis(millis: u64) -> Self {
        Self::from_duration(Duration::from_millis(millis))
    }

    /// Saturates at `Duration::MAX`.
    pub fn to_duration(self) -> Duration {
        Duration::from_secs(self.sec).saturating_add(Duration::from_micros(u64::from(self.usec)))
    }

    pub fn is_zero(self) -> bool {
        self.sec == 0 && self.usec == 0
    }
}

impl fmt::Display for Timeval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:06}s", self.sec, self.usec)
    }
}

/// Fixed message header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MsgHead {
    pub opcode: Opcode,
    pub flags: Flags,
    /// Phase-1 transmission count.
    pub count: u32,
    /// Phase-1 interval (TX) or reception timeout (RX).
    pub ival1: Timeval,
    /// Phase-2 interval (TX) or notification throttle (RX).
    pub ival2: Timeval,
    /// Identifier of the managed operation.
    pub can_id: CanId,
    /// Number of frames following the header.
    pub nframes: u32,
}

impl MsgHead {
    /// A header with the given opcode and identifier and everything else zero.
    pub fn new(opcode: Opcode, can_id: impl Into<CanId>) -> Self {
        Self {
            opcode,
            flags: Flags::empty(),
            count: 0,
            ival1: Timeval::ZERO,
            ival2: Timeval::ZERO,
            can_id: can_id.into(),
            nframes: 0,
        }
    }
}

/// A header plus its frames.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BcmMessage {
    pub head: MsgHead,
    pub frames: Vec<CanFrame>,
}

impl BcmMessage {
    /// Build a message; `head.nframes` is set from `frames`.
    pub fn new(mut head: MsgHead, frames: Vec<CanFrame>) -> Self {
        head.nframes = frames.len() as u32;
        Self { head, frames }
    }

    /// A message without frames.
    pub fn header_only(head: MsgHead) -> Self {
        Self::new(head, Vec::new())
    }

    /// Builder-style flag setter.
    pub fn with_flags(mut self, flags: Flags) -> Self {
        self.head.flags = flags;
        self
    }

    /// Builder-style timer setter.
    pub fn with_timers(mut self, count: u32, ival1: Timeval, ival2: Timeval) -> Self {
        self.head.count = count;
        self.head.ival1 = ival1;
        self.head.ival2 = ival2;
        self
    }

    pub fn opcode(&self) -> Opcode {
        self.head.opcode
    }
}

impl fmt::Display for BcmMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let head = &self.head;
        write!(
            f,
            "{} id={} flags={} count={} ival1={} ival2={} nframes={}",
            head.opcode, head.can_id, head.flags, head.count, head.ival1, head.ival2, head.nframes
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opcode_roundtrip_and_unknown() {
        for raw in 1..=12u32 {
            let opcode = Opcode::try_from(raw).unwrap();
            assert_eq!(opcode as u32, raw);
        }
        assert!(matches!(
            Opcode::try_from(0),
            Err(FrameError::UnknownOpcode(0))
        ));
        assert!(matches!(
            Opcode::try_from(13),
            Err(FrameError::UnknownOpcode(13))
        ));
    }

    #[test]
    fn opcode_from_name() {
        assert_eq!(Opcode::from_name("tx_setup"), Some(Opcode::TxSetup));
        assert_eq!(Opcode::from_name("RX_CHANGED"), Some(Opcode::RxChanged));
        assert_eq!(Opcode::from_name("RX_NOPE"), None);
        assert!(Opcode::ALL.iter().all(|op| Opcode::from_name(op.name()) == Some(*op)));
    }

    #[test]
    fn command_opcodes() {
        assert!(Opcode::TxSetup.is_command());
        assert!(Opcode::RxRead.is_command());
        assert!(!Opcode::RxChanged.is_command());
        assert!(!Opcode::TxStatus.is_command());
    }

    #[test]
    fn flags_display_and_parse() {
        let flags = Flags::SET_TIMER | Flags::START_TIMER;
        assert_eq!(flags.to_string(), "SET_TIMER|START_TIMER");
        assert_eq!(Flags::empty().to_string(), "-");
        assert_eq!(Flags::from_bits(0x8001).to_string(), "SET_TIMER|0x8000");
        assert_eq!(Flags::from_name("rx_check_length"), Some(Flags::RX_CHECK_LENGTH));
        assert_eq!(Flags::from_name("bogus"), None);
    }

    #[test]
    fn flags_insert_remove() {
        let mut flags = Flags::empty();
        flags.insert(Flags::TX_ANNOUNCE);
        flags |= Flags::SET_TIMER;
        assert!(flags.contains(Flags::TX_ANNOUNCE | Flags::SET_TIMER));
        flags.remove(Flags::TX_ANNOUNCE);
        assert!(!flags.contains(Flags::TX_ANNOUNCE));
        assert_eq!(flags.bits(), 0x1);
    }

    #[test]
    fn timeval_validation_and_conversion() {
        assert!(Timeval::new(1, 999_999).is_ok());
        assert!(matches!(
            Timeval::new(0, 1_000_000),
            Err(FrameError::InvalidTimeval { usec: 1_000_000 })
        ));
        let tv = Timeval::from_millis(1500);
        assert_eq!(tv, Timeval { sec: 1, usec: 500_000 });
        assert_eq!(tv.to_duration(), Duration::from_millis(1500));
        assert!(Timeval::ZERO.is_zero());
    }

    #[test]
    fn message_new_sets_frame_count() {
        let frames = vec![CanFrame::new(0x1, &[1]).unwrap(); 3];
        let msg = BcmMessage::new(MsgHead::new(Opcode::TxSetup, 0x1), frames);
        assert_eq!(msg.head.nframes, 3);
        assert_eq!(msg.opcode(), Opcode::TxSetup);
    }
}
