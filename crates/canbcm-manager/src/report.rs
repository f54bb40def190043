use std::fmt;

use canbcm_frame::Flags;
use canbcm_transport::IfIndex;
use serde::Serialize;

use crate::channel::BcmChannel;
use crate::op::Direction;

/// Snapshot of a channel's operations and statistics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChannelReport {
    /// Bound interface index; `Some(0)` means every interface.
    pub bound: Option<u32>,
    pub dropped_notifications: u64,
    pub inbound_overruns: u64,
    /// Receive operations that have seen at least one frame.
    pub rx_ops: Vec<RxOpReport>,
    pub tx_ops: Vec<TxOpReport>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RxOpReport {
    pub can_id: String,
    pub ifindex: u32,
    pub frames: usize,
    pub check_length: bool,
    pub timeout_ticks: u64,
    pub throttle_ticks: u64,
    pub received: u64,
    pub notified: u64,
    /// Percentage of received frames that caused no notification.
    pub reduction: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TxOpReport {
    pub can_id: String,
    pub ifindex: u32,
    pub frames: usize,
    pub interval1_ticks: u64,
    pub interval2_ticks: u64,
    pub remaining_count: u32,
    pub sent: u64,
}

impl ChannelReport {
    pub(crate) fn collect(channel: &BcmChannel) -> Self {
        let rx_ops = channel
            .operations(Direction::Rx)
            .filter(|op| op.counters().processed() > 0)
            .map(|op| {
                let (timeout_ticks, throttle_ticks) = op.ticks();
                let counters = op.counters();
                RxOpReport {
                    can_id: op.can_id().to_string(),
                    ifindex: op.ifindex().0,
                    frames: op.active_frames().len(),
                    check_length: op.flags().contains(Flags::RX_CHECK_LENGTH),
                    timeout_ticks,
                    throttle_ticks,
                    received: counters.processed(),
                    notified: counters.notified(),
                    reduction: counters.reduction(),
                }
            })
            .collect();

        let tx_ops = channel
            .operations(Direction::Tx)
            .map(|op| {
                let (interval1_ticks, interval2_ticks) = op.ticks();
                TxOpReport {
                    can_id: op.can_id().to_string(),
                    ifindex: op.ifindex().0,
                    frames: op.active_frames().len(),
                    interval1_ticks,
                    interval2_ticks,
                    remaining_count: op.count(),
                    sent: op.counters().processed(),
                }
            })
            .collect();

        Self {
            bound: channel.bound().map(|ifindex| ifindex.0),
            dropped_notifications: channel.dropped_notifications(),
            inbound_overruns: channel.inbound_overruns(),
            rx_ops,
            tx_ops,
        }
    }
}

impl fmt::Display for ChannelReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bound = match self.bound {
            Some(ifindex) => IfIndex(ifindex).to_string(),
            None => "-".to_string(),
        };
        writeln!(
            f,
            ">>> dropped {} / overruns {} / bound {} <<<",
            self.dropped_notifications, self.inbound_overruns, bound
        )?;

        for op in &self.rx_ops {
            write!(
                f,
                "rx_op: {} {:<5} [{}]{} ",
                op.can_id,
                IfIndex(op.ifindex).to_string(),
                op.frames,
                if op.check_length { 'd' } else { ' ' }
            )?;
            if op.timeout_ticks > 0 {
                write!(f, "timeo={} ", op.timeout_ticks)?;
            }
            if op.throttle_ticks > 0 {
                write!(f, "thr={} ", op.throttle_ticks)?;
            }
            writeln!(
                f,
                "# recv {} ({}) => reduction: {}{}%",
                op.notified,
                op.received,
                if op.reduction == 100 { "near " } else { "" },
                op.reduction
            )?;
        }

        for op in &self.tx_ops {
            write!(
                f,
                "tx_op: {} {} [{}] ",
                op.can_id,
                IfIndex(op.ifindex),
                op.frames
            )?;
            if op.interval1_ticks > 0 {
                write!(f, "t1={} ", op.interval1_ticks)?;
            }
            if op.interval2_ticks > 0 {
                write!(f, "t2={} ", op.interval2_ticks)?;
            }
            writeln!(f, "# sent {}", op.sent)?;
        }
        Ok(())
    }
}
