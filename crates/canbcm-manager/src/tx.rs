//! Cyclic transmission.
//!
//! A TX operation runs `count` cycles of `interval1`, emits `TX_EXPIRED`
//! when asked to, and then continues with `interval2` until that is zero.

use canbcm_frame::{BcmMessage, Flags, Opcode};
use canbcm_transport::{CanTransport, IfIndex};
use tracing::{debug, trace, warn};

use crate::channel::BcmChannel;
use crate::error::{BcmError, Result};
use crate::op::{Direction, OpId, OpKey, Operation};
use crate::ticks::duration_to_ticks;
use crate::timer::TimerRef;

impl BcmChannel {
    pub(crate) fn tx_setup(&mut self, msg: &BcmMessage, ifindex: IfIndex, now: u64) -> Result<()> {
        if ifindex.is_any() {
            return Err(BcmError::TransportUnavailable);
        }
        let head = &msg.head;
        let n = msg.frames.len();
        if n == 0 {
            return Err(BcmError::InvalidMessage(
                "TX_SETUP needs at least one frame".to_string(),
            ));
        }

        let key = OpKey::new(head.can_id, ifindex);
        let id = match self.table.find(Direction::Tx, key) {
            Some(id) => {
                let capacity = self.table.get(id).map_or(0, Operation::capacity);
                if n > capacity {
                    return Err(BcmError::Capacity {
                        requested: n,
                        capacity,
                    });
                }
                debug!(op = %id, can_id = %key.can_id, %ifindex, frames = n, "tx operation updated");
                id
            }
            None => self
                .table
                .insert(Operation::new(Direction::Tx, key, n)),
        };

        let tick_hz = self.config.tick_hz;
        let transport = &*self.transport;
        let Some((op, timers)) = self.table.op_and_timers(id) else {
            return Ok(());
        };

        for (slot, frame) in op.frames.iter_mut().zip(&msg.frames) {
            *slot = *frame;
            if head.flags.contains(Flags::TX_COPY_ID_INTO_FRAME) {
                slot.id = head.can_id;
            }
        }
        if op.active != n {
            op.active = n;
            op.cursor = 0;
        }

        op.flags = head.flags;
        if op.flags.contains(Flags::TX_RESET_CYCLE_INDEX) {
            op.cursor = 0;
        }

        let primary = TimerRef::primary(id);
        if op.flags.contains(Flags::SET_TIMER) {
            op.count = head.count;
            op.ival1 = head.ival1;
            op.ival2 = head.ival2;
            op.ticks1 = duration_to_ticks(head.ival1.to_duration(), tick_hz);
            op.ticks2 = duration_to_ticks(head.ival2.to_duration(), tick_hz);
            if op.ticks1 == 0 && op.ticks2 == 0 && timers.cancel(primary) {
                debug!(op = %id, "tx timer stopped");
            }
        }

        let start = op.flags.contains(Flags::START_TIMER)
            && ((op.ticks1 > 0 && op.count > 0) || op.ticks2 > 0);
        if start {
            timers.cancel(primary);
            op.flags.insert(Flags::TX_ANNOUNCE);
        }

        if op.flags.contains(Flags::TX_ANNOUNCE) {
            transmit(transport, op);
        }

        if start {
            let interval = if op.ticks1 > 0 && op.count > 0 {
                op.ticks1
            } else {
                op.ticks2
            };
            timers.arm(primary, now.saturating_add(interval));
            debug!(op = %id, interval, count = op.count, "tx timer started");
        }
        Ok(())
    }

    pub(crate) fn tx_send(&mut self, msg: &BcmMessage, ifindex: IfIndex) -> Result<()> {
        let Some(frame) = msg.frames.first() else {
            return Err(BcmError::InvalidMessage(
                "TX_SEND needs a frame".to_string(),
            ));
        };
        if ifindex.is_any() {
            return Err(BcmError::TransportUnavailable);
        }
        self.transport.send(frame, ifindex, true)?;
        trace!(%ifindex, %frame, "single frame sent");
        Ok(())
    }

    pub(crate) fn tx_timer_fired(&mut self, id: OpId, at: u64) {
        let transport = &*self.transport;
        let Some((op, timers)) = self.table.op_and_timers(id) else {
            return;
        };

        if op.ticks1 > 0 && op.count > 0 {
            op.count -= 1;
            if op.count == 0 && op.flags.contains(Flags::TX_COUNT_EVENT) {
                let expired = BcmMessage::header_only(op.head(Opcode::TxExpired, 0));
                self.outbox.message(expired, op.ifindex(), None);
            }
        }

        let interval = if op.ticks1 > 0 && op.count > 0 {
            op.ticks1
        } else {
            op.ticks2
        };
        if interval == 0 {
            debug!(op = %id, "tx timer idle");
            return;
        }
        timers.arm(TimerRef::primary(id), at.saturating_add(interval));
        transmit(transport, op);
    }
}

/// Send the frame under the cursor. Failures leave cursor and statistics
/// untouched.
fn transmit(transport: &dyn CanTransport, op: &mut Operation) {
    let frame = op.frames[op.cursor];
    match transport.send(&frame, op.key.ifindex, true) {
        Ok(()) => {
            op.counters.record_processed();
            op.cursor += 1;
            if op.cursor >= op.active {
                op.cursor = 0;
            }
            trace!(op = %op.id, %frame, "cyclic frame sent");
        }
        Err(err) => {
            warn!(op = %op.id, can_id = %op.key.can_id, ifindex = %op.key.ifindex, error = %err, "cyclic transmission failed");
        }
    }
}
