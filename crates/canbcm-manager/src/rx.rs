//! Receive filtering, change detection, throttling and timeout monitoring.

use std::sync::Arc;

use canbcm_frame::{BcmMessage, Flags, Opcode};
use canbcm_transport::{CanFrame, FrameHandler, IfIndex, RxInfo};
use tracing::{debug, trace, warn};

use crate::channel::{enqueue, BcmChannel, Inbound};
use crate::error::{BcmError, Result};
use crate::notify::Outbox;
use crate::op::{Direction, OpId, OpKey, Operation};
use crate::ticks::duration_to_ticks;
use crate::timer::{TimerQueue, TimerRef};

/// Ticks after which notifications held back by the throttle are released
/// when the timers of a throttled operation are reprogrammed.
const THROTTLE_FLUSH_TICKS: u64 = 2;

impl BcmChannel {
    pub(crate) fn rx_setup(&mut self, msg: &BcmMessage, ifindex: IfIndex, now: u64) -> Result<()> {
        let head = &msg.head;
        let mut flags = head.flags;
        let mut frames: &[CanFrame] = &msg.frames;
        if flags.contains(Flags::RX_FILTER_BY_ID_ONLY) || frames.is_empty() {
            flags.insert(Flags::RX_FILTER_BY_ID_ONLY);
            frames = &[];
        }
        if flags.contains(Flags::RX_REPLY_MODE) && (frames.len() != 1 || !head.can_id.is_rtr()) {
            return Err(BcmError::InvalidMessage(
                "reply mode needs exactly one frame and an RTR identifier".to_string(),
            ));
        }

        let n = frames.len();
        let key = OpKey::new(head.can_id, ifindex);
        let id = match self.table.find(Direction::Rx, key) {
            Some(id) => {
                let capacity = self.table.get(id).map_or(0, Operation::capacity);
                if n > capacity {
                    return Err(BcmError::Capacity {
                        requested: n,
                        capacity,
                    });
                }
                debug!(op = %id, can_id = %key.can_id, %ifindex, frames = n, "rx operation updated");
                id
            }
            None => {
                let id = self.table.peek_id();
                let (tx, overruns) = self.inbound_sender();
                let handler: FrameHandler = Arc::new(move |frame: &CanFrame, info: RxInfo| {
                    enqueue(
                        &tx,
                        &overruns,
                        Inbound::Frame {
                            op: id,
                            frame: *frame,
                            info,
                        },
                    )
                });
                let matcher = self.transport.register_matcher(
                    ifindex,
                    head.can_id,
                    head.can_id.registration_mask(),
                    handler,
                )?;
                let mut op = Operation::new(Direction::Rx, key, n.max(1));
                op.matcher = Some(matcher);
                self.table.insert(op)
            }
        };

        let tick_hz = self.config.tick_hz;
        let Some((op, timers)) = self.table.op_and_timers(id) else {
            return Ok(());
        };

        op.frames[..n].copy_from_slice(frames);
        for slot in &mut op.mirrors[..n] {
            slot.reset();
        }
        op.active = n;
        op.flags = flags;

        let primary = TimerRef::primary(id);
        let throttle = TimerRef::throttle(id);
        if flags.contains(Flags::RX_REPLY_MODE) {
            timers.cancel_all(id);
            if flags.contains(Flags::TX_COPY_ID_INTO_FRAME) || op.frames[0].id == head.can_id {
                op.frames[0].id = head.can_id.without_rtr();
            }
            return Ok(());
        }

        if flags.contains(Flags::SET_TIMER) {
            op.count = head.count;
            op.ival1 = head.ival1;
            op.ival2 = head.ival2;
            op.ticks1 = duration_to_ticks(head.ival1.to_duration(), tick_hz);
            op.ticks2 = duration_to_ticks(head.ival2.to_duration(), tick_hz);
            if op.ticks1 == 0 && timers.cancel(primary) {
                debug!(op = %id, "rx timeout stopped");
            }
            if timers.is_armed(throttle) {
                timers.arm(throttle, now.saturating_add(THROTTLE_FLUSH_TICKS));
            }
        }

        if flags.contains(Flags::START_TIMER) && op.ticks1 > 0 {
            timers.arm(primary, now.saturating_add(op.ticks1));
            debug!(op = %id, timeout = op.ticks1, "rx timeout started");
        }
        Ok(())
    }

    pub(crate) fn rx_frame(&mut self, id: OpId, frame: &CanFrame, info: RxInfo, now: u64) {
        let transport = &*self.transport;
        let Some((op, timers)) = self.table.op_and_timers(id) else {
            trace!(op = %id, "frame for removed operation");
            return;
        };

        op.counters.record_processed();
        op.last_rx = Some(info);
        let primary = TimerRef::primary(id);
        timers.cancel(primary);

        if frame.id != op.key.can_id {
            trace!(op = %id, %frame, "identifier mismatch");
            return;
        }

        if op.flags.contains(Flags::RX_REPLY_MODE) {
            let target = if op.key.ifindex.is_any() {
                info.ifindex
            } else {
                op.key.ifindex
            };
            let reply = op.frames[0];
            if let Err(err) = transport.send(&reply, target, true) {
                warn!(op = %id, ifindex = %target, error = %err, "reply transmission failed");
            }
            return;
        }

        if let Some(slot) = changed_slot(op, frame) {
            update_and_send(op, timers, &mut self.outbox, slot, frame, info, now);
        }

        if !op.flags.contains(Flags::RX_NO_AUTO_TIMER) && op.ticks1 > 0 {
            timers.arm(primary, now.saturating_add(op.ticks1));
        }
    }

    pub(crate) fn rx_timeout_fired(&mut self, id: OpId, _at: u64) {
        let Some(op) = self.table.get_mut(id) else {
            return;
        };
        let timeout = BcmMessage::header_only(op.head(Opcode::RxTimeout, 0));
        self.outbox.message(timeout, op.origin(), None);
        debug!(op = %id, can_id = %op.key.can_id, "rx timeout");

        if op.flags.contains(Flags::RX_ANNOUNCE_ON_RESUME) {
            op.reset_mirrors();
        }
    }

    pub(crate) fn rx_throttle_fired(&mut self, id: OpId, at: u64) {
        let Some(op) = self.table.get_mut(id) else {
            return;
        };
        let slots = if op.active > 1 { 1..op.active } else { 0..1 };
        for slot in slots {
            if op.mirrors[slot].throttled {
                op.mirrors[slot].throttled = false;
                rx_changed(op, &mut self.outbox, slot, at);
            }
        }
    }
}

/// Slot whose baseline `frame` relevantly changes, if any.
fn changed_slot(op: &Operation, frame: &CanFrame) -> Option<usize> {
    if op.flags.contains(Flags::RX_FILTER_BY_ID_ONLY) {
        return Some(0);
    }
    if op.active <= 1 {
        return is_change(op, 0, frame).then_some(0);
    }

    let selector = &op.frames[0];
    let slot = op.frames[1..op.active]
        .iter()
        .position(|candidate| frame.masked_eq(candidate, selector))
        .map(|pos| pos + 1);
    match slot {
        Some(slot) => is_change(op, slot, frame).then_some(slot),
        None => {
            trace!(op = %op.id, %frame, "no multiplex slot");
            None
        }
    }
}

fn is_change(op: &Operation, slot: usize, frame: &CanFrame) -> bool {
    let mirror = &op.mirrors[slot];
    if !mirror.received {
        return true;
    }
    if !frame.masked_eq(&mirror.frame, &op.frames[slot]) {
        return true;
    }
    op.flags.contains(Flags::RX_CHECK_LENGTH) && frame.len() != mirror.frame.len()
}

/// Store the new baseline and notify now or once the throttle expires.
fn update_and_send(
    op: &mut Operation,
    timers: &mut TimerQueue,
    outbox: &mut Outbox,
    slot: usize,
    frame: &CanFrame,
    info: RxInfo,
    now: u64,
) {
    let mirror = &mut op.mirrors[slot];
    mirror.frame = *frame;
    mirror.received = true;
    mirror.ifindex = info.ifindex;
    mirror.timestamp = Some(info.timestamp);

    let throttle = TimerRef::throttle(op.id);
    let next_allowed = op
        .last_notify
        .map(|last| last.saturating_add(op.ticks2))
        .filter(|&next| op.ticks2 > 0 && next > now);

    if timers.is_armed(throttle) {
        op.mirrors[slot].throttled = true;
    } else if let Some(next) = next_allowed {
        op.mirrors[slot].throttled = true;
        timers.arm(throttle, next);
        trace!(op = %op.id, slot, until = next, "change throttled");
    } else {
        rx_changed(op, outbox, slot, now);
    }
}

fn rx_changed(op: &mut Operation, outbox: &mut Outbox, slot: usize, now: u64) {
    op.last_notify = Some(now);
    op.counters.record_notified();
    let mirror = op.mirrors[slot];
    let changed = BcmMessage::new(op.head(Opcode::RxChanged, 1), vec![mirror.frame]);
    outbox.message(changed, mirror.ifindex, mirror.timestamp);
}
