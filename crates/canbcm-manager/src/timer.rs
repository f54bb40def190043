use std::collections::{BTreeSet, HashMap};

use crate::op::OpId;

/// The two timers an operation may own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TimerKind {
    /// Retransmission (TX) or reception timeout (RX).
    Primary,
    /// Deferred change notification (RX).
    Throttle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerRef {
    pub op: OpId,
    pub kind: TimerKind,
}

impl TimerRef {
    pub fn primary(op: OpId) -> Self {
        Self {
            op,
            kind: TimerKind::Primary,
        }
    }

    pub fn throttle(op: OpId) -> Self {
        Self {
            op,
            kind: TimerKind::Throttle,
        }
    }
}

/// Deadline-ordered set of armed timers, in scheduler ticks.
///
/// Each timer is armed at most once; arming again replaces the previous
/// deadline. Timers with equal deadlines pop in arming order.
#[derive(Debug, Default)]
pub struct TimerQueue {
    queue: BTreeSet<(u64, u64, TimerRef)>,
    armed: HashMap<TimerRef, (u64, u64)>,
    next_seq: u64,
}

impl TimerQueue {
    #[cfg(test)]
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm `timer` for `deadline`, replacing any earlier arming.
    pub fn arm(&mut self, timer: TimerRef, deadline: u64) {
        self.cancel(timer);
        let seq = self.next_seq;
        self.next_seq = self.next_seq.wrapping_add(1);
        self.queue.insert((deadline, seq, timer));
        self.armed.insert(timer, (deadline, seq));
    }

    /// Returns `true` if the timer was armed.
    pub fn cancel(&mut self, timer: TimerRef) -> bool {
        match self.armed.remove(&timer) {
            Some((deadline, seq)) => {
                self.queue.remove(&(deadline, seq, timer));
                true
            }
            None => false,
        }
    }

    /// Cancel both timers of `op`.
    pub fn cancel_all(&mut self, op: OpId) {
        self.cancel(TimerRef::primary(op));
        self.cancel(TimerRef::throttle(op));
    }

    pub fn is_armed(&self, timer: TimerRef) -> bool {
        self.armed.contains_key(&timer)
    }

    #[cfg(test)]
    pub fn deadline(&self, timer: TimerRef) -> Option<u64> {
        self.armed.get(&timer).map(|(deadline, _)| *deadline)
    }

    /// Earliest armed deadline.
    pub fn next_deadline(&self) -> Option<u64> {
        self.queue.first().map(|(deadline, _, _)| *deadline)
    }

    /// Disarm and return the earliest timer due at `now`, with the deadline
    /// it was scheduled for.
    pub fn pop_due(&mut self, now: u64) -> Option<(u64, TimerRef)> {
        let &(deadline, seq, timer) = self.queue.first()?;
        if deadline > now {
            return None;
        }
        self.queue.remove(&(deadline, seq, timer));
        self.armed.remove(&timer);
        Some((deadline, timer))
    }

    pub fn len(&self) -> usize {
        self.armed.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.armed.is_empty()
    }

    pub fn clear(&mut self) {
        self.queue.clear();
        self.armed.clear();
    }
}
