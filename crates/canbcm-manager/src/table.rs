use std::collections::HashMap;

use tracing::debug;

use crate::op::{Direction, OpId, OpKey, Operation};
use crate::timer::TimerQueue;

/// Per-channel operations: an arena keyed by [`OpId`], one key index per
/// direction, and the timers of every operation.
#[derive(Debug, Default)]
pub struct OpTable {
    ops: HashMap<OpId, Operation>,
    tx_index: HashMap<OpKey, OpId>,
    rx_index: HashMap<OpKey, OpId>,
    timers: TimerQueue,
    next_id: u64,
}

impl OpTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn index(&self, direction: Direction) -> &HashMap<OpKey, OpId> {
        match direction {
            Direction::Tx => &self.tx_index,
            Direction::Rx => &self.rx_index,
        }
    }

    fn index_mut(&mut self, direction: Direction) -> &mut HashMap<OpKey, OpId> {
        match direction {
            Direction::Tx => &mut self.tx_index,
            Direction::Rx => &mut self.rx_index,
        }
    }

    pub fn find(&self, direction: Direction, key: OpKey) -> Option<OpId> {
        self.index(direction).get(&key).copied()
    }

    pub fn get(&self, id: OpId) -> Option<&Operation> {
        self.ops.get(&id)
    }

    pub fn get_mut(&mut self, id: OpId) -> Option<&mut Operation> {
        self.ops.get_mut(&id)
    }

    /// Borrow an operation together with the timer queue.
    pub fn op_and_timers(&mut self, id: OpId) -> Option<(&mut Operation, &mut TimerQueue)> {
        let op = self.ops.get_mut(&id)?;
        Some((op, &mut self.timers))
    }

    pub fn timers(&self) -> &TimerQueue {
        &self.timers
    }

    pub fn timers_mut(&mut self) -> &mut TimerQueue {
        &mut self.timers
    }

    /// Id the next [`OpTable::insert`] will assign.
    pub fn peek_id(&self) -> OpId {
        OpId(self.next_id)
    }

    /// Insert a new operation and assign its id.
    ///
    /// The caller has checked that the key is free; an existing entry for
    /// the same key would be shadowed in the index.
    pub fn insert(&mut self, mut op: Operation) -> OpId {
        let id = OpId(self.next_id);
        self.next_id += 1;
        op.id = id;
        let direction = op.direction;
        let key = op.key;
        debug!(op = %id, %direction, can_id = %key.can_id, ifindex = %key.ifindex, "operation created");
        self.index_mut(direction).insert(key, id);
        self.ops.insert(id, op);
        id
    }

    /// Remove by key. Both timers are cancelled before the operation is
    /// returned. `None` if no such operation exists.
    pub fn remove(&mut self, direction: Direction, key: OpKey) -> Option<Operation> {
        let id = self.find(direction, key)?;
        self.remove_id(id)
    }

    pub fn remove_id(&mut self, id: OpId) -> Option<Operation> {
        self.timers.cancel_all(id);
        let op = self.ops.remove(&id)?;
        self.index_mut(op.direction).remove(&op.key);
        debug!(op = %id, direction = %op.direction, can_id = %op.key.can_id, ifindex = %op.key.ifindex, "operation removed");
        Some(op)
    }

    /// Ids of one direction in creation order.
    pub fn ids(&self, direction: Direction) -> Vec<OpId> {
        let mut ids: Vec<OpId> = self.index(direction).values().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Operations of one direction in creation order.
    pub fn iter(&self, direction: Direction) -> impl Iterator<Item = &Operation> + '_ {
        self.ids(direction)
            .into_iter()
            .filter_map(move |id| self.ops.get(&id))
    }

    /// Remove everything, cancelling every timer first.
    pub fn drain(&mut self) -> Vec<Operation> {
        self.timers.clear();
        self.tx_index.clear();
        self.rx_index.clear();
        let mut ops: Vec<Operation> = self.ops.drain().map(|(_, op)| op).collect();
        ops.sort_unstable_by_key(|op| op.id);
        ops
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}
