use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use canbcm_frame::{decode_message_slice, BcmMessage, FrameError, Opcode};
use canbcm_transport::{
    CanFrame, CanTransport, EventHandler, IfIndex, InterfaceEvent, RxInfo, SubscriptionId,
    TransportError,
};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, trace, warn};

use crate::config::BcmConfig;
use crate::error::{BcmError, Result};
use crate::notify::{Delivery, Fault, Outbox};
use crate::op::{Direction, OpId, OpKey, Operation};
use crate::report::ChannelReport;
use crate::table::OpTable;
use crate::timer::TimerKind;

/// Work handed from transport callbacks to the channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Inbound {
    /// A frame matched the receive filter of `op`.
    Frame {
        op: OpId,
        frame: CanFrame,
        info: RxInfo,
    },
    Interface(InterfaceEvent),
}

/// Receiving ends created together with a [`BcmChannel`].
#[derive(Debug)]
pub struct ChannelQueues {
    /// Notifications and faults for the owner.
    pub deliveries: mpsc::Receiver<Delivery>,
    /// Items to feed back through [`BcmChannel::handle_inbound`].
    pub inbound: mpsc::Receiver<Inbound>,
}

/// One broadcast manager channel: its bound interface, its TX and RX
/// operations and their timers.
///
/// The channel never blocks and never reads a clock. Every call that may
/// arm or fire a timer takes the current scheduler tick as `now`. Transport
/// callbacks only enqueue [`Inbound`] items; the owner of the channel feeds
/// them back through [`BcmChannel::handle_inbound`] and calls
/// [`BcmChannel::fire_due`] once [`BcmChannel::next_deadline`] is reached.
pub struct BcmChannel {
    pub(crate) transport: Arc<dyn CanTransport>,
    pub(crate) config: BcmConfig,
    pub(crate) bound: Option<IfIndex>,
    pub(crate) table: OpTable,
    pub(crate) outbox: Outbox,
    inbound: mpsc::Sender<Inbound>,
    overruns: Arc<AtomicU64>,
    subscription: Option<SubscriptionId>,
    closed: bool,
}

impl BcmChannel {
    /// Create an unconnected channel and subscribe to interface events.
    pub fn new(
        transport: Arc<dyn CanTransport>,
        config: BcmConfig,
    ) -> Result<(Self, ChannelQueues)> {
        config.validate()?;
        let (outbox, deliveries) = mpsc::channel(config.notify_queue_depth);
        let (inbound_tx, inbound) = mpsc::channel(config.inbound_queue_depth);
        let overruns = Arc::new(AtomicU64::new(0));

        let handler: EventHandler = {
            let tx = inbound_tx.clone();
            let overruns = Arc::clone(&overruns);
            Arc::new(move |event| enqueue(&tx, &overruns, Inbound::Interface(event)))
        };
        let subscription = transport.subscribe_interface_events(handler)?;

        let channel = Self {
            transport,
            config,
            bound: None,
            table: OpTable::new(),
            outbox: Outbox::new(outbox),
            inbound: inbound_tx,
            overruns,
            subscription: Some(subscription),
            closed: false,
        };
        Ok((
            channel,
            ChannelQueues {
                deliveries,
                inbound,
            },
        ))
    }

    pub fn config(&self) -> &BcmConfig {
        &self.config
    }

    /// Bound interface, `None` before `connect` or after its removal.
    pub fn bound(&self) -> Option<IfIndex> {
        self.bound
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Operation currently registered under `key`.
    pub fn operation(&self, direction: Direction, key: OpKey) -> Option<&Operation> {
        let id = self.table.find(direction, key)?;
        self.table.get(id)
    }

    pub fn operations(&self, direction: Direction) -> impl Iterator<Item = &Operation> + '_ {
        self.table.iter(direction)
    }

    /// Bind to `ifindex`, or to every interface with [`IfIndex::ANY`].
    pub fn connect(&mut self, ifindex: IfIndex) -> Result<()> {
        self.ensure_open()?;
        if self.bound.is_some() {
            return Err(BcmError::AlreadyBound);
        }
        if !ifindex.is_any() && !self.transport.interface_exists(ifindex) {
            return Err(TransportError::NoSuchInterface(ifindex).into());
        }
        self.bound = Some(ifindex);
        debug!(%ifindex, "channel connected");
        Ok(())
    }

    /// Apply one control message.
    ///
    /// `ifindex` overrides the target interface for this message; it is
    /// honoured only when the channel is bound to [`IfIndex::ANY`].
    pub fn send(&mut self, msg: &BcmMessage, ifindex: Option<IfIndex>, now: u64) -> Result<()> {
        self.ensure_open()?;
        let bound = self.bound.ok_or(BcmError::NotBound)?;

        let count = msg.frames.len();
        if count > self.config.max_frames as usize {
            return Err(FrameError::TooManyFrames {
                count: u32::try_from(count).unwrap_or(u32::MAX),
                max: self.config.max_frames,
            }
            .into());
        }
        let ifindex = self.resolve_ifindex(bound, ifindex)?;

        trace!(opcode = %msg.opcode(), can_id = %msg.head.can_id, %ifindex, "control message");
        match msg.opcode() {
            Opcode::TxSetup => self.tx_setup(msg, ifindex, now),
            Opcode::TxDelete => self.delete(Direction::Tx, msg, ifindex),
            Opcode::TxRead => self.read(Direction::Tx, msg, ifindex),
            Opcode::TxSend => self.tx_send(msg, ifindex),
            Opcode::RxSetup => self.rx_setup(msg, ifindex, now),
            Opcode::RxDelete => self.delete(Direction::Rx, msg, ifindex),
            Opcode::RxRead => self.read(Direction::Rx, msg, ifindex),
            other => Err(BcmError::InvalidMessage(format!(
                "{other} is a notification, not a command"
            ))),
        }
    }

    /// Decode one wire-format control message and apply it.
    pub fn send_bytes(&mut self, bytes: &[u8], ifindex: Option<IfIndex>, now: u64) -> Result<()> {
        let msg = decode_message_slice(bytes, self.config.max_frames)?;
        self.send(&msg, ifindex, now)
    }

    fn resolve_ifindex(&self, bound: IfIndex, requested: Option<IfIndex>) -> Result<IfIndex> {
        match requested {
            Some(ifindex) if bound.is_any() && !ifindex.is_any() => {
                if !self.transport.interface_exists(ifindex) {
                    return Err(TransportError::NoSuchInterface(ifindex).into());
                }
                Ok(ifindex)
            }
            _ => Ok(bound),
        }
    }

    fn delete(&mut self, direction: Direction, msg: &BcmMessage, ifindex: IfIndex) -> Result<()> {
        let key = OpKey::new(msg.head.can_id, ifindex);
        match self.table.remove(direction, key) {
            Some(op) => {
                self.release(&op);
                Ok(())
            }
            None => Err(BcmError::NotFound {
                direction,
                can_id: key.can_id,
                ifindex,
            }),
        }
    }

    fn read(&mut self, direction: Direction, msg: &BcmMessage, ifindex: IfIndex) -> Result<()> {
        let key = OpKey::new(msg.head.can_id, ifindex);
        let op = self
            .table
            .find(direction, key)
            .and_then(|id| self.table.get(id))
            .ok_or(BcmError::NotFound {
                direction,
                can_id: key.can_id,
                ifindex,
            })?;
        let opcode = match direction {
            Direction::Tx => Opcode::TxStatus,
            Direction::Rx => Opcode::RxStatus,
        };
        let frames = op.active_frames().to_vec();
        let status = BcmMessage::new(op.head(opcode, frames.len()), frames);
        let origin = op.ifindex();
        self.outbox.message(status, origin, None);
        Ok(())
    }

    /// Process one item produced by a transport callback.
    pub fn handle_inbound(&mut self, item: Inbound, now: u64) {
        if self.closed {
            return;
        }
        match item {
            Inbound::Frame { op, frame, info } => self.rx_frame(op, &frame, info, now),
            Inbound::Interface(event) => self.interface_event(event),
        }
    }

    fn interface_event(&mut self, event: InterfaceEvent) {
        match event {
            InterfaceEvent::Down(ifindex) => {
                if self.bound == Some(ifindex) {
                    debug!(%ifindex, "bound interface down");
                    self.outbox.push(Delivery::Fault(Fault::InterfaceDown(ifindex)));
                }
            }
            InterfaceEvent::Removed(ifindex) => {
                let doomed: Vec<OpId> = [Direction::Tx, Direction::Rx]
                    .into_iter()
                    .flat_map(|direction| self.table.iter(direction))
                    .filter(|op| op.ifindex() == ifindex)
                    .map(|op| op.id())
                    .collect();
                debug!(%ifindex, ops = doomed.len(), "interface removed");
                for id in doomed {
                    if let Some(op) = self.table.remove_id(id) {
                        self.release(&op);
                    }
                }
                if self.bound == Some(ifindex) {
                    self.bound = None;
                    self.outbox
                        .push(Delivery::Fault(Fault::InterfaceRemoved(ifindex)));
                }
            }
        }
    }

    /// Earliest tick at which [`BcmChannel::fire_due`] has work.
    pub fn next_deadline(&self) -> Option<u64> {
        if self.closed {
            return None;
        }
        self.table.timers().next_deadline()
    }

    /// Fire every timer due at `now`, in deadline order. Re-armed timers
    /// are scheduled from their previous deadline, so fires missed by a late
    /// caller are replayed. Returns the number of fires.
    pub fn fire_due(&mut self, now: u64) -> usize {
        let mut fired = 0;
        while let Some((deadline, timer)) = self.table.timers_mut().pop_due(now) {
            fired += 1;
            let Some(direction) = self.table.get(timer.op).map(|op| op.direction()) else {
                continue;
            };
            trace!(op = %timer.op, ?timer.kind, deadline, now, "timer fired");
            match (direction, timer.kind) {
                (Direction::Tx, TimerKind::Primary) => self.tx_timer_fired(timer.op, deadline),
                (Direction::Rx, TimerKind::Primary) => self.rx_timeout_fired(timer.op, deadline),
                (Direction::Rx, TimerKind::Throttle) => self.rx_throttle_fired(timer.op, deadline),
                (Direction::Tx, TimerKind::Throttle) => {}
            }
        }
        fired
    }

    pub fn report(&self) -> ChannelReport {
        ChannelReport::collect(self)
    }

    /// Notifications dropped because the owner queue was full or closed.
    pub fn dropped_notifications(&self) -> u64 {
        self.outbox.dropped()
    }

    /// Inbound items dropped because the inbound queue was full.
    pub fn inbound_overruns(&self) -> u64 {
        self.overruns.load(Ordering::Relaxed)
    }

    /// Destroy every operation, drop all transport registrations and stop
    /// accepting work. Idempotent.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        for op in self.table.drain() {
            self.release(&op);
        }
        if let Some(subscription) = self.subscription.take() {
            if let Err(err) = self.transport.unsubscribe_interface_events(subscription) {
                warn!(error = %err, "failed to unsubscribe interface events");
            }
        }
        self.bound = None;
        self.outbox.close();
        debug!("channel closed");
    }

    pub(crate) fn ensure_open(&self) -> Result<()> {
        if self.closed {
            Err(BcmError::Closed)
        } else {
            Ok(())
        }
    }

    /// Sender used by receive matchers of this channel.
    pub(crate) fn inbound_sender(&self) -> (mpsc::Sender<Inbound>, Arc<AtomicU64>) {
        (self.inbound.clone(), Arc::clone(&self.overruns))
    }

    /// Drop the transport registration of a removed operation.
    pub(crate) fn release(&self, op: &Operation) {
        let Some(matcher) = op.matcher else {
            return;
        };
        match self.transport.unregister_matcher(matcher) {
            Ok(()) => {}
            // Already gone with its interface.
            Err(TransportError::UnknownMatcher(_)) => {
                debug!(op = %op.id(), can_id = %op.can_id(), "matcher already released");
            }
            Err(err) => {
                warn!(op = %op.id(), can_id = %op.can_id(), error = %err, "failed to unregister matcher");
            }
        }
    }
}

impl Drop for BcmChannel {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for BcmChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BcmChannel")
            .field("bound", &self.bound)
            .field("ops", &self.table.len())
            .field("timers", &self.table.timers().len())
            .field("closed", &self.closed)
            .finish()
    }
}

pub(crate) fn enqueue(tx: &mpsc::Sender<Inbound>, overruns: &AtomicU64, item: Inbound) {
    match tx.try_send(item) {
        Ok(()) => {}
        Err(TrySendError::Full(_)) => {
            overruns.fetch_add(1, Ordering::Relaxed);
        }
        Err(TrySendError::Closed(_)) => {}
    }
}
