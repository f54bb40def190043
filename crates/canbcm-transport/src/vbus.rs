use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::SystemTime;

use tracing::{debug, info, trace};

use crate::can::{CanFrame, CanId};
use crate::error::{Result, TransportError};
use crate::traits::{
    CanTransport, EventHandler, FrameHandler, IfIndex, InterfaceEvent, MatcherId, RxInfo,
    SubscriptionId,
};

/// In-memory CAN bus with any number of virtual interfaces.
///
/// Frames sent on an interface are recorded in that interface's transmit log
/// and, with loopback, delivered to local matchers. [`VirtualBus::inject`]
/// simulates a frame arriving from a remote node.
pub struct VirtualBus {
    state: Mutex<BusState>,
}

struct VirtualInterface {
    name: String,
    up: bool,
    sent: Vec<CanFrame>,
}

struct Matcher {
    ifindex: IfIndex,
    can_id: CanId,
    mask: u32,
    handler: FrameHandler,
}

#[derive(Default)]
struct BusState {
    interfaces: BTreeMap<IfIndex, VirtualInterface>,
    matchers: BTreeMap<MatcherId, Matcher>,
    subscribers: HashMap<SubscriptionId, EventHandler>,
    next_ifindex: u32,
    next_matcher: u64,
    next_subscription: u64,
}

impl VirtualBus {
    /// Create a bus without interfaces.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(BusState {
                next_ifindex: 1,
                ..BusState::default()
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BusState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add an interface that is up. Returns its index.
    pub fn add_interface(&self, name: &str) -> Result<IfIndex> {
        let mut state = self.lock();
        if state.interfaces.values().any(|iface| iface.name == name) {
            return Err(TransportError::DuplicateInterface(name.to_string()));
        }
        let ifindex = IfIndex(state.next_ifindex);
        state.next_ifindex += 1;
        state.interfaces.insert(
            ifindex,
            VirtualInterface {
                name: name.to_string(),
                up: true,
                sent: Vec::new(),
            },
        );
        info!(%ifindex, name, "virtual interface added");
        Ok(ifindex)
    }

    /// Look up an interface index by name.
    pub fn ifindex_by_name(&self, name: &str) -> Option<IfIndex> {
        self.lock()
            .interfaces
            .iter()
            .find(|(_, iface)| iface.name == name)
            .map(|(ifindex, _)| *ifindex)
    }

    /// Name of an interface, `"any"` for the wildcard.
    pub fn interface_name(&self, ifindex: IfIndex) -> Option<String> {
        if ifindex.is_any() {
            return Some("any".to_string());
        }
        self.lock()
            .interfaces
            .get(&ifindex)
            .map(|iface| iface.name.clone())
    }

    /// Bring an interface up.
    pub fn set_up(&self, ifindex: IfIndex) -> Result<()> {
        let mut state = self.lock();
        let iface = state
            .interfaces
            .get_mut(&ifindex)
            .ok_or(TransportError::NoSuchInterface(ifindex))?;
        iface.up = true;
        Ok(())
    }

    /// Take an interface down and notify subscribers.
    pub fn set_down(&self, ifindex: IfIndex) -> Result<()> {
        let subscribers = {
            let mut state = self.lock();
            let iface = state
                .interfaces
                .get_mut(&ifindex)
                .ok_or(TransportError::NoSuchInterface(ifindex))?;
            iface.up = false;
            state.subscribers.values().cloned().collect::<Vec<_>>()
        };
        debug!(%ifindex, "virtual interface down");
        for handler in subscribers {
            handler(InterfaceEvent::Down(ifindex));
        }
        Ok(())
    }

    /// Remove an interface, drop its matchers and notify subscribers.
    pub fn remove_interface(&self, ifindex: IfIndex) -> Result<()> {
        let subscribers = {
            let mut state = self.lock();
            state
                .interfaces
                .remove(&ifindex)
                .ok_or(TransportError::NoSuchInterface(ifindex))?;
            state.matchers.retain(|_, matcher| matcher.ifindex != ifindex);
            state.subscribers.values().cloned().collect::<Vec<_>>()
        };
        info!(%ifindex, "virtual interface removed");
        for handler in subscribers {
            handler(InterfaceEvent::Removed(ifindex));
        }
        Ok(())
    }

    /// Deliver `frame` as if a remote node had sent it on `ifindex`.
    pub fn inject(&self, ifindex: IfIndex, frame: &CanFrame) -> Result<()> {
        let handlers = {
            let state = self.lock();
            let iface = state
                .interfaces
                .get(&ifindex)
                .ok_or(TransportError::NoSuchInterface(ifindex))?;
            if !iface.up {
                return Err(TransportError::InterfaceDown(ifindex));
            }
            state.matching_handlers(ifindex, frame.id)
        };
        deliver(handlers, frame, ifindex);
        Ok(())
    }

    /// Frames transmitted on `ifindex` so far.
    pub fn sent_frames(&self, ifindex: IfIndex) -> Vec<CanFrame> {
        self.lock()
            .interfaces
            .get(&ifindex)
            .map(|iface| iface.sent.clone())
            .unwrap_or_default()
    }

    /// Drain the transmit log of `ifindex`.
    pub fn take_sent(&self, ifindex: IfIndex) -> Vec<CanFrame> {
        self.lock()
            .interfaces
            .get_mut(&ifindex)
            .map(|iface| std::mem::take(&mut iface.sent))
            .unwrap_or_default()
    }

    /// Number of live matcher registrations.
    pub fn matcher_count(&self) -> usize {
        self.lock().matchers.len()
    }
}

impl Default for VirtualBus {
    fn default() -> Self {
        Self::new()
    }
}

impl BusState {
    fn matching_handlers(&self, ifindex: IfIndex, can_id: CanId) -> Vec<FrameHandler> {
        self.matchers
            .values()
            .filter(|m| m.ifindex.is_any() || m.ifindex == ifindex)
            .filter(|m| m.can_id.matches(can_id, m.mask))
            .map(|m| m.handler.clone())
            .collect()
    }
}

fn deliver(handlers: Vec<FrameHandler>, frame: &CanFrame, ifindex: IfIndex) {
    let info = RxInfo {
        ifindex,
        timestamp: SystemTime::now(),
    };
    trace!(%ifindex, %frame, receivers = handlers.len(), "delivering frame");
    for handler in handlers {
        handler(frame, info);
    }
}

impl CanTransport for VirtualBus {
    fn send(&self, frame: &CanFrame, ifindex: IfIndex, loopback: bool) -> Result<()> {
        let handlers = {
            let mut state = self.lock();
            let iface = state
                .interfaces
                .get_mut(&ifindex)
                .ok_or(TransportError::NoSuchInterface(ifindex))?;
            if !iface.up {
                return Err(TransportError::InterfaceDown(ifindex));
            }
            iface.sent.push(*frame);
            if loopback {
                state.matching_handlers(ifindex, frame.id)
            } else {
                Vec::new()
            }
        };
        deliver(handlers, frame, ifindex);
        Ok(())
    }

    fn register_matcher(
        &self,
        ifindex: IfIndex,
        can_id: CanId,
        mask: u32,
        handler: FrameHandler,
    ) -> Result<MatcherId> {
        let mut state = self.lock();
        if !ifindex.is_any() && !state.interfaces.contains_key(&ifindex) {
            return Err(TransportError::NoSuchInterface(ifindex));
        }
        let id = MatcherId(state.next_matcher);
        state.next_matcher += 1;
        state.matchers.insert(
            id,
            Matcher {
                ifindex,
                can_id,
                mask,
                handler,
            },
        );
        debug!(%ifindex, %can_id, mask = format_args!("{mask:#x}"), ?id, "matcher registered");
        Ok(id)
    }

    fn unregister_matcher(&self, id: MatcherId) -> Result<()> {
        match self.lock().matchers.remove(&id) {
            Some(_) => Ok(()),
            None => Err(TransportError::UnknownMatcher(id)),
        }
    }

    fn interface_exists(&self, ifindex: IfIndex) -> bool {
        self.lock().interfaces.contains_key(&ifindex)
    }

    fn subscribe_interface_events(&self, handler: EventHandler) -> Result<SubscriptionId> {
        let mut state = self.lock();
        let id = SubscriptionId(state.next_subscription);
        state.next_subscription += 1;
        state.subscribers.insert(id, handler);
        Ok(id)
    }

    fn unsubscribe_interface_events(&self, id: SubscriptionId) -> Result<()> {
        match self.lock().subscribers.remove(&id) {
            Some(_) => Ok(()),
            None => Err(TransportError::UnknownSubscription(id)),
        }
    }
}
