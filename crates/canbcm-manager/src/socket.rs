//! Async front-end: a [`BcmChannel`] driven by a tokio task.
//!
//! ```text
//! transport callbacks ─► inbound queue ─┐
//! timer deadlines ──────────────────────┼─► driver task ─► BcmChannel (locked)
//! control calls ─► wake ────────────────┘                      │
//!                                         owner ◄── deliveries ┘
//! ```

use std::future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use canbcm_frame::BcmMessage;
use canbcm_transport::{CanTransport, IfIndex};
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;

use crate::channel::{BcmChannel, Inbound};
use crate::config::BcmConfig;
use crate::error::Result;
use crate::notify::Delivery;
use crate::report::ChannelReport;
use crate::ticks::{duration_to_ticks, elapsed_ticks, ticks_to_duration};

struct Shared {
    core: Mutex<BcmChannel>,
    wake: Notify,
    epoch: Instant,
    tick_hz: u32,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, BcmChannel> {
        self.core.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Last tick boundary passed. Timers due at or before it may fire.
    fn now(&self) -> u64 {
        elapsed_ticks(self.epoch.elapsed(), self.tick_hz)
    }

    /// Next tick boundary. Events are stamped with it so that timers armed
    /// relative to an event never expire early.
    fn event_tick(&self) -> u64 {
        duration_to_ticks(self.epoch.elapsed(), self.tick_hz)
    }

    fn deadline_instant(&self, tick: u64) -> Option<Instant> {
        let offset = ticks_to_duration(tick, self.tick_hz)?;
        self.epoch.checked_add(offset)
    }
}

/// A broadcast manager channel with its own timer/receive driver.
///
/// Must be opened inside a tokio runtime. Dropping the socket closes the
/// channel and stops the driver.
pub struct BcmSocket {
    shared: Arc<Shared>,
    deliveries: mpsc::Receiver<Delivery>,
    driver: Option<JoinHandle<()>>,
}

impl BcmSocket {
    /// Create an unconnected socket on `transport`.
    pub fn open(transport: Arc<dyn CanTransport>, config: BcmConfig) -> Result<Self> {
        let tick_hz = config.tick_hz;
        let (channel, queues) = BcmChannel::new(transport, config)?;
        let shared = Arc::new(Shared {
            core: Mutex::new(channel),
            wake: Notify::new(),
            epoch: Instant::now(),
            tick_hz,
        });
        let driver = tokio::spawn(drive(Arc::clone(&shared), queues.inbound));
        Ok(Self {
            shared,
            deliveries: queues.deliveries,
            driver: Some(driver),
        })
    }

    /// Bind to one interface, or to all with [`IfIndex::ANY`].
    pub fn connect(&self, ifindex: IfIndex) -> Result<()> {
        self.shared.lock().connect(ifindex)
    }

    /// Apply a control message on the bound interface.
    pub fn send(&self, msg: &BcmMessage) -> Result<()> {
        self.apply(|core, now| core.send(msg, None, now))
    }

    /// Apply a control message on `ifindex`. Only allowed to differ from the
    /// bound interface when bound to [`IfIndex::ANY`].
    pub fn send_to(&self, msg: &BcmMessage, ifindex: IfIndex) -> Result<()> {
        self.apply(|core, now| core.send(msg, Some(ifindex), now))
    }

    /// Decode and apply a wire-format control message.
    pub fn send_bytes(&self, bytes: &[u8]) -> Result<()> {
        self.apply(|core, now| core.send_bytes(bytes, None, now))
    }

    fn apply(&self, f: impl FnOnce(&mut BcmChannel, u64) -> Result<()>) -> Result<()> {
        let at = self.shared.event_tick();
        let result = f(&mut self.shared.lock(), at);
        self.shared.wake.notify_one();
        result
    }

    /// Next notification or fault. `None` once the socket is closed and
    /// the queue is drained.
    pub async fn recv(&mut self) -> Option<Delivery> {
        self.deliveries.recv().await
    }

    pub fn try_recv(&mut self) -> Option<Delivery> {
        self.deliveries.try_recv().ok()
    }

    pub fn report(&self) -> ChannelReport {
        self.shared.lock().report()
    }

    pub fn bound(&self) -> Option<IfIndex> {
        self.shared.lock().bound()
    }

    /// Current scheduler tick of this socket.
    pub fn now(&self) -> u64 {
        self.shared.now()
    }

    /// Destroy all operations and stop the driver. Queued deliveries can
    /// still be received.
    pub fn close(&mut self) {
        self.shared.lock().close();
        self.shared.wake.notify_one();
        if let Some(driver) = self.driver.take() {
            driver.abort();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.shared.lock().is_closed()
    }
}

impl Drop for BcmSocket {
    fn drop(&mut self) {
        self.close();
    }
}

async fn drive(shared: Arc<Shared>, mut inbound: mpsc::Receiver<Inbound>) {
    loop {
        let deadline = {
            let core = shared.lock();
            if core.is_closed() {
                break;
            }
            core.next_deadline()
        };
        let wake_at = deadline.and_then(|tick| shared.deadline_instant(tick));

        tokio::select! {
            item = inbound.recv() => {
                let Some(item) = item else { break };
                let at = shared.event_tick();
                let mut core = shared.lock();
                core.handle_inbound(item, at);
                while let Ok(item) = inbound.try_recv() {
                    core.handle_inbound(item, at);
                }
                core.fire_due(shared.now());
            }
            _ = sleep_until(wake_at) => {
                let now = shared.now();
                shared.lock().fire_due(now);
            }
            _ = shared.wake.notified() => {}
        }
    }
    debug!("channel driver stopped");
}

async fn sleep_until(at: Option<Instant>) {
    match at {
        Some(at) => tokio::time::sleep_until(at).await,
        None => future::pending().await,
    }
}
