use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::interval;

use crate::core::{Address, Result};
use crate::protocol::state::{LinkScheduler, StateInfo};
use crate::time::Clock;
use super::{NeighborDiscovery, PacketTransport, RadioControl};

/// Inbound datagrams waiting for the scheduler, in arrival order.
///
/// The transport side pushes, the scheduler task pops; this queue is the only
/// data the two share.
#[derive(Debug, Clone, Default)]
pub struct Inbox {
    queue: Arc<Mutex<VecDeque<(Bytes, Address)>>>,
    notify: Arc<Notify>,
}

impl Inbox {
    /// Creates an empty inbox
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a datagram received from `source`
    pub fn push(&self, bytes: Bytes, source: Address) {
        self.queue
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back((bytes, source));
        self.notify.notify_one();
    }

    /// Takes the oldest datagram
    pub fn pop(&self) -> Option<(Bytes, Address)> {
        self.queue.lock().unwrap_or_else(|e| e.into_inner()).pop_front()
    }

    /// Number of queued datagrams
    pub fn len(&self) -> usize {
        self.queue.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Returns whether nothing is queued
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Waits until a datagram is pushed
    pub async fn notified(&self) {
        self.notify.notified().await
    }
}

/// Link status shared with the housekeeping task
#[derive(Debug, Default)]
pub struct LinkFlags {
    packet_arrived: AtomicBool,
    link_active: AtomicBool,
    token_held: AtomicBool,
}

impl LinkFlags {
    /// Creates cleared flags
    pub fn new() -> Self {
        Self::default()
    }

    /// Signals that a datagram arrived
    pub fn set_packet_arrived(&self) {
        self.packet_arrived.store(true, Ordering::Release);
    }

    /// Reads and clears the packet-arrived signal
    pub fn take_packet_arrived(&self) -> bool {
        self.packet_arrived.swap(false, Ordering::AcqRel)
    }

    /// Sets whether a radio link is up
    pub fn set_link_active(&self, active: bool) {
        self.link_active.store(active, Ordering::Release);
    }

    /// Returns whether a radio link is up
    pub fn link_active(&self) -> bool {
        self.link_active.load(Ordering::Acquire)
    }

    /// Sets whether the token is at this node
    pub fn set_token_held(&self, held: bool) {
        self.token_held.store(held, Ordering::Release);
    }

    /// Returns whether the token is at this node
    pub fn token_held(&self) -> bool {
        self.token_held.load(Ordering::Acquire)
    }
}

/// Something that shows link activity, such as a board LED
pub trait ActivityIndicator: Send + 'static {
    /// Turns the indicator on or off
    fn set(&mut self, on: bool);
}

/// Scheduler task of a node.
///
/// Drains the inbox in order, runs one scheduler step per tick and publishes
/// a [`StateInfo`] after every tick.
pub struct NodeRuntime<R, D, T, C> {
    scheduler: LinkScheduler<R, D, T>,
    inbox: Inbox,
    flags: Arc<LinkFlags>,
    clock: C,
    poll_interval: Duration,
    state_tx: watch::Sender<StateInfo>,
}

impl<R, D, T, C> NodeRuntime<R, D, T, C>
where
    R: RadioControl,
    D: NeighborDiscovery,
    T: PacketTransport,
    C: Clock,
{
    /// Creates a runtime around a booted scheduler
    pub fn new(scheduler: LinkScheduler<R, D, T>, inbox: Inbox, clock: C, poll_interval: Duration) -> Self {
        let (state_tx, _) = watch::channel(scheduler.snapshot());
        NodeRuntime {
            scheduler,
            inbox,
            flags: Arc::new(LinkFlags::new()),
            clock,
            poll_interval,
            state_tx,
        }
    }

    /// Flags for the housekeeping task
    pub fn flags(&self) -> Arc<LinkFlags> {
        Arc::clone(&self.flags)
    }

    /// Receiver of the state published after every tick
    pub fn subscribe(&self) -> watch::Receiver<StateInfo> {
        self.state_tx.subscribe()
    }

    /// Processes queued datagrams and runs one scheduler step
    pub fn tick(&mut self) {
        let now = self.clock.now();
        while let Some((bytes, source)) = self.inbox.pop() {
            self.flags.set_packet_arrived();
            self.scheduler.handle_datagram(&bytes, &source, now);
            self.scheduler.poll(now);
        }
        self.scheduler.poll(now);

        self.flags.set_link_active(self.scheduler.is_linked());
        self.flags.set_token_held(self.scheduler.holds_token());
        self.state_tx.send_replace(self.scheduler.snapshot());
    }

    /// Runs until `shutdown` turns true or its sender goes away, then hands
    /// the scheduler back
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> Result<LinkScheduler<R, D, T>> {
        tracing::info!(node = %self.scheduler.node().id, "scheduler task started");
        loop {
            if *shutdown.borrow() {
                break;
            }
            self.tick();

            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                _ = self.inbox.notified() => {}
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }
        tracing::info!(node = %self.scheduler.node().id, "scheduler task stopped");
        Ok(self.scheduler)
    }
}

/// Spawns the housekeeping task: lights the indicator while a link is up or
/// traffic arrived since the last tick, and blinks it while the token is held.
/// It reads the flags and nothing else.
pub fn spawn_housekeeping<I: ActivityIndicator>(
    flags: Arc<LinkFlags>,
    mut indicator: I,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(period);
        let mut blink = false;
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    blink = !blink;
                    let traffic = flags.take_packet_arrived();
                    let on = flags.link_active() || traffic || (flags.token_held() && blink);
                    indicator.set(on);
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        indicator.set(false);
                        break;
                    }
                }
            }
        }
    })
}
