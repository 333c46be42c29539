//! In-process simulation of a mesh of boards
//!
//! [`Network`] drives one [`LinkScheduler`] per board over a shared
//! [`Medium`] under a [`ManualClock`], stepping every board once per tick in
//! board order. Nothing here touches real hardware.

pub mod medium;
pub mod topology;

pub use self::medium::{Medium, Port};
pub use self::topology::Topology;

use std::time::Duration;

use crate::core::{Config, NodeId, Result};
use crate::network::Inbox;
use crate::protocol::command::Command;
use crate::protocol::state::{LinkScheduler, Phase};
use crate::time::{Clock, ManualClock, Timestamp};

/// Scheduler of a simulated board
pub type SimNode = LinkScheduler<Port, Port, Port>;

/// A set of simulated boards sharing one medium
pub struct Network {
    topology: Topology,
    medium: Medium,
    clock: ManualClock,
    tick: Duration,
    nodes: Vec<SimNode>,
    inboxes: Vec<Inbox>,
}

impl Network {
    /// Boots one node per board of `topology`. Each board gets its own jitter
    /// seed derived from `config.rng_seed`.
    pub fn new(topology: Topology, config: Config, tick: Duration) -> Result<Self> {
        let medium = Medium::new(topology.clone(), &config);
        let clock = ManualClock::new();
        let base_seed = config.rng_seed.unwrap_or_default();

        let mut nodes = Vec::with_capacity(topology.len());
        let mut inboxes = Vec::with_capacity(topology.len());
        for board in 0..topology.len() {
            let port = medium.port(board);
            let node_config = Config {
                rng_seed: Some(base_seed.wrapping_add(board as u64)),
                ..config.clone()
            };
            let mut node = LinkScheduler::new(node_config, &port, port.clone(), port.clone(), port.clone())?;
            node.boot(clock.now())?;
            nodes.push(node);
            inboxes.push(medium.inbox(board));
        }

        Ok(Network {
            topology,
            medium,
            clock,
            tick,
            nodes,
            inboxes,
        })
    }

    /// Board layout
    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    /// Shared medium
    pub fn medium(&self) -> &Medium {
        &self.medium
    }

    /// Current simulated time
    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }

    /// Scheduler of a board
    pub fn node(&self, board: usize) -> &SimNode {
        &self.nodes[board]
    }

    /// Mutable scheduler of a board
    pub fn node_mut(&mut self, board: usize) -> &mut SimNode {
        &mut self.nodes[board]
    }

    /// Schedulers of every board, in board order
    pub fn nodes(&self) -> &[SimNode] {
        &self.nodes
    }

    /// Runs an operator command on a board
    pub fn execute(&mut self, board: usize, command: Command) -> Result<()> {
        let now = self.clock.now();
        self.nodes[board].execute(command, now)
    }

    /// Board holding `id`, if any
    pub fn board_of(&self, id: NodeId) -> Option<usize> {
        self.nodes.iter().position(|n| n.node().id == id)
    }

    /// Delivers queued datagrams, runs one scheduler step on every board and
    /// advances the clock by one tick
    pub fn step(&mut self) {
        let now = self.clock.now();
        for (node, inbox) in self.nodes.iter_mut().zip(&self.inboxes) {
            while let Some((bytes, source)) = inbox.pop() {
                node.handle_datagram(&bytes, &source, now);
                node.poll(now);
            }
            node.poll(now);
        }
        self.clock.advance(self.tick);
    }

    /// Steps until `done` holds or `limit` of simulated time passes.
    /// Returns whether `done` was reached.
    pub fn run_until(&mut self, limit: Duration, mut done: impl FnMut(&Network) -> bool) -> bool {
        let deadline = self.clock.now() + limit;
        while self.clock.now() < deadline {
            if done(self) {
                return true;
            }
            self.step();
        }
        done(self)
    }

    /// Returns whether every board holds an id and has nothing left to do
    pub fn is_settled(&self) -> bool {
        self.inboxes.iter().all(Inbox::is_empty)
            && self.nodes.iter().all(|n| {
                n.node().is_assigned() && n.phase() == Phase::Idle && !n.is_busy() && n.next_dv_scan().is_none()
            })
    }
}
