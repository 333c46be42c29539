use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use bytes::Bytes;

use crate::core::{Address, Config, Error, Result};
use crate::network::{
    DiscoveredPeer, IdentitySource, Inbox, NeighborDiscovery, PacketTransport, RadioControl, Role, ScanFilter,
};
use super::topology::{Topology, BOARD_KEYS};

#[derive(Debug)]
struct Board {
    key: String,
    role: Role,
    name: Option<String>,
    address: Address,
    link: Option<usize>,
    inbox: Inbox,
}

#[derive(Debug)]
struct World {
    topology: Topology,
    boards: Vec<Board>,
    broadcaster_address: Address,
    listener_address: Address,
    delivered: u64,
}

impl World {
    fn unlink(&mut self, board: usize) {
        if let Some(peer) = self.boards[board].link.take() {
            self.boards[peer].link = None;
            tracing::trace!(board, peer, "link dropped");
        }
    }
}

/// Shared radio medium of a set of simulated boards.
///
/// A board is either a broadcaster, visible under its name to every board in
/// range and accepting one listener, or a listener that can attach to one
/// broadcaster in range. Changing role drops the current link. Datagrams only
/// travel over a link, and only to the address the peer currently holds.
#[derive(Debug, Clone)]
pub struct Medium {
    world: Arc<Mutex<World>>,
}

impl Medium {
    /// Creates a medium for the boards of `topology`, all radios off
    pub fn new(topology: Topology, config: &Config) -> Self {
        let boards = (0..topology.len())
            .map(|b| Board {
                key: BOARD_KEYS
                    .get(b)
                    .map_or_else(|| format!("SIM{:04X}", b), |key| key.to_string()),
                role: Role::Off,
                name: None,
                address: config.broadcaster_address.clone(),
                link: None,
                inbox: Inbox::new(),
            })
            .collect();

        Medium {
            world: Arc::new(Mutex::new(World {
                topology,
                boards,
                broadcaster_address: config.broadcaster_address.clone(),
                listener_address: config.listener_address.clone(),
                delivered: 0,
            })),
        }
    }

    /// Capability handle of one board
    pub fn port(&self, board: usize) -> Port {
        Port {
            world: Arc::clone(&self.world),
            board,
        }
    }

    /// Inbox the medium delivers `board`'s datagrams into
    pub fn inbox(&self, board: usize) -> Inbox {
        self.lock().boards[board].inbox.clone()
    }

    /// Number of boards
    pub fn len(&self) -> usize {
        self.lock().boards.len()
    }

    /// Returns whether the medium has no boards
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Datagrams delivered so far
    pub fn delivered(&self) -> u64 {
        self.lock().delivered
    }

    fn lock(&self) -> MutexGuard<'_, World> {
        self.world.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// One board's view of the medium; implements every radio capability
#[derive(Debug, Clone)]
pub struct Port {
    world: Arc<Mutex<World>>,
    board: usize,
}

impl Port {
    /// Board this port belongs to
    pub fn board(&self) -> usize {
        self.board
    }

    fn lock(&self) -> MutexGuard<'_, World> {
        self.world.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl RadioControl for Port {
    fn become_broadcaster(&mut self, name: &str) -> Result<()> {
        let mut world = self.lock();
        world.unlink(self.board);
        let address = world.broadcaster_address.clone();
        let board = &mut world.boards[self.board];
        board.role = Role::Broadcaster;
        board.name = Some(name.to_string());
        board.address = address;
        Ok(())
    }

    fn become_listener(&mut self) -> Result<()> {
        let mut world = self.lock();
        world.unlink(self.board);
        let address = world.listener_address.clone();
        let board = &mut world.boards[self.board];
        board.role = Role::Listener;
        board.name = None;
        board.address = address;
        Ok(())
    }

    fn attach(&mut self, target_name: &str, _timeout: Duration) -> Result<()> {
        let mut world = self.lock();
        if world.boards[self.board].role != Role::Listener {
            return Err(Error::radio("attach requires listener role"));
        }
        world.unlink(self.board);

        let target = (0..world.boards.len()).find(|&b| {
            b != self.board
                && world.topology.signal(self.board, b).is_some()
                && world.boards[b].role == Role::Broadcaster
                && world.boards[b].name.as_deref() == Some(target_name)
        });
        let Some(target) = target else {
            return Err(Error::connect(format!("{} not in range", target_name)));
        };
        if world.boards[target].link.is_some() {
            return Err(Error::connect(format!("{} already has a listener", target_name)));
        }

        world.boards[target].link = Some(self.board);
        world.boards[self.board].link = Some(target);
        tracing::trace!(board = self.board, peer = target, "linked");
        Ok(())
    }

    fn current_role(&self) -> Role {
        self.lock().boards[self.board].role
    }

    fn is_linked(&self) -> bool {
        self.lock().boards[self.board].link.is_some()
    }
}

impl NeighborDiscovery for Port {
    fn scan(&mut self, _filter: ScanFilter) -> Vec<DiscoveredPeer> {
        let world = self.lock();
        world
            .topology
            .neighbors(self.board)
            .into_iter()
            .filter(|&b| world.boards[b].role == Role::Broadcaster)
            .filter_map(|b| {
                let name = world.boards[b].name.clone()?;
                let signal = world.topology.signal(self.board, b)?;
                Some(DiscoveredPeer::new(name, signal))
            })
            .collect()
    }
}

impl PacketTransport for Port {
    fn send(&mut self, bytes: &[u8], dest: &Address) -> Result<()> {
        let mut world = self.lock();
        let Some(peer) = world.boards[self.board].link else {
            return Err(Error::transport("no link"));
        };
        if &world.boards[peer].address != dest {
            return Err(Error::transport(format!("{} is not the link peer", dest)));
        }
        let source = world.boards[self.board].address.clone();
        world.boards[peer].inbox.push(Bytes::copy_from_slice(bytes), source);
        world.delivered += 1;
        Ok(())
    }
}

impl IdentitySource for Port {
    fn unique_hardware_id(&self) -> String {
        self.lock().boards[self.board].key.clone()
    }
}
