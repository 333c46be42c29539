//! dvmesh: token-assigned spanning tree and distance-vector routing over
//! half-duplex radio links
//!
//! Every node is either a broadcaster, visible under a name and accepting one
//! listener, or a listener attached to one broadcaster. A token walked
//! depth-first through the mesh hands out node ids and builds a spanning tree;
//! nodes then trade distance vectors with poisoned reverse, one neighbor at a
//! time, until each has shortest-path routes to every other node.

pub mod core;
pub mod network;
pub mod protocol;
pub mod routing;
pub mod sim;
pub mod time;
pub mod util;

// Re-export commonly used items
pub use crate::core::{Address, Config, Distance, Error, NodeId, Result};
pub use crate::network::{
    IdentitySource, NeighborDiscovery, NodeRuntime, PacketTransport, RadioControl, Role,
};
pub use crate::protocol::{Command, LinkScheduler, Packet, PacketCodec, PacketKind, Phase, StateInfo};
pub use crate::routing::{DistanceVectorEngine, NeighborTable, Node};
pub use crate::time::{Clock, ManualClock, SystemClock, Timestamp};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
