//! Core types and constants for the mesh
//!
//! This module contains the fundamental building blocks used throughout the library.

pub mod config;
pub mod error;
pub mod serde;
pub mod types;

pub use self::config::Config;
pub use self::error::{DecodeError, Error, Result};
pub use self::types::{unreachable_vector, Address, Distance, DistanceVector, NodeId, RoutingTable};

/// Maximum number of nodes that can join the network
pub const MAX_NODES: usize = 16;

/// Distance reported when no route to a destination is known
pub const NO_ROUTE_DISTANCE: Distance = MAX_NODES as Distance;

/// Distance sent in place of a real distance to the neighbor a route goes through.
/// Only ever appears on the wire.
pub const POISON_DISTANCE: Distance = NO_ROUTE_DISTANCE + 1;

/// Cost of a single radio hop
pub const DEFAULT_LINK_COST: Distance = 1;

/// Maximum encoded packet size in bytes
pub const MAX_PACKET_SIZE: usize = 1400;
