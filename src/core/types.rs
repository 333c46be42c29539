use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::error::DecodeError;
use super::{MAX_NODES, NO_ROUTE_DISTANCE};

/// Cost of a path, in hops weighted by link cost
pub type Distance = u8;

/// Best-known distance to every node, indexed by node id
pub type DistanceVector = [Distance; MAX_NODES];

/// Next hop towards every node, indexed by node id
pub type RoutingTable = [Option<NodeId>; MAX_NODES];

/// Returns a distance vector with no route to any node
pub fn unreachable_vector() -> DistanceVector {
    [NO_ROUTE_DISTANCE; MAX_NODES]
}

/// Network-wide node identifier handed out by the circulating token
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(u16);

impl NodeId {
    /// Identifier of a node that has not received the token yet
    pub const UNASSIGNED: NodeId = NodeId(u16::MAX);

    /// Identifier of the node that starts the token
    pub const ROOT: NodeId = NodeId(0);

    /// Creates a node id from its numeric value
    pub const fn new(value: u16) -> Self {
        NodeId(value)
    }

    /// Returns the numeric value
    pub fn value(&self) -> u16 {
        self.0
    }

    /// Returns whether this id was handed out by the token
    pub fn is_assigned(&self) -> bool {
        *self != Self::UNASSIGNED
    }

    /// Returns the table index for this id, if it fits in a node table
    pub fn index(&self) -> Option<usize> {
        let idx = self.0 as usize;
        (self.is_assigned() && idx < MAX_NODES).then_some(idx)
    }

    /// Iterates over every id that fits in a node table
    pub fn all() -> impl Iterator<Item = NodeId> {
        (0..MAX_NODES as u16).map(NodeId)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_assigned() {
            fmt::Display::fmt(&self.0, f)
        } else {
            f.pad("-1")
        }
    }
}

impl FromStr for NodeId {
    type Err = DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "-1" {
            return Ok(NodeId::UNASSIGNED);
        }
        match s.parse::<u16>() {
            Ok(value) if value != u16::MAX => Ok(NodeId(value)),
            _ => Err(DecodeError::invalid("node id", s)),
        }
    }
}

/// Transport address of a node on its current link
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Address(pub String);

impl Address {
    /// Creates a new address
    pub fn new(addr: impl Into<String>) -> Self {
        Address(addr.into())
    }

    /// Returns the address as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Address {
    fn from(s: &str) -> Self {
        Address(s.to_string())
    }
}
