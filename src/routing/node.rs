use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use crate::core::{
    unreachable_vector, Address, DistanceVector, Error, NodeId, Result, RoutingTable, MAX_NODES,
    NO_ROUTE_DISTANCE,
};
use super::neighbor::{Neighbor, NeighborTable};

/// Identity and routing state of the local node
#[derive(Debug, Clone)]
pub struct Node {
    /// Id handed out by the token, `UNASSIGNED` until then
    pub id: NodeId,
    /// Node that handed us our id; `UNASSIGNED` for the root
    pub parent_id: NodeId,
    /// Current transport address
    pub address: Address,
    /// Number of packets sent
    pub sequence_counter: u32,
    /// Adjacent nodes
    pub neighbors: NeighborTable,
    /// Best-known distance to every node
    pub distance_vector: DistanceVector,
    /// Next hop to every node
    pub routing_table: RoutingTable,
}

impl Node {
    /// Creates a node that has not received the token
    pub fn new(address: Address) -> Self {
        Node {
            id: NodeId::UNASSIGNED,
            parent_id: NodeId::UNASSIGNED,
            address,
            sequence_counter: 0,
            neighbors: NeighborTable::new(),
            distance_vector: unreachable_vector(),
            routing_table: [None; MAX_NODES],
        }
    }

    /// Takes an id, routing to ourselves at distance zero
    pub fn assign(&mut self, id: NodeId) -> Result<()> {
        let idx = id.index().ok_or(Error::NetworkFull(id.value()))?;
        self.id = id;
        self.distance_vector[idx] = 0;
        self.routing_table[idx] = Some(id);
        Ok(())
    }

    /// Returns whether this node holds an id
    pub fn is_assigned(&self) -> bool {
        self.id.is_assigned()
    }

    /// Returns whether this node started the token
    pub fn is_root(&self) -> bool {
        self.id == NodeId::ROOT
    }

    /// Next hop towards `dest`
    pub fn next_hop(&self, dest: NodeId) -> Result<NodeId> {
        dest.index()
            .and_then(|idx| self.routing_table[idx])
            .ok_or(Error::NoRoute(dest))
    }

    /// Returns a snapshot of this node's routing state
    pub fn snapshot(&self) -> NodeSnapshot {
        NodeSnapshot {
            id: self.id,
            parent_id: self.parent_id,
            distance_vector: self.distance_vector,
            routing_table: self.routing_table,
            neighbors: self.neighbors.iter().cloned().collect(),
        }
    }

    /// Renders the distance vector and routing table as a text table
    pub fn render_tables(&self) -> String {
        let mut out = String::new();
        let _ = write!(out, " Target   |");
        for id in 0..MAX_NODES {
            let _ = write!(out, " {:>2}", id);
        }
        let _ = write!(out, "\n Distance |");
        for distance in self.distance_vector {
            if distance >= NO_ROUTE_DISTANCE {
                out.push_str("  -");
            } else {
                let _ = write!(out, " {:>2}", distance);
            }
        }
        let _ = write!(out, "\n Next-hop |");
        for hop in self.routing_table {
            match hop {
                Some(hop) => {
                    let _ = write!(out, " {:>2}", hop);
                }
                None => out.push_str("  -"),
            }
        }
        out
    }
}

/// Serializable view of a node's routing state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSnapshot {
    /// Node id
    pub id: NodeId,
    /// Parent in the spanning tree
    pub parent_id: NodeId,
    /// Distance vector
    pub distance_vector: DistanceVector,
    /// Routing table
    pub routing_table: RoutingTable,
    /// Known neighbors
    pub neighbors: Vec<Neighbor>,
}
