//! Per-node record of adjacent nodes
//!
//! Neighbors are stored in an arena indexed by node id. A neighbor is created
//! the first time discovery reports it and is never evicted.

use serde::{Deserialize, Serialize};

use crate::core::{unreachable_vector, Distance, DistanceVector, NodeId, MAX_NODES};
use crate::time::Timestamp;

/// A directly reachable node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Neighbor {
    /// Neighbor's id
    pub id: NodeId,
    /// Cost of the hop to this neighbor
    pub link_cost: Distance,
    /// Last distance vector this neighbor reported
    pub estimated_vector: DistanceVector,
    /// Whether the neighbor acknowledged our current distance vector
    pub is_synced: bool,
    /// Last time we attached to or heard from this neighbor
    pub last_contact: Timestamp,
}

impl Neighbor {
    /// Creates a neighbor that knows no routes and has not seen our vector
    pub fn new(id: NodeId, link_cost: Distance, now: Timestamp) -> Self {
        Neighbor {
            id,
            link_cost,
            estimated_vector: unreachable_vector(),
            is_synced: false,
            last_contact: now,
        }
    }
}

/// Known neighbors of a node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NeighborTable {
    slots: Vec<Option<Neighbor>>,
}

impl Default for NeighborTable {
    fn default() -> Self {
        Self::new()
    }
}

impl NeighborTable {
    /// Creates an empty table
    pub fn new() -> Self {
        NeighborTable {
            slots: vec![None; MAX_NODES],
        }
    }

    /// Records a neighbor, or updates the link cost of a known one.
    /// Returns true if the neighbor was not known before.
    pub fn upsert(&mut self, id: NodeId, cost: Distance, now: Timestamp) -> bool {
        let Some(idx) = id.index() else {
            tracing::warn!(peer = %id, "neighbor id outside the node table, ignoring");
            return false;
        };
        let slot = &mut self.slots[idx];
        if let Some(neighbor) = slot.as_mut() {
            neighbor.link_cost = cost;
            return false;
        }
        tracing::debug!(peer = %id, cost, "new neighbor");
        *slot = Some(Neighbor::new(id, cost, now));
        true
    }

    /// Returns a neighbor by id
    pub fn get(&self, id: NodeId) -> Option<&Neighbor> {
        id.index().and_then(|idx| self.slots[idx].as_ref())
    }

    /// Returns a mutable neighbor by id
    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut Neighbor> {
        id.index().and_then(|idx| self.slots[idx].as_mut())
    }

    /// Returns whether `id` is a known neighbor
    pub fn contains(&self, id: NodeId) -> bool {
        self.get(id).is_some()
    }

    /// Marks a neighbor as holding our current vector
    pub fn mark_synced(&mut self, id: NodeId) -> bool {
        match self.get_mut(id) {
            Some(neighbor) => {
                neighbor.is_synced = true;
                true
            }
            None => false,
        }
    }

    /// Marks every neighbor as needing our vector again
    pub fn mark_unsynced_all(&mut self) {
        for neighbor in self.iter_mut() {
            neighbor.is_synced = false;
        }
    }

    /// Number of neighbors that have not acknowledged our current vector
    pub fn count_unsynced(&self) -> usize {
        self.iter().filter(|n| !n.is_synced).count()
    }

    /// Stores the vector a neighbor reported
    pub fn store_vector(&mut self, id: NodeId, vector: DistanceVector) -> bool {
        match self.get_mut(id) {
            Some(neighbor) => {
                neighbor.estimated_vector = vector;
                true
            }
            None => false,
        }
    }

    /// Updates the last contact time of a neighbor
    pub fn touch(&mut self, id: NodeId, now: Timestamp) {
        if let Some(neighbor) = self.get_mut(id) {
            neighbor.last_contact = now;
        }
    }

    /// Iterates over known neighbors in id order
    pub fn iter(&self) -> impl Iterator<Item = &Neighbor> {
        self.slots.iter().flatten()
    }

    fn iter_mut(&mut self) -> impl Iterator<Item = &mut Neighbor> {
        self.slots.iter_mut().flatten()
    }

    /// Ids of known neighbors in ascending order
    pub fn ids(&self) -> Vec<NodeId> {
        self.iter().map(|n| n.id).collect()
    }

    /// Number of known neighbors
    pub fn len(&self) -> usize {
        self.iter().count()
    }

    /// Returns whether no neighbor is known
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
