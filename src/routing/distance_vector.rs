//! Distance-vector routing with poisoned reverse
//!
//! The engine holds no state of its own. It relaxes the local node's distance
//! vector against one neighbor's report at a time (Bellman-Ford restricted to
//! that neighbor) and prepares the vector sent to each neighbor, reporting
//! `POISON_DISTANCE` for every destination routed through that neighbor.

use crate::core::{
    Distance, DistanceVector, Error, NodeId, Result, NO_ROUTE_DISTANCE, POISON_DISTANCE,
};
use crate::time::Timestamp;
use super::node::Node;

/// Bellman-Ford relaxation and poisoned-reverse encoding over a [`Node`]
#[derive(Debug, Clone, Copy, Default)]
pub struct DistanceVectorEngine;

impl DistanceVectorEngine {
    /// Seeds routing from the discovered neighbors: zero to ourselves and one
    /// hop of `link_cost` to each neighbor. Returns true if the vector changed.
    pub fn initialize(node: &mut Node) -> bool {
        let Some(own) = node.id.index() else {
            return false;
        };
        node.distance_vector[own] = 0;
        node.routing_table[own] = Some(node.id);

        let mut changed = false;
        let hops: Vec<(NodeId, Distance)> = node.neighbors.iter().map(|n| (n.id, n.link_cost)).collect();
        for (id, cost) in hops {
            let Some(idx) = id.index() else { continue };
            if cost < node.distance_vector[idx] {
                node.distance_vector[idx] = cost;
                node.routing_table[idx] = Some(id);
                changed = true;
            }
        }

        if changed {
            node.neighbors.mark_unsynced_all();
        }
        changed
    }

    /// Relaxes every destination against the last vector reported by
    /// `from_neighbor`. Equal-cost alternatives keep the existing route.
    /// Returns true if any entry changed, in which case every neighbor is
    /// marked unsynced.
    pub fn recompute(node: &mut Node, from_neighbor: NodeId) -> bool {
        let Some(neighbor) = node.neighbors.get(from_neighbor) else {
            tracing::warn!(node = %node.id, peer = %from_neighbor, "recompute for unknown neighbor");
            return false;
        };
        let cost = neighbor.link_cost;
        let reported = neighbor.estimated_vector;

        let mut changed = false;
        for (dest, &via) in reported.iter().enumerate() {
            let candidate = cost.saturating_add(via);
            let current = node.distance_vector[dest];
            if candidate < current {
                tracing::info!(
                    node = %node.id,
                    dest,
                    via = %from_neighbor,
                    from = current,
                    to = candidate,
                    "shorter route"
                );
                node.distance_vector[dest] = candidate;
                node.routing_table[dest] = Some(from_neighbor);
                changed = true;
            }
        }

        if changed {
            node.neighbors.mark_unsynced_all();
        }
        changed
    }

    /// Vector to send to `recipient`: destinations routed through the
    /// recipient are reported as unreachable.
    pub fn encode_for(node: &Node, recipient: NodeId) -> DistanceVector {
        let mut vector = node.distance_vector;
        for (entry, hop) in vector.iter_mut().zip(node.routing_table.iter()) {
            if *hop == Some(recipient) {
                *entry = POISON_DISTANCE;
            }
        }
        vector
    }

    /// Stores a vector reported by `sender` and relaxes against it.
    /// Poisoned entries are stored as no route.
    pub fn ingest(node: &mut Node, sender: NodeId, vector: DistanceVector) -> Result<bool> {
        let clamped = vector.map(|d| d.min(NO_ROUTE_DISTANCE));
        if !node.neighbors.store_vector(sender, clamped) {
            return Err(Error::invalid_state(format!(
                "distance vector from {} which is not a neighbor",
                sender
            )));
        }
        Ok(Self::recompute(node, sender))
    }

    /// Picks the next neighbor to send our vector to: among the unsynced
    /// neighbors that are currently `visible`, the one contacted longest ago,
    /// lowest id first on ties.
    pub fn next_unsynced(node: &Node, visible: &[NodeId]) -> Option<NodeId> {
        node.neighbors
            .iter()
            .filter(|n| !n.is_synced && visible.contains(&n.id))
            .min_by_key(|n| (n.last_contact, n.id))
            .map(|n| n.id)
    }

    /// Records that `neighbor` acknowledged our vector at `now`.
    /// Returns the number of neighbors still unsynced.
    pub fn acknowledge(node: &mut Node, neighbor: NodeId, now: Timestamp) -> usize {
        if node.neighbors.mark_synced(neighbor) {
            node.neighbors.touch(neighbor, now);
        } else {
            tracing::warn!(node = %node.id, peer = %neighbor, "vector ack from unknown neighbor");
        }
        node.neighbors.count_unsynced()
    }
}
