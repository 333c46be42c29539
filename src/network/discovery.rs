use std::collections::{BTreeMap, BTreeSet};

use crate::core::{Distance, NodeId};
use crate::protocol::naming::{BroadcastName, Naming};
use crate::routing::NeighborTable;
use crate::time::Timestamp;
use super::{DiscoveredPeer, NeighborDiscovery, ScanFilter};

/// A broadcaster still waiting for the token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnassignedPeer {
    /// Per-board discovery key
    pub key: String,
    /// Full broadcast name to attach to
    pub name: String,
    /// Strongest signal seen for this key during the pass
    pub signal_strength: i32,
}

/// Result of one discovery pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanReport {
    /// Unassigned broadcasters, one entry per discovery key, ordered by key
    pub unassigned: Vec<UnassignedPeer>,
    /// Ids of assigned broadcasters, ascending
    pub assigned: Vec<NodeId>,
}

impl ScanReport {
    /// Unassigned peer the token should go to next: strongest signal,
    /// lowest key on ties
    pub fn strongest_unassigned(&self) -> Option<&UnassignedPeer> {
        self.unassigned
            .iter()
            .min_by(|a, b| b.signal_strength.cmp(&a.signal_strength).then_with(|| a.key.cmp(&b.key)))
    }

    /// Returns whether `id` was seen broadcasting during the pass
    pub fn saw(&self, id: NodeId) -> bool {
        self.assigned.binary_search(&id).is_ok()
    }
}

/// Turns raw scan results into neighbor knowledge
#[derive(Debug, Clone, Default)]
pub struct Discovery {
    naming: Naming,
}

impl Discovery {
    /// Creates a classifier for the given naming scheme
    pub fn new(naming: Naming) -> Self {
        Discovery { naming }
    }

    /// Returns the naming scheme
    pub fn naming(&self) -> &Naming {
        &self.naming
    }

    /// Runs a scan and classifies what it saw
    pub fn scan<D: NeighborDiscovery + ?Sized>(
        &self,
        discovery: &mut D,
        filter: ScanFilter,
        own_id: NodeId,
    ) -> ScanReport {
        let peers = discovery.scan(filter);
        let mut report = self.classify(&peers, own_id);
        if filter == ScanFilter::AssignedOnly {
            report.unassigned.clear();
        }
        tracing::debug!(
            node = %own_id,
            seen = peers.len(),
            unassigned = report.unassigned.len(),
            assigned = report.assigned.len(),
            "scan complete"
        );
        report
    }

    /// Splits scan results into unassigned and assigned broadcasters.
    /// Duplicate unassigned keys collapse to one entry; foreign names and
    /// our own id are skipped.
    pub fn classify(&self, peers: &[DiscoveredPeer], own_id: NodeId) -> ScanReport {
        let mut unassigned: BTreeMap<String, UnassignedPeer> = BTreeMap::new();
        let mut assigned = BTreeSet::new();

        for peer in peers {
            match self.naming.parse(&peer.name) {
                Some(BroadcastName::Assigned(id)) if id != own_id => {
                    assigned.insert(id);
                }
                Some(BroadcastName::Assigned(_)) => {}
                Some(BroadcastName::Unassigned(key)) => {
                    let entry = unassigned.entry(key.clone()).or_insert_with(|| UnassignedPeer {
                        key,
                        name: peer.name.clone(),
                        signal_strength: peer.signal_strength,
                    });
                    entry.signal_strength = entry.signal_strength.max(peer.signal_strength);
                }
                None => {
                    tracing::trace!(name = %peer.name, "ignoring foreign broadcaster");
                }
            }
        }

        ScanReport {
            unassigned: unassigned.into_values().collect(),
            assigned: assigned.into_iter().collect(),
        }
    }

    /// Records every assigned broadcaster of a pass as a neighbor.
    /// Returns the number of neighbors that were not known before.
    pub fn record(
        &self,
        report: &ScanReport,
        neighbors: &mut NeighborTable,
        link_cost: Distance,
        now: Timestamp,
    ) -> usize {
        report
            .assigned
            .iter()
            .filter(|&&id| neighbors.upsert(id, link_cost, now))
            .count()
    }
}
