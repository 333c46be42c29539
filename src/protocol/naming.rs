//! Broadcast names
//!
//! A broadcaster advertises `<prefix>_<value>`. Nodes holding an id use the
//! assigned prefix with their decimal id; nodes still waiting for the token
//! use the unassigned prefix with their hardware identifier, which doubles as
//! the discovery key.

use crate::core::{Config, NodeId};

/// What a broadcast name says about the node behind it
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BroadcastName {
    /// Node that already holds an id
    Assigned(NodeId),
    /// Node awaiting the token, identified by its hardware key
    Unassigned(String),
}

/// Builds and parses broadcast names for one prefix pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Naming {
    assigned_prefix: String,
    unassigned_prefix: String,
}

impl Naming {
    /// Creates a naming scheme from explicit prefixes
    pub fn new(assigned_prefix: impl Into<String>, unassigned_prefix: impl Into<String>) -> Self {
        Naming {
            assigned_prefix: assigned_prefix.into(),
            unassigned_prefix: unassigned_prefix.into(),
        }
    }

    /// Creates the naming scheme configured for this node
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.assigned_prefix.clone(), config.unassigned_prefix.clone())
    }

    /// Name broadcast by a node holding `id`
    pub fn assigned(&self, id: NodeId) -> String {
        format!("{}_{}", self.assigned_prefix, id)
    }

    /// Name broadcast by a node waiting for the token
    pub fn unassigned(&self, hardware_key: &str) -> String {
        format!("{}_{}", self.unassigned_prefix, hardware_key)
    }

    /// Name this node broadcasts with the given id and hardware key
    pub fn for_node(&self, id: NodeId, hardware_key: &str) -> String {
        if id.is_assigned() {
            self.assigned(id)
        } else {
            self.unassigned(hardware_key)
        }
    }

    /// Classifies a broadcast name; names of foreign networks yield `None`
    pub fn parse(&self, name: &str) -> Option<BroadcastName> {
        let (prefix, value) = name.split_once('_')?;
        if value.is_empty() {
            return None;
        }
        if prefix == self.assigned_prefix {
            let id: NodeId = value.parse().ok()?;
            id.is_assigned().then_some(BroadcastName::Assigned(id))
        } else if prefix == self.unassigned_prefix {
            Some(BroadcastName::Unassigned(value.to_string()))
        } else {
            None
        }
    }
}

impl Default for Naming {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}
