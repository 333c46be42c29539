//! Id assignment by token circulation
//!
//! The token is a single integer, the next id to hand out. It travels as a
//! depth-first walk over the adjacency discovered at runtime: down to the
//! strongest unassigned broadcaster a holder can see, and back up to the
//! parent once a holder sees no unassigned broadcaster. Every holder keeps
//! the highest value it has seen, so ids handed out in one subtree are never
//! reused in the next.

use crate::core::{Error, NodeId, Result, MAX_NODES};
use crate::routing::Node;
use super::discovery::ScanReport;

/// What receiving the token did to the local node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenOutcome {
    /// The node took an id and a parent
    Assigned {
        /// New id
        id: NodeId,
        /// Node that handed over the token
        parent: NodeId,
    },
    /// The node already had an id; it only carries the token on
    PassThrough,
}

/// What the holder does with the token after a discovery pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssignerStep {
    /// Hand the token down to an unassigned broadcaster
    Forward {
        /// Broadcast name to attach to
        to_name: String,
        /// Token value to send
        token: u16,
    },
    /// Subtree closed, hand the token back up
    ReturnToParent {
        /// Parent id
        parent: NodeId,
        /// Token value to send
        token: u16,
    },
    /// The root's subtree is closed: every reachable node holds an id
    Complete,
}

/// Token bookkeeping of one node
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpanningTreeAssigner {
    token: u16,
    held: bool,
}

impl SpanningTreeAssigner {
    /// Creates an assigner that has never seen the token
    pub fn new() -> Self {
        Self::default()
    }

    /// Next id this node would hand out
    pub fn token(&self) -> u16 {
        self.token
    }

    /// Returns whether the token is currently at this node
    pub fn holds_token(&self) -> bool {
        self.held
    }

    /// Makes `node` the root: it takes id 0 and holds the token.
    /// A node that already has an id keeps it and simply takes the token again.
    pub fn start(&mut self, node: &mut Node) -> Result<()> {
        if !node.is_assigned() {
            node.assign(NodeId::ROOT)?;
            node.parent_id = NodeId::UNASSIGNED;
        }
        self.token = self.token.max(node.id.value() + 1);
        self.held = true;
        tracing::info!(node = %node.id, token = self.token, "starting id assignment");
        Ok(())
    }

    /// Takes the token handed over by `sender`.
    ///
    /// An unassigned node takes `value` as its id; an assigned one passes the
    /// token through. Fails with `NetworkFull` when `value` is not a valid id,
    /// leaving the node unassigned.
    pub fn receive_token(&mut self, node: &mut Node, sender: NodeId, value: u16) -> Result<TokenOutcome> {
        if node.is_assigned() {
            self.token = self.token.max(value);
            self.held = true;
            tracing::debug!(node = %node.id, peer = %sender, token = value, "token passes through");
            return Ok(TokenOutcome::PassThrough);
        }

        if value as usize >= MAX_NODES {
            return Err(Error::NetworkFull(value));
        }
        let id = NodeId::new(value);
        node.assign(id)?;
        node.parent_id = sender;
        self.token = value + 1;
        self.held = true;
        tracing::info!(node = %id, parent = %sender, "assigned id");
        Ok(TokenOutcome::Assigned { id, parent: sender })
    }

    /// Decides where the token goes after a discovery pass
    pub fn next_step(&mut self, node: &Node, report: &ScanReport) -> AssignerStep {
        if let Some(peer) = report.strongest_unassigned() {
            self.held = false;
            return AssignerStep::Forward {
                to_name: peer.name.clone(),
                token: self.token,
            };
        }

        if node.is_root() || !node.parent_id.is_assigned() {
            self.held = false;
            tracing::info!(node = %node.id, assigned = self.token, "id assignment complete");
            return AssignerStep::Complete;
        }

        self.held = false;
        AssignerStep::ReturnToParent {
            parent: node.parent_id,
            token: self.token,
        }
    }

    /// Puts the token back after a failed hand-off
    pub fn keep(&mut self) {
        self.held = true;
    }
}
