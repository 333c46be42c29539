use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;

use bytes::BytesMut;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tokio_util::codec::{Decoder, Encoder};

use crate::core::{Address, Config, Error, NodeId, Result};
use crate::network::{
    AssignerStep, Discovery, IdentitySource, NeighborDiscovery, PacketTransport, RadioControl, Role,
    ScanFilter, SpanningTreeAssigner,
};
use crate::routing::{DistanceVectorEngine, Node, NodeSnapshot};
use crate::time::Timestamp;
use crate::util;
use super::codec::{self, PacketCodec};
use super::command::Command;
use super::naming::Naming;
use super::packet::{Packet, PacketKind};

/// Number of role changes kept for inspection
const TRANSITION_LOG_LEN: usize = 1024;

/// What the node as a whole is busy with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    /// Nothing pending; every neighbor holds our current vector
    Idle,
    /// Taking part in the id assignment
    FindingNeighbors,
    /// Exchanging distance vectors
    RoutingDv,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Idle => "idle",
            Phase::FindingNeighbors => "finding-neighbors",
            Phase::RoutingDv => "routing-dv",
        };
        f.write_str(name)
    }
}

/// What a connect request asks the radio to do
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// Broadcast under our own name and accept a listener
    EnableBroadcast,
    /// Scan for every broadcaster and move the token on
    FindNeighbors,
    /// Scan for assigned broadcasters and send our vector to one of them
    DvScan,
    /// Attach to an assigned node
    Node(NodeId),
    /// Attach to an unassigned broadcaster by name
    Unassigned(String),
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::EnableBroadcast => f.write_str("enable-broadcast"),
            Target::FindNeighbors => f.write_str("find-neighbors"),
            Target::DvScan => f.write_str("dv-scan"),
            Target::Node(id) => write!(f, "node {}", id),
            Target::Unassigned(name) => write!(f, "{}", name),
        }
    }
}

#[derive(Debug, Clone)]
struct ConnectRequest {
    target: Target,
    not_before: Timestamp,
}

/// A sent packet waiting for its acknowledgment
#[derive(Debug, Clone)]
struct Awaiting {
    kind: PacketKind,
    peer: Option<NodeId>,
    deadline: Timestamp,
}

/// One role change of the radio, as seen by the scheduler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    /// When the role changed
    pub at: Timestamp,
    /// Role taken
    pub role: Role,
    /// Phase at the time
    pub phase: Phase,
    /// Neighbors that had not acknowledged our vector
    pub unsynced: usize,
}

/// Information about the current scheduler state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateInfo {
    /// Current phase
    pub phase: Phase,
    /// Current radio role
    pub role: Role,
    /// Whether the token is at this node
    pub holds_token: bool,
    /// Next id this node would hand out
    pub token: u16,
    /// Whether an acknowledgment is waiting to go out
    pub ack_pending: bool,
    /// Whether a packet is waiting to go out
    pub send_pending: bool,
    /// Routing state
    pub node: NodeSnapshot,
}

/// Owner of the single radio link of a node.
///
/// All protocol work happens in two entry points: [`handle_datagram`] for
/// each inbound datagram in arrival order, and [`poll`] which runs at most
/// one step of outbound work. At most one transaction is in flight: a
/// pending acknowledgment blocks every role change, and a sent packet blocks
/// everything until its acknowledgment arrives or the link times out.
///
/// [`handle_datagram`]: LinkScheduler::handle_datagram
/// [`poll`]: LinkScheduler::poll
pub struct LinkScheduler<R, D, T> {
    config: Config,
    hardware_key: String,
    discovery: Discovery,
    assigner: SpanningTreeAssigner,
    node: Node,
    phase: Phase,
    radio: R,
    scanner: D,
    transport: T,
    codec: PacketCodec,
    connect: Option<ConnectRequest>,
    send_queue: Option<Packet>,
    ack_queue: Option<(Packet, Address)>,
    awaiting: Option<Awaiting>,
    next_dv_scan: Option<Timestamp>,
    rng: StdRng,
    delivered: VecDeque<Packet>,
    transitions: VecDeque<Transition>,
}

impl<R, D, T> LinkScheduler<R, D, T>
where
    R: RadioControl,
    D: NeighborDiscovery,
    T: PacketTransport,
{
    /// Creates a scheduler for an unassigned node
    pub fn new<I: IdentitySource + ?Sized>(
        config: Config,
        identity: &I,
        radio: R,
        scanner: D,
        transport: T,
    ) -> Result<Self> {
        config.validate()?;
        let rng = match config.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Ok(LinkScheduler {
            hardware_key: identity.unique_hardware_id(),
            discovery: Discovery::new(Naming::from_config(&config)),
            assigner: SpanningTreeAssigner::new(),
            node: Node::new(config.broadcaster_address.clone()),
            phase: Phase::Idle,
            radio,
            scanner,
            transport,
            codec: PacketCodec::new(),
            connect: None,
            send_queue: None,
            ack_queue: None,
            awaiting: None,
            next_dv_scan: None,
            rng,
            delivered: VecDeque::new(),
            transitions: VecDeque::new(),
            config,
        })
    }

    /// Brings the radio up as a broadcaster. A failure here is fatal.
    pub fn boot(&mut self, now: Timestamp) -> Result<()> {
        self.enable_broadcast(now).map_err(|e| {
            tracing::error!(error = %e, "radio failed to start");
            e
        })?;
        tracing::info!(name = %self.broadcast_name(), "node up");
        Ok(())
    }

    /// Local node state
    pub fn node(&self) -> &Node {
        &self.node
    }

    /// Current phase
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Radio capability
    pub fn radio(&self) -> &R {
        &self.radio
    }

    /// Transport capability
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Scan capability
    pub fn scanner_mut(&mut self) -> &mut D {
        &mut self.scanner
    }

    /// Name this node broadcasts under
    pub fn broadcast_name(&self) -> String {
        self.discovery.naming().for_node(self.node.id, &self.hardware_key)
    }

    /// Returns whether the token is at this node
    pub fn holds_token(&self) -> bool {
        self.assigner.holds_token()
    }

    /// Returns whether the radio link is up
    pub fn is_linked(&self) -> bool {
        self.radio.is_linked()
    }

    /// Returns whether any outbound work is pending
    pub fn is_busy(&self) -> bool {
        self.connect.is_some() || self.send_queue.is_some() || self.ack_queue.is_some() || self.awaiting.is_some()
    }

    /// When the next distance-vector scan is due, if one is scheduled
    pub fn next_dv_scan(&self) -> Option<Timestamp> {
        self.next_dv_scan
    }

    /// Recent role changes, oldest first
    pub fn transitions(&self) -> impl Iterator<Item = &Transition> {
        self.transitions.iter()
    }

    /// Takes the data packets addressed to this node
    pub fn take_delivered(&mut self) -> Vec<Packet> {
        self.delivered.drain(..).collect()
    }

    /// Returns a snapshot of the scheduler state
    pub fn snapshot(&self) -> StateInfo {
        StateInfo {
            phase: self.phase,
            role: self.radio.current_role(),
            holds_token: self.assigner.holds_token(),
            token: self.assigner.token(),
            ack_pending: self.ack_queue.is_some(),
            send_pending: self.send_queue.is_some(),
            node: self.node.snapshot(),
        }
    }

    /// Runs an operator command
    pub fn execute(&mut self, command: Command, now: Timestamp) -> Result<()> {
        match command {
            Command::StartToken => {
                self.assigner.start(&mut self.node)?;
                self.set_phase(Phase::FindingNeighbors);
                self.request(Target::FindNeighbors, now);
            }
            Command::ScanNow => {
                if !self.node.is_assigned() {
                    return Err(Error::invalid_state("node has no id yet"));
                }
                self.set_phase(Phase::RoutingDv);
                self.next_dv_scan = Some(now);
            }
            Command::SendData { dest, message } => {
                let packet = Packet::addressed(PacketKind::Data, dest, self.node.id, now).with_payload(message);
                if dest == self.node.id {
                    self.delivered.push_back(packet);
                    return Ok(());
                }
                let hop = self.node.next_hop(dest)?;
                if self.send_queue.is_some() || self.awaiting.is_some() {
                    return Err(Error::invalid_state("an outbound packet is already pending"));
                }
                self.send_queue = Some(packet);
                self.request(Target::Node(hop), now);
            }
        }
        Ok(())
    }

    /// Runs at most one step of outbound work. Returns whether anything ran.
    pub fn poll(&mut self, now: Timestamp) -> bool {
        if let Some((ack, dest)) = self.ack_queue.take() {
            if let Err(e) = self.transmit(ack, &dest) {
                tracing::warn!(node = %self.node.id, error = %e, "failed to send acknowledgment");
            }
            return true;
        }

        if let Some(awaiting) = self.awaiting.take() {
            if now < awaiting.deadline {
                self.awaiting = Some(awaiting);
                return false;
            }
            tracing::warn!(node = %self.node.id, kind = %awaiting.kind, "no acknowledgment before timeout");
            self.on_link_failure(awaiting.kind, awaiting.peer, now);
            return true;
        }

        if let Some(request) = self.connect.take() {
            if now < request.not_before {
                self.connect = Some(request);
                return false;
            }
            self.run_target(request.target, now);
            return true;
        }

        if let Some(packet) = self.send_queue.take() {
            if self.radio.current_role() == Role::Listener && self.radio.is_linked() {
                self.send_pending(packet, now);
            } else {
                tracing::warn!(node = %self.node.id, kind = %packet.kind, "link lost before send");
                self.on_link_failure(packet.kind, packet.dest_id, now);
            }
            return true;
        }

        if self.next_dv_scan.map_or(false, |due| now >= due) {
            self.next_dv_scan = None;
            self.run_target(Target::DvScan, now);
            return true;
        }

        false
    }

    /// Processes one inbound datagram
    pub fn handle_datagram(&mut self, bytes: &[u8], source: &Address, now: Timestamp) {
        let mut buf = BytesMut::from(bytes);
        let packet = match self.codec.decode(&mut buf) {
            Ok(Some(packet)) => packet,
            Ok(None) => return,
            Err(e) => {
                tracing::warn!(node = %self.node.id, source = %source, error = %e, "dropping malformed packet");
                return;
            }
        };
        tracing::debug!(
            node = %self.node.id,
            kind = %packet.kind,
            peer = ?packet.src_id,
            seq = ?packet.sequence_number,
            "packet received"
        );

        let acknowledge = match packet.kind {
            PacketKind::Ack => {
                self.on_ack(&packet, now);
                false
            }
            PacketKind::Token => self.on_token(&packet, now),
            PacketKind::Data => self.on_data(&packet, now),
            PacketKind::DistanceVector => self.on_vector(&packet, now),
        };

        if acknowledge {
            let reply_to = packet.src_address.clone().unwrap_or_else(|| source.clone());
            let ack = packet.ack(self.node.id, self.node.address.clone());
            if self.ack_queue.replace((ack, reply_to)).is_some() {
                tracing::warn!(node = %self.node.id, "unsent acknowledgment replaced");
            }
        }
    }

    fn on_ack(&mut self, packet: &Packet, now: Timestamp) {
        let Some(awaiting) = self.awaiting.take() else {
            tracing::debug!(node = %self.node.id, "ignoring unexpected acknowledgment");
            return;
        };
        let acked = packet.acked_kind().unwrap_or(awaiting.kind);
        if acked != awaiting.kind {
            tracing::warn!(node = %self.node.id, expected = %awaiting.kind, got = %acked, "acknowledgment for another packet");
            self.awaiting = Some(awaiting);
            return;
        }
        if let Some(sent) = packet.timestamp {
            tracing::debug!(
                node = %self.node.id,
                kind = %acked,
                rtt_us = util::duration_to_micros(now.saturating_duration_since(sent)),
                "acknowledged"
            );
        }

        match acked {
            PacketKind::Token | PacketKind::Data | PacketKind::Ack => {
                self.request(Target::EnableBroadcast, now);
            }
            PacketKind::DistanceVector => {
                let Some(peer) = packet.src_id.or(awaiting.peer) else {
                    self.request(Target::EnableBroadcast, now);
                    return;
                };
                let remaining = DistanceVectorEngine::acknowledge(&mut self.node, peer, now);
                tracing::debug!(node = %self.node.id, peer = %peer, remaining, "neighbor synced");
                if remaining == 0 {
                    self.enter_idle(now);
                } else {
                    self.set_phase(Phase::RoutingDv);
                    self.request(Target::DvScan, now);
                }
            }
        }
    }

    fn on_token(&mut self, packet: &Packet, now: Timestamp) -> bool {
        let Some(value) = packet.payload.as_deref().and_then(|p| p.trim().parse::<u16>().ok()) else {
            tracing::warn!(node = %self.node.id, payload = ?packet.payload, "token without a value, dropping");
            return false;
        };
        let sender = packet.src_id.unwrap_or(NodeId::UNASSIGNED);

        match self.assigner.receive_token(&mut self.node, sender, value) {
            Ok(_) => {
                self.set_phase(Phase::FindingNeighbors);
                self.request(Target::FindNeighbors, now + self.config.settle_delay);
            }
            Err(e) => {
                tracing::warn!(node = %self.node.id, peer = %sender, error = %e, "cannot take the token");
            }
        }
        true
    }

    fn on_data(&mut self, packet: &Packet, now: Timestamp) -> bool {
        let Some(dest) = packet.dest_id.filter(NodeId::is_assigned) else {
            tracing::warn!(node = %self.node.id, "data packet without destination, dropping");
            return false;
        };

        if dest == self.node.id {
            tracing::info!(
                node = %self.node.id,
                peer = ?packet.src_id,
                text = packet.payload.as_deref().unwrap_or_default(),
                "data delivered"
            );
            self.delivered.push_back(packet.clone());
            return true;
        }

        match self.node.next_hop(dest) {
            Ok(hop) if self.send_queue.is_none() && self.awaiting.is_none() => {
                tracing::info!(node = %self.node.id, dest = %dest, via = %hop, "forwarding data");
                let mut forward = packet.clone();
                forward.src_id = Some(self.node.id);
                self.send_queue = Some(forward);
                self.request(Target::Node(hop), now);
            }
            Ok(_) => {
                tracing::warn!(node = %self.node.id, dest = %dest, "outbound slot busy, dropping data");
            }
            Err(e) => {
                tracing::warn!(node = %self.node.id, error = %e, "dropping data");
            }
        }
        true
    }

    fn on_vector(&mut self, packet: &Packet, now: Timestamp) -> bool {
        let Some(sender) = packet.src_id.filter(|id| id.index().is_some()) else {
            tracing::warn!(node = %self.node.id, peer = ?packet.src_id, "distance vector from invalid sender, dropping");
            return false;
        };
        if !self.node.is_assigned() {
            tracing::warn!(peer = %sender, "distance vector before id assignment, dropping");
            return false;
        }
        let vector = match packet.payload.as_deref().map(codec::decode_vector) {
            Some(Ok(vector)) => vector,
            Some(Err(e)) => {
                tracing::warn!(node = %self.node.id, peer = %sender, error = %e, "dropping distance vector");
                return false;
            }
            None => {
                tracing::warn!(node = %self.node.id, peer = %sender, "distance vector without payload, dropping");
                return false;
            }
        };

        self.set_phase(Phase::RoutingDv);
        if self.node.neighbors.upsert(sender, self.config.link_cost, now) {
            DistanceVectorEngine::initialize(&mut self.node);
        }
        self.node.neighbors.touch(sender, now);

        match DistanceVectorEngine::ingest(&mut self.node, sender, vector) {
            Ok(true) => tracing::info!(node = %self.node.id, peer = %sender, "routes updated"),
            Ok(false) => tracing::debug!(node = %self.node.id, peer = %sender, "routes unchanged"),
            Err(e) => tracing::warn!(node = %self.node.id, error = %e, "failed to ingest distance vector"),
        }
        self.next_dv_scan = Some(now + self.config.dv_coalesce_delay);
        true
    }

    fn run_target(&mut self, target: Target, now: Timestamp) {
        tracing::debug!(node = %self.node.id, to = %target, "connect");
        match target {
            Target::EnableBroadcast => {
                if let Err(e) = self.enable_broadcast(now) {
                    tracing::warn!(node = %self.node.id, error = %e, "failed to broadcast, retrying");
                    self.request(Target::EnableBroadcast, now + self.config.settle_delay);
                }
            }
            Target::FindNeighbors => self.find_neighbors(now),
            Target::DvScan => self.dv_scan(now),
            Target::Node(id) => {
                let name = self.discovery.naming().assigned(id);
                self.attach(&name, Some(id), now);
            }
            Target::Unassigned(name) => self.attach(&name, None, now),
        }
    }

    fn find_neighbors(&mut self, now: Timestamp) {
        if let Err(e) = self.become_listener(now) {
            tracing::warn!(node = %self.node.id, error = %e, "cannot scan, retrying");
            self.request(Target::FindNeighbors, now + self.config.settle_delay);
            return;
        }
        let report = self.discovery.scan(&mut self.scanner, ScanFilter::All, self.node.id);
        self.discovery
            .record(&report, &mut self.node.neighbors, self.config.link_cost, now);

        if !self.node.is_assigned() {
            self.fall_back(now);
            return;
        }

        match self.assigner.next_step(&self.node, &report) {
            AssignerStep::Forward { to_name, token } => {
                tracing::info!(node = %self.node.id, to = %to_name, token, "passing token down");
                self.send_queue = Some(
                    Packet::addressed(PacketKind::Token, NodeId::UNASSIGNED, self.node.id, now)
                        .with_payload(token.to_string()),
                );
                self.request(Target::Unassigned(to_name), now);
            }
            AssignerStep::ReturnToParent { parent, token } => {
                DistanceVectorEngine::initialize(&mut self.node);
                tracing::info!(node = %self.node.id, parent = %parent, token, "subtree closed, returning token");
                self.send_queue = Some(
                    Packet::addressed(PacketKind::Token, parent, self.node.id, now).with_payload(token.to_string()),
                );
                self.request(Target::Node(parent), now);
            }
            AssignerStep::Complete => {
                DistanceVectorEngine::initialize(&mut self.node);
                if self.config.auto_start_routing {
                    self.set_phase(Phase::RoutingDv);
                    self.next_dv_scan = Some(now);
                }
                self.fall_back(now);
            }
        }
    }

    fn dv_scan(&mut self, now: Timestamp) {
        if !self.node.is_assigned() {
            tracing::debug!("skipping distance-vector scan before id assignment");
            return;
        }
        if self.node.neighbors.count_unsynced() == 0 {
            self.enter_idle(now);
            return;
        }
        if let Err(e) = self.become_listener(now) {
            tracing::warn!(node = %self.node.id, error = %e, "cannot scan");
            self.next_dv_scan = Some(now + self.cooldown());
            return;
        }

        let report = self.discovery.scan(&mut self.scanner, ScanFilter::AssignedOnly, self.node.id);
        if self
            .discovery
            .record(&report, &mut self.node.neighbors, self.config.link_cost, now)
            > 0
        {
            DistanceVectorEngine::initialize(&mut self.node);
        }

        match DistanceVectorEngine::next_unsynced(&self.node, &report.assigned) {
            Some(peer) => {
                let vector = DistanceVectorEngine::encode_for(&self.node, peer);
                tracing::debug!(node = %self.node.id, peer = %peer, "sending distance vector");
                self.send_queue = Some(
                    Packet::addressed(PacketKind::DistanceVector, peer, self.node.id, now)
                        .with_payload(codec::encode_vector(&vector)),
                );
                self.request(Target::Node(peer), now);
            }
            None => {
                let wait = self.cooldown();
                tracing::debug!(
                    node = %self.node.id,
                    unsynced = self.node.neighbors.count_unsynced(),
                    wait_ms = wait.as_millis() as u64,
                    "no unsynced neighbor in range"
                );
                self.next_dv_scan = Some(now + wait);
                self.fall_back(now);
            }
        }
    }

    fn attach(&mut self, name: &str, peer: Option<NodeId>, now: Timestamp) {
        let attached = self
            .become_listener(now)
            .and_then(|_| self.radio.attach(name, self.config.connect_timeout));
        if let Err(e) = attached {
            tracing::warn!(node = %self.node.id, to = %name, error = %e, "attach failed");
            match self.send_queue.as_ref().map(|p| p.kind) {
                Some(kind) => self.on_link_failure(kind, peer, now),
                None => self.fall_back(now),
            }
            return;
        }
        if let Some(id) = peer {
            self.node.neighbors.touch(id, now);
        }
        tracing::debug!(node = %self.node.id, to = %name, "attached");
    }

    fn send_pending(&mut self, packet: Packet, now: Timestamp) {
        let kind = packet.kind;
        let peer = packet.dest_id;
        let dest = self.config.broadcaster_address.clone();
        match self.transmit(packet, &dest) {
            Ok(()) => {
                self.awaiting = Some(Awaiting {
                    kind,
                    peer,
                    deadline: now + self.config.connect_timeout,
                });
            }
            Err(e) => {
                tracing::warn!(node = %self.node.id, kind = %kind, error = %e, "send failed");
                self.on_link_failure(kind, peer, now);
            }
        }
    }

    /// Stamps and sends a packet over the current link
    fn transmit(&mut self, mut packet: Packet, dest: &Address) -> Result<()> {
        packet.src_address = Some(self.node.address.clone());
        if packet.sequence_number.is_none() {
            packet.sequence_number = Some(self.node.sequence_counter);
        }
        let kind = packet.kind;
        let seq = packet.sequence_number;

        let mut buf = BytesMut::new();
        self.codec.encode(packet, &mut buf)?;
        self.transport.send(&buf, dest)?;
        self.node.sequence_counter = self.node.sequence_counter.wrapping_add(1);

        tracing::debug!(node = %self.node.id, kind = %kind, seq = ?seq, dest = %dest, "packet sent");
        Ok(())
    }

    /// Gives up on the current transaction and returns to broadcasting
    fn on_link_failure(&mut self, kind: PacketKind, peer: Option<NodeId>, now: Timestamp) {
        self.send_queue = None;
        self.awaiting = None;
        self.fall_back(now);

        match kind {
            PacketKind::Token => {
                self.assigner.keep();
                self.request(Target::FindNeighbors, now + self.config.settle_delay);
            }
            PacketKind::DistanceVector => {
                let wait = self.cooldown();
                tracing::debug!(node = %self.node.id, peer = ?peer, wait_ms = wait.as_millis() as u64, "vector not delivered");
                self.next_dv_scan = Some(now + wait);
            }
            PacketKind::Data => {
                tracing::warn!(node = %self.node.id, peer = ?peer, "data packet dropped");
            }
            PacketKind::Ack => {}
        }
    }

    /// Settles in broadcaster role once every neighbor holds our vector
    fn enter_idle(&mut self, now: Timestamp) {
        if self.node.neighbors.count_unsynced() > 0 {
            self.set_phase(Phase::RoutingDv);
            self.next_dv_scan = Some(now);
            return;
        }
        self.next_dv_scan = None;
        if self.phase != Phase::Idle {
            tracing::info!(node = %self.node.id, "routing converged\n{}", self.node.render_tables());
        }
        self.set_phase(Phase::Idle);
        self.request(Target::EnableBroadcast, now);
    }

    fn fall_back(&mut self, now: Timestamp) {
        if let Err(e) = self.enable_broadcast(now) {
            tracing::warn!(node = %self.node.id, error = %e, "failed to broadcast, retrying");
            self.request(Target::EnableBroadcast, now + self.config.settle_delay);
        }
    }

    fn enable_broadcast(&mut self, now: Timestamp) -> Result<()> {
        let name = self.broadcast_name();
        self.radio.become_broadcaster(&name)?;
        self.node.address = self.config.broadcaster_address.clone();
        self.record(Role::Broadcaster, now);
        Ok(())
    }

    fn become_listener(&mut self, now: Timestamp) -> Result<()> {
        self.radio.become_listener()?;
        self.node.address = self.config.listener_address.clone();
        self.record(Role::Listener, now);
        Ok(())
    }

    fn request(&mut self, target: Target, not_before: Timestamp) {
        self.connect = Some(ConnectRequest { target, not_before });
    }

    fn set_phase(&mut self, phase: Phase) {
        if self.phase != phase {
            tracing::info!(node = %self.node.id, from = %self.phase, to = %phase, "phase change");
            self.phase = phase;
        }
    }

    fn record(&mut self, role: Role, at: Timestamp) {
        if self.transitions.len() == TRANSITION_LOG_LEN {
            self.transitions.pop_front();
        }
        self.transitions.push_back(Transition {
            at,
            role,
            phase: self.phase,
            unsynced: self.node.neighbors.count_unsynced(),
        });
    }

    fn cooldown(&mut self) -> Duration {
        util::jitter(&mut self.rng, self.config.cooldown_min, self.config.cooldown_max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::unreachable_vector;
    use crate::network::DiscoveredPeer;

    struct MockRadio {
        role: Role,
        linked: bool,
        fail_attach: bool,
        names: Vec<String>,
        attached: Vec<String>,
    }

    impl MockRadio {
        fn new() -> Self {
            MockRadio {
                role: Role::Off,
                linked: false,
                fail_attach: false,
                names: Vec::new(),
                attached: Vec::new(),
            }
        }
    }

    impl RadioControl for MockRadio {
        fn become_broadcaster(&mut self, name: &str) -> Result<()> {
            self.role = Role::Broadcaster;
            self.linked = false;
            self.names.push(name.to_string());
            Ok(())
        }

        fn become_listener(&mut self) -> Result<()> {
            self.role = Role::Listener;
            self.linked = false;
            Ok(())
        }

        fn attach(&mut self, target_name: &str, _timeout: Duration) -> Result<()> {
            if self.fail_attach {
                return Err(Error::connect("attach timed out"));
            }
            self.linked = true;
            self.attached.push(target_name.to_string());
            Ok(())
        }

        fn current_role(&self) -> Role {
            self.role
        }

        fn is_linked(&self) -> bool {
            self.linked
        }
    }

    struct MockScan(Vec<DiscoveredPeer>);

    impl NeighborDiscovery for MockScan {
        fn scan(&mut self, _filter: ScanFilter) -> Vec<DiscoveredPeer> {
            self.0.clone()
        }
    }

    #[derive(Default)]
    struct MockTransport {
        sent: Vec<(Packet, Address)>,
    }

    impl PacketTransport for MockTransport {
        fn send(&mut self, bytes: &[u8], dest: &Address) -> Result<()> {
            self.sent.push((codec::decode(bytes)?, dest.clone()));
            Ok(())
        }
    }

    struct Board;

    impl IdentitySource for Board {
        fn unique_hardware_id(&self) -> String {
            "E661".to_string()
        }
    }

    type Scheduler = LinkScheduler<MockRadio, MockScan, MockTransport>;

    fn t(secs: u64) -> Timestamp {
        Timestamp::from_micros(secs * 1_000_000)
    }

    fn scheduler(peers: Vec<DiscoveredPeer>) -> Scheduler {
        let config = Config {
            rng_seed: Some(1),
            ..Config::default()
        };
        let mut scheduler =
            LinkScheduler::new(config, &Board, MockRadio::new(), MockScan(peers), MockTransport::default()).unwrap();
        scheduler.boot(Timestamp::ZERO).unwrap();
        scheduler
    }

    /// Scheduler holding id `id` with the given neighbors already known
    fn assigned(id: u16, neighbors: &[u16], peers: Vec<DiscoveredPeer>) -> Scheduler {
        let mut scheduler = scheduler(peers);
        scheduler.node.assign(NodeId::new(id)).unwrap();
        for &n in neighbors {
            scheduler.node.neighbors.upsert(NodeId::new(n), 1, Timestamp::ZERO);
        }
        DistanceVectorEngine::initialize(&mut scheduler.node);
        scheduler
    }

    fn datagram(text: &str) -> Vec<u8> {
        text.as_bytes().to_vec()
    }

    fn listener() -> Address {
        Address::new("192.168.4.10")
    }

    fn run(scheduler: &mut Scheduler, now: Timestamp) {
        while scheduler.poll(now) {}
    }

    #[test]
    fn test_boot_broadcasts_unassigned_name() {
        let scheduler = scheduler(vec![]);
        assert_eq!(scheduler.radio().names, vec!["pidog_E661".to_string()]);
        assert_eq!(scheduler.radio().current_role(), Role::Broadcaster);
        assert_eq!(scheduler.phase(), Phase::Idle);
        assert!(!scheduler.is_busy());
    }

    #[test]
    fn test_malformed_packet_dropped() {
        let mut scheduler = scheduler(vec![]);
        scheduler.handle_datagram(b"hello;1;2", &listener(), t(1));
        scheduler.handle_datagram(b"dv;1;0", &listener(), t(1));
        assert!(!scheduler.poll(t(1)));
        assert!(scheduler.transport().sent.is_empty());
    }

    #[test]
    fn test_vector_is_ingested_and_acknowledged() {
        let mut scheduler = assigned(1, &[], vec![]);
        let mut vector = unreachable_vector();
        vector[0] = 0;
        vector[2] = 1;
        let text = format!("dv;1;0;192.168.4.10;4;77;{}", codec::encode_vector(&vector));
        scheduler.handle_datagram(&datagram(&text), &listener(), t(5));

        assert_eq!(scheduler.phase(), Phase::RoutingDv);
        assert_eq!(&scheduler.node().distance_vector[..3], &[1, 0, 2]);
        assert_eq!(scheduler.node().routing_table[2], Some(NodeId::ROOT));
        assert_eq!(scheduler.next_dv_scan(), Some(t(15)));

        assert!(scheduler.poll(t(5)));
        let (ack, dest) = &scheduler.transport().sent[0];
        assert_eq!(dest, &listener());
        assert_eq!(ack.kind, PacketKind::Ack);
        assert_eq!(ack.acked_kind(), Some(PacketKind::DistanceVector));
        assert_eq!(ack.src_id, Some(NodeId::new(1)));
        assert_eq!(ack.dest_id, Some(NodeId::ROOT));
        assert_eq!(ack.sequence_number, Some(4));
        assert_eq!(ack.timestamp, Some(Timestamp::from_micros(77)));
    }

    #[test]
    fn test_data_for_self_delivered() {
        let mut scheduler = assigned(2, &[1], vec![]);
        scheduler.handle_datagram(b"data;2;1;192.168.4.10;0;0;hi there", &listener(), t(1));
        let delivered = scheduler.take_delivered();
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].payload.as_deref(), Some("hi there"));
        assert!(scheduler.poll(t(1)));
        assert_eq!(scheduler.transport().sent[0].0.acked_kind(), Some(PacketKind::Data));
    }

    #[test]
    fn test_data_without_route_dropped() {
        let mut scheduler = assigned(1, &[0], vec![]);
        scheduler.handle_datagram(b"data;9;0;192.168.4.10;0;0;lost", &listener(), t(1));
        run(&mut scheduler, t(1));

        let sent = &scheduler.transport().sent;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0.kind, PacketKind::Ack);
        assert!(scheduler.radio().attached.is_empty());
    }

    #[test]
    fn test_data_forwarded_after_ack() {
        let mut scheduler = assigned(1, &[0, 2], vec![]);
        scheduler.handle_datagram(b"data;2;0;192.168.4.10;3;9;ping", &listener(), t(1));

        assert!(scheduler.poll(t(1)));
        assert_eq!(scheduler.transport().sent[0].0.kind, PacketKind::Ack);
        assert!(scheduler.radio().attached.is_empty());

        assert!(scheduler.poll(t(1)));
        assert_eq!(scheduler.radio().attached, vec!["picow_2".to_string()]);

        assert!(scheduler.poll(t(1)));
        let (forward, dest) = &scheduler.transport().sent[1];
        assert_eq!(dest, &Address::new("192.168.4.1"));
        assert_eq!(forward.kind, PacketKind::Data);
        assert_eq!(forward.src_id, Some(NodeId::new(1)));
        assert_eq!(forward.dest_id, Some(NodeId::new(2)));
        assert_eq!(forward.src_address, Some(listener()));
        assert_eq!(forward.sequence_number, Some(3));
        assert_eq!(forward.payload.as_deref(), Some("ping"));

        scheduler.handle_datagram(b"ack;1;2;192.168.4.1;3;9;data", &Address::new("192.168.4.1"), t(2));
        assert!(scheduler.poll(t(2)));
        assert_eq!(scheduler.radio().current_role(), Role::Broadcaster);
        assert!(!scheduler.is_busy());
    }

    #[test]
    fn test_scan_sends_to_oldest_unsynced() {
        let peers = vec![DiscoveredPeer::new("picow_0", -40), DiscoveredPeer::new("picow_2", -60)];
        let mut scheduler = assigned(1, &[0, 2], peers);
        scheduler.node.neighbors.touch(NodeId::ROOT, t(3));
        scheduler.execute(Command::ScanNow, t(4)).unwrap();

        run(&mut scheduler, t(4));
        assert_eq!(scheduler.radio().attached, vec!["picow_2".to_string()]);
        let (vector, _) = &scheduler.transport().sent[0];
        assert_eq!(vector.kind, PacketKind::DistanceVector);
        assert_eq!(vector.dest_id, Some(NodeId::new(2)));
        let decoded = codec::decode_vector(vector.payload.as_deref().unwrap()).unwrap();
        assert_eq!(&decoded[..3], &[1, 0, crate::core::POISON_DISTANCE]);

        scheduler.handle_datagram(b"ack;1;2;192.168.4.1;0;0;dv", &Address::new("192.168.4.1"), t(5));
        assert!(scheduler.node().neighbors.get(NodeId::new(2)).unwrap().is_synced);
        assert_eq!(scheduler.phase(), Phase::RoutingDv);

        run(&mut scheduler, t(5));
        assert_eq!(scheduler.radio().attached, vec!["picow_2".to_string(), "picow_0".to_string()]);
        scheduler.handle_datagram(b"ack;1;0;192.168.4.1;1;0;dv", &Address::new("192.168.4.1"), t(6));
        run(&mut scheduler, t(6));

        assert_eq!(scheduler.phase(), Phase::Idle);
        assert_eq!(scheduler.radio().current_role(), Role::Broadcaster);
        assert_eq!(scheduler.next_dv_scan(), None);
    }

    #[test]
    fn test_attach_failure_keeps_neighbor_unsynced() {
        let mut scheduler = assigned(1, &[0], vec![DiscoveredPeer::new("picow_0", -40)]);
        scheduler.radio.fail_attach = true;
        scheduler.execute(Command::ScanNow, t(1)).unwrap();
        run(&mut scheduler, t(1));

        assert_eq!(scheduler.radio().current_role(), Role::Broadcaster);
        assert!(!scheduler.node().neighbors.get(NodeId::ROOT).unwrap().is_synced);
        assert_eq!(scheduler.phase(), Phase::RoutingDv);
        let next = scheduler.next_dv_scan().unwrap();
        assert!(next >= t(16) && next <= t(31));
        assert!(!scheduler.is_busy());
    }

    #[test]
    fn test_missing_ack_times_out() {
        let mut scheduler = assigned(1, &[0], vec![]);
        scheduler
            .execute(Command::SendData { dest: NodeId::ROOT, message: "x".into() }, t(1))
            .unwrap();
        run(&mut scheduler, t(1));
        assert_eq!(scheduler.transport().sent.len(), 1);
        assert!(scheduler.is_busy());

        assert!(!scheduler.poll(t(5)));
        assert!(scheduler.poll(t(11)));
        assert_eq!(scheduler.radio().current_role(), Role::Broadcaster);
        assert!(!scheduler.is_busy());
    }

    #[test]
    fn test_vector_without_ack_rescans_after_cooldown() {
        let mut scheduler = assigned(1, &[0], vec![DiscoveredPeer::new("picow_0", -40)]);
        scheduler.execute(Command::ScanNow, t(1)).unwrap();
        run(&mut scheduler, t(1));
        assert_eq!(scheduler.transport().sent.len(), 1);
        assert_eq!(scheduler.transport().sent[0].0.kind, PacketKind::DistanceVector);

        assert!(!scheduler.poll(t(10)));
        assert!(scheduler.poll(t(11)));
        assert_eq!(scheduler.radio().current_role(), Role::Broadcaster);
        assert!(!scheduler.node().neighbors.get(NodeId::ROOT).unwrap().is_synced);
        assert_eq!(scheduler.phase(), Phase::RoutingDv);
        assert!(!scheduler.is_busy());

        let next = scheduler.next_dv_scan().unwrap();
        assert!(next >= t(26) && next <= t(41));
        run(&mut scheduler, next);
        let (retry, _) = &scheduler.transport().sent[1];
        assert_eq!(retry.kind, PacketKind::DistanceVector);
        assert_eq!(retry.dest_id, Some(NodeId::ROOT));
    }

    #[test]
    fn test_token_forward_failure_keeps_token() {
        let mut scheduler = scheduler(vec![DiscoveredPeer::new("pidog_B", -35)]);
        scheduler.radio.fail_attach = true;
        scheduler.execute(Command::StartToken, t(0)).unwrap();
        run(&mut scheduler, t(0));

        assert!(scheduler.holds_token());
        assert!(scheduler.transport().sent.is_empty());
        assert_eq!(scheduler.radio().current_role(), Role::Broadcaster);
        assert_eq!(scheduler.radio().names.last().map(String::as_str), Some("picow_0"));
        assert_eq!(scheduler.phase(), Phase::FindingNeighbors);
        assert!(scheduler.is_busy());

        scheduler.radio.fail_attach = false;
        run(&mut scheduler, t(1));
        assert_eq!(scheduler.radio().attached, vec!["pidog_B".to_string()]);
        let (token, _) = &scheduler.transport().sent[0];
        assert_eq!(token.kind, PacketKind::Token);
        assert_eq!(token.payload.as_deref(), Some("1"));
        assert!(!scheduler.holds_token());
    }

    #[test]
    fn test_token_return_failure_retries_discovery() {
        let mut scheduler = scheduler(vec![DiscoveredPeer::new("picow_0", -30)]);
        scheduler.handle_datagram(b"token;-1;0;192.168.4.10;0;0;1", &listener(), t(1));
        run(&mut scheduler, t(1));

        scheduler.radio.fail_attach = true;
        run(&mut scheduler, t(2));
        assert!(scheduler.holds_token());
        assert_eq!(scheduler.transport().sent.len(), 1);
        assert_eq!(scheduler.radio().current_role(), Role::Broadcaster);
        assert!(!scheduler.poll(t(2)));

        scheduler.radio.fail_attach = false;
        run(&mut scheduler, t(3));
        assert_eq!(scheduler.radio().attached, vec!["picow_0".to_string()]);
        let (token, _) = &scheduler.transport().sent[1];
        assert_eq!(token.dest_id, Some(NodeId::ROOT));
        assert_eq!(token.payload.as_deref(), Some("2"));
        assert!(!scheduler.holds_token());
    }

    #[test]
    fn test_token_assigns_and_returns_to_parent() {
        let mut scheduler = scheduler(vec![DiscoveredPeer::new("picow_0", -30)]);
        scheduler.handle_datagram(b"token;-1;0;192.168.4.10;0;0;1", &listener(), t(1));

        assert_eq!(scheduler.node().id, NodeId::new(1));
        assert_eq!(scheduler.node().parent_id, NodeId::ROOT);
        assert_eq!(scheduler.phase(), Phase::FindingNeighbors);
        assert!(scheduler.holds_token());

        run(&mut scheduler, t(1));
        assert_eq!(scheduler.transport().sent.len(), 1);
        assert!(scheduler.radio().attached.is_empty());

        run(&mut scheduler, t(2));
        assert_eq!(scheduler.radio().attached, vec!["picow_0".to_string()]);
        let (token, _) = &scheduler.transport().sent[1];
        assert_eq!(token.kind, PacketKind::Token);
        assert_eq!(token.dest_id, Some(NodeId::ROOT));
        assert_eq!(token.payload.as_deref(), Some("2"));
        assert_eq!(scheduler.node().distance_vector[0], 1);
        assert!(!scheduler.holds_token());
    }

    #[test]
    fn test_start_token_forwards_to_strongest() {
        let peers = vec![DiscoveredPeer::new("pidog_A", -70), DiscoveredPeer::new("pidog_B", -35)];
        let mut scheduler = scheduler(peers);
        scheduler.execute(Command::StartToken, t(0)).unwrap();
        run(&mut scheduler, t(0));

        assert!(scheduler.node().is_root());
        assert_eq!(scheduler.radio().attached, vec!["pidog_B".to_string()]);
        let (token, _) = &scheduler.transport().sent[0];
        assert_eq!(token.dest_id, Some(NodeId::UNASSIGNED));
        assert_eq!(token.payload.as_deref(), Some("1"));
    }

    #[test]
    fn test_snapshot_serializes() {
        let scheduler = assigned(0, &[1], vec![]);
        let info = scheduler.snapshot();
        assert_eq!(info.node.id, NodeId::ROOT);
        let json = serde_json::to_string(&info).unwrap();
        assert_eq!(serde_json::from_str::<StateInfo>(&json).unwrap(), info);
    }
}
