use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::core::{Address, DecodeError, NodeId};
use crate::time::Timestamp;

/// Kind of a packet, the first field on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PacketKind {
    /// Carries the next id to hand out
    Token,
    /// Application payload routed hop by hop
    Data,
    /// Acknowledges any other kind; the payload names the acknowledged kind
    Ack,
    /// Carries the sender's (poisoned) distance vector
    DistanceVector,
}

impl PacketKind {
    /// Returns the wire name of this kind
    pub fn as_str(&self) -> &'static str {
        match self {
            PacketKind::Token => "token",
            PacketKind::Data => "data",
            PacketKind::Ack => "ack",
            PacketKind::DistanceVector => "dv",
        }
    }
}

impl fmt::Display for PacketKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PacketKind {
    type Err = DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "token" => Ok(PacketKind::Token),
            "data" => Ok(PacketKind::Data),
            "ack" => Ok(PacketKind::Ack),
            "dv" => Ok(PacketKind::DistanceVector),
            other => Err(DecodeError::UnknownKind(other.to_string())),
        }
    }
}

/// A packet exchanged between two attached nodes.
///
/// Every field except the kind may be absent: a short datagram decodes with
/// the missing trailing fields set to `None` rather than failing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Packet {
    /// Packet kind
    pub kind: PacketKind,
    /// Final destination
    pub dest_id: Option<NodeId>,
    /// Last node that transmitted the packet
    pub src_id: Option<NodeId>,
    /// Address acknowledgments go back to
    pub src_address: Option<Address>,
    /// Sender's packet counter, echoed by the acknowledgment
    pub sequence_number: Option<u32>,
    /// Sender's clock when the packet was created, echoed by the acknowledgment
    pub timestamp: Option<Timestamp>,
    /// Kind-specific payload
    pub payload: Option<String>,
}

impl Packet {
    /// Creates a packet with every optional field absent
    pub fn new(kind: PacketKind) -> Self {
        Packet {
            kind,
            dest_id: None,
            src_id: None,
            src_address: None,
            sequence_number: None,
            timestamp: None,
            payload: None,
        }
    }

    /// Creates a packet addressed from `src` to `dest`
    pub fn addressed(kind: PacketKind, dest: NodeId, src: NodeId, timestamp: Timestamp) -> Self {
        Packet {
            dest_id: Some(dest),
            src_id: Some(src),
            timestamp: Some(timestamp),
            ..Packet::new(kind)
        }
    }

    /// Sets the payload
    pub fn with_payload(mut self, payload: impl Into<String>) -> Self {
        self.payload = Some(payload.into());
        self
    }

    /// Builds the acknowledgment for this packet, sent by `src` from `address`
    pub fn ack(&self, src: NodeId, address: Address) -> Packet {
        Packet {
            kind: PacketKind::Ack,
            dest_id: self.src_id,
            src_id: Some(src),
            src_address: Some(address),
            sequence_number: self.sequence_number,
            timestamp: self.timestamp,
            payload: Some(self.kind.as_str().to_string()),
        }
    }

    /// Kind of the packet an acknowledgment refers to
    pub fn acked_kind(&self) -> Option<PacketKind> {
        if self.kind != PacketKind::Ack {
            return None;
        }
        self.payload.as_deref().and_then(|p| p.parse().ok())
    }
}
