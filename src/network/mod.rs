//! Radio-facing side of a node
//!
//! The capabilities a host must supply (radio role control, neighbor scans,
//! datagram transport and board identity) are traits here, so the protocol
//! logic runs the same against real hardware and the in-process simulator.

pub mod assigner;
pub mod connection;
pub mod discovery;

pub use self::assigner::{AssignerStep, SpanningTreeAssigner, TokenOutcome};
pub use self::connection::{spawn_housekeeping, ActivityIndicator, Inbox, LinkFlags, NodeRuntime};
pub use self::discovery::{Discovery, ScanReport, UnassignedPeer};

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::{Address, Result};

/// Current mode of the node's single radio
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    /// Discoverable, accepting one inbound listener
    Broadcaster,
    /// Attached to, or ready to attach to, one broadcaster
    Listener,
    /// Radio not configured yet
    Off,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Role::Broadcaster => "broadcaster",
            Role::Listener => "listener",
            Role::Off => "off",
        };
        f.write_str(name)
    }
}

/// Which broadcasters a scan reports
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanFilter {
    /// Every broadcaster in range
    All,
    /// Only broadcasters that already hold an id
    AssignedOnly,
}

/// A broadcaster seen during a scan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveredPeer {
    /// Broadcast name, `<prefix>_<value>`
    pub name: String,
    /// Received signal strength in dBm
    pub signal_strength: i32,
}

impl DiscoveredPeer {
    /// Creates a discovered peer
    pub fn new(name: impl Into<String>, signal_strength: i32) -> Self {
        DiscoveredPeer {
            name: name.into(),
            signal_strength,
        }
    }
}

/// Role switching of the half-duplex radio
pub trait RadioControl {
    /// Becomes discoverable under `name`, dropping any current link
    fn become_broadcaster(&mut self, name: &str) -> Result<()>;

    /// Stops broadcasting so the radio can scan and attach
    fn become_listener(&mut self) -> Result<()>;

    /// Attaches to the broadcaster named `target_name`, blocking up to `timeout`
    fn attach(&mut self, target_name: &str, timeout: Duration) -> Result<()>;

    /// Returns the current role
    fn current_role(&self) -> Role;

    /// Returns whether a listener link is currently up, in either direction
    fn is_linked(&self) -> bool;
}

/// Scanning for nearby broadcasters
pub trait NeighborDiscovery {
    /// Lists the broadcasters currently in range
    fn scan(&mut self, filter: ScanFilter) -> Vec<DiscoveredPeer>;
}

/// Datagram delivery over the current link
pub trait PacketTransport {
    /// Sends one datagram to `dest`
    fn send(&mut self, bytes: &[u8], dest: &Address) -> Result<()>;
}

/// Board identity used before the node holds an id
pub trait IdentitySource {
    /// Returns a key unique to this board
    fn unique_hardware_id(&self) -> String;
}

impl<T: RadioControl + ?Sized> RadioControl for Box<T> {
    fn become_broadcaster(&mut self, name: &str) -> Result<()> {
        (**self).become_broadcaster(name)
    }

    fn become_listener(&mut self) -> Result<()> {
        (**self).become_listener()
    }

    fn attach(&mut self, target_name: &str, timeout: Duration) -> Result<()> {
        (**self).attach(target_name, timeout)
    }

    fn current_role(&self) -> Role {
        (**self).current_role()
    }

    fn is_linked(&self) -> bool {
        (**self).is_linked()
    }
}

impl<T: NeighborDiscovery + ?Sized> NeighborDiscovery for Box<T> {
    fn scan(&mut self, filter: ScanFilter) -> Vec<DiscoveredPeer> {
        (**self).scan(filter)
    }
}

impl<T: PacketTransport + ?Sized> PacketTransport for Box<T> {
    fn send(&mut self, bytes: &[u8], dest: &Address) -> Result<()> {
        (**self).send(bytes, dest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_display() {
        assert_eq!(Role::Broadcaster.to_string(), "broadcaster");
        assert_eq!(Role::Listener.to_string(), "listener");
        assert_eq!(Role::Off.to_string(), "off");
    }

    #[test]
    fn test_discovered_peer_serialization() {
        let peer = DiscoveredPeer::new("picow_2", -48);
        let json = serde_json::to_string(&peer).unwrap();
        assert_eq!(serde_json::from_str::<DiscoveredPeer>(&json).unwrap(), peer);
    }
}
