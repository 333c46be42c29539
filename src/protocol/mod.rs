//! Protocol implementation module
//!
//! This module defines the wire packets and their encoding, the broadcaster
//! naming convention, operator commands, and the link scheduler state machine.

pub mod codec;
pub mod command;
pub mod naming;
pub mod packet;
pub mod state;

pub use self::codec::PacketCodec;
pub use self::command::Command;
pub use self::naming::{BroadcastName, Naming};
pub use self::packet::{Packet, PacketKind};
pub use self::state::{LinkScheduler, Phase, StateInfo, Target, Transition};
