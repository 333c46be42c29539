//! Console commands understood by a node

use std::str::FromStr;

use crate::core::{DecodeError, NodeId};
use super::codec::FIELD_DELIMITER;

/// An operator request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `token`: start the id assignment from this node
    StartToken,
    /// `dv`: run a distance-vector scan now
    ScanNow,
    /// `<dest>-<message>`: send a data packet along the computed route
    SendData {
        /// Destination node
        dest: NodeId,
        /// Message text
        message: String,
    },
}

impl Command {
    /// Parses a console line
    pub fn parse(line: &str) -> Result<Self, DecodeError> {
        line.parse()
    }
}

impl FromStr for Command {
    type Err = DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let line = s.trim();
        match line {
            "token" => Ok(Command::StartToken),
            "dv" => Ok(Command::ScanNow),
            _ => {
                let (dest, message) = line
                    .split_once('-')
                    .ok_or_else(|| DecodeError::invalid("command", line))?;
                let dest: NodeId = dest.trim().parse()?;
                if !dest.is_assigned() {
                    return Err(DecodeError::invalid("command destination", dest.to_string()));
                }
                if message.is_empty() || message.contains(FIELD_DELIMITER) {
                    return Err(DecodeError::invalid("command message", message));
                }
                Ok(Command::SendData {
                    dest,
                    message: message.to_string(),
                })
            }
        }
    }
}
