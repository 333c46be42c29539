use std::io;
use thiserror::Error;

use super::types::NodeId;

/// Failure to turn a received datagram into a packet
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("unknown packet kind {0:?}")]
    UnknownKind(String),

    #[error("invalid {field} field: {value:?}")]
    InvalidField {
        field: &'static str,
        value: String,
    },

    #[error("packet of {0} bytes exceeds the maximum packet size")]
    TooLong(usize),

    #[error("packet is not valid UTF-8")]
    NotUtf8,
}

impl DecodeError {
    pub(crate) fn invalid(field: &'static str, value: impl Into<String>) -> Self {
        DecodeError::InvalidField {
            field,
            value: value.into(),
        }
    }
}

/// Custom error types for the mesh
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("Connect error: {0}")]
    Connect(String),

    #[error("No route to node {0}")]
    NoRoute(NodeId),

    #[error("Radio error: {0}")]
    Radio(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Network full: token value {0} exceeds the node limit")]
    NetworkFull(u16),

    #[error("Invalid state: {0}")]
    InvalidState(String),
}

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Creates a new connect error
    pub fn connect(msg: impl Into<String>) -> Self {
        Error::Connect(msg.into())
    }

    /// Creates a new radio error
    pub fn radio(msg: impl Into<String>) -> Self {
        Error::Radio(msg.into())
    }

    /// Creates a new transport error
    pub fn transport(msg: impl Into<String>) -> Self {
        Error::Transport(msg.into())
    }

    /// Creates a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// Creates a new invalid state error
    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Error::InvalidState(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = Error::connect("attach timed out");
        assert!(matches!(err, Error::Connect(_)));
        assert_eq!(err.to_string(), "Connect error: attach timed out");
    }

    #[test]
    fn test_error_conversion() {
        let io_err = io::Error::new(io::ErrorKind::Other, "test");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));

        let err: Error = DecodeError::UnknownKind("beacon".into()).into();
        assert!(matches!(err, Error::Decode(DecodeError::UnknownKind(_))));
        assert_eq!(err.to_string(), "Decode error: unknown packet kind \"beacon\"");
    }

    #[test]
    fn test_no_route_display() {
        let err = Error::NoRoute(NodeId::new(3));
        assert_eq!(err.to_string(), "No route to node 3");
    }
}
