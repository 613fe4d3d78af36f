//! Error types for pktbridge

use thiserror::Error;

/// Result type alias for pktbridge operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for pktbridge
#[derive(Error, Debug)]
pub enum Error {
    /// Buffer too short for the requested header
    #[error("Buffer too short: need {needed} bytes, have {available}")]
    Bounds { needed: usize, available: usize },

    /// Protocol selector other than TCP or UDP
    #[error("Unsupported transport protocol: {0}")]
    UnsupportedProtocol(u8),

    /// Network layer is not IPv4 or IPv6
    #[error("Not an IP packet (network protocol {0:#06x})")]
    NotIp(u16),

    /// Header fields are inconsistent with each other
    #[error("Malformed packet: {0}")]
    Malformed(&'static str),

    /// Link-layer type the locator cannot walk through
    #[error("Unsupported link-layer type: {0}")]
    UnsupportedLinkType(i32),

    /// A consumer handler panicked or failed during loop delivery
    #[error("Packet handler fault: {0}")]
    HandlerFault(String),

    /// Channel publish attempted after the consumer side went away
    #[error("Packet queue closed")]
    QueueClosed,

    /// Capture engine error
    #[error("Packet capture error: {0}")]
    Capture(String),

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A session is already running a capture loop
    #[error("Capture already running")]
    AlreadyRunning,

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a bounds error
    pub fn bounds(needed: usize, available: usize) -> Self {
        Error::Bounds { needed, available }
    }

    /// Create a capture error with a custom message
    pub fn capture<S: Into<String>>(msg: S) -> Self {
        Error::Capture(msg.into())
    }

    /// Create a handler fault with a custom message
    pub fn handler_fault<S: Into<String>>(msg: S) -> Self {
        Error::HandlerFault(msg.into())
    }

    /// Create a configuration error with a custom message
    pub fn invalid_config<S: Into<String>>(msg: S) -> Self {
        Error::InvalidConfig(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounds_message() {
        let err = Error::bounds(20, 19);
        assert_eq!(err.to_string(), "Buffer too short: need 20 bytes, have 19");
    }

    #[test]
    fn test_helper_constructors() {
        assert!(matches!(Error::capture("x"), Error::Capture(m) if m == "x"));
        assert!(matches!(Error::handler_fault("boom"), Error::HandlerFault(m) if m == "boom"));
        assert!(matches!(Error::invalid_config("cap"), Error::InvalidConfig(_)));
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk");
        let err: Error = io.into();
        assert!(matches!(err, Error::Io(_)));
    }
}
