//! pktbridge core library
//!
//! This crate provides the error type and the packet metadata types shared by
//! the header decoder (`pktbridge-packet`) and the capture bridge
//! (`pktbridge-capture`).

pub mod error;
pub mod packet;

// Re-export commonly used types
pub use error::{Error, Result};
pub use packet::{PacketHeader, Verdict};
