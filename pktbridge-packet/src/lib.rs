//! Transport header decoding for captured packets
//!
//! Headers are read through fixed offset/width field tables rather than by
//! overlaying a platform struct on the packet bytes. Every multi-byte field
//! is available twice: in host byte order (the default accessor) and exactly
//! as stored on the wire (the `_raw` accessor).
//!
//! - [`tcp`] - TCP header view and flags
//! - [`udp`] - UDP header view
//! - [`decode`] - protocol-dispatching entry point
//! - [`link`] - walking link and IP headers to find the transport header
//!
//! # Example
//!
//! ```rust
//! use pktbridge_packet::{decode, Protocol};
//!
//! let segment = [
//!     0x1F, 0x90, 0x00, 0x50, // ports 8080 -> 80
//!     0x00, 0x00, 0x00, 0x01, // sequence 1
//!     0x00, 0x00, 0x00, 0x00, // acknowledgment
//!     0x50, 0x02, 0xFF, 0xFF, // data offset 5, SYN, window
//!     0x00, 0x00, 0x00, 0x00, // checksum, urgent pointer
//! ];
//!
//! let header = decode(&segment, 0, Protocol::Tcp).unwrap();
//! assert_eq!(header.source_port(), 8080);
//! assert_eq!(header.destination_port(), 80);
//! assert_eq!(header.as_tcp().unwrap().sequence(), 1);
//! ```

pub mod decode;
pub mod field;
pub mod link;
pub mod tcp;
pub mod udp;

pub use decode::{decode, DecodedHeader, Protocol};
pub use field::{Field16, Field32};
pub use link::{decode_transport, locate_transport, LinkType, TransportLocation};
pub use tcp::{TcpFlags, TcpHeader, TCP_MAX_LEN, TCP_MIN_LEN};
pub use udp::{UdpHeader, UDP_LEN};
