//! Transport header decoding entry point

use std::fmt;

use crate::tcp::{TcpHeader, TCP_MIN_LEN};
use crate::udp::{UdpHeader, UDP_LEN};
use pktbridge_core::{Error, Result};

/// Transport protocol selector, keyed by IP protocol number
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    /// TCP (6)
    Tcp,
    /// UDP (17)
    Udp,
    /// Anything else; decoding it fails with `UnsupportedProtocol`
    Other(u8),
}

impl Protocol {
    pub const TCP_NUMBER: u8 = 6;
    pub const UDP_NUMBER: u8 = 17;

    /// IP protocol number
    pub fn number(self) -> u8 {
        match self {
            Protocol::Tcp => Self::TCP_NUMBER,
            Protocol::Udp => Self::UDP_NUMBER,
            Protocol::Other(n) => n,
        }
    }

    /// Minimum header length, `None` for protocols the decoder does not handle
    pub fn min_header_len(self) -> Option<usize> {
        match self {
            Protocol::Tcp => Some(TCP_MIN_LEN),
            Protocol::Udp => Some(UDP_LEN),
            Protocol::Other(_) => None,
        }
    }
}

impl From<u8> for Protocol {
    fn from(number: u8) -> Self {
        match number {
            Self::TCP_NUMBER => Protocol::Tcp,
            Self::UDP_NUMBER => Protocol::Udp,
            n => Protocol::Other(n),
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Tcp => write!(f, "TCP"),
            Protocol::Udp => write!(f, "UDP"),
            Protocol::Other(n) => write!(f, "proto({})", n),
        }
    }
}

/// A decoded transport header borrowing from the packet buffer
#[derive(Debug, Clone, Copy)]
pub enum DecodedHeader<'a> {
    Tcp(TcpHeader<'a>),
    Udp(UdpHeader<'a>),
}

impl<'a> DecodedHeader<'a> {
    /// Which protocol was decoded
    pub fn protocol(&self) -> Protocol {
        match self {
            DecodedHeader::Tcp(_) => Protocol::Tcp,
            DecodedHeader::Udp(_) => Protocol::Udp,
        }
    }

    /// Source port in host byte order
    pub fn source_port(&self) -> u16 {
        match self {
            DecodedHeader::Tcp(h) => h.source_port(),
            DecodedHeader::Udp(h) => h.source_port(),
        }
    }

    /// Destination port in host byte order
    pub fn destination_port(&self) -> u16 {
        match self {
            DecodedHeader::Tcp(h) => h.destination_port(),
            DecodedHeader::Udp(h) => h.destination_port(),
        }
    }

    /// Checksum in host byte order
    pub fn checksum(&self) -> u16 {
        match self {
            DecodedHeader::Tcp(h) => h.checksum(),
            DecodedHeader::Udp(h) => h.checksum(),
        }
    }

    /// Transport payload, `None` when a TCP data offset is inconsistent
    pub fn payload(&self) -> Option<&'a [u8]> {
        match self {
            DecodedHeader::Tcp(h) => h.payload(),
            DecodedHeader::Udp(h) => Some(h.payload()),
        }
    }

    pub fn as_tcp(&self) -> Option<&TcpHeader<'a>> {
        match self {
            DecodedHeader::Tcp(h) => Some(h),
            DecodedHeader::Udp(_) => None,
        }
    }

    pub fn as_udp(&self) -> Option<&UdpHeader<'a>> {
        match self {
            DecodedHeader::Udp(h) => Some(h),
            DecodedHeader::Tcp(_) => None,
        }
    }
}

impl fmt::Display for DecodedHeader<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodedHeader::Tcp(h) => write!(f, "TCP {}", h),
            DecodedHeader::Udp(h) => write!(f, "UDP {}", h),
        }
    }
}

/// Decode the transport header that starts at `offset` in `buffer`
///
/// Fails with `Error::Bounds` when fewer than the protocol's minimum header
/// length remain after `offset`, and with `Error::UnsupportedProtocol` for
/// anything but TCP and UDP. No byte outside `buffer` is ever read.
pub fn decode(buffer: &[u8], offset: usize, protocol: Protocol) -> Result<DecodedHeader<'_>> {
    match protocol {
        Protocol::Tcp => TcpHeader::new(buffer, offset).map(DecodedHeader::Tcp),
        Protocol::Udp => UdpHeader::new(buffer, offset).map(DecodedHeader::Udp),
        Protocol::Other(n) => Err(Error::UnsupportedProtocol(n)),
    }
}
