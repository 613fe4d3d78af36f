//! Locating the transport header inside a captured frame
//!
//! Only the layers needed to reach a TCP/UDP header are walked: the link
//! header for the capture's datalink type, then the IPv4 or IPv6 fixed
//! header. IPv6 extension headers are not followed.

use crate::decode::{decode, DecodedHeader, Protocol};
use crate::field::{window, Field16};
use pktbridge_core::{Error, Result};

pub const ETHERTYPE_IPV4: u16 = 0x0800;
pub const ETHERTYPE_IPV6: u16 = 0x86DD;
pub const ETHERTYPE_VLAN: u16 = 0x8100;
pub const ETHERTYPE_QINQ: u16 = 0x88A8;

const ETHERNET_LEN: usize = 14;
const VLAN_TAG_LEN: usize = 4;
const MAX_VLAN_TAGS: usize = 2;
const LINUX_SLL_LEN: usize = 16;
const LOOPBACK_LEN: usize = 4;
const IPV4_MIN_LEN: usize = 20;
const IPV6_LEN: usize = 40;

/// Datalink types the locator understands (libpcap `DLT_*` values)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinkType {
    /// BSD loopback, address family in host byte order
    Null,
    /// Ethernet II, optionally 802.1Q / 802.1ad tagged
    Ethernet,
    /// Raw IP, version taken from the first nibble
    Raw,
    /// OpenBSD loopback, address family in network byte order
    Loop,
    /// Linux "cooked" capture (the `any` device)
    LinuxSll,
    /// Raw IPv4
    Ipv4,
    /// Raw IPv6
    Ipv6,
}

impl LinkType {
    /// Map a libpcap datalink value
    pub fn from_dlt(dlt: i32) -> Result<Self> {
        match dlt {
            0 => Ok(LinkType::Null),
            1 => Ok(LinkType::Ethernet),
            // DLT_RAW is 12 on most platforms, 14 on some BSDs, 101 as LINKTYPE
            12 | 14 | 101 => Ok(LinkType::Raw),
            108 => Ok(LinkType::Loop),
            113 => Ok(LinkType::LinuxSll),
            228 => Ok(LinkType::Ipv4),
            229 => Ok(LinkType::Ipv6),
            other => Err(Error::UnsupportedLinkType(other)),
        }
    }

    /// Canonical libpcap datalink value
    pub fn dlt(self) -> i32 {
        match self {
            LinkType::Null => 0,
            LinkType::Ethernet => 1,
            LinkType::Raw => 12,
            LinkType::Loop => 108,
            LinkType::LinuxSll => 113,
            LinkType::Ipv4 => 228,
            LinkType::Ipv6 => 229,
        }
    }
}

/// Where the transport header sits in a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportLocation {
    /// Protocol number from the IP header
    pub protocol: Protocol,
    /// Byte offset of the transport header
    pub offset: usize,
    /// End of the IP payload within the captured bytes; link-layer padding
    /// after this point is not part of the datagram
    pub end: usize,
}

enum Network {
    V4,
    V6,
}

/// Find the transport header in `frame` captured with datalink `link`
pub fn locate_transport(frame: &[u8], link: LinkType) -> Result<TransportLocation> {
    let (network, offset) = match link {
        LinkType::Ethernet => ethernet(frame)?,
        LinkType::LinuxSll => {
            window(frame, 0, LINUX_SLL_LEN)?;
            (by_ethertype(Field16::at(14).host(frame))?, LINUX_SLL_LEN)
        }
        LinkType::Null | LinkType::Loop => {
            let bytes = window(frame, 0, LOOPBACK_LEN)?;
            let raw = [bytes[0], bytes[1], bytes[2], bytes[3]];
            let family = match link {
                LinkType::Null => u32::from_ne_bytes(raw),
                _ => u32::from_be_bytes(raw),
            };
            let network = match family {
                2 => Network::V4,
                // AF_INET6 differs across BSDs
                24 | 28 | 30 => Network::V6,
                // Families are small; anything else is not IP
                other => return Err(Error::NotIp(u16::try_from(other).unwrap_or(u16::MAX))),
            };
            (network, LOOPBACK_LEN)
        }
        LinkType::Raw => {
            let bytes = window(frame, 0, 1)?;
            let network = match bytes[0] >> 4 {
                4 => Network::V4,
                6 => Network::V6,
                _ => return Err(Error::Malformed("unknown IP version")),
            };
            (network, 0)
        }
        LinkType::Ipv4 => (Network::V4, 0),
        LinkType::Ipv6 => (Network::V6, 0),
    };

    match network {
        Network::V4 => ipv4(frame, offset),
        Network::V6 => ipv6(frame, offset),
    }
}

/// Locate and decode the transport header in one step
///
/// The decoded view is limited to the IP payload, so trailing link padding
/// never shows up in a payload slice.
pub fn decode_transport(frame: &[u8], link: LinkType) -> Result<DecodedHeader<'_>> {
    let loc = locate_transport(frame, link)?;
    decode(&frame[..loc.end], loc.offset, loc.protocol)
}

fn by_ethertype(ethertype: u16) -> Result<Network> {
    match ethertype {
        ETHERTYPE_IPV4 => Ok(Network::V4),
        ETHERTYPE_IPV6 => Ok(Network::V6),
        other => Err(Error::NotIp(other)),
    }
}

fn ethernet(frame: &[u8]) -> Result<(Network, usize)> {
    window(frame, 0, ETHERNET_LEN)?;
    let mut type_at = 12;
    let mut ethertype = Field16::at(type_at).host(frame);

    for _ in 0..MAX_VLAN_TAGS {
        if ethertype != ETHERTYPE_VLAN && ethertype != ETHERTYPE_QINQ {
            break;
        }
        type_at += VLAN_TAG_LEN;
        window(frame, type_at, 2)?;
        ethertype = Field16::at(type_at).host(frame);
    }

    Ok((by_ethertype(ethertype)?, type_at + 2))
}

fn ipv4(frame: &[u8], offset: usize) -> Result<TransportLocation> {
    let ip = window(frame, offset, IPV4_MIN_LEN)?;
    if ip[0] >> 4 != 4 {
        return Err(Error::Malformed("IPv4 version mismatch"));
    }

    let ihl = usize::from(ip[0] & 0x0F) * 4;
    if ihl < IPV4_MIN_LEN {
        return Err(Error::Malformed("IPv4 header length below minimum"));
    }
    window(frame, offset, ihl)?;

    let fragment_offset = Field16::at(6).host(ip) & 0x1FFF;
    if fragment_offset != 0 {
        return Err(Error::Malformed("non-initial IPv4 fragment"));
    }

    let total_len = usize::from(Field16::at(2).host(ip));
    Ok(TransportLocation {
        protocol: Protocol::from(ip[9]),
        offset: offset + ihl,
        end: payload_end(frame, offset, total_len, offset + ihl),
    })
}

fn ipv6(frame: &[u8], offset: usize) -> Result<TransportLocation> {
    let ip = window(frame, offset, IPV6_LEN)?;
    if ip[0] >> 4 != 6 {
        return Err(Error::Malformed("IPv6 version mismatch"));
    }

    let payload_len = usize::from(Field16::at(4).host(ip));
    Ok(TransportLocation {
        protocol: Protocol::from(ip[6]),
        offset: offset + IPV6_LEN,
        end: payload_end(frame, offset, IPV6_LEN + payload_len, offset + IPV6_LEN),
    })
}

/// Clamp the IP-announced end to what was captured; a bogus length never
/// shrinks the view below the transport start
fn payload_end(frame: &[u8], ip_start: usize, ip_len: usize, transport_start: usize) -> usize {
    ip_start
        .saturating_add(ip_len)
        .min(frame.len())
        .max(transport_start)
}
