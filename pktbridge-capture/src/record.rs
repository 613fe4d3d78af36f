//! Packets as handed to consumers
//!
//! [`PacketRecord`] owns its bytes and can travel across threads.
//! [`PacketView`] borrows the capture engine's buffer and only exists for the
//! duration of one alloc-less handler call.

use bytes::Bytes;
use pktbridge_core::{PacketHeader, Result};
use pktbridge_packet::{
    decode_transport, locate_transport, DecodedHeader, LinkType, TransportLocation,
};

/// An owned copy of a captured packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacketRecord<C = ()> {
    /// Capture metadata
    pub header: PacketHeader,
    /// The `caplen` captured bytes
    pub data: Bytes,
    /// Value supplied when the session was started
    pub context: C,
}

impl<C> PacketRecord<C> {
    pub fn new(header: PacketHeader, data: Bytes, context: C) -> Self {
        Self {
            header,
            data,
            context,
        }
    }

    /// Number of captured bytes
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Locate the TCP/UDP header for a capture with datalink `link`
    pub fn locate(&self, link: LinkType) -> Result<TransportLocation> {
        locate_transport(&self.data, link)
    }

    /// Decode the TCP/UDP header for a capture with datalink `link`
    pub fn transport(&self, link: LinkType) -> Result<DecodedHeader<'_>> {
        decode_transport(&self.data, link)
    }

    /// Split into header, bytes and context
    pub fn into_parts(self) -> (PacketHeader, Bytes, C) {
        (self.header, self.data, self.context)
    }
}

/// A borrowed packet valid for one alloc-less handler call
///
/// The header lives in a slot owned by the delivery strategy and is
/// overwritten for every packet; the data points straight into the capture
/// engine's buffer.
#[derive(Debug, Clone, Copy)]
pub struct PacketView<'a> {
    header: &'a PacketHeader,
    data: &'a [u8],
}

impl<'a> PacketView<'a> {
    pub fn new(header: &'a PacketHeader, data: &'a [u8]) -> Self {
        Self { header, data }
    }

    pub fn header(&self) -> &'a PacketHeader {
        self.header
    }

    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Decode the TCP/UDP header without copying
    pub fn transport(&self, link: LinkType) -> Result<DecodedHeader<'a>> {
        decode_transport(self.data, link)
    }

    /// Copy the packet out so it can outlive the handler call
    pub fn to_record(&self) -> PacketRecord {
        PacketRecord::new(*self.header, Bytes::copy_from_slice(self.data), ())
    }
}
