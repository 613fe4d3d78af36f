//! UDP header view
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |          Source Port          |       Destination Port        |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |            Length             |           Checksum            |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```

use std::fmt;

use crate::field::window;
use pktbridge_core::Result;

/// UDP header size in bytes
pub const UDP_LEN: usize = 8;

/// Byte offsets of the UDP header fields
pub mod offsets {
    use crate::field::Field16;

    pub const SOURCE: Field16 = Field16::at(0);
    pub const DEST: Field16 = Field16::at(2);
    pub const LENGTH: Field16 = Field16::at(4);
    pub const CHECKSUM: Field16 = Field16::at(6);
}

/// Borrowed view over a UDP header
#[derive(Clone, Copy)]
pub struct UdpHeader<'a> {
    /// Always at least `UDP_LEN` long
    bytes: &'a [u8],
}

impl<'a> UdpHeader<'a> {
    /// Decode a UDP header starting at `offset` in `buffer`
    pub fn new(buffer: &'a [u8], offset: usize) -> Result<Self> {
        let bytes = window(buffer, offset, UDP_LEN)?;
        Ok(Self { bytes })
    }

    /// Source port in host byte order
    pub fn source_port(&self) -> u16 {
        offsets::SOURCE.host(self.bytes)
    }

    /// Source port as stored, no byte-order conversion
    pub fn source_port_raw(&self) -> u16 {
        offsets::SOURCE.raw(self.bytes)
    }

    /// Destination port in host byte order
    pub fn destination_port(&self) -> u16 {
        offsets::DEST.host(self.bytes)
    }

    /// Destination port as stored, no byte-order conversion
    pub fn destination_port_raw(&self) -> u16 {
        offsets::DEST.raw(self.bytes)
    }

    /// Datagram length (header + payload) in host byte order
    pub fn length(&self) -> u16 {
        offsets::LENGTH.host(self.bytes)
    }

    /// Datagram length as stored, no byte-order conversion
    pub fn length_raw(&self) -> u16 {
        offsets::LENGTH.raw(self.bytes)
    }

    /// Checksum in host byte order
    pub fn checksum(&self) -> u16 {
        offsets::CHECKSUM.host(self.bytes)
    }

    /// Checksum as stored, no byte-order conversion
    pub fn checksum_raw(&self) -> u16 {
        offsets::CHECKSUM.raw(self.bytes)
    }

    /// The 8 header bytes
    pub fn fixed_bytes(&self) -> &'a [u8] {
        &self.bytes[..UDP_LEN]
    }

    /// Datagram payload
    ///
    /// Bounded by the length field and by the captured bytes, whichever is
    /// shorter. A length below the header size yields an empty payload.
    pub fn payload(&self) -> &'a [u8] {
        let end = usize::from(self.length())
            .min(self.bytes.len())
            .max(UDP_LEN);
        &self.bytes[UDP_LEN..end]
    }
}

impl fmt::Debug for UdpHeader<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UdpHeader")
            .field("source_port", &self.source_port())
            .field("destination_port", &self.destination_port())
            .field("length", &self.length())
            .field("checksum", &self.checksum())
            .finish()
    }
}

impl fmt::Display for UdpHeader<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}->{} {} {}",
            self.source_port(),
            self.destination_port(),
            self.length(),
            self.checksum()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pktbridge_core::Error;

    #[test]
    fn test_udp_fields() {
        let data = [
            0x30, 0x39, // Source port (12345)
            0x00, 0x35, // Dest port (53)
            0x00, 0x0C, // Length (12)
            0xAB, 0xCD, // Checksum
            0x01, 0x02, 0x03, 0x04, // Payload
        ];
        let udp = UdpHeader::new(&data, 0).unwrap();

        assert_eq!(udp.source_port(), 12345);
        assert_eq!(udp.destination_port(), 53);
        assert_eq!(udp.length(), 12);
        assert_eq!(udp.checksum(), 0xABCD);
        assert_eq!(udp.payload(), &[0x01, 0x02, 0x03, 0x04]);
        assert_eq!(udp.to_string(), "12345->53 12 43981");
    }

    #[test]
    fn test_length_field_scenario() {
        let data = [0x00, 0x44, 0x00, 0x43, 0x00, 0x08, 0x00, 0x00];
        let udp = UdpHeader::new(&data, 0).unwrap();

        assert_eq!(udp.length(), 8);
        assert_eq!(udp.length_raw().to_ne_bytes(), [0x00, 0x08]);
        assert_eq!(u16::from_be(udp.length_raw()), 8);
        assert!(udp.payload().is_empty());
    }

    #[test]
    fn test_payload_is_bounded() {
        // Length claims 64 bytes but only 2 payload bytes were captured
        let data = [0, 1, 0, 2, 0x00, 0x40, 0, 0, 0xAA, 0xBB];
        let udp = UdpHeader::new(&data, 0).unwrap();
        assert_eq!(udp.payload(), &[0xAA, 0xBB]);

        // Length below the header size
        let data = [0, 1, 0, 2, 0x00, 0x03, 0, 0, 0xAA];
        let udp = UdpHeader::new(&data, 0).unwrap();
        assert!(udp.payload().is_empty());

        // Trailing link-layer padding is excluded
        let data = [0, 1, 0, 2, 0x00, 0x09, 0, 0, 0xAA, 0x00, 0x00];
        let udp = UdpHeader::new(&data, 0).unwrap();
        assert_eq!(udp.payload(), &[0xAA]);
    }

    #[test]
    fn test_short_buffer() {
        let data = [0u8; 7];
        let err = UdpHeader::new(&data, 0).unwrap_err();
        assert!(matches!(
            err,
            Error::Bounds {
                needed: 8,
                available: 7
            }
        ));

        let data = [0u8; 12];
        assert!(UdpHeader::new(&data, 5).is_err());
        assert!(UdpHeader::new(&data, 4).is_ok());
    }
}
