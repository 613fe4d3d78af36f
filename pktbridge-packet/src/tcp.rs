//! TCP header view
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |          Source Port          |       Destination Port        |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                        Sequence Number                        |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                    Acknowledgment Number                      |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |  Data | Rsv |N|C|E|U|A|P|R|S|F|                               |
//! | Offset|     |S|W|E|R|C|S|S|Y|I|            Window             |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |           Checksum            |         Urgent Pointer        |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```
//!
//! All multi-byte fields are stored big-endian. The default accessors return
//! host byte order; the `_raw` accessors return the stored bytes unconverted.

use std::fmt;

use crate::field::window;
use pktbridge_core::Result;

/// Minimum TCP header size (without options)
pub const TCP_MIN_LEN: usize = 20;

/// Maximum TCP header size (with maximum options)
pub const TCP_MAX_LEN: usize = 60;

/// Byte offsets of the fixed TCP header fields
pub mod offsets {
    use crate::field::{Field16, Field32};

    pub const SOURCE: Field16 = Field16::at(0);
    pub const DEST: Field16 = Field16::at(2);
    pub const SEQ: Field32 = Field32::at(4);
    pub const ACK: Field32 = Field32::at(8);
    /// Data offset (4 bits), reserved (3 bits), NS + 8 flag bits
    pub const OFF_FLAGS: Field16 = Field16::at(12);
    pub const WINDOW: Field16 = Field16::at(14);
    pub const CHECKSUM: Field16 = Field16::at(16);
    pub const URGENT: Field16 = Field16::at(18);
}

/// TCP flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TcpFlags {
    /// FIN - No more data from sender
    pub fin: bool,
    /// SYN - Synchronize sequence numbers
    pub syn: bool,
    /// RST - Reset the connection
    pub rst: bool,
    /// PSH - Push function
    pub psh: bool,
    /// ACK - Acknowledgment field is significant
    pub ack: bool,
    /// URG - Urgent pointer field is significant
    pub urg: bool,
    /// ECE - ECN-Echo
    pub ece: bool,
    /// CWR - Congestion Window Reduced
    pub cwr: bool,
    /// NS - ECN nonce concealment
    pub ns: bool,
}

impl TcpFlags {
    pub const FIN: u16 = 0x001;
    pub const SYN: u16 = 0x002;
    pub const RST: u16 = 0x004;
    pub const PSH: u16 = 0x008;
    pub const ACK: u16 = 0x010;
    pub const URG: u16 = 0x020;
    pub const ECE: u16 = 0x040;
    pub const CWR: u16 = 0x080;
    pub const NS: u16 = 0x100;

    /// Parse the 9 flag bits
    pub fn from_bits(bits: u16) -> Self {
        TcpFlags {
            fin: bits & Self::FIN != 0,
            syn: bits & Self::SYN != 0,
            rst: bits & Self::RST != 0,
            psh: bits & Self::PSH != 0,
            ack: bits & Self::ACK != 0,
            urg: bits & Self::URG != 0,
            ece: bits & Self::ECE != 0,
            cwr: bits & Self::CWR != 0,
            ns: bits & Self::NS != 0,
        }
    }

    /// Convert flags back to their 9-bit value
    pub fn bits(self) -> u16 {
        let mut bits = 0u16;
        for (set, mask) in [
            (self.fin, Self::FIN),
            (self.syn, Self::SYN),
            (self.rst, Self::RST),
            (self.psh, Self::PSH),
            (self.ack, Self::ACK),
            (self.urg, Self::URG),
            (self.ece, Self::ECE),
            (self.cwr, Self::CWR),
            (self.ns, Self::NS),
        ] {
            if set {
                bits |= mask;
            }
        }
        bits
    }
}

/// Borrowed view over a TCP header
///
/// The view never copies; it is valid only as long as the buffer it was
/// decoded from.
#[derive(Clone, Copy)]
pub struct TcpHeader<'a> {
    /// Header bytes followed by whatever the buffer holds after them.
    /// Always at least `TCP_MIN_LEN` long.
    bytes: &'a [u8],
}

impl<'a> TcpHeader<'a> {
    /// Decode a TCP header starting at `offset` in `buffer`
    pub fn new(buffer: &'a [u8], offset: usize) -> Result<Self> {
        let bytes = window(buffer, offset, TCP_MIN_LEN)?;
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

    /// Sequence number in host byte order
    pub fn sequence(&self) -> u32 {
        offsets::SEQ.host(self.bytes)
    }

    /// Sequence number as stored, no byte-order conversion
    pub fn sequence_raw(&self) -> u32 {
        offsets::SEQ.raw(self.bytes)
    }

    /// Acknowledgment number in host byte order
    pub fn acknowledgment(&self) -> u32 {
        offsets::ACK.host(self.bytes)
    }

    /// Acknowledgment number as stored, no byte-order conversion
    pub fn acknowledgment_raw(&self) -> u32 {
        offsets::ACK.raw(self.bytes)
    }

    /// Window size in host byte order
    pub fn window(&self) -> u16 {
        offsets::WINDOW.host(self.bytes)
    }

    /// Window size as stored, no byte-order conversion
    pub fn window_raw(&self) -> u16 {
        offsets::WINDOW.raw(self.bytes)
    }

    /// Checksum in host byte order
    pub fn checksum(&self) -> u16 {
        offsets::CHECKSUM.host(self.bytes)
    }

    /// Checksum as stored, no byte-order conversion
    pub fn checksum_raw(&self) -> u16 {
        offsets::CHECKSUM.raw(self.bytes)
    }

    /// Urgent pointer in host byte order
    pub fn urgent_pointer(&self) -> u16 {
        offsets::URGENT.host(self.bytes)
    }

    /// Urgent pointer as stored, no byte-order conversion
    pub fn urgent_pointer_raw(&self) -> u16 {
        offsets::URGENT.raw(self.bytes)
    }

    /// Data offset in 32-bit words
    pub fn data_offset(&self) -> u8 {
        self.bytes[offsets::OFF_FLAGS.offset] >> 4
    }

    /// Header length in bytes as announced by the data offset
    pub fn header_len(&self) -> usize {
        usize::from(self.data_offset()) * 4
    }

    /// The 9 flag bits (NS through FIN)
    pub fn flag_bits(&self) -> u16 {
        offsets::OFF_FLAGS.host(self.bytes) & 0x01FF
    }

    /// Parsed TCP flags
    pub fn flags(&self) -> TcpFlags {
        TcpFlags::from_bits(self.flag_bits())
    }

    /// The fixed 20-byte header
    pub fn fixed_bytes(&self) -> &'a [u8] {
        &self.bytes[..TCP_MIN_LEN]
    }

    /// Option bytes, `None` if the data offset is invalid or points past
    /// the captured bytes
    pub fn options(&self) -> Option<&'a [u8]> {
        let end = self.checked_header_len()?;
        Some(&self.bytes[TCP_MIN_LEN..end])
    }

    /// Segment payload up to the end of the buffer, `None` if the data
    /// offset is invalid or points past the captured bytes
    pub fn payload(&self) -> Option<&'a [u8]> {
        let start = self.checked_header_len()?;
        Some(&self.bytes[start..])
    }

    fn checked_header_len(&self) -> Option<usize> {
        let len = self.header_len();
        (TCP_MIN_LEN..=self.bytes.len()).contains(&len).then_some(len)
    }
}

impl fmt::Debug for TcpHeader<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TcpHeader")
            .field("source_port", &self.source_port())
            .field("destination_port", &self.destination_port())
            .field("sequence", &self.sequence())
            .field("acknowledgment", &self.acknowledgment())
            .field("data_offset", &self.data_offset())
            .field("flags", &self.flags())
            .field("window", &self.window())
            .field("checksum", &self.checksum())
            .field("urgent_pointer", &self.urgent_pointer())
            .finish()
    }
}

impl fmt::Display for TcpHeader<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}->{} {} {} {:#x}",
            self.source_port(),
            self.destination_port(),
            self.sequence(),
            self.acknowledgment(),
            self.flag_bits()
        )
    }
}
