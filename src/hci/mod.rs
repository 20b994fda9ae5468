//! Host Controller Interface structures.
//!
//! This module defines the framing shared by every HCI transport packet: the H4 packet type
//! octet, the command/event headers, and the ACL/SCO/ISO data headers with their packed
//! handle-and-flags words.
//!
//! The packet layouts are defined in the *Bluetooth Core Specification*, Vol 4, Part E,
//! Section 5.4, and Vol 4, Part A for the UART (H4) transport.

pub mod cmd;
pub mod event;
pub mod opcode;

use crate::bytes::*;
use crate::Error;

/// H4 packet type octets, sent as the first byte of every UART transport frame.
enum_with_unknown! {
    /// The H4 packet type, prepended to each HCI packet on the UART transport.
    #[derive(Debug, Copy, Clone, PartialEq, Eq)]
    pub enum PacketType(u8) {
        /// HCI command packet (host to controller).
        Command = 0x01,
        /// ACL data packet.
        AclData = 0x02,
        /// Synchronous (SCO) data packet.
        ScoData = 0x03,
        /// HCI event packet (controller to host).
        Event = 0x04,
        /// Isochronous data packet.
        IsoData = 0x05,
    }
}

/// Extracts the 12-bit connection handle from a packed handle-and-flags word.
pub fn handle(word: u16) -> u16 {
    word & 0x0fff
}

/// Extracts the 4 flag bits from a packed handle-and-flags word.
pub fn flags(word: u16) -> u8 {
    (word >> 12) as u8
}

/// Packs a 12-bit connection handle and 4 flag bits into one word.
pub fn pack_handle(handle: u16, flags: u8) -> u16 {
    (handle & 0x0fff) | (u16::from(flags) << 12)
}

/// Packet Boundary flag values of the ACL data header.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum AclBoundary {
    /// First fragment of a non-automatically-flushable PDU.
    FirstNonFlushable = 0x00,
    /// Continuing fragment.
    Continuation = 0x01,
    /// First fragment of an automatically-flushable PDU.
    FirstFlushable = 0x02,
    /// A complete automatically-flushable PDU.
    Complete = 0x03,
}

/// ACL data packet header: a packed handle word and the fragment length.
#[derive(Debug, Copy, Clone)]
pub struct AclHeader {
    /// Packed connection handle (bits 0-11), PB flag (bits 12-13) and BC flag (bits 14-15).
    pub handle: u16,
    /// Number of data octets following the header.
    pub dlen: u16,
}

impl AclHeader {
    /// Size of the header in octets.
    pub const SIZE: usize = 4;

    /// Creates a header addressing `handle` with the given boundary flag and no broadcast bits.
    pub fn new(handle: u16, pb: u8, dlen: u16) -> Self {
        AclHeader {
            handle: pack_handle(handle, pb & 0x03),
            dlen,
        }
    }

    /// Returns the 12-bit connection handle.
    pub fn handle(&self) -> u16 {
        handle(self.handle)
    }

    /// Returns the raw 4 flag bits (PB in the low 2, BC in the high 2).
    pub fn flags(&self) -> u8 {
        flags(self.handle)
    }
}

impl<'a> FromBytes<'a> for AclHeader {
    fn from_bytes(bytes: &mut ByteReader<'a>) -> Result<Self, Error> {
        Ok(Self {
            handle: bytes.read_u16_le()?,
            dlen: bytes.read_u16_le()?,
        })
    }
}

impl ToBytes for AclHeader {
    fn to_bytes(&self, writer: &mut ByteWriter<'_>) -> Result<(), Error> {
        writer.write_u16_le(self.handle)?;
        writer.write_u16_le(self.dlen)?;
        Ok(())
    }
}

/// SCO data packet header.
///
/// The flag bits of the handle word carry the Packet Status in their low 2 bits on the receive
/// path.
#[derive(Debug, Copy, Clone)]
pub struct ScoHeader {
    /// Packed connection handle and packet-status flags.
    pub handle: u16,
    /// Number of data octets following the header.
    pub dlen: u8,
}

impl ScoHeader {
    /// Size of the header in octets.
    pub const SIZE: usize = 3;

    /// Creates a header addressing `handle` carrying `pkt_status` in the flag bits.
    pub fn new(handle: u16, pkt_status: u8, dlen: u8) -> Self {
        ScoHeader {
            handle: pack_handle(handle, pkt_status & 0x03),
            dlen,
        }
    }

    /// Returns the 12-bit connection handle.
    pub fn handle(&self) -> u16 {
        handle(self.handle)
    }

    /// Returns the 2-bit Packet Status field.
    pub fn pkt_status(&self) -> u8 {
        flags(self.handle) & 0x03
    }
}

impl<'a> FromBytes<'a> for ScoHeader {
    fn from_bytes(bytes: &mut ByteReader<'a>) -> Result<Self, Error> {
        Ok(Self {
            handle: bytes.read_u16_le()?,
            dlen: bytes.read_u8()?,
        })
    }
}

impl ToBytes for ScoHeader {
    fn to_bytes(&self, writer: &mut ByteWriter<'_>) -> Result<(), Error> {
        writer.write_u16_le(self.handle)?;
        writer.write_u8(self.dlen)?;
        Ok(())
    }
}

/// Packet Boundary flag values of the ISO data header.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum IsoBoundary {
    /// First fragment of a fragmented SDU.
    First = 0x00,
    /// Continuation fragment.
    Continuation = 0x01,
    /// A complete SDU in a single packet.
    Complete = 0x02,
    /// The last fragment of a fragmented SDU.
    Last = 0x03,
}

/// Packs the ISO flag bits from a PB value and a timestamp-present bit.
pub fn iso_flags(pb: u8, ts: bool) -> u8 {
    (pb & 0x03) | ((ts as u8) << 2)
}

/// Extracts the PB flag from packed ISO flag bits.
pub fn iso_flags_pb(flags: u8) -> u8 {
    flags & 0x03
}

/// Extracts the timestamp-present bit from packed ISO flag bits.
pub fn iso_flags_ts(flags: u8) -> bool {
    (flags >> 2) & 0x01 != 0
}

/// ISO data packet header.
#[derive(Debug, Copy, Clone)]
pub struct IsoHeader {
    /// Packed connection handle, PB flag (bits 12-13) and TS flag (bit 14).
    pub handle: u16,
    /// Number of data octets following the header.
    pub dlen: u16,
}

impl IsoHeader {
    /// Size of the header in octets.
    pub const SIZE: usize = 4;

    /// Creates a header addressing `handle` with pre-packed ISO flag bits.
    pub fn new(handle: u16, flags: u8, dlen: u16) -> Self {
        IsoHeader {
            handle: pack_handle(handle, flags),
            dlen,
        }
    }

    /// Returns the 12-bit connection handle.
    pub fn handle(&self) -> u16 {
        handle(self.handle)
    }

    /// Returns the raw flag bits.
    pub fn flags(&self) -> u8 {
        flags(self.handle)
    }
}

impl<'a> FromBytes<'a> for IsoHeader {
    fn from_bytes(bytes: &mut ByteReader<'a>) -> Result<Self, Error> {
        Ok(Self {
            handle: bytes.read_u16_le()?,
            dlen: bytes.read_u16_le()?,
        })
    }
}

impl ToBytes for IsoHeader {
    fn to_bytes(&self, writer: &mut ByteWriter<'_>) -> Result<(), Error> {
        writer.write_u16_le(self.handle)?;
        writer.write_u16_le(self.dlen)?;
        Ok(())
    }
}

/// The load header at the start of the first fragment of every ISO SDU.
///
/// `slen` carries the SDU length in its low 14 bits and the Packet Status in the top 2.
#[derive(Debug, Copy, Clone)]
pub struct IsoDataStart {
    /// SDU sequence number.
    pub sn: u16,
    /// Packed SDU length and packet status.
    pub slen: u16,
}

impl IsoDataStart {
    /// Size of the header in octets.
    pub const SIZE: usize = 4;

    /// Packs an SDU length and a packet-status field into the `slen` word.
    pub fn pack_slen(len: u16, pkt_status: u8) -> u16 {
        len | (u16::from(pkt_status) << 14)
    }

    /// Returns the SDU length.
    pub fn sdu_len(&self) -> u16 {
        self.slen & 0x3fff
    }

    /// Returns the 2-bit Packet Status field.
    pub fn pkt_status(&self) -> u8 {
        (self.slen >> 14) as u8
    }
}

impl<'a> FromBytes<'a> for IsoDataStart {
    fn from_bytes(bytes: &mut ByteReader<'a>) -> Result<Self, Error> {
        Ok(Self {
            sn: bytes.read_u16_le()?,
            slen: bytes.read_u16_le()?,
        })
    }
}

impl ToBytes for IsoDataStart {
    fn to_bytes(&self, writer: &mut ByteWriter<'_>) -> Result<(), Error> {
        writer.write_u16_le(self.sn)?;
        writer.write_u16_le(self.slen)?;
        Ok(())
    }
}
