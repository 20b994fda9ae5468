//! RFCOMM framing.
//!
//! RFCOMM emulates serial cables over an L2CAP channel (PSM `0x0003`). Every frame starts with an
//! address octet (DLCI, command/response bit, EA bit), a control octet (frame type plus the
//! poll/final bit) and a 7- or 15-bit length field, and ends with an FCS octet. The multiplexer
//! control channel (DLCI 0) carries `MCC` messages such as parameter negotiation (`PN`) and modem
//! status (`MSC`) inside UIH frames.
//!
//! A DLCI is `channel * 2 + direction`; the channel number occupies the upper 5 bits of the
//! 6-bit DLCI.

use crate::bytes::*;
use crate::Error;

/// CRC-8 lookup table for the FCS polynomial used by RFCOMM (TS 07.10).
pub static CRC_TABLE: [u8; 256] = [
    0x00, 0x91, 0xe3, 0x72, 0x07, 0x96, 0xe4, 0x75, 0x0e, 0x9f, 0xed, 0x7c, 0x09, 0x98, 0xea,
    0x7b, 0x1c, 0x8d, 0xff, 0x6e, 0x1b, 0x8a, 0xf8, 0x69, 0x12, 0x83, 0xf1, 0x60, 0x15, 0x84,
    0xf6, 0x67, 0x38, 0xa9, 0xdb, 0x4a, 0x3f, 0xae, 0xdc, 0x4d, 0x36, 0xa7, 0xd5, 0x44, 0x31,
    0xa0, 0xd2, 0x43, 0x24, 0xb5, 0xc7, 0x56, 0x23, 0xb2, 0xc0, 0x51, 0x2a, 0xbb, 0xc9, 0x58,
    0x2d, 0xbc, 0xce, 0x5f, 0x70, 0xe1, 0x93, 0x02, 0x77, 0xe6, 0x94, 0x05, 0x7e, 0xef, 0x9d,
    0x0c, 0x79, 0xe8, 0x9a, 0x0b, 0x6c, 0xfd, 0x8f, 0x1e, 0x6b, 0xfa, 0x88, 0x19, 0x62, 0xf3,
    0x81, 0x10, 0x65, 0xf4, 0x86, 0x17, 0x48, 0xd9, 0xab, 0x3a, 0x4f, 0xde, 0xac, 0x3d, 0x46,
    0xd7, 0xa5, 0x34, 0x41, 0xd0, 0xa2, 0x33, 0x54, 0xc5, 0xb7, 0x26, 0x53, 0xc2, 0xb0, 0x21,
    0x5a, 0xcb, 0xb9, 0x28, 0x5d, 0xcc, 0xbe, 0x2f, 0xe0, 0x71, 0x03, 0x92, 0xe7, 0x76, 0x04,
    0x95, 0xee, 0x7f, 0x0d, 0x9c, 0xe9, 0x78, 0x0a, 0x9b, 0xfc, 0x6d, 0x1f, 0x8e, 0xfb, 0x6a,
    0x18, 0x89, 0xf2, 0x63, 0x11, 0x80, 0xf5, 0x64, 0x16, 0x87, 0xd8, 0x49, 0x3b, 0xaa, 0xdf,
    0x4e, 0x3c, 0xad, 0xd6, 0x47, 0x35, 0xa4, 0xd1, 0x40, 0x32, 0xa3, 0xc4, 0x55, 0x27, 0xb6,
    0xc3, 0x52, 0x20, 0xb1, 0xca, 0x5b, 0x29, 0xb8, 0xcd, 0x5c, 0x2e, 0xbf, 0x90, 0x01, 0x73,
    0xe2, 0x97, 0x06, 0x74, 0xe5, 0x9e, 0x0f, 0x7d, 0xec, 0x99, 0x08, 0x7a, 0xeb, 0x8c, 0x1d,
    0x6f, 0xfe, 0x8b, 0x1a, 0x68, 0xf9, 0x82, 0x13, 0x61, 0xf0, 0x85, 0x14, 0x66, 0xf7, 0xa8,
    0x39, 0x4b, 0xda, 0xaf, 0x3e, 0x4c, 0xdd, 0xa6, 0x37, 0x45, 0xd4, 0xa1, 0x30, 0x42, 0xd3,
    0xb4, 0x25, 0x57, 0xc6, 0xb3, 0x22, 0x50, 0xc1, 0xba, 0x2b, 0x59, 0xc8, 0xbd, 0x2c, 0x5e,
    0xcf,
];

/// Computes the FCS octet over the given header bytes.
///
/// The FCS covers the first three octets of SABM/UA/DM/DISC frames and the first two octets of
/// UIH frames.
pub fn fcs(data: &[u8]) -> u8 {
    let crc = data
        .iter()
        .fold(0xff, |crc, &byte| CRC_TABLE[usize::from(crc ^ byte)]);
    0xff - crc
}

enum_with_unknown! {
    /// RFCOMM frame types, as found in the control octet with the P/F bit masked off.
    #[derive(Debug, Copy, Clone, PartialEq, Eq)]
    pub enum FrameType(u8) {
        /// Set Asynchronous Balanced Mode (channel open request).
        Sabm = 0x2f,
        /// Unnumbered Acknowledgement.
        Ua = 0x63,
        /// Disconnected Mode (rejection).
        Dm = 0x0f,
        /// Disconnect.
        Disc = 0x43,
        /// Unnumbered Information with Header check.
        Uih = 0xef,
    }
}

enum_with_unknown! {
    /// Multiplexer control message types (the type field shifted past its EA and C/R bits).
    #[derive(Debug, Copy, Clone, PartialEq, Eq)]
    pub enum MccType(u8) {
        /// DLC parameter negotiation.
        Pn = 0x20,
        /// Modem status command.
        Msc = 0x38,
    }
}

/// Packs an address octet from the C/R bit and a DLCI.
pub fn address(cr: u8, dlci: u8) -> u8 {
    (dlci & 0x3f) << 2 | (cr & 0x01) << 1 | 0x01
}

/// Extracts the DLCI from an address octet.
pub fn addr_dlci(address: u8) -> u8 {
    (address >> 2) & 0x3f
}

/// Extracts the server channel from an address octet (the DLCI without its direction bit).
pub fn addr_channel(address: u8) -> u8 {
    (address >> 3) & 0x1f
}

/// Packs a control octet from a frame type and the poll/final bit.
pub fn control(frame_type: FrameType, pf: u8) -> u8 {
    (u8::from(frame_type) & 0xef) | (pf & 0x01) << 4
}

/// Extracts the frame type from a control octet, masking off the P/F bit.
pub fn control_type(control: u8) -> FrameType {
    FrameType::from(control & 0xef)
}

/// Packs an MCC type octet from the C/R bit and a message type.
pub fn mcc_type(cr: u8, mcc: MccType) -> u8 {
    u8::from(mcc) << 2 | (cr & 0x01) << 1 | 0x01
}

/// Extracts the message type from an MCC type octet.
pub fn mcc_type_of(octet: u8) -> MccType {
    MccType::from(octet >> 2)
}

/// Returns whether the C/R bit of an address, control-type or MCC type octet is set.
pub fn test_cr(octet: u8) -> bool {
    octet & 0x02 != 0
}

/// Returns whether the EA bit terminates a length octet.
pub fn test_ea(octet: u8) -> bool {
    octet & 0x01 != 0
}

/// Encodes a 7-bit length with its EA bit set.
pub fn len8(len: u8) -> u8 {
    len << 1 | 0x01
}

/// Decodes a 7-bit length octet.
pub fn get_len8(octet: u8) -> u8 {
    (octet & 0xfe) >> 1
}

/// Decodes a 15-bit length from its two octets (EA octet first).
pub fn get_len16(lo: u8, hi: u8) -> u16 {
    (u16::from(hi) << 8 | u16::from(lo)) >> 1
}

/// A SABM/UA/DM/DISC frame: fixed four octets, FCS over the first three.
#[derive(Debug, Copy, Clone)]
pub struct CmdFrame {
    pub address: u8,
    pub control: u8,
    pub length: u8,
    pub fcs: u8,
}

impl CmdFrame {
    /// Size of the frame in octets.
    pub const SIZE: usize = 4;

    /// Builds an empty frame of the given type with the P/F bit set.
    pub fn new(frame_type: FrameType, cr: u8, dlci: u8) -> Self {
        let address = address(cr, dlci);
        let control = control(frame_type, 1);
        let length = len8(0);
        CmdFrame {
            address,
            control,
            length,
            fcs: fcs(&[address, control, length]),
        }
    }

    /// Returns the frame type with the P/F bit masked off.
    pub fn frame_type(&self) -> FrameType {
        control_type(self.control)
    }
}

impl<'a> FromBytes<'a> for CmdFrame {
    fn from_bytes(bytes: &mut ByteReader<'a>) -> Result<Self, Error> {
        Ok(Self {
            address: bytes.read_u8()?,
            control: bytes.read_u8()?,
            length: bytes.read_u8()?,
            fcs: bytes.read_u8()?,
        })
    }
}

impl ToBytes for CmdFrame {
    fn to_bytes(&self, writer: &mut ByteWriter<'_>) -> Result<(), Error> {
        writer.write_u8(self.address)?;
        writer.write_u8(self.control)?;
        writer.write_u8(self.length)?;
        writer.write_u8(self.fcs)
    }
}

/// Header of a multiplexer control message carried in a UIH frame on DLCI 0.
#[derive(Debug, Copy, Clone)]
pub struct MccHeader {
    pub mcc_type: u8,
    pub length: u8,
}

impl MccHeader {
    /// Size of the header in octets.
    pub const SIZE: usize = 2;
}

impl<'a> FromBytes<'a> for MccHeader {
    fn from_bytes(bytes: &mut ByteReader<'a>) -> Result<Self, Error> {
        Ok(Self {
            mcc_type: bytes.read_u8()?,
            length: bytes.read_u8()?,
        })
    }
}

impl ToBytes for MccHeader {
    fn to_bytes(&self, writer: &mut ByteWriter<'_>) -> Result<(), Error> {
        writer.write_u8(self.mcc_type)?;
        writer.write_u8(self.length)
    }
}

/// `PN` (parameter negotiation) payload.
#[derive(Debug, Copy, Clone, Default)]
pub struct Pn {
    pub dlci: u8,
    pub flow_ctrl: u8,
    pub priority: u8,
    pub ack_timer: u8,
    pub mtu: u16,
    pub max_retrans: u8,
    pub credits: u8,
}

impl Pn {
    /// Size of the payload in octets.
    pub const SIZE: usize = 8;
}

impl<'a> FromBytes<'a> for Pn {
    fn from_bytes(bytes: &mut ByteReader<'a>) -> Result<Self, Error> {
        Ok(Self {
            dlci: bytes.read_u8()?,
            flow_ctrl: bytes.read_u8()?,
            priority: bytes.read_u8()?,
            ack_timer: bytes.read_u8()?,
            mtu: bytes.read_u16_le()?,
            max_retrans: bytes.read_u8()?,
            credits: bytes.read_u8()?,
        })
    }
}

impl ToBytes for Pn {
    fn to_bytes(&self, writer: &mut ByteWriter<'_>) -> Result<(), Error> {
        writer.write_u8(self.dlci)?;
        writer.write_u8(self.flow_ctrl)?;
        writer.write_u8(self.priority)?;
        writer.write_u8(self.ack_timer)?;
        writer.write_u16_le(self.mtu)?;
        writer.write_u8(self.max_retrans)?;
        writer.write_u8(self.credits)
    }
}

/// `MSC` (modem status) payload.
#[derive(Debug, Copy, Clone)]
pub struct Msc {
    pub dlci: u8,
    pub v24_sig: u8,
}

impl Msc {
    /// Size of the payload in octets.
    pub const SIZE: usize = 2;
}

impl<'a> FromBytes<'a> for Msc {
    fn from_bytes(bytes: &mut ByteReader<'a>) -> Result<Self, Error> {
        Ok(Self {
            dlci: bytes.read_u8()?,
            v24_sig: bytes.read_u8()?,
        })
    }
}

impl ToBytes for Msc {
    fn to_bytes(&self, writer: &mut ByteWriter<'_>) -> Result<(), Error> {
        writer.write_u8(self.dlci)?;
        writer.write_u8(self.v24_sig)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fcs_matches_table_identity() {
        // FCS must equal 0xFF minus the folded CRC over the covered octets.
        let hdr = [address(1, 0), control(FrameType::Sabm, 1), len8(0)];
        let mut crc = 0xffu8;
        for byte in &hdr {
            crc = CRC_TABLE[usize::from(crc ^ byte)];
        }
        assert_eq!(fcs(&hdr), 0xff - crc);
    }

    #[test]
    fn cmd_frame_fcs_covers_three_octets() {
        let frame = CmdFrame::new(FrameType::Sabm, 1, 6);
        assert_eq!(frame.address, 6 << 2 | 0x03);
        assert_eq!(frame.control, 0x3f);
        assert_eq!(frame.length, 0x01);
        assert_eq!(
            frame.fcs,
            fcs(&[frame.address, frame.control, frame.length])
        );
    }

    #[test]
    fn address_field_packing() {
        let addr = address(1, 6);
        assert_eq!(addr_dlci(addr), 6);
        assert_eq!(addr_channel(addr), 3);
        assert!(test_ea(addr));
    }

    #[test]
    fn mcc_type_packing() {
        let octet = mcc_type(1, MccType::Pn);
        assert_eq!(octet, 0x83);
        assert_eq!(mcc_type_of(octet), MccType::Pn);
        assert!(test_cr(octet));

        let octet = mcc_type(0, MccType::Msc);
        assert_eq!(mcc_type_of(octet), MccType::Msc);
        assert!(!test_cr(octet));
    }

    #[test]
    fn length_encodings() {
        assert_eq!(get_len8(len8(100)), 100);

        let len: u16 = 1000;
        let lo = ((len << 1) & 0xff) as u8;
        let hi = (len >> 7) as u8;
        assert!(!test_ea(lo));
        assert_eq!(get_len16(lo, hi), 1000);
    }

    #[test]
    fn frame_type_masks_pf_bit() {
        assert_eq!(control_type(control(FrameType::Ua, 1)), FrameType::Ua);
        assert_eq!(control_type(control(FrameType::Ua, 0)), FrameType::Ua);
        assert_eq!(control_type(0xff), FrameType::Uih);
    }
}
