//! The Logical Link Control and Adaptation Protocol (L2CAP).
//!
//! L2CAP provides "channels" on top of an ACL link, identified by a 16-bit CID. A handful of CIDs
//! are fixed: this host implements the BR/EDR signaling channel (`0x0001`) and the LE signaling
//! channel (`0x0005`) itself, and hands the two Security Manager channels (`0x0006`, `0x0007`) to
//! the external [`SecurityManager`]. Dynamic channels are allocated from `0x0040` upwards and are
//! negotiated through the signaling PDUs in [`signaling`].
//!
//! [`SecurityManager`]: ../security/trait.SecurityManager.html
//! [`signaling`]: signaling/index.html

pub mod signaling;

use crate::bytes::*;
use crate::Error;
use bitflags::bitflags;
use core::fmt;

/// An L2CAP channel identifier (CID).
///
/// Channels are basically like TCP ports: traffic addressed to a CID is delivered to whatever is
/// connected to that channel on the receiving device. Fixed channels use the same CID on both
/// devices; dynamically allocated channels can have different CIDs on each end.
#[derive(PartialEq, Eq, Hash, Copy, Clone)]
pub struct Cid(u16);

impl Cid {
    /// The null identifier. Must never be used as a destination endpoint.
    pub const NULL: Self = Cid(0x0000);

    /// BR/EDR L2CAP signaling channel.
    pub const SIGNALING: Self = Cid(0x0001);

    /// LE L2CAP signaling channel.
    pub const LE_SIGNALING: Self = Cid(0x0005);

    /// LE Security Manager channel.
    pub const LE_SECURITY_MANAGER: Self = Cid(0x0006);

    /// BR/EDR Security Manager channel.
    pub const BREDR_SECURITY_MANAGER: Self = Cid(0x0007);

    /// The first dynamically allocated CID.
    pub const FIRST_DYNAMIC: Self = Cid(0x0040);

    /// Creates a CID from its raw value.
    pub fn new(raw: u16) -> Self {
        Cid(raw)
    }

    /// Returns the channel identifier as a raw `u16`.
    pub fn as_raw(&self) -> u16 {
        self.0
    }
}

impl fmt::Debug for Cid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#06X}", self.0)
    }
}

impl FromBytes<'_> for Cid {
    fn from_bytes(bytes: &mut ByteReader<'_>) -> Result<Self, Error> {
        Ok(Cid(bytes.read_u16_le()?))
    }
}

impl ToBytes for Cid {
    fn to_bytes(&self, writer: &mut ByteWriter<'_>) -> Result<(), Error> {
        writer.write_u16_le(self.0)
    }
}

/// The PSM carrying RFCOMM.
pub const PSM_RFCOMM: u16 = 0x0003;

/// Operating mode of a connected dynamic channel.
///
/// Credit-based channels prefix each SDU with a 16-bit length and chop it into K-frames; the
/// receiving side reassembles against that length and returns flow-control credits.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ChannelMode {
    /// Basic mode (BR/EDR connection-oriented channels).
    Basic,
    /// LE credit-based flow control mode.
    LeCredits,
    /// Enhanced credit-based flow control mode.
    EnhancedCredits,
}

impl ChannelMode {
    /// Returns whether SDUs on this channel carry a length prefix and credit accounting.
    pub fn is_credit_based(self) -> bool {
        match self {
            ChannelMode::Basic => false,
            ChannelMode::LeCredits | ChannelMode::EnhancedCredits => true,
        }
    }
}

/// Header used by *all* L2CAP PDUs.
#[derive(Debug, Copy, Clone)]
pub struct Header {
    /// Length of the payload following the length and channel fields (after reassembly).
    pub length: u16,
    /// Destination endpoint of the PDU.
    pub cid: Cid,
}

impl Header {
    /// The size of an L2CAP basic header in octets.
    pub const SIZE: usize = 2 + 2;
}

impl<'a> FromBytes<'a> for Header {
    fn from_bytes(bytes: &mut ByteReader<'a>) -> Result<Self, Error> {
        let length = bytes.read_u16_le()?;
        let cid = Cid::from_bytes(bytes)?;
        Ok(Self { length, cid })
    }
}

impl ToBytes for Header {
    fn to_bytes(&self, writer: &mut ByteWriter<'_>) -> Result<(), Error> {
        writer.write_u16_le(self.length)?;
        writer.write_u16_le(self.cid.as_raw())?;
        Ok(())
    }
}

bitflags! {
    /// The fixed-channel support mask exchanged through the information request procedure.
    pub struct FixedChannels: u64 {
        const SIG_BREDR = 0x02;
        const CONNLESS = 0x04;
        const SMP_BREDR = 0x80;
    }
}

/// `Information Request` feature mask bit advertising fixed-channel support.
pub const FEAT_FIXED_CHAN: u32 = 0x0000_0080;

/// Information request/response types.
pub const INFO_TYPE_FEAT_MASK: u16 = 0x0002;
pub const INFO_TYPE_FIXED_CHAN: u16 = 0x0003;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_layout() {
        let hdr = Header {
            length: 0x0008,
            cid: Cid::SIGNALING,
        };
        let mut buf = [0; Header::SIZE];
        hdr.to_bytes(&mut ByteWriter::new(&mut buf)).unwrap();
        assert_eq!(buf, [0x08, 0x00, 0x01, 0x00]);
    }
}
