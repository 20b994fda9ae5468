//! PDUs used on the L2CAP signaling channels.
//!
//! BR/EDR signaling runs on CID `0x0001`, LE signaling on CID `0x0005`. Both share the same
//! `{code, ident, len}` header; the set of codes each channel accepts differs and is enforced by
//! the dispatchers in the host module.

use crate::bytes::*;
use crate::Error;

enum_with_unknown! {
    /// Signaling PDU opcodes.
    #[derive(Debug, Copy, Clone, PartialEq, Eq)]
    pub enum SigCode(u8) {
        CommandReject = 0x01,
        ConnReq = 0x02,
        ConnRsp = 0x03,
        ConfigReq = 0x04,
        ConfigRsp = 0x05,
        DisconnReq = 0x06,
        DisconnRsp = 0x07,
        EchoReq = 0x08,
        EchoRsp = 0x09,
        InfoReq = 0x0a,
        InfoRsp = 0x0b,
        ConnParamReq = 0x12,
        ConnParamRsp = 0x13,
        LeConnReq = 0x14,
        LeConnRsp = 0x15,
        FlowCtlCredits = 0x16,
        EcredConnReq = 0x17,
        EcredConnRsp = 0x18,
    }
}

/// Connection response / LE connection response result meaning "PSM not supported".
pub const RESULT_PSM_NOT_SUPPORTED: u16 = 0x0002;

/// Information response result meaning "not supported".
pub const RESULT_INFO_NOT_SUPPORTED: u16 = 0x0001;

/// Header shared by every signaling PDU.
#[derive(Debug, Copy, Clone)]
pub struct SigHeader {
    pub code: SigCode,
    pub ident: u8,
    pub length: u16,
}

impl SigHeader {
    /// Size of the header in octets.
    pub const SIZE: usize = 4;
}

impl<'a> FromBytes<'a> for SigHeader {
    fn from_bytes(bytes: &mut ByteReader<'a>) -> Result<Self, Error> {
        Ok(Self {
            code: SigCode::from(bytes.read_u8()?),
            ident: bytes.read_u8()?,
            length: bytes.read_u16_le()?,
        })
    }
}

impl ToBytes for SigHeader {
    fn to_bytes(&self, writer: &mut ByteWriter<'_>) -> Result<(), Error> {
        writer.write_u8(self.code.into())?;
        writer.write_u8(self.ident)?;
        writer.write_u16_le(self.length)
    }
}

/// `Command Reject`. The reason-dependent data is omitted; rejects this host emits carry an
/// empty reason field.
#[derive(Debug, Copy, Clone, Default)]
pub struct CmdReject {
    pub reason: u16,
}

impl<'a> FromBytes<'a> for CmdReject {
    fn from_bytes(bytes: &mut ByteReader<'a>) -> Result<Self, Error> {
        Ok(Self {
            reason: bytes.read_u16_le()?,
        })
    }
}

impl ToBytes for CmdReject {
    fn to_bytes(&self, writer: &mut ByteWriter<'_>) -> Result<(), Error> {
        writer.write_u16_le(self.reason)
    }
}

/// `Connection Request`.
#[derive(Debug, Copy, Clone)]
pub struct ConnReq {
    pub psm: u16,
    pub scid: u16,
}

impl<'a> FromBytes<'a> for ConnReq {
    fn from_bytes(bytes: &mut ByteReader<'a>) -> Result<Self, Error> {
        Ok(Self {
            psm: bytes.read_u16_le()?,
            scid: bytes.read_u16_le()?,
        })
    }
}

impl ToBytes for ConnReq {
    fn to_bytes(&self, writer: &mut ByteWriter<'_>) -> Result<(), Error> {
        writer.write_u16_le(self.psm)?;
        writer.write_u16_le(self.scid)
    }
}

/// `Connection Response`.
#[derive(Debug, Copy, Clone, Default)]
pub struct ConnRsp {
    pub dcid: u16,
    pub scid: u16,
    pub result: u16,
    pub status: u16,
}

impl<'a> FromBytes<'a> for ConnRsp {
    fn from_bytes(bytes: &mut ByteReader<'a>) -> Result<Self, Error> {
        Ok(Self {
            dcid: bytes.read_u16_le()?,
            scid: bytes.read_u16_le()?,
            result: bytes.read_u16_le()?,
            status: bytes.read_u16_le()?,
        })
    }
}

impl ToBytes for ConnRsp {
    fn to_bytes(&self, writer: &mut ByteWriter<'_>) -> Result<(), Error> {
        writer.write_u16_le(self.dcid)?;
        writer.write_u16_le(self.scid)?;
        writer.write_u16_le(self.result)?;
        writer.write_u16_le(self.status)
    }
}

/// `Configure Request`. Configuration options are accepted as-is and not decoded.
#[derive(Debug, Copy, Clone, Default)]
pub struct ConfigReq {
    pub dcid: u16,
    pub flags: u16,
}

impl<'a> FromBytes<'a> for ConfigReq {
    fn from_bytes(bytes: &mut ByteReader<'a>) -> Result<Self, Error> {
        Ok(Self {
            dcid: bytes.read_u16_le()?,
            flags: bytes.read_u16_le()?,
        })
    }
}

impl ToBytes for ConfigReq {
    fn to_bytes(&self, writer: &mut ByteWriter<'_>) -> Result<(), Error> {
        writer.write_u16_le(self.dcid)?;
        writer.write_u16_le(self.flags)
    }
}

/// `Configure Response`.
#[derive(Debug, Copy, Clone, Default)]
pub struct ConfigRsp {
    pub scid: u16,
    pub flags: u16,
    pub result: u16,
}

impl<'a> FromBytes<'a> for ConfigRsp {
    fn from_bytes(bytes: &mut ByteReader<'a>) -> Result<Self, Error> {
        Ok(Self {
            scid: bytes.read_u16_le()?,
            flags: bytes.read_u16_le()?,
            result: bytes.read_u16_le()?,
        })
    }
}

impl ToBytes for ConfigRsp {
    fn to_bytes(&self, writer: &mut ByteWriter<'_>) -> Result<(), Error> {
        writer.write_u16_le(self.scid)?;
        writer.write_u16_le(self.flags)?;
        writer.write_u16_le(self.result)
    }
}

/// `Disconnection Request`; the response mirrors the same two fields.
#[derive(Debug, Copy, Clone)]
pub struct DisconnReq {
    pub dcid: u16,
    pub scid: u16,
}

/// `Disconnection Response`.
pub type DisconnRsp = DisconnReq;

impl<'a> FromBytes<'a> for DisconnReq {
    fn from_bytes(bytes: &mut ByteReader<'a>) -> Result<Self, Error> {
        Ok(Self {
            dcid: bytes.read_u16_le()?,
            scid: bytes.read_u16_le()?,
        })
    }
}

impl ToBytes for DisconnReq {
    fn to_bytes(&self, writer: &mut ByteWriter<'_>) -> Result<(), Error> {
        writer.write_u16_le(self.dcid)?;
        writer.write_u16_le(self.scid)
    }
}

/// `Information Request`.
#[derive(Debug, Copy, Clone)]
pub struct InfoReq {
    pub info_type: u16,
}

impl<'a> FromBytes<'a> for InfoReq {
    fn from_bytes(bytes: &mut ByteReader<'a>) -> Result<Self, Error> {
        Ok(Self {
            info_type: bytes.read_u16_le()?,
        })
    }
}

impl ToBytes for InfoReq {
    fn to_bytes(&self, writer: &mut ByteWriter<'_>) -> Result<(), Error> {
        writer.write_u16_le(self.info_type)
    }
}

/// `Information Response` with its type-dependent data.
#[derive(Debug, Copy, Clone)]
pub struct InfoRsp<'a> {
    pub info_type: u16,
    pub result: u16,
    pub data: &'a [u8],
}

impl<'a> FromBytes<'a> for InfoRsp<'a> {
    fn from_bytes(bytes: &mut ByteReader<'a>) -> Result<Self, Error> {
        Ok(Self {
            info_type: bytes.read_u16_le()?,
            result: bytes.read_u16_le()?,
            data: bytes.read_rest(),
        })
    }
}

impl<'a> ToBytes for InfoRsp<'a> {
    fn to_bytes(&self, writer: &mut ByteWriter<'_>) -> Result<(), Error> {
        writer.write_u16_le(self.info_type)?;
        writer.write_u16_le(self.result)?;
        writer.write_slice(self.data)
    }
}

/// `Connection Parameter Update Request`.
#[derive(Debug, Copy, Clone)]
pub struct ConnParamReq {
    pub min_interval: u16,
    pub max_interval: u16,
    pub latency: u16,
    pub timeout: u16,
}

impl<'a> FromBytes<'a> for ConnParamReq {
    fn from_bytes(bytes: &mut ByteReader<'a>) -> Result<Self, Error> {
        Ok(Self {
            min_interval: bytes.read_u16_le()?,
            max_interval: bytes.read_u16_le()?,
            latency: bytes.read_u16_le()?,
            timeout: bytes.read_u16_le()?,
        })
    }
}

impl ToBytes for ConnParamReq {
    fn to_bytes(&self, writer: &mut ByteWriter<'_>) -> Result<(), Error> {
        writer.write_u16_le(self.min_interval)?;
        writer.write_u16_le(self.max_interval)?;
        writer.write_u16_le(self.latency)?;
        writer.write_u16_le(self.timeout)
    }
}

/// `Connection Parameter Update Response`.
#[derive(Debug, Copy, Clone, Default)]
pub struct ConnParamRsp {
    pub result: u16,
}

impl<'a> FromBytes<'a> for ConnParamRsp {
    fn from_bytes(bytes: &mut ByteReader<'a>) -> Result<Self, Error> {
        Ok(Self {
            result: bytes.read_u16_le()?,
        })
    }
}

impl ToBytes for ConnParamRsp {
    fn to_bytes(&self, writer: &mut ByteWriter<'_>) -> Result<(), Error> {
        writer.write_u16_le(self.result)
    }
}

/// `LE Credit Based Connection Request`.
#[derive(Debug, Copy, Clone)]
pub struct LeConnReq {
    pub psm: u16,
    pub scid: u16,
    pub mtu: u16,
    pub mps: u16,
    pub credits: u16,
}

impl<'a> FromBytes<'a> for LeConnReq {
    fn from_bytes(bytes: &mut ByteReader<'a>) -> Result<Self, Error> {
        Ok(Self {
            psm: bytes.read_u16_le()?,
            scid: bytes.read_u16_le()?,
            mtu: bytes.read_u16_le()?,
            mps: bytes.read_u16_le()?,
            credits: bytes.read_u16_le()?,
        })
    }
}

impl ToBytes for LeConnReq {
    fn to_bytes(&self, writer: &mut ByteWriter<'_>) -> Result<(), Error> {
        writer.write_u16_le(self.psm)?;
        writer.write_u16_le(self.scid)?;
        writer.write_u16_le(self.mtu)?;
        writer.write_u16_le(self.mps)?;
        writer.write_u16_le(self.credits)
    }
}

/// `LE Credit Based Connection Response`.
#[derive(Debug, Copy, Clone, Default)]
pub struct LeConnRsp {
    pub dcid: u16,
    pub mtu: u16,
    pub mps: u16,
    pub credits: u16,
    pub result: u16,
}

impl<'a> FromBytes<'a> for LeConnRsp {
    fn from_bytes(bytes: &mut ByteReader<'a>) -> Result<Self, Error> {
        Ok(Self {
            dcid: bytes.read_u16_le()?,
            mtu: bytes.read_u16_le()?,
            mps: bytes.read_u16_le()?,
            credits: bytes.read_u16_le()?,
            result: bytes.read_u16_le()?,
        })
    }
}

impl ToBytes for LeConnRsp {
    fn to_bytes(&self, writer: &mut ByteWriter<'_>) -> Result<(), Error> {
        writer.write_u16_le(self.dcid)?;
        writer.write_u16_le(self.mtu)?;
        writer.write_u16_le(self.mps)?;
        writer.write_u16_le(self.credits)?;
        writer.write_u16_le(self.result)
    }
}

/// `LE Flow Control Credit`.
#[derive(Debug, Copy, Clone)]
pub struct FlowCtlCredits {
    pub cid: u16,
    pub credits: u16,
}

impl<'a> FromBytes<'a> for FlowCtlCredits {
    fn from_bytes(bytes: &mut ByteReader<'a>) -> Result<Self, Error> {
        Ok(Self {
            cid: bytes.read_u16_le()?,
            credits: bytes.read_u16_le()?,
        })
    }
}

impl ToBytes for FlowCtlCredits {
    fn to_bytes(&self, writer: &mut ByteWriter<'_>) -> Result<(), Error> {
        writer.write_u16_le(self.cid)?;
        writer.write_u16_le(self.credits)
    }
}

/// `Enhanced Credit Based Connection Request` with its trailing source CID array.
#[derive(Debug, Clone)]
pub struct EcredConnReq {
    pub psm: u16,
    pub mtu: u16,
    pub mps: u16,
    pub credits: u16,
    pub scids: Vec<u16>,
}

impl<'a> FromBytes<'a> for EcredConnReq {
    fn from_bytes(bytes: &mut ByteReader<'a>) -> Result<Self, Error> {
        let psm = bytes.read_u16_le()?;
        let mtu = bytes.read_u16_le()?;
        let mps = bytes.read_u16_le()?;
        let credits = bytes.read_u16_le()?;
        let mut scids = Vec::new();
        while !bytes.is_empty() {
            scids.push(bytes.read_u16_le()?);
        }
        Ok(Self {
            psm,
            mtu,
            mps,
            credits,
            scids,
        })
    }
}

impl ToBytes for EcredConnReq {
    fn to_bytes(&self, writer: &mut ByteWriter<'_>) -> Result<(), Error> {
        writer.write_u16_le(self.psm)?;
        writer.write_u16_le(self.mtu)?;
        writer.write_u16_le(self.mps)?;
        writer.write_u16_le(self.credits)?;
        for scid in &self.scids {
            writer.write_u16_le(*scid)?;
        }
        Ok(())
    }
}

/// `Enhanced Credit Based Connection Response` with its trailing destination CID array.
#[derive(Debug, Clone, Default)]
pub struct EcredConnRsp {
    pub mtu: u16,
    pub mps: u16,
    pub credits: u16,
    pub result: u16,
    pub dcids: Vec<u16>,
}

impl<'a> FromBytes<'a> for EcredConnRsp {
    fn from_bytes(bytes: &mut ByteReader<'a>) -> Result<Self, Error> {
        let mtu = bytes.read_u16_le()?;
        let mps = bytes.read_u16_le()?;
        let credits = bytes.read_u16_le()?;
        let result = bytes.read_u16_le()?;
        let mut dcids = Vec::new();
        while !bytes.is_empty() {
            dcids.push(bytes.read_u16_le()?);
        }
        Ok(Self {
            mtu,
            mps,
            credits,
            result,
            dcids,
        })
    }
}

impl ToBytes for EcredConnRsp {
    fn to_bytes(&self, writer: &mut ByteWriter<'_>) -> Result<(), Error> {
        writer.write_u16_le(self.mtu)?;
        writer.write_u16_le(self.mps)?;
        writer.write_u16_le(self.credits)?;
        writer.write_u16_le(self.result)?;
        for dcid in &self.dcids {
            writer.write_u16_le(*dcid)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_round_trip() {
        let hdr = SigHeader {
            code: SigCode::ConnReq,
            ident: 3,
            length: 4,
        };
        let mut buf = [0; SigHeader::SIZE];
        hdr.to_bytes(&mut ByteWriter::new(&mut buf)).unwrap();
        assert_eq!(buf, [0x02, 0x03, 0x04, 0x00]);

        let parsed = SigHeader::from_bytes(&mut ByteReader::new(&buf)).unwrap();
        assert_eq!(parsed.code, SigCode::ConnReq);
        assert_eq!(parsed.ident, 3);
        assert_eq!(parsed.length, 4);
    }

    #[test]
    fn ecred_req_trailing_cids() {
        let raw = [
            0x80, 0x00, // psm
            0x40, 0x00, // mtu
            0x17, 0x00, // mps
            0x01, 0x00, // credits
            0x40, 0x00, 0x41, 0x00, 0x42, 0x00, // scids
        ];
        let req = EcredConnReq::from_bytes(&mut ByteReader::new(&raw)).unwrap();
        assert_eq!(req.psm, 0x0080);
        assert_eq!(req.scids, vec![0x0040, 0x0041, 0x0042]);
    }

    #[test]
    fn unknown_code_is_preserved() {
        assert_eq!(SigCode::from(0x42), SigCode::Unknown(0x42));
        assert_eq!(u8::from(SigCode::Unknown(0x42)), 0x42);
    }
}
