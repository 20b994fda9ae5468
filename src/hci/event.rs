//! HCI event decoding.
//!
//! Defines the event codes this host reacts to and the parameter blocks it decodes. Events whose
//! code is not listed fall into the `Unknown` variant and are logged and ignored by the event
//! dispatcher; they are never an error.

use crate::bytes::*;
use crate::Error;

enum_with_unknown! {
    /// HCI event codes ([Vol 4] Part E, Section 7.7).
    #[derive(Debug, Copy, Clone, PartialEq, Eq)]
    pub enum EventCode(u8) {
        ConnComplete = 0x03,
        ConnRequest = 0x04,
        DisconnectComplete = 0x05,
        AuthComplete = 0x06,
        EncryptChange = 0x08,
        CmdComplete = 0x0e,
        CmdStatus = 0x0f,
        NumCompletedPackets = 0x13,
        PinCodeRequest = 0x16,
        LinkKeyRequest = 0x17,
        LinkKeyNotify = 0x18,
        SyncConnComplete = 0x2c,
        IoCapabilityRequest = 0x31,
        IoCapabilityResponse = 0x32,
        UserConfirmRequest = 0x33,
        SimplePairingComplete = 0x36,
        LeMetaEvent = 0x3e,
    }
}

enum_with_unknown! {
    /// LE meta event subcodes ([Vol 4] Part E, Section 7.7.65).
    #[derive(Debug, Copy, Clone, PartialEq, Eq)]
    pub enum LeEventCode(u8) {
        ConnComplete = 0x01,
        AdvReport = 0x02,
        ConnUpdateComplete = 0x03,
        RemoteFeaturesComplete = 0x04,
        LtkRequest = 0x05,
        EnhancedConnComplete = 0x0a,
        ExtAdvReport = 0x0d,
        CisEstablished = 0x19,
        CisRequest = 0x1a,
        BigComplete = 0x1b,
        BigSyncEstablished = 0x1d,
    }
}

/// Header of every HCI event packet.
#[derive(Debug, Copy, Clone)]
pub struct EventHeader {
    pub code: EventCode,
    pub plen: u8,
}

impl EventHeader {
    /// Size of the header in octets.
    pub const SIZE: usize = 2;
}

impl<'a> FromBytes<'a> for EventHeader {
    fn from_bytes(bytes: &mut ByteReader<'a>) -> Result<Self, Error> {
        Ok(Self {
            code: EventCode::from(bytes.read_u8()?),
            plen: bytes.read_u8()?,
        })
    }
}

/// `Command Complete` parameters; the command's return parameters follow.
#[derive(Debug, Copy, Clone)]
pub struct CmdComplete {
    pub ncmd: u8,
    pub opcode: u16,
}

impl<'a> FromBytes<'a> for CmdComplete {
    fn from_bytes(bytes: &mut ByteReader<'a>) -> Result<Self, Error> {
        Ok(Self {
            ncmd: bytes.read_u8()?,
            opcode: bytes.read_u16_le()?,
        })
    }
}

/// `Command Status` parameters.
#[derive(Debug, Copy, Clone)]
pub struct CmdStatus {
    pub status: u8,
    pub ncmd: u8,
    pub opcode: u16,
}

impl<'a> FromBytes<'a> for CmdStatus {
    fn from_bytes(bytes: &mut ByteReader<'a>) -> Result<Self, Error> {
        Ok(Self {
            status: bytes.read_u8()?,
            ncmd: bytes.read_u8()?,
            opcode: bytes.read_u16_le()?,
        })
    }
}

/// Return parameters of `Read BD_ADDR`.
#[derive(Debug, Copy, Clone)]
pub struct ReadBdAddrComplete {
    pub status: u8,
    pub bdaddr: [u8; 6],
}

impl<'a> FromBytes<'a> for ReadBdAddrComplete {
    fn from_bytes(bytes: &mut ByteReader<'a>) -> Result<Self, Error> {
        Ok(Self {
            status: bytes.read_u8()?,
            bdaddr: bytes.read_array()?,
        })
    }
}

/// Return parameters of `Read Local Supported Features`.
#[derive(Debug, Copy, Clone)]
pub struct ReadLocalFeaturesComplete {
    pub status: u8,
    pub features: [u8; 8],
}

impl<'a> FromBytes<'a> for ReadLocalFeaturesComplete {
    fn from_bytes(bytes: &mut ByteReader<'a>) -> Result<Self, Error> {
        Ok(Self {
            status: bytes.read_u8()?,
            features: bytes.read_array()?,
        })
    }
}

/// `Connection Request`.
#[derive(Debug, Copy, Clone)]
pub struct ConnRequest {
    pub bdaddr: [u8; 6],
    pub dev_class: [u8; 3],
    pub link_type: u8,
}

impl<'a> FromBytes<'a> for ConnRequest {
    fn from_bytes(bytes: &mut ByteReader<'a>) -> Result<Self, Error> {
        Ok(Self {
            bdaddr: bytes.read_array()?,
            dev_class: bytes.read_array()?,
            link_type: bytes.read_u8()?,
        })
    }
}

/// `Connection Complete`.
#[derive(Debug, Copy, Clone)]
pub struct ConnComplete {
    pub status: u8,
    pub handle: u16,
    pub bdaddr: [u8; 6],
    pub link_type: u8,
    pub encr_mode: u8,
}

impl<'a> FromBytes<'a> for ConnComplete {
    fn from_bytes(bytes: &mut ByteReader<'a>) -> Result<Self, Error> {
        Ok(Self {
            status: bytes.read_u8()?,
            handle: bytes.read_u16_le()?,
            bdaddr: bytes.read_array()?,
            link_type: bytes.read_u8()?,
            encr_mode: bytes.read_u8()?,
        })
    }
}

/// `Disconnection Complete`.
#[derive(Debug, Copy, Clone)]
pub struct DisconnectComplete {
    pub status: u8,
    pub handle: u16,
    pub reason: u8,
}

impl<'a> FromBytes<'a> for DisconnectComplete {
    fn from_bytes(bytes: &mut ByteReader<'a>) -> Result<Self, Error> {
        Ok(Self {
            status: bytes.read_u8()?,
            handle: bytes.read_u16_le()?,
            reason: bytes.read_u8()?,
        })
    }
}

/// `Authentication Complete`.
#[derive(Debug, Copy, Clone)]
pub struct AuthComplete {
    pub status: u8,
    pub handle: u16,
}

impl<'a> FromBytes<'a> for AuthComplete {
    fn from_bytes(bytes: &mut ByteReader<'a>) -> Result<Self, Error> {
        Ok(Self {
            status: bytes.read_u8()?,
            handle: bytes.read_u16_le()?,
        })
    }
}

/// `Encryption Change`.
#[derive(Debug, Copy, Clone)]
pub struct EncryptChange {
    pub status: u8,
    pub handle: u16,
    pub encr_mode: u8,
}

impl<'a> FromBytes<'a> for EncryptChange {
    fn from_bytes(bytes: &mut ByteReader<'a>) -> Result<Self, Error> {
        Ok(Self {
            status: bytes.read_u8()?,
            handle: bytes.read_u16_le()?,
            encr_mode: bytes.read_u8()?,
        })
    }
}

/// Events that carry nothing but the peer address (`PIN Code Request`, `Link Key Request`,
/// `IO Capability Request`).
#[derive(Debug, Copy, Clone)]
pub struct BdaddrEvent {
    pub bdaddr: [u8; 6],
}

impl<'a> FromBytes<'a> for BdaddrEvent {
    fn from_bytes(bytes: &mut ByteReader<'a>) -> Result<Self, Error> {
        Ok(Self {
            bdaddr: bytes.read_array()?,
        })
    }
}

/// `IO Capability Response`.
#[derive(Debug, Copy, Clone)]
pub struct IoCapabilityResponse {
    pub bdaddr: [u8; 6],
    pub capability: u8,
    pub oob_data: u8,
    pub authentication: u8,
}

impl<'a> FromBytes<'a> for IoCapabilityResponse {
    fn from_bytes(bytes: &mut ByteReader<'a>) -> Result<Self, Error> {
        Ok(Self {
            bdaddr: bytes.read_array()?,
            capability: bytes.read_u8()?,
            oob_data: bytes.read_u8()?,
            authentication: bytes.read_u8()?,
        })
    }
}

/// `User Confirmation Request`.
#[derive(Debug, Copy, Clone)]
pub struct UserConfirmRequest {
    pub bdaddr: [u8; 6],
    pub passkey: u32,
}

impl<'a> FromBytes<'a> for UserConfirmRequest {
    fn from_bytes(bytes: &mut ByteReader<'a>) -> Result<Self, Error> {
        Ok(Self {
            bdaddr: bytes.read_array()?,
            passkey: bytes.read_u32_le()?,
        })
    }
}

/// `Synchronous Connection Complete`.
#[derive(Debug, Copy, Clone)]
pub struct SyncConnComplete {
    pub status: u8,
    pub handle: u16,
    pub bdaddr: [u8; 6],
    pub link_type: u8,
    pub tx_interval: u8,
    pub retrans_window: u8,
    pub rx_pkt_len: u16,
    pub tx_pkt_len: u16,
    pub air_mode: u8,
}

impl<'a> FromBytes<'a> for SyncConnComplete {
    fn from_bytes(bytes: &mut ByteReader<'a>) -> Result<Self, Error> {
        Ok(Self {
            status: bytes.read_u8()?,
            handle: bytes.read_u16_le()?,
            bdaddr: bytes.read_array()?,
            link_type: bytes.read_u8()?,
            tx_interval: bytes.read_u8()?,
            retrans_window: bytes.read_u8()?,
            rx_pkt_len: bytes.read_u16_le()?,
            tx_pkt_len: bytes.read_u16_le()?,
            air_mode: bytes.read_u8()?,
        })
    }
}

/// `LE Connection Complete`.
#[derive(Debug, Copy, Clone)]
pub struct LeConnComplete {
    pub status: u8,
    pub handle: u16,
    pub role: u8,
    pub peer_addr_type: u8,
    pub peer_addr: [u8; 6],
    pub interval: u16,
    pub latency: u16,
    pub supv_timeout: u16,
    pub clock_accuracy: u8,
}

impl<'a> FromBytes<'a> for LeConnComplete {
    fn from_bytes(bytes: &mut ByteReader<'a>) -> Result<Self, Error> {
        Ok(Self {
            status: bytes.read_u8()?,
            handle: bytes.read_u16_le()?,
            role: bytes.read_u8()?,
            peer_addr_type: bytes.read_u8()?,
            peer_addr: bytes.read_array()?,
            interval: bytes.read_u16_le()?,
            latency: bytes.read_u16_le()?,
            supv_timeout: bytes.read_u16_le()?,
            clock_accuracy: bytes.read_u8()?,
        })
    }
}

/// `LE Enhanced Connection Complete`.
#[derive(Debug, Copy, Clone)]
pub struct LeEnhancedConnComplete {
    pub status: u8,
    pub handle: u16,
    pub role: u8,
    pub peer_addr_type: u8,
    pub peer_addr: [u8; 6],
    pub local_rpa: [u8; 6],
    pub peer_rpa: [u8; 6],
    pub interval: u16,
    pub latency: u16,
    pub supv_timeout: u16,
    pub clock_accuracy: u8,
}

impl<'a> FromBytes<'a> for LeEnhancedConnComplete {
    fn from_bytes(bytes: &mut ByteReader<'a>) -> Result<Self, Error> {
        Ok(Self {
            status: bytes.read_u8()?,
            handle: bytes.read_u16_le()?,
            role: bytes.read_u8()?,
            peer_addr_type: bytes.read_u8()?,
            peer_addr: bytes.read_array()?,
            local_rpa: bytes.read_array()?,
            peer_rpa: bytes.read_array()?,
            interval: bytes.read_u16_le()?,
            latency: bytes.read_u16_le()?,
            supv_timeout: bytes.read_u16_le()?,
            clock_accuracy: bytes.read_u8()?,
        })
    }
}

/// `LE Long Term Key Request`.
#[derive(Debug, Copy, Clone)]
pub struct LeLtkRequest {
    pub handle: u16,
    pub rand: u64,
    pub ediv: u16,
}

impl<'a> FromBytes<'a> for LeLtkRequest {
    fn from_bytes(bytes: &mut ByteReader<'a>) -> Result<Self, Error> {
        Ok(Self {
            handle: bytes.read_u16_le()?,
            rand: bytes.read_u64_le()?,
            ediv: bytes.read_u16_le()?,
        })
    }
}

/// `LE CIS Established`, decoded only as far as the host needs it.
#[derive(Debug, Copy, Clone)]
pub struct LeCisEstablished {
    pub status: u8,
    pub conn_handle: u16,
}

impl<'a> FromBytes<'a> for LeCisEstablished {
    fn from_bytes(bytes: &mut ByteReader<'a>) -> Result<Self, Error> {
        Ok(Self {
            status: bytes.read_u8()?,
            conn_handle: bytes.read_u16_le()?,
        })
    }
}

/// `LE CIS Request`.
#[derive(Debug, Copy, Clone)]
pub struct LeCisRequest {
    pub acl_handle: u16,
    pub cis_handle: u16,
    pub cig_id: u8,
    pub cis_id: u8,
}

impl<'a> FromBytes<'a> for LeCisRequest {
    fn from_bytes(bytes: &mut ByteReader<'a>) -> Result<Self, Error> {
        Ok(Self {
            acl_handle: bytes.read_u16_le()?,
            cis_handle: bytes.read_u16_le()?,
            cig_id: bytes.read_u8()?,
            cis_id: bytes.read_u8()?,
        })
    }
}

/// `LE Create BIG Complete`, carrying the established BIS handles.
#[derive(Debug, Clone)]
pub struct LeBigComplete {
    pub status: u8,
    pub handle: u8,
    pub bis_handles: Vec<u16>,
}

impl<'a> FromBytes<'a> for LeBigComplete {
    fn from_bytes(bytes: &mut ByteReader<'a>) -> Result<Self, Error> {
        let status = bytes.read_u8()?;
        let handle = bytes.read_u8()?;
        // sync_delay, latency (3 octets each), phy, nse, bn, pto, irc, max_pdu, interval.
        bytes.skip(3 + 3 + 1 + 1 + 1 + 1 + 1 + 2 + 2)?;
        let num_bis = bytes.read_u8()?;
        let mut bis_handles = Vec::with_capacity(num_bis.into());
        for _ in 0..num_bis {
            bis_handles.push(bytes.read_u16_le()?);
        }
        Ok(Self {
            status,
            handle,
            bis_handles,
        })
    }
}

/// `LE BIG Sync Established`, carrying the synchronized BIS handles.
#[derive(Debug, Clone)]
pub struct LeBigSyncEstablished {
    pub status: u8,
    pub handle: u8,
    pub bis_handles: Vec<u16>,
}

impl<'a> FromBytes<'a> for LeBigSyncEstablished {
    fn from_bytes(bytes: &mut ByteReader<'a>) -> Result<Self, Error> {
        let status = bytes.read_u8()?;
        let handle = bytes.read_u8()?;
        // latency (3 octets), nse, bn, pto, irc, max_pdu, interval.
        bytes.skip(3 + 1 + 1 + 1 + 1 + 2 + 2)?;
        let num_bis = bytes.read_u8()?;
        let mut bis_handles = Vec::with_capacity(num_bis.into());
        for _ in 0..num_bis {
            bis_handles.push(bytes.read_u16_le()?);
        }
        Ok(Self {
            status,
            handle,
            bis_handles,
        })
    }
}

/// One entry of an `LE Extended Advertising Report`.
#[derive(Debug, Copy, Clone)]
pub struct ExtAdvReport {
    pub event_type: u16,
    pub addr_type: u8,
    pub addr: [u8; 6],
    pub direct_addr_type: u8,
    pub direct_addr: [u8; 6],
}

impl<'a> FromBytes<'a> for ExtAdvReport {
    fn from_bytes(bytes: &mut ByteReader<'a>) -> Result<Self, Error> {
        let event_type = bytes.read_u16_le()?;
        let addr_type = bytes.read_u8()?;
        let addr = bytes.read_array()?;
        // primary_phy, secondary_phy, sid, tx_power, rssi, PA interval.
        bytes.skip(1 + 1 + 1 + 1 + 1 + 2)?;
        let direct_addr_type = bytes.read_u8()?;
        let direct_addr = bytes.read_array()?;
        let data_len = bytes.read_u8()?;
        bytes.skip(data_len.into())?;
        Ok(Self {
            event_type,
            addr_type,
            addr,
            direct_addr_type,
            direct_addr,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_le_meta_codes() {
        assert_eq!(EventCode::from(0x3e), EventCode::LeMetaEvent);
        assert_eq!(LeEventCode::from(0x05), LeEventCode::LtkRequest);
        assert_eq!(LeEventCode::from(0x42), LeEventCode::Unknown(0x42));
    }

    #[test]
    fn ltk_request_layout() {
        let mut raw = vec![0x2a, 0x00];
        raw.extend_from_slice(&0x0102030405060708u64.to_le_bytes());
        raw.extend_from_slice(&[0x34, 0x12]);
        let ev = LeLtkRequest::from_bytes(&mut ByteReader::new(&raw)).unwrap();
        assert_eq!(ev.handle, 0x002a);
        assert_eq!(ev.rand, 0x0102030405060708);
        assert_eq!(ev.ediv, 0x1234);
    }

    #[test]
    fn big_complete_reads_trailing_handles() {
        let mut raw = vec![0x00, 0x01];
        raw.extend_from_slice(&[0; 15]);
        raw.push(2);
        raw.extend_from_slice(&[0x10, 0x00, 0x11, 0x00]);
        let ev = LeBigComplete::from_bytes(&mut ByteReader::new(&raw)).unwrap();
        assert_eq!(ev.bis_handles, vec![0x0010, 0x0011]);
    }

    #[test]
    fn ext_adv_report_skips_data() {
        let mut raw = Vec::new();
        raw.extend_from_slice(&[0x13, 0x00]); // event type
        raw.push(0x01); // addr type
        raw.extend_from_slice(&[1, 2, 3, 4, 5, 6]);
        raw.extend_from_slice(&[0; 7]); // phys, sid, power, rssi, interval
        raw.push(0x00); // direct addr type
        raw.extend_from_slice(&[0; 6]);
        raw.push(3); // data_len
        raw.extend_from_slice(&[0xaa, 0xbb, 0xcc]);

        let mut bytes = ByteReader::new(&raw);
        let report = ExtAdvReport::from_bytes(&mut bytes).unwrap();
        assert_eq!(report.addr, [1, 2, 3, 4, 5, 6]);
        assert!(bytes.is_empty());
    }
}
