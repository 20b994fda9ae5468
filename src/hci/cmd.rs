//! Parameter blocks of the HCI commands this host originates.
//!
//! Each block implements [`ToBytes`] with the exact wire layout from [Vol 4] Part E, Section 7.
//! Commands whose parameter block is a single octet (eg. `Write Scan Enable`) are emitted
//! directly from their raw byte and have no struct here.
//!
//! [`ToBytes`]: ../../bytes/trait.ToBytes.html

use crate::bytes::*;
use crate::Error;

/// `Accept Connection Request`.
#[derive(Debug, Default)]
pub struct AcceptConnRequest {
    pub bdaddr: [u8; 6],
    pub role: u8,
}

impl ToBytes for AcceptConnRequest {
    fn to_bytes(&self, writer: &mut ByteWriter<'_>) -> Result<(), Error> {
        writer.write_slice(&self.bdaddr)?;
        writer.write_u8(self.role)
    }
}

/// `Create Connection`.
#[derive(Debug, Default)]
pub struct CreateConn {
    pub bdaddr: [u8; 6],
    pub pkt_type: u16,
    pub pscan_rep_mode: u8,
    pub pscan_mode: u8,
    pub clock_offset: u16,
    pub role_switch: u8,
}

impl ToBytes for CreateConn {
    fn to_bytes(&self, writer: &mut ByteWriter<'_>) -> Result<(), Error> {
        writer.write_slice(&self.bdaddr)?;
        writer.write_u16_le(self.pkt_type)?;
        writer.write_u8(self.pscan_rep_mode)?;
        writer.write_u8(self.pscan_mode)?;
        writer.write_u16_le(self.clock_offset)?;
        writer.write_u8(self.role_switch)
    }
}

/// `Disconnect`.
#[derive(Debug)]
pub struct Disconnect {
    pub handle: u16,
    pub reason: u8,
}

impl ToBytes for Disconnect {
    fn to_bytes(&self, writer: &mut ByteWriter<'_>) -> Result<(), Error> {
        writer.write_u16_le(self.handle)?;
        writer.write_u8(self.reason)
    }
}

/// `Authentication Requested`.
#[derive(Debug)]
pub struct AuthRequested {
    pub handle: u16,
}

impl ToBytes for AuthRequested {
    fn to_bytes(&self, writer: &mut ByteWriter<'_>) -> Result<(), Error> {
        writer.write_u16_le(self.handle)
    }
}

/// `Set Connection Encryption`.
#[derive(Debug)]
pub struct SetConnEncrypt {
    pub handle: u16,
    pub encr_mode: u8,
}

impl ToBytes for SetConnEncrypt {
    fn to_bytes(&self, writer: &mut ByteWriter<'_>) -> Result<(), Error> {
        writer.write_u16_le(self.handle)?;
        writer.write_u8(self.encr_mode)
    }
}

/// `PIN Code Request Reply`. The PIN is zero-padded to its fixed 16-octet field.
#[derive(Debug, Default)]
pub struct PinCodeRequestReply {
    pub bdaddr: [u8; 6],
    pub pin_len: u8,
    pub pin_code: [u8; 16],
}

impl ToBytes for PinCodeRequestReply {
    fn to_bytes(&self, writer: &mut ByteWriter<'_>) -> Result<(), Error> {
        writer.write_slice(&self.bdaddr)?;
        writer.write_u8(self.pin_len)?;
        writer.write_slice(&self.pin_code)
    }
}

/// `PIN Code Request Negative Reply`, also used for the link-key and user-confirmation
/// negative replies that carry only the peer address.
#[derive(Debug, Default)]
pub struct BdaddrOnly {
    pub bdaddr: [u8; 6],
}

impl ToBytes for BdaddrOnly {
    fn to_bytes(&self, writer: &mut ByteWriter<'_>) -> Result<(), Error> {
        writer.write_slice(&self.bdaddr)
    }
}

/// `IO Capability Request Reply`.
#[derive(Debug, Default)]
pub struct IoCapabilityRequestReply {
    pub bdaddr: [u8; 6],
    pub capability: u8,
    pub oob_data: u8,
    pub authentication: u8,
}

impl ToBytes for IoCapabilityRequestReply {
    fn to_bytes(&self, writer: &mut ByteWriter<'_>) -> Result<(), Error> {
        writer.write_slice(&self.bdaddr)?;
        writer.write_u8(self.capability)?;
        writer.write_u8(self.oob_data)?;
        writer.write_u8(self.authentication)
    }
}

/// `Write LE Host Supported`.
#[derive(Debug, Default)]
pub struct WriteLeHostSupported {
    pub supported: u8,
    pub simultaneous: u8,
}

impl ToBytes for WriteLeHostSupported {
    fn to_bytes(&self, writer: &mut ByteWriter<'_>) -> Result<(), Error> {
        writer.write_u8(self.supported)?;
        writer.write_u8(self.simultaneous)
    }
}

/// `LE Create Connection`.
#[derive(Debug, Default)]
pub struct LeCreateConn {
    pub scan_interval: u16,
    pub scan_window: u16,
    pub filter_policy: u8,
    pub peer_addr_type: u8,
    pub peer_addr: [u8; 6],
    pub own_addr_type: u8,
    pub min_interval: u16,
    pub max_interval: u16,
    pub latency: u16,
    pub supv_timeout: u16,
    pub min_length: u16,
    pub max_length: u16,
}

impl ToBytes for LeCreateConn {
    fn to_bytes(&self, writer: &mut ByteWriter<'_>) -> Result<(), Error> {
        writer.write_u16_le(self.scan_interval)?;
        writer.write_u16_le(self.scan_window)?;
        writer.write_u8(self.filter_policy)?;
        writer.write_u8(self.peer_addr_type)?;
        writer.write_slice(&self.peer_addr)?;
        writer.write_u8(self.own_addr_type)?;
        writer.write_u16_le(self.min_interval)?;
        writer.write_u16_le(self.max_interval)?;
        writer.write_u16_le(self.latency)?;
        writer.write_u16_le(self.supv_timeout)?;
        writer.write_u16_le(self.min_length)?;
        writer.write_u16_le(self.max_length)
    }
}

/// `LE Extended Create Connection` with a single initiating PHY entry.
#[derive(Debug, Default)]
pub struct LeExtCreateConn {
    pub filter_policy: u8,
    pub own_addr_type: u8,
    pub peer_addr_type: u8,
    pub peer_addr: [u8; 6],
    /// Bitmask of initiating PHYs; one parameter set follows per bit.
    pub phys: u8,
    pub scan_interval: u16,
    pub scan_window: u16,
    pub min_interval: u16,
    pub max_interval: u16,
    pub latency: u16,
    pub supv_timeout: u16,
    pub min_length: u16,
    pub max_length: u16,
}

impl ToBytes for LeExtCreateConn {
    fn to_bytes(&self, writer: &mut ByteWriter<'_>) -> Result<(), Error> {
        writer.write_u8(self.filter_policy)?;
        writer.write_u8(self.own_addr_type)?;
        writer.write_u8(self.peer_addr_type)?;
        writer.write_slice(&self.peer_addr)?;
        writer.write_u8(self.phys)?;
        writer.write_u16_le(self.scan_interval)?;
        writer.write_u16_le(self.scan_window)?;
        writer.write_u16_le(self.min_interval)?;
        writer.write_u16_le(self.max_interval)?;
        writer.write_u16_le(self.latency)?;
        writer.write_u16_le(self.supv_timeout)?;
        writer.write_u16_le(self.min_length)?;
        writer.write_u16_le(self.max_length)
    }
}

/// `LE Connection Update`.
#[derive(Debug, Default)]
pub struct LeConnUpdate {
    pub handle: u16,
    pub min_interval: u16,
    pub max_interval: u16,
    pub latency: u16,
    pub supv_timeout: u16,
    pub min_length: u16,
    pub max_length: u16,
}

impl ToBytes for LeConnUpdate {
    fn to_bytes(&self, writer: &mut ByteWriter<'_>) -> Result<(), Error> {
        writer.write_u16_le(self.handle)?;
        writer.write_u16_le(self.min_interval)?;
        writer.write_u16_le(self.max_interval)?;
        writer.write_u16_le(self.latency)?;
        writer.write_u16_le(self.supv_timeout)?;
        writer.write_u16_le(self.min_length)?;
        writer.write_u16_le(self.max_length)
    }
}

/// `LE Enable Encryption` (Start Encryption).
#[derive(Debug)]
pub struct LeStartEncrypt {
    pub handle: u16,
    pub rand: u64,
    pub ediv: u16,
    pub ltk: [u8; 16],
}

impl ToBytes for LeStartEncrypt {
    fn to_bytes(&self, writer: &mut ByteWriter<'_>) -> Result<(), Error> {
        writer.write_u16_le(self.handle)?;
        writer.write_u64_le(self.rand)?;
        writer.write_u16_le(self.ediv)?;
        writer.write_slice(&self.ltk)
    }
}

/// `LE Long Term Key Request Reply`.
#[derive(Debug)]
pub struct LeLtkReqReply {
    pub handle: u16,
    pub ltk: [u8; 16],
}

impl ToBytes for LeLtkReqReply {
    fn to_bytes(&self, writer: &mut ByteWriter<'_>) -> Result<(), Error> {
        writer.write_u16_le(self.handle)?;
        writer.write_slice(&self.ltk)
    }
}

/// `LE Long Term Key Request Negative Reply`.
#[derive(Debug)]
pub struct LeLtkReqNegReply {
    pub handle: u16,
}

impl ToBytes for LeLtkReqNegReply {
    fn to_bytes(&self, writer: &mut ByteWriter<'_>) -> Result<(), Error> {
        writer.write_u16_le(self.handle)
    }
}

/// `LE Set Advertising Data`. The data field is fixed at 31 octets on the wire.
#[derive(Debug)]
pub struct LeSetAdvData {
    pub len: u8,
    pub data: [u8; 31],
}

impl Default for LeSetAdvData {
    fn default() -> Self {
        LeSetAdvData {
            len: 0,
            data: [0; 31],
        }
    }
}

impl ToBytes for LeSetAdvData {
    fn to_bytes(&self, writer: &mut ByteWriter<'_>) -> Result<(), Error> {
        writer.write_u8(self.len)?;
        writer.write_slice(&self.data)
    }
}

/// `LE Set Advertising Parameters`.
#[derive(Debug, Default)]
pub struct LeSetAdvParameters {
    pub min_interval: u16,
    pub max_interval: u16,
    pub adv_type: u8,
    pub own_addr_type: u8,
    pub direct_addr_type: u8,
    pub direct_addr: [u8; 6],
    pub channel_map: u8,
    pub filter_policy: u8,
}

impl ToBytes for LeSetAdvParameters {
    fn to_bytes(&self, writer: &mut ByteWriter<'_>) -> Result<(), Error> {
        writer.write_u16_le(self.min_interval)?;
        writer.write_u16_le(self.max_interval)?;
        writer.write_u8(self.adv_type)?;
        writer.write_u8(self.own_addr_type)?;
        writer.write_u8(self.direct_addr_type)?;
        writer.write_slice(&self.direct_addr)?;
        writer.write_u8(self.channel_map)?;
        writer.write_u8(self.filter_policy)
    }
}

/// `LE Set Scan Parameters`.
#[derive(Debug, Default)]
pub struct LeSetScanParameters {
    pub scan_type: u8,
    pub interval: u16,
    pub window: u16,
    pub own_addr_type: u8,
    pub filter_policy: u8,
}

impl ToBytes for LeSetScanParameters {
    fn to_bytes(&self, writer: &mut ByteWriter<'_>) -> Result<(), Error> {
        writer.write_u8(self.scan_type)?;
        writer.write_u16_le(self.interval)?;
        writer.write_u16_le(self.window)?;
        writer.write_u8(self.own_addr_type)?;
        writer.write_u8(self.filter_policy)
    }
}

/// `LE Set Scan Enable`.
#[derive(Debug, Default)]
pub struct LeSetScanEnable {
    pub enable: u8,
    pub filter_dup: u8,
}

impl ToBytes for LeSetScanEnable {
    fn to_bytes(&self, writer: &mut ByteWriter<'_>) -> Result<(), Error> {
        writer.write_u8(self.enable)?;
        writer.write_u8(self.filter_dup)
    }
}

/// `LE Set Extended Advertising Parameters`.
#[derive(Debug, Default)]
pub struct LeSetExtAdvParams {
    pub handle: u8,
    pub evt_properties: u16,
    pub min_interval: u32,
    pub max_interval: u32,
    pub channel_map: u8,
    pub own_addr_type: u8,
    pub peer_addr_type: u8,
    pub peer_addr: [u8; 6],
    pub filter_policy: u8,
    pub tx_power: u8,
    pub primary_phy: u8,
    pub secondary_max_skip: u8,
    pub secondary_phy: u8,
    pub sid: u8,
    pub notif_enable: u8,
}

impl ToBytes for LeSetExtAdvParams {
    fn to_bytes(&self, writer: &mut ByteWriter<'_>) -> Result<(), Error> {
        writer.write_u8(self.handle)?;
        writer.write_u16_le(self.evt_properties)?;
        writer.write_u24_le(self.min_interval)?;
        writer.write_u24_le(self.max_interval)?;
        writer.write_u8(self.channel_map)?;
        writer.write_u8(self.own_addr_type)?;
        writer.write_u8(self.peer_addr_type)?;
        writer.write_slice(&self.peer_addr)?;
        writer.write_u8(self.filter_policy)?;
        writer.write_u8(self.tx_power)?;
        writer.write_u8(self.primary_phy)?;
        writer.write_u8(self.secondary_max_skip)?;
        writer.write_u8(self.secondary_phy)?;
        writer.write_u8(self.sid)?;
        writer.write_u8(self.notif_enable)
    }
}

/// `LE Set Extended Advertising Data`, always carrying the full 31-octet fragment.
#[derive(Debug)]
pub struct LeSetExtAdvData {
    pub handle: u8,
    pub operation: u8,
    pub fragment_preference: u8,
    pub data_len: u8,
    pub data: [u8; 31],
}

impl Default for LeSetExtAdvData {
    fn default() -> Self {
        LeSetExtAdvData {
            handle: 0,
            operation: 0,
            fragment_preference: 0,
            data_len: 0,
            data: [0; 31],
        }
    }
}

impl ToBytes for LeSetExtAdvData {
    fn to_bytes(&self, writer: &mut ByteWriter<'_>) -> Result<(), Error> {
        writer.write_u8(self.handle)?;
        writer.write_u8(self.operation)?;
        writer.write_u8(self.fragment_preference)?;
        writer.write_u8(self.data_len)?;
        writer.write_slice(&self.data)
    }
}

/// `LE Set Extended Advertising Enable` with a single advertising set.
#[derive(Debug, Default)]
pub struct LeSetExtAdvEnable {
    pub enable: u8,
    pub num_of_sets: u8,
    pub set_handle: u8,
    pub duration: u16,
    pub max_events: u8,
}

impl ToBytes for LeSetExtAdvEnable {
    fn to_bytes(&self, writer: &mut ByteWriter<'_>) -> Result<(), Error> {
        writer.write_u8(self.enable)?;
        writer.write_u8(self.num_of_sets)?;
        writer.write_u8(self.set_handle)?;
        writer.write_u16_le(self.duration)?;
        writer.write_u8(self.max_events)
    }
}

/// `LE Set Periodic Advertising Parameters`.
#[derive(Debug, Default)]
pub struct LeSetPaParams {
    pub handle: u8,
    pub min_interval: u16,
    pub max_interval: u16,
    pub properties: u16,
}

impl ToBytes for LeSetPaParams {
    fn to_bytes(&self, writer: &mut ByteWriter<'_>) -> Result<(), Error> {
        writer.write_u8(self.handle)?;
        writer.write_u16_le(self.min_interval)?;
        writer.write_u16_le(self.max_interval)?;
        writer.write_u16_le(self.properties)
    }
}

/// `LE Set Periodic Advertising Data`, variable-length fragment.
#[derive(Debug, Default)]
pub struct LeSetPaData {
    pub handle: u8,
    pub operation: u8,
    pub data: Vec<u8>,
}

impl ToBytes for LeSetPaData {
    fn to_bytes(&self, writer: &mut ByteWriter<'_>) -> Result<(), Error> {
        writer.write_u8(self.handle)?;
        writer.write_u8(self.operation)?;
        writer.write_u8(self.data.len() as u8)?;
        writer.write_slice(&self.data)
    }
}

/// `LE Set Periodic Advertising Enable`.
#[derive(Debug, Default)]
pub struct LeSetPaEnable {
    pub enable: u8,
    pub handle: u8,
}

impl ToBytes for LeSetPaEnable {
    fn to_bytes(&self, writer: &mut ByteWriter<'_>) -> Result<(), Error> {
        writer.write_u8(self.enable)?;
        writer.write_u8(self.handle)
    }
}

/// `LE Create BIG` with one BIG parameter block.
#[derive(Debug)]
pub struct LeCreateBig {
    pub handle: u8,
    pub adv_handle: u8,
    pub num_bis: u8,
    pub sdu_interval: u32,
    pub sdu: u16,
    pub latency: u16,
    pub rtn: u8,
    pub phy: u8,
    pub packing: u8,
    pub framing: u8,
    pub encryption: u8,
    pub bcode: [u8; 16],
}

impl ToBytes for LeCreateBig {
    fn to_bytes(&self, writer: &mut ByteWriter<'_>) -> Result<(), Error> {
        writer.write_u8(self.handle)?;
        writer.write_u8(self.adv_handle)?;
        writer.write_u8(self.num_bis)?;
        writer.write_u24_le(self.sdu_interval)?;
        writer.write_u16_le(self.sdu)?;
        writer.write_u16_le(self.latency)?;
        writer.write_u8(self.rtn)?;
        writer.write_u8(self.phy)?;
        writer.write_u8(self.packing)?;
        writer.write_u8(self.framing)?;
        writer.write_u8(self.encryption)?;
        writer.write_slice(&self.bcode)
    }
}

/// Per-CIS entry of `LE Set CIG Parameters`.
#[derive(Debug, Default)]
pub struct CigCis {
    pub cis_id: u8,
    pub c_sdu: u16,
    pub p_sdu: u16,
    pub c_phy: u8,
    pub p_phy: u8,
    pub c_rtn: u8,
    pub p_rtn: u8,
}

impl ToBytes for CigCis {
    fn to_bytes(&self, writer: &mut ByteWriter<'_>) -> Result<(), Error> {
        writer.write_u8(self.cis_id)?;
        writer.write_u16_le(self.c_sdu)?;
        writer.write_u16_le(self.p_sdu)?;
        writer.write_u8(self.c_phy)?;
        writer.write_u8(self.p_phy)?;
        writer.write_u8(self.c_rtn)?;
        writer.write_u8(self.p_rtn)
    }
}

/// `LE Set CIG Parameters` with its trailing CIS array.
#[derive(Debug, Default)]
pub struct LeSetCigParams {
    pub cig_id: u8,
    pub c_interval: u32,
    pub p_interval: u32,
    pub sca: u8,
    pub packing: u8,
    pub framing: u8,
    pub c_latency: u16,
    pub p_latency: u16,
    pub cis: Vec<CigCis>,
}

impl ToBytes for LeSetCigParams {
    fn to_bytes(&self, writer: &mut ByteWriter<'_>) -> Result<(), Error> {
        writer.write_u8(self.cig_id)?;
        writer.write_u24_le(self.c_interval)?;
        writer.write_u24_le(self.p_interval)?;
        writer.write_u8(self.sca)?;
        writer.write_u8(self.packing)?;
        writer.write_u8(self.framing)?;
        writer.write_u16_le(self.c_latency)?;
        writer.write_u16_le(self.p_latency)?;
        writer.write_u8(self.cis.len() as u8)?;
        self.cis.to_bytes(writer)
    }
}

/// Per-CIS entry of `LE Create CIS`.
#[derive(Debug)]
pub struct CisHandlePair {
    pub cis_handle: u16,
    pub acl_handle: u16,
}

impl ToBytes for CisHandlePair {
    fn to_bytes(&self, writer: &mut ByteWriter<'_>) -> Result<(), Error> {
        writer.write_u16_le(self.cis_handle)?;
        writer.write_u16_le(self.acl_handle)
    }
}

/// `LE Create CIS` with its trailing handle array.
#[derive(Debug)]
pub struct LeCreateCis {
    pub cis: Vec<CisHandlePair>,
}

impl ToBytes for LeCreateCis {
    fn to_bytes(&self, writer: &mut ByteWriter<'_>) -> Result<(), Error> {
        writer.write_u8(self.cis.len() as u8)?;
        self.cis.to_bytes(writer)
    }
}

/// `LE Accept CIS Request`.
#[derive(Debug)]
pub struct LeAcceptCis {
    pub handle: u16,
}

impl ToBytes for LeAcceptCis {
    fn to_bytes(&self, writer: &mut ByteWriter<'_>) -> Result<(), Error> {
        writer.write_u16_le(self.handle)
    }
}

/// `LE Reject CIS Request`.
#[derive(Debug)]
pub struct LeRejectCis {
    pub handle: u16,
    pub reason: u8,
}

impl ToBytes for LeRejectCis {
    fn to_bytes(&self, writer: &mut ByteWriter<'_>) -> Result<(), Error> {
        writer.write_u16_le(self.handle)?;
        writer.write_u8(self.reason)
    }
}

/// Per-direction isochronous QoS parameters, used to fill in `LE Set CIG Parameters`.
#[derive(Debug, Default, Copy, Clone)]
pub struct IsoDirQos {
    /// SDU interval in microseconds; 0 means "mirror the other direction".
    pub interval: u32,
    pub latency: u16,
    pub sdu: u16,
    pub phy: u8,
    pub rtn: u8,
}

/// Unicast isochronous QoS for both directions of a CIS.
#[derive(Debug, Default, Copy, Clone)]
pub struct IsoQos {
    /// Central-to-peripheral direction.
    pub input: IsoDirQos,
    /// Peripheral-to-central direction.
    pub output: IsoDirQos,
}
