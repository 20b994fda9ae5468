//! L2CAP frame processing and the signaling state machines.
//!
//! Inbound L2CAP frames arrive here after ACL reassembly. Credit-based channels get their
//! flow-control credit returned and their SDUs reassembled before delivery; the two signaling
//! channels are dispatched to the BR/EDR and LE handlers; the Security Manager channels go to
//! the external [`SecurityManager`].
//!
//! Any malformed signaling PDU is answered with `Command Reject`. Responses complete pending
//! requests by ident.
//!
//! [`SecurityManager`]: ../security/trait.SecurityManager.html

use byteorder::{ByteOrder, LittleEndian};

use crate::bytes::{encode_to_vec, ByteReader, FromBytes, ToBytes};
use crate::hci::{cmd, opcode};
use crate::l2cap::signaling::*;
use crate::l2cap::{
    ChannelMode, Cid, FixedChannels, Header, FEAT_FIXED_CHAN, INFO_TYPE_FEAT_MASK,
    INFO_TYPE_FIXED_CHAN, PSM_RFCOMM,
};
use crate::Host;

use super::{L2Conn, RecvBuf};

/// Default MTU/MPS for accepted LE credit-based channels when the server did not specify them.
const LE_DEFAULT_MTU: u16 = 23;
/// Default initial credit grant for accepted LE credit-based channels.
const LE_DEFAULT_CREDITS: u16 = 1;
/// At most this many channels are accepted out of one enhanced connection request.
const ECRED_MAX_CHANNELS: usize = 5;

impl Host {
    pub(crate) fn process_l2cap(&mut self, idx: usize, frame: &[u8]) {
        if frame.len() < Header::SIZE {
            debug!("L2CAP frame shorter than its header");
            return;
        }
        let l2_len = LittleEndian::read_u16(&frame[0..2]);
        let cid = LittleEndian::read_u16(&frame[2..4]);
        if frame.len() != Header::SIZE + usize::from(l2_len) {
            debug!(
                "L2CAP invalid length: {} != {}",
                frame.len(),
                Header::SIZE + usize::from(l2_len)
            );
            return;
        }

        debug!("L2CAP data: {} bytes", l2_len);

        let payload = &frame[Header::SIZE..];

        // Credit-based channels return one credit per PDU and reassemble SDUs before anything
        // else sees the data.
        let is_credit = self.conns[idx]
            .l2conn_by_scid(cid)
            .map_or(false, |l2conn| l2conn.mode.is_credit_based());
        let sdu;
        let payload = if is_credit {
            match self.process_l2cap_credit(idx, cid, payload) {
                Some(complete) => {
                    sdu = complete;
                    &sdu[..]
                }
                None => return,
            }
        } else {
            payload
        };

        if let Some(hook) = self.cid_hook_fn(idx, cid) {
            hook(self, payload);
            return;
        }

        let handle = self.conns[idx].handle;
        match Cid::new(cid) {
            Cid::SIGNALING => self.l2cap_sig(idx, payload),
            Cid::LE_SIGNALING => self.l2cap_le_sig(idx, payload),
            Cid::LE_SECURITY_MANAGER => {
                self.with_smp(|smp, host| smp.deliver(host, handle, payload));
            }
            Cid::BREDR_SECURITY_MANAGER => {
                self.with_smp(|smp, host| smp.deliver_bredr(host, handle, payload));
            }
            _ => {
                let psm = self.conns[idx]
                    .l2conn_by_scid(cid)
                    .map(|l2conn| l2conn.psm);
                if psm == Some(PSM_RFCOMM) {
                    self.process_rfcomm(idx, cid, payload);
                } else {
                    debug!("Packet for unknown CID {:?} ({})", crate::utils::Hex(cid), cid);
                }
            }
        }
    }

    /// Returns the fully reassembled SDU, or `None` while one is still in progress (or when the
    /// PDU had to be dropped).
    fn process_l2cap_credit(&mut self, idx: usize, scid: u16, mut payload: &[u8]) -> Option<Vec<u8>> {
        let handle = self.conns[idx].handle;

        let creds = FlowCtlCredits {
            cid: scid,
            credits: 1,
        };
        self.send_sig_obj(handle, SigCode::FlowCtlCredits, 0, &creds);

        let l2conn = self.conns[idx].l2conn_by_scid(scid)?;

        if l2conn.recv.is_none() {
            if payload.len() < 2 {
                debug!("L2CAP invalid SDU");
                return None;
            }
            let sdu_len = LittleEndian::read_u16(&payload[0..2]);
            l2conn.recv = Some(RecvBuf::new(sdu_len.into()));
            payload = &payload[2..];
        }

        let buf = l2conn.recv.as_mut().unwrap();
        if !buf.append(payload) {
            warn!("Unexpected L2CAP SDU data: sCID 0x{:04x}", scid);
            l2conn.recv = None;
            return None;
        }

        debug!(
            "L2CAP SDU data: {}/{} bytes",
            buf.data.len(),
            buf.expected
        );

        if buf.is_complete() {
            Some(l2conn.recv.take().unwrap().data)
        } else {
            None
        }
    }

    pub(crate) fn send_sig_obj<T: ToBytes>(
        &mut self,
        handle: u16,
        code: SigCode,
        ident: u8,
        pdu: &T,
    ) -> u8 {
        match encode_to_vec(pdu, 64) {
            Ok(buf) => self.l2cap_sig_send(handle, code, ident, &buf),
            Err(e) => {
                error!("failed to encode signaling PDU: {}", e);
                0
            }
        }
    }

    fn sig_reject(&mut self, idx: usize) {
        let handle = self.conns[idx].handle;
        self.send_sig_obj(handle, SigCode::CommandReject, 0, &CmdReject::default());
    }

    // ---- BR/EDR signaling (CID 0x0001) ----

    pub(crate) fn l2cap_sig(&mut self, idx: usize, data: &[u8]) {
        let mut bytes = ByteReader::new(data);
        let hdr = match SigHeader::from_bytes(&mut bytes) {
            Ok(hdr) => hdr,
            Err(_) => return self.sig_reject(idx),
        };
        if bytes.bytes_left() != usize::from(hdr.length) {
            return self.sig_reject(idx);
        }
        let payload = bytes.into_rest();

        let ok = match hdr.code {
            SigCode::CommandReject => self.l2cap_cmd_rej(payload),
            SigCode::ConnReq => self.l2cap_conn_req(idx, hdr.ident, payload),
            SigCode::ConnRsp => self.l2cap_conn_rsp(idx, payload),
            SigCode::ConfigReq => self.l2cap_config_req(idx, hdr.ident, payload),
            SigCode::ConfigRsp => self.l2cap_config_rsp(idx, payload),
            SigCode::DisconnReq => self.l2cap_disconn_req(idx, hdr.ident, payload),
            SigCode::InfoReq => self.l2cap_info_req(idx, hdr.ident, payload),
            SigCode::InfoRsp => self.l2cap_info_rsp(idx, payload),
            other => {
                debug!("Unknown L2CAP code 0x{:02x}", u8::from(other));
                false
            }
        };

        if bredr_rsp_code(hdr.code) {
            self.handle_pending_l2reqs(hdr.ident, hdr.code, payload);
        }

        if !ok {
            self.sig_reject(idx);
        }
    }

    fn l2cap_cmd_rej(&mut self, payload: &[u8]) -> bool {
        match CmdReject::from_bytes(&mut ByteReader::new(payload)) {
            Ok(rej) => {
                debug!("peer rejected command: reason 0x{:04x}", rej.reason);
                true
            }
            Err(_) => false,
        }
    }

    fn l2cap_conn_req(&mut self, idx: usize, ident: u8, payload: &[u8]) -> bool {
        let req = match ConnReq::from_bytes(&mut ByteReader::new(payload)) {
            Ok(req) => req,
            Err(_) => return false,
        };

        let mut rsp = ConnRsp {
            scid: req.scid,
            ..ConnRsp::default()
        };
        let connect_cb = match self.l2cap_server_for_psm(req.psm) {
            Some(server) => {
                rsp.dcid = req.scid;
                server.connect.clone()
            }
            None => {
                rsp.result = RESULT_PSM_NOT_SUPPORTED;
                None
            }
        };

        let handle = self.conns[idx].handle;
        self.send_sig_obj(handle, SigCode::ConnRsp, ident, &rsp);

        if rsp.result == 0 {
            self.conns[idx]
                .l2conns
                .push(L2Conn::new(rsp.dcid, rsp.scid, req.psm));

            let conf = ConfigReq {
                dcid: rsp.scid,
                flags: 0,
            };
            self.send_sig_obj(handle, SigCode::ConfigReq, 0, &conf);

            if let Some(cb) = connect_cb {
                cb(self, handle, rsp.scid);
            }
        }

        true
    }

    fn l2cap_conn_rsp(&mut self, idx: usize, payload: &[u8]) -> bool {
        let rsp = match ConnRsp::from_bytes(&mut ByteReader::new(payload)) {
            Ok(rsp) => rsp,
            Err(_) => return false,
        };

        match self.conns[idx].l2conn_by_scid(rsp.scid) {
            Some(l2conn) => l2conn.dcid = rsp.dcid,
            None => return false,
        }

        if rsp.result != 0 {
            return true;
        }

        let handle = self.conns[idx].handle;
        let req = ConfigReq {
            dcid: rsp.dcid,
            flags: 0,
        };
        self.send_sig_obj(handle, SigCode::ConfigReq, 0, &req);

        true
    }

    fn l2cap_config_req(&mut self, idx: usize, ident: u8, payload: &[u8]) -> bool {
        let req = match ConfigReq::from_bytes(&mut ByteReader::new(payload)) {
            Ok(req) => req,
            Err(_) => return false,
        };

        let peer_cid = match self.conns[idx].l2conn_by_scid(req.dcid) {
            Some(l2conn) => l2conn.dcid,
            None => return false,
        };

        let handle = self.conns[idx].handle;
        let rsp = ConfigRsp {
            scid: peer_cid,
            flags: req.flags,
            result: 0,
        };
        self.send_sig_obj(handle, SigCode::ConfigRsp, ident, &rsp);

        true
    }

    fn l2cap_config_rsp(&mut self, idx: usize, payload: &[u8]) -> bool {
        let rsp = match ConfigRsp::from_bytes(&mut ByteReader::new(payload)) {
            Ok(rsp) => rsp,
            Err(_) => return false,
        };

        let psm = match self.conns[idx].l2conn_by_scid(rsp.scid) {
            Some(l2conn) => l2conn.psm,
            None => return false,
        };

        // The carrier channel for a pending RFCOMM connect is up; open the multiplexer.
        if psm == PSM_RFCOMM && rsp.result == 0 && self.rfcomm_conn.is_some() {
            self.rfcomm_open_mux(idx, rsp.scid);
        }

        true
    }

    fn l2cap_disconn_req(&mut self, idx: usize, ident: u8, payload: &[u8]) -> bool {
        let req = match DisconnReq::from_bytes(&mut ByteReader::new(payload)) {
            Ok(req) => req,
            Err(_) => return false,
        };

        let handle = self.conns[idx].handle;
        let rsp = DisconnRsp {
            dcid: req.dcid,
            scid: req.scid,
        };
        self.send_sig_obj(handle, SigCode::DisconnRsp, ident, &rsp);

        let psm = match self.conns[idx].l2conn_by_scid(req.scid) {
            Some(l2conn) => l2conn.psm,
            None => return true,
        };

        let disconnect_cb = self
            .l2cap_server_for_psm(psm)
            .and_then(|server| server.disconnect.clone());
        if let Some(cb) = disconnect_cb {
            cb(self);
        }

        true
    }

    fn l2cap_info_req(&mut self, idx: usize, ident: u8, payload: &[u8]) -> bool {
        let req = match InfoReq::from_bytes(&mut ByteReader::new(payload)) {
            Ok(req) => req,
            Err(_) => return false,
        };

        let handle = self.conns[idx].handle;

        match req.info_type {
            INFO_TYPE_FEAT_MASK => {
                let mut data = [0; 4];
                LittleEndian::write_u32(&mut data, FEAT_FIXED_CHAN);
                let rsp = InfoRsp {
                    info_type: req.info_type,
                    result: 0,
                    data: &data,
                };
                self.send_sig_obj(handle, SigCode::InfoRsp, ident, &rsp);
            }
            INFO_TYPE_FIXED_CHAN => {
                let mut mask = FixedChannels::SIG_BREDR;
                if self.sc && self.le {
                    mask |= FixedChannels::SMP_BREDR;
                }
                let mut data = [0; 8];
                LittleEndian::write_u64(&mut data, mask.bits());
                let rsp = InfoRsp {
                    info_type: req.info_type,
                    result: 0,
                    data: &data,
                };
                self.send_sig_obj(handle, SigCode::InfoRsp, ident, &rsp);
            }
            _ => {
                let rsp = InfoRsp {
                    info_type: req.info_type,
                    result: RESULT_INFO_NOT_SUPPORTED,
                    data: &[],
                };
                self.send_sig_obj(handle, SigCode::InfoRsp, ident, &rsp);
            }
        }

        true
    }

    fn l2cap_info_rsp(&mut self, idx: usize, payload: &[u8]) -> bool {
        let rsp = match InfoRsp::from_bytes(&mut ByteReader::new(payload)) {
            Ok(rsp) => rsp,
            Err(_) => return false,
        };

        if rsp.result != 0 {
            return true;
        }

        if rsp.info_type == INFO_TYPE_FIXED_CHAN {
            if rsp.data.len() < 8 {
                return false;
            }
            let conn = &mut self.conns[idx];
            conn.fixed_chan = LittleEndian::read_u64(&rsp.data[..8]);

            let handle = conn.handle;
            let mode = conn.encr_mode;
            if mode != 0 {
                self.with_smp(move |smp, host| smp.encrypted(host, handle, mode));
            }
        }

        true
    }

    // ---- LE signaling (CID 0x0005) ----

    pub(crate) fn l2cap_le_sig(&mut self, idx: usize, data: &[u8]) {
        let mut bytes = ByteReader::new(data);
        let hdr = match SigHeader::from_bytes(&mut bytes) {
            Ok(hdr) => hdr,
            Err(_) => return self.sig_reject(idx),
        };
        if bytes.bytes_left() != usize::from(hdr.length) {
            return self.sig_reject(idx);
        }
        let payload = bytes.into_rest();

        let ok = match hdr.code {
            SigCode::CommandReject => self.l2cap_cmd_rej(payload),
            SigCode::DisconnReq => self.l2cap_disconn_req(idx, hdr.ident, payload),
            SigCode::ConnParamReq => self.l2cap_conn_param_req(idx, hdr.ident, payload),
            SigCode::ConnParamRsp => ConnParamRsp::from_bytes(&mut ByteReader::new(payload)).is_ok(),
            SigCode::LeConnReq => self.l2cap_le_conn_req(idx, hdr.ident, payload),
            SigCode::LeConnRsp => self.l2cap_le_conn_rsp(idx, payload),
            SigCode::EcredConnReq => self.l2cap_ecred_conn_req(idx, hdr.ident, payload),
            SigCode::EcredConnRsp => self.l2cap_ecred_conn_rsp(idx, payload),
            other => {
                debug!("Unknown L2CAP code 0x{:02x}", u8::from(other));
                false
            }
        };

        if le_rsp_code(hdr.code) {
            self.handle_pending_l2reqs(hdr.ident, hdr.code, payload);
        }

        if !ok {
            self.sig_reject(idx);
        }
    }

    fn l2cap_conn_param_req(&mut self, idx: usize, ident: u8, payload: &[u8]) -> bool {
        let req = match ConnParamReq::from_bytes(&mut ByteReader::new(payload)) {
            Ok(req) => req,
            Err(_) => return false,
        };

        let handle = self.conns[idx].handle;

        let hci_cmd = cmd::LeConnUpdate {
            handle,
            min_interval: req.min_interval,
            max_interval: req.max_interval,
            latency: req.latency,
            supv_timeout: req.timeout,
            min_length: 0x0001,
            max_length: 0x0001,
        };
        self.send_command_obj(opcode::LE_CONN_UPDATE, &hci_cmd);

        self.send_sig_obj(handle, SigCode::ConnParamRsp, ident, &ConnParamRsp::default());

        true
    }

    fn l2cap_le_conn_req(&mut self, idx: usize, ident: u8, payload: &[u8]) -> bool {
        let req = match LeConnReq::from_bytes(&mut ByteReader::new(payload)) {
            Ok(req) => req,
            Err(_) => return false,
        };

        let mut rsp = LeConnRsp::default();
        let server = self
            .l2cap_server_for_psm(req.psm)
            .map(|server| (server.mtu, server.mps, server.credits, server.connect.clone()));
        let connect_cb = match server {
            Some((mtu, mps, credits, cb)) => {
                let or_default = |value, fallback| if value != 0 { value } else { fallback };
                rsp.mtu = or_default(mtu, LE_DEFAULT_MTU);
                rsp.mps = or_default(mps, LE_DEFAULT_MTU);
                rsp.credits = or_default(credits, LE_DEFAULT_CREDITS);
                rsp.dcid = self.conns[idx].alloc_cid();
                cb
            }
            None => {
                rsp.result = RESULT_PSM_NOT_SUPPORTED;
                None
            }
        };

        let handle = self.conns[idx].handle;
        self.send_sig_obj(handle, SigCode::LeConnRsp, ident, &rsp);

        if rsp.result == 0 {
            let mut l2conn = L2Conn::new(rsp.dcid, req.scid, req.psm);
            l2conn.mode = ChannelMode::LeCredits;
            self.conns[idx].l2conns.push(l2conn);

            if let Some(cb) = connect_cb {
                cb(self, handle, req.scid);
            }
        }

        true
    }

    fn l2cap_le_conn_rsp(&mut self, idx: usize, payload: &[u8]) -> bool {
        let rsp = match LeConnRsp::from_bytes(&mut ByteReader::new(payload)) {
            Ok(rsp) => rsp,
            Err(_) => return false,
        };

        if rsp.result != 0 {
            return true;
        }

        let conn = &mut self.conns[idx];
        match conn
            .l2conns
            .iter_mut()
            .find(|l2conn| l2conn.mode == ChannelMode::LeCredits && l2conn.dcid == 0)
        {
            Some(l2conn) => l2conn.dcid = rsp.dcid,
            None => {
                // No matching request was recorded; keep the channel usable anyway.
                let mut l2conn = L2Conn::new(0, rsp.dcid, 0);
                l2conn.mode = ChannelMode::LeCredits;
                conn.l2conns.push(l2conn);
            }
        }

        true
    }

    fn l2cap_ecred_conn_req(&mut self, idx: usize, ident: u8, payload: &[u8]) -> bool {
        let req = match EcredConnReq::from_bytes(&mut ByteReader::new(payload)) {
            Ok(req) => req,
            Err(_) => return false,
        };

        let mut rsp = EcredConnRsp {
            mtu: 64,
            mps: 64,
            credits: 1,
            ..EcredConnRsp::default()
        };

        if self.l2cap_server_for_psm(req.psm).is_none() {
            rsp.result = RESULT_PSM_NOT_SUPPORTED;
        } else {
            for _ in req.scids.iter().take(ECRED_MAX_CHANNELS) {
                rsp.dcids.push(self.conns[idx].alloc_cid());
            }
        }

        let handle = self.conns[idx].handle;
        self.send_sig_obj(handle, SigCode::EcredConnRsp, ident, &rsp);

        if rsp.result == 0 {
            for (peer_scid, dcid) in req.scids.iter().zip(&rsp.dcids) {
                let mut l2conn = L2Conn::new(*dcid, *peer_scid, req.psm);
                l2conn.mode = ChannelMode::EnhancedCredits;
                self.conns[idx].l2conns.push(l2conn);
            }
        }

        true
    }

    fn l2cap_ecred_conn_rsp(&mut self, idx: usize, payload: &[u8]) -> bool {
        let rsp = match EcredConnRsp::from_bytes(&mut ByteReader::new(payload)) {
            Ok(rsp) => rsp,
            Err(_) => return false,
        };

        if rsp.result != 0 {
            return true;
        }

        let conn = &mut self.conns[idx];
        let mut dcids = rsp.dcids.iter();
        for l2conn in conn
            .l2conns
            .iter_mut()
            .filter(|l2conn| l2conn.mode == ChannelMode::EnhancedCredits && l2conn.dcid == 0)
        {
            match dcids.next() {
                Some(&dcid) => l2conn.dcid = dcid,
                None => break,
            }
        }
        for &dcid in dcids {
            // More CIDs than recorded requests; keep the channels usable anyway.
            let mut l2conn = L2Conn::new(0, dcid, 0);
            l2conn.mode = ChannelMode::EnhancedCredits;
            conn.l2conns.push(l2conn);
        }

        true
    }
}

fn bredr_rsp_code(code: SigCode) -> bool {
    match code {
        SigCode::CommandReject
        | SigCode::ConnRsp
        | SigCode::ConfigRsp
        | SigCode::InfoRsp => true,
        _ => false,
    }
}

fn le_rsp_code(code: SigCode) -> bool {
    match code {
        SigCode::CommandReject
        | SigCode::ConnParamRsp
        | SigCode::LeConnRsp
        | SigCode::EcredConnRsp => true,
        _ => false,
    }
}
