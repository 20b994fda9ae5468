//! HCI event dispatch.
//!
//! The decoder reacts to every event the counterpart may raise: it refreshes the command
//! credits, maintains the connection table, answers pairing dialogues and LTK requests, and
//! caches extended advertising reports. Unknown events and malformed parameter blocks are
//! logged and dropped; they never wedge the host.

use crate::bytes::{ByteReader, FromBytes};
use crate::hci::event::*;
use crate::hci::{self, cmd, opcode};
use crate::l2cap::signaling::SigCode;
use crate::l2cap::INFO_TYPE_FIXED_CHAN;
use crate::{Addr, AddrKind, Host};

use super::Conn;

impl Host {
    pub(crate) fn process_evt(&mut self, data: &[u8]) {
        let mut bytes = ByteReader::new(data);
        let hdr = match EventHeader::from_bytes(&mut bytes) {
            Ok(hdr) => hdr,
            Err(_) => return,
        };
        if bytes.bytes_left() != usize::from(hdr.plen) {
            return;
        }
        let param = bytes.into_rest();

        debug!("event {:?}", hdr.code);

        match hdr.code {
            EventCode::CmdComplete => self.evt_cmd_complete(param),
            EventCode::CmdStatus => self.evt_cmd_status(param),
            EventCode::ConnRequest => self.evt_conn_request(param),
            EventCode::ConnComplete => self.evt_conn_complete(param),
            EventCode::DisconnectComplete => self.evt_disconn_complete(param),
            EventCode::SyncConnComplete => self.evt_sync_conn_complete(param),
            EventCode::NumCompletedPackets => {
                // Flow control towards the controller is not modeled.
            }
            EventCode::AuthComplete => self.evt_auth_complete(param),
            EventCode::PinCodeRequest => self.evt_pin_code_request(param),
            EventCode::LinkKeyRequest => self.evt_link_key_request(param),
            EventCode::LinkKeyNotify => {
                debug!("link key notification ignored");
            }
            EventCode::EncryptChange => self.evt_encrypt_change(param),
            EventCode::IoCapabilityRequest => self.evt_io_cap_request(param),
            EventCode::IoCapabilityResponse => self.evt_io_cap_response(param),
            EventCode::UserConfirmRequest => self.evt_user_confirm_request(param),
            EventCode::SimplePairingComplete => {
                debug!("simple pairing complete");
            }
            EventCode::LeMetaEvent => self.evt_le_meta_event(param),
            EventCode::Unknown(code) => debug!("Unsupported event 0x{:02x}", code),
        }
    }

    fn evt_cmd_complete(&mut self, param: &[u8]) {
        let mut bytes = ByteReader::new(param);
        let ev = match CmdComplete::from_bytes(&mut bytes) {
            Ok(ev) => ev,
            Err(_) => return,
        };
        let rparams = bytes.into_rest();

        self.set_ncmd(ev.ncmd);

        match ev.opcode {
            opcode::READ_LOCAL_FEATURES => {
                if let Ok(rsp) = ReadLocalFeaturesComplete::from_bytes(&mut ByteReader::new(rparams))
                {
                    if rsp.status == 0 {
                        self.read_local_features_complete(rsp.features);
                    }
                }
            }
            opcode::READ_BD_ADDR => {
                if let Ok(rsp) = ReadBdAddrComplete::from_bytes(&mut ByteReader::new(rparams)) {
                    if rsp.status == 0 {
                        self.read_bd_addr_complete(rsp.bdaddr);
                    }
                }
            }
            opcode::RESET
            | opcode::WRITE_SCAN_ENABLE
            | opcode::WRITE_SIMPLE_PAIRING_MODE
            | opcode::WRITE_LE_HOST_SUPPORTED
            | opcode::WRITE_SECURE_CONN_SUPPORT
            | opcode::PIN_CODE_REQUEST_REPLY
            | opcode::PIN_CODE_REQUEST_NEG_REPLY
            | opcode::LINK_KEY_REQUEST_NEG_REPLY
            | opcode::IO_CAPABILITY_REQUEST_REPLY
            | opcode::USER_CONFIRM_REQUEST_REPLY
            | opcode::USER_CONFIRM_REQUEST_NEG_REPLY
            | opcode::LE_LTK_REQ_REPLY
            | opcode::LE_LTK_REQ_NEG_REPLY
            | opcode::LE_SET_ADV_PARAMETERS
            | opcode::LE_SET_ADV_DATA
            | opcode::LE_SET_ADV_ENABLE
            | opcode::LE_SET_SCAN_PARAMETERS
            | opcode::LE_SET_SCAN_ENABLE
            | opcode::LE_SET_EXT_ADV_PARAMS
            | opcode::LE_SET_EXT_ADV_DATA
            | opcode::LE_SET_EXT_ADV_ENABLE
            | opcode::LE_SET_PA_PARAMS
            | opcode::LE_SET_PA_DATA
            | opcode::LE_SET_PA_ENABLE => {}
            other => debug!("Unhandled cmd_complete opcode 0x{:04x}", other),
        }

        self.dispatch_cmd_complete(ev.opcode, 0, rparams);

        self.next_cmd();
    }

    fn evt_cmd_status(&mut self, param: &[u8]) {
        let ev = match CmdStatus::from_bytes(&mut ByteReader::new(param)) {
            Ok(ev) => ev,
            Err(_) => return,
        };

        self.set_ncmd(ev.ncmd);

        if ev.status != 0 {
            self.dispatch_cmd_complete(ev.opcode, ev.status, &[]);
        }

        self.next_cmd();
    }

    fn evt_conn_request(&mut self, param: &[u8]) {
        let ev = match ConnRequest::from_bytes(&mut ByteReader::new(param)) {
            Ok(ev) => ev,
            Err(_) => return,
        };

        let cmd = cmd::AcceptConnRequest {
            bdaddr: ev.bdaddr,
            role: 0x00,
        };
        self.send_command_obj(opcode::ACCEPT_CONN_REQUEST, &cmd);
    }

    /// Creates an ACL connection entry, attaches the Security Manager and, on BR/EDR, probes
    /// the peer's fixed channels.
    fn init_conn(&mut self, handle: u16, addr: Addr) {
        self.conns.push(Conn::new(handle, addr));

        let local_kind = if addr.is_bredr() {
            AddrKind::BrEdr
        } else {
            AddrKind::LePublic
        };
        let local = Addr::new(*self.bdaddr(), local_kind);
        let initiator = self.conn_init;
        self.with_smp(move |smp, _| smp.conn_added(handle, local, addr, initiator));

        if let Some(cb) = self.new_conn_cb.clone() {
            cb(self, handle);
        }

        if addr.is_bredr() {
            let payload = INFO_TYPE_FIXED_CHAN.to_le_bytes();
            self.l2cap_sig_send(handle, SigCode::InfoReq, 1, &payload);
        }
    }

    fn init_sco(&mut self, handle: u16, addr: Addr) {
        debug!("SCO handle 0x{:04x}", handle);

        self.conns.push(Conn::new(handle, addr));

        if let Some(cb) = self.new_sco_cb.clone() {
            cb(self, handle);
        }
    }

    fn init_iso(&mut self, handle: u16, addr: Addr) {
        debug!("ISO handle 0x{:04x}", handle);

        self.conns.push(Conn::new(handle, addr));

        if let Some(cb) = self.new_iso_cb.clone() {
            cb(self, handle);
        }
    }

    fn evt_conn_complete(&mut self, param: &[u8]) {
        let ev = match ConnComplete::from_bytes(&mut ByteReader::new(param)) {
            Ok(ev) => ev,
            Err(_) => return,
        };
        if ev.status != 0 {
            return;
        }

        let addr = Addr::new(ev.bdaddr, AddrKind::BrEdr);
        match ev.link_type {
            0x00 => self.init_sco(ev.handle, addr),
            0x01 => self.init_conn(ev.handle, addr),
            _ => {}
        }
    }

    fn evt_disconn_complete(&mut self, param: &[u8]) {
        let ev = match DisconnectComplete::from_bytes(&mut ByteReader::new(param)) {
            Ok(ev) => ev,
            Err(_) => return,
        };
        if ev.status != 0 {
            return;
        }

        self.remove_conn(ev.handle);
    }

    fn evt_sync_conn_complete(&mut self, param: &[u8]) {
        let ev = match SyncConnComplete::from_bytes(&mut ByteReader::new(param)) {
            Ok(ev) => ev,
            Err(_) => return,
        };
        if ev.status != 0 {
            return;
        }

        self.init_sco(ev.handle, Addr::new(ev.bdaddr, AddrKind::BrEdr));
    }

    fn evt_auth_complete(&mut self, param: &[u8]) {
        let ev = match AuthComplete::from_bytes(&mut ByteReader::new(param)) {
            Ok(ev) => ev,
            Err(_) => return,
        };
        if ev.status != 0 {
            return;
        }

        let cp = cmd::SetConnEncrypt {
            handle: ev.handle,
            encr_mode: 0x01,
        };
        self.send_command_obj(opcode::SET_CONN_ENCRYPT, &cp);
    }

    fn evt_pin_code_request(&mut self, param: &[u8]) {
        let ev = match BdaddrEvent::from_bytes(&mut ByteReader::new(param)) {
            Ok(ev) => ev,
            Err(_) => return,
        };

        if self.pin_len > 0 {
            let cp = cmd::PinCodeRequestReply {
                bdaddr: ev.bdaddr,
                pin_len: self.pin_len,
                pin_code: self.pin,
            };
            self.send_command_obj(opcode::PIN_CODE_REQUEST_REPLY, &cp);
        } else {
            let cp = cmd::BdaddrOnly { bdaddr: ev.bdaddr };
            self.send_command_obj(opcode::PIN_CODE_REQUEST_NEG_REPLY, &cp);
        }
    }

    fn evt_link_key_request(&mut self, param: &[u8]) {
        let ev = match BdaddrEvent::from_bytes(&mut ByteReader::new(param)) {
            Ok(ev) => ev,
            Err(_) => return,
        };

        // This peer keeps no link keys.
        let cp = cmd::BdaddrOnly { bdaddr: ev.bdaddr };
        self.send_command_obj(opcode::LINK_KEY_REQUEST_NEG_REPLY, &cp);
    }

    fn evt_encrypt_change(&mut self, param: &[u8]) {
        let ev = match EncryptChange::from_bytes(&mut ByteReader::new(param)) {
            Ok(ev) => ev,
            Err(_) => return,
        };

        let handle = hci::handle(ev.handle);
        if self.find_conn(handle).is_none() {
            return;
        }
        if ev.status != 0 {
            return;
        }

        if let Some(conn) = self.find_conn_mut(handle) {
            conn.encr_mode = ev.encr_mode;
        }

        let mode = ev.encr_mode;
        self.with_smp(move |smp, host| smp.encrypted(host, handle, mode));
    }

    fn evt_io_cap_request(&mut self, param: &[u8]) {
        let ev = match BdaddrEvent::from_bytes(&mut ByteReader::new(param)) {
            Ok(ev) => ev,
            Err(_) => return,
        };

        if self.find_conn_by_bdaddr(&ev.bdaddr).is_none() {
            return;
        }

        let cp = cmd::IoCapabilityRequestReply {
            bdaddr: ev.bdaddr,
            capability: self.io_capability,
            oob_data: 0x00,
            authentication: self.auth_req,
        };
        self.send_command_obj(opcode::IO_CAPABILITY_REQUEST_REPLY, &cp);
    }

    fn evt_io_cap_response(&mut self, param: &[u8]) {
        let ev = match IoCapabilityResponse::from_bytes(&mut ByteReader::new(param)) {
            Ok(ev) => ev,
            Err(_) => return,
        };

        debug!(
            "io capability response: capability 0x{:02x}",
            ev.capability
        );
    }

    fn evt_user_confirm_request(&mut self, param: &[u8]) {
        let ev = match UserConfirmRequest::from_bytes(&mut ByteReader::new(param)) {
            Ok(ev) => ev,
            Err(_) => return,
        };

        if self.find_conn_by_bdaddr(&ev.bdaddr).is_none() {
            return;
        }

        let cp = cmd::BdaddrOnly { bdaddr: ev.bdaddr };
        if self.reject_user_confirm {
            self.send_command_obj(opcode::USER_CONFIRM_REQUEST_NEG_REPLY, &cp);
            return;
        }

        self.send_command_obj(opcode::USER_CONFIRM_REQUEST_REPLY, &cp);
    }

    fn evt_le_meta_event(&mut self, param: &[u8]) {
        if param.is_empty() {
            return;
        }
        let subcode = LeEventCode::from(param[0]);
        let data = &param[1..];

        debug!("meta event {:?}", subcode);

        match subcode {
            LeEventCode::ConnComplete => self.evt_le_conn_complete(data),
            LeEventCode::EnhancedConnComplete => self.evt_le_enhanced_conn_complete(data),
            LeEventCode::ConnUpdateComplete => {
                debug!("le connection update complete");
            }
            LeEventCode::RemoteFeaturesComplete => {
                debug!("le remote features complete");
            }
            LeEventCode::LtkRequest => self.evt_le_ltk_request(data),
            LeEventCode::AdvReport => {}
            LeEventCode::ExtAdvReport => self.evt_le_ext_adv_report(data),
            LeEventCode::CisEstablished => self.evt_le_cis_established(data),
            LeEventCode::CisRequest => self.evt_le_cis_request(data),
            LeEventCode::BigComplete => self.evt_le_big_complete(data),
            LeEventCode::BigSyncEstablished => self.evt_le_big_sync_established(data),
            LeEventCode::Unknown(code) => debug!("Unsupported LE Meta event 0x{:02x}", code),
        }
    }

    fn le_peer_addr(addr_type: u8, addr: [u8; 6]) -> Addr {
        let kind = if addr_type == 0x00 {
            AddrKind::LePublic
        } else {
            AddrKind::LeRandom
        };
        Addr::new(addr, kind)
    }

    fn evt_le_conn_complete(&mut self, data: &[u8]) {
        let ev = match LeConnComplete::from_bytes(&mut ByteReader::new(data)) {
            Ok(ev) => ev,
            Err(_) => return,
        };
        if ev.status != 0 {
            return;
        }

        self.init_conn(ev.handle, Self::le_peer_addr(ev.peer_addr_type, ev.peer_addr));
    }

    fn evt_le_enhanced_conn_complete(&mut self, data: &[u8]) {
        let ev = match LeEnhancedConnComplete::from_bytes(&mut ByteReader::new(data)) {
            Ok(ev) => ev,
            Err(_) => return,
        };
        if ev.status != 0 {
            return;
        }

        self.init_conn(ev.handle, Self::le_peer_addr(ev.peer_addr_type, ev.peer_addr));
    }

    fn evt_le_ltk_request(&mut self, data: &[u8]) {
        let ev = match LeLtkRequest::from_bytes(&mut ByteReader::new(data)) {
            Ok(ev) => ev,
            Err(_) => return,
        };

        let handle = hci::handle(ev.handle);
        if self.find_conn(handle).is_none() {
            return;
        }

        let ltk = self
            .with_smp(|smp, _| smp.get_ltk(handle, ev.rand, ev.ediv))
            .flatten();

        match ltk {
            Some(ltk) => {
                let cp = cmd::LeLtkReqReply { handle, ltk };
                self.send_command_obj(opcode::LE_LTK_REQ_REPLY, &cp);
            }
            None => {
                let cp = cmd::LeLtkReqNegReply { handle };
                self.send_command_obj(opcode::LE_LTK_REQ_NEG_REPLY, &cp);
            }
        }
    }

    fn evt_le_cis_established(&mut self, data: &[u8]) {
        let ev = match LeCisEstablished::from_bytes(&mut ByteReader::new(data)) {
            Ok(ev) => ev,
            Err(_) => return,
        };
        if ev.status != 0 {
            return;
        }

        self.init_iso(ev.conn_handle, Addr::any(AddrKind::LePublic));
    }

    fn evt_le_cis_request(&mut self, data: &[u8]) {
        let ev = match LeCisRequest::from_bytes(&mut ByteReader::new(data)) {
            Ok(ev) => ev,
            Err(_) => return,
        };

        if let Some(accept) = self.accept_cis_cb.clone() {
            let reason = accept(self, ev.cis_handle);
            if reason != 0 {
                let rej = cmd::LeRejectCis {
                    handle: ev.cis_handle,
                    reason,
                };
                self.send_command_obj(opcode::LE_REJECT_CIS, &rej);
                return;
            }
        }

        let cmd = cmd::LeAcceptCis {
            handle: ev.cis_handle,
        };
        self.send_command_obj(opcode::LE_ACCEPT_CIS, &cmd);
    }

    fn evt_le_big_complete(&mut self, data: &[u8]) {
        let ev = match LeBigComplete::from_bytes(&mut ByteReader::new(data)) {
            Ok(ev) => ev,
            Err(_) => return,
        };
        if ev.status != 0 {
            return;
        }

        for handle in ev.bis_handles {
            self.init_iso(handle, Addr::any(AddrKind::LePublic));
        }
    }

    fn evt_le_big_sync_established(&mut self, data: &[u8]) {
        let ev = match LeBigSyncEstablished::from_bytes(&mut ByteReader::new(data)) {
            Ok(ev) => ev,
            Err(_) => return,
        };
        if ev.status != 0 {
            return;
        }

        for handle in ev.bis_handles {
            self.init_iso(handle, Addr::any(AddrKind::LePublic));
        }
    }

    fn evt_le_ext_adv_report(&mut self, data: &[u8]) {
        let mut bytes = ByteReader::new(data);
        let num_reports = match bytes.read_u8() {
            Ok(n) => n,
            Err(_) => return,
        };

        for _ in 0..num_reports {
            let report = match ExtAdvReport::from_bytes(&mut bytes) {
                Ok(report) => report,
                Err(_) => return,
            };

            debug!(
                "le ext adv report: {:?} (0x{:02x})",
                crate::utils::HexSlice(&report.addr),
                report.addr_type
            );

            self.ext_adv_reports.push_back(report);
        }
    }
}
