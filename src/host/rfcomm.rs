//! RFCOMM frame processing and the multiplexer state machine.
//!
//! RFCOMM rides on the L2CAP channel connected to PSM `0x0003`. The server side answers SABM
//! with UA (or DM when no server listens on the channel); the client side walks the open
//! sequence: SABM on DLCI 0, parameter negotiation over the multiplexer control channel, then
//! SABM on the data DLCI.

use std::rc::Rc;

use crate::bytes::{encode_to_vec, ByteReader, FromBytes};
use crate::l2cap::signaling::{ConnReq, SigCode};
use crate::l2cap::PSM_RFCOMM;
use crate::rfcomm::{
    addr_channel, addr_dlci, address, control, fcs, len8, mcc_type, mcc_type_of, test_cr, test_ea,
    CmdFrame, FrameType, MccHeader, MccType, Msc, Pn,
};
use crate::{Error, Host};

use super::{RcConn, RfcommConnData};

impl Host {
    /// Starts a client-side RFCOMM connection on an existing ACL link.
    ///
    /// Only one outbound attempt may be in flight at a time. The callback fires with
    /// `success = true` once the data DLCI is open, or `false` when the peer rejects it.
    pub fn connect_rfcomm<F>(&mut self, handle: u16, channel: u8, cb: F) -> Result<(), Error>
    where
        F: Fn(&mut Host, u16, u16, bool) + 'static,
    {
        if self.rfcomm_conn.is_some() {
            return Err(Error::Busy);
        }

        let scid = match self.find_conn_mut(handle) {
            Some(conn) => conn.alloc_cid(),
            None => return Err(Error::UnknownConn),
        };

        self.rfcomm_conn = Some(RfcommConnData {
            channel,
            cb: Some(Rc::new(cb)),
        });

        let req = ConnReq {
            psm: PSM_RFCOMM,
            scid,
        };
        let payload = match encode_to_vec(&req, 4) {
            Ok(payload) => payload,
            Err(_) => return Err(Error::InvalidValue),
        };
        self.l2cap_req(handle, SigCode::ConnReq, &payload, None)
    }

    /// Sends application data in a UIH frame on an open channel.
    ///
    /// Payloads longer than 127 octets use the two-octet length encoding.
    pub fn send_rfcomm_data(&mut self, handle: u16, channel: u8, data: &[u8]) {
        let idx = match self.conn_index(handle) {
            Some(idx) => idx,
            None => return,
        };
        let scid = match self.conns[idx].rcconn_by_channel(channel) {
            Some(rcconn) => rcconn.scid,
            None => return,
        };

        let addr = address(1, channel * 2);
        let ctrl = control(FrameType::Uih, 0);

        let mut frame = Vec::with_capacity(5 + data.len());
        frame.push(addr);
        frame.push(ctrl);
        if data.len() > 127 {
            let len = data.len() as u16;
            frame.push((len << 1) as u8);
            frame.push((len >> 7) as u8);
        } else {
            frame.push(len8(data.len() as u8));
        }
        frame.extend_from_slice(data);
        frame.push(fcs(&[addr, ctrl]));

        let dcid = self.conns[idx]
            .l2conn_by_scid(scid)
            .map_or(scid, |l2conn| l2conn.dcid);
        self.send_acl(handle, dcid, false, &frame);
    }

    pub(crate) fn process_rfcomm(&mut self, idx: usize, scid: u16, data: &[u8]) {
        if data.len() < 2 {
            debug!("RFCOMM frame too short");
            return;
        }

        debug!("RFCOMM data: {} bytes", data.len());

        match crate::rfcomm::control_type(data[1]) {
            FrameType::Sabm => self.rfcomm_sabm_recv(idx, scid, data),
            FrameType::Disc => self.rfcomm_disc_recv(idx, scid, data),
            FrameType::Ua => self.rfcomm_ua_recv(idx, scid, data),
            FrameType::Dm => self.rfcomm_dm_recv(idx, scid, data),
            FrameType::Uih => self.rfcomm_uih_recv(idx, scid, data),
            FrameType::Unknown(_) => debug!("Unknown frame type"),
        }
    }

    /// Sends an empty SABM/UA/DM/DISC frame on the carrier channel identified by `scid`.
    pub(crate) fn rfcomm_send_frame(
        &mut self,
        idx: usize,
        scid: u16,
        frame_type: FrameType,
        cr: u8,
        dlci: u8,
    ) {
        let (handle, dcid) = {
            let conn = &mut self.conns[idx];
            let handle = conn.handle;
            match conn.l2conn_by_scid(scid) {
                Some(l2conn) => (handle, l2conn.dcid),
                None => return,
            }
        };

        let frame = CmdFrame::new(frame_type, cr, dlci);
        let buf = [frame.address, frame.control, frame.length, frame.fcs];
        self.send_acl(handle, dcid, false, &buf);
    }

    /// Sends a multiplexer control message in a UIH frame on DLCI 0.
    fn rfcomm_send_mcc(&mut self, idx: usize, scid: u16, addr: u8, mcc_type_octet: u8, payload: &[u8]) {
        let (handle, dcid) = {
            let conn = &mut self.conns[idx];
            let handle = conn.handle;
            match conn.l2conn_by_scid(scid) {
                Some(l2conn) => (handle, l2conn.dcid),
                None => return,
            }
        };

        let hdr = [
            addr,
            control(FrameType::Uih, 0),
            len8((MccHeader::SIZE + payload.len()) as u8),
        ];

        let mut frame = Vec::with_capacity(hdr.len() + MccHeader::SIZE + payload.len() + 1);
        frame.extend_from_slice(&hdr);
        frame.push(mcc_type_octet);
        frame.push(len8(payload.len() as u8));
        frame.extend_from_slice(payload);
        frame.push(fcs(&hdr[..2]));

        self.send_acl(handle, dcid, false, &frame);
    }

    /// Opens the multiplexer for a pending client connect (SABM on DLCI 0).
    pub(crate) fn rfcomm_open_mux(&mut self, idx: usize, scid: u16) {
        self.rfcomm_send_frame(idx, scid, FrameType::Sabm, 1, 0);
    }

    fn rfcomm_sabm_recv(&mut self, idx: usize, scid: u16, data: &[u8]) {
        let hdr = match CmdFrame::from_bytes(&mut ByteReader::new(data)) {
            Ok(hdr) => hdr,
            Err(_) => return,
        };

        let channel = addr_channel(hdr.address);
        let dlci = addr_dlci(hdr.address);

        let connect_cb = self
            .rfcomm_server_for_channel(channel)
            .and_then(|server| server.connect.clone());
        let has_server = self.rfcomm_server_for_channel(channel).is_some();

        if dlci == 0 || has_server {
            self.conns[idx].rcconns.push(RcConn { channel, scid });
            self.rfcomm_send_frame(idx, scid, FrameType::Ua, 1, dlci);
            if let Some(cb) = connect_cb {
                let handle = self.conns[idx].handle;
                cb(self, handle, scid, true);
            }
        } else {
            self.rfcomm_send_frame(idx, scid, FrameType::Dm, 1, dlci);
        }
    }

    fn rfcomm_disc_recv(&mut self, idx: usize, scid: u16, data: &[u8]) {
        let hdr = match CmdFrame::from_bytes(&mut ByteReader::new(data)) {
            Ok(hdr) => hdr,
            Err(_) => return,
        };

        self.rfcomm_send_frame(idx, scid, FrameType::Ua, 0, addr_dlci(hdr.address));
    }

    fn rfcomm_ua_recv(&mut self, idx: usize, scid: u16, data: &[u8]) {
        let hdr = match CmdFrame::from_bytes(&mut ByteReader::new(data)) {
            Ok(hdr) => hdr,
            Err(_) => return,
        };

        let channel = addr_channel(hdr.address);

        // UA on the data DLCI completes a pending client connect.
        if channel != 0 {
            let matches = self
                .rfcomm_conn
                .as_ref()
                .map_or(false, |pending| pending.channel == channel);
            if matches {
                let pending = self.rfcomm_conn.take().unwrap();
                self.conns[idx].rcconns.push(RcConn { channel, scid });
                let handle = self.conns[idx].handle;
                if let Some(cb) = pending.cb {
                    cb(self, handle, scid, true);
                }
                return;
            }
        }

        if self.rfcomm_conn.is_none() || !test_cr(u8::from(hdr.frame_type())) {
            return;
        }

        // UA on DLCI 0: the multiplexer is up, negotiate the data DLCI's parameters.
        self.conns[idx].rcconns.push(RcConn { channel, scid });

        let dlci = self.rfcomm_conn.as_ref().unwrap().channel * 2;
        let pn = Pn {
            dlci,
            priority: 7,
            mtu: 667,
            credits: 7,
            ..Pn::default()
        };
        let payload = match encode_to_vec(&pn, Pn::SIZE) {
            Ok(payload) => payload,
            Err(_) => return,
        };
        self.rfcomm_send_mcc(idx, scid, address(1, 0), mcc_type(1, MccType::Pn), &payload);
    }

    fn rfcomm_dm_recv(&mut self, idx: usize, scid: u16, data: &[u8]) {
        let hdr = match CmdFrame::from_bytes(&mut ByteReader::new(data)) {
            Ok(hdr) => hdr,
            Err(_) => return,
        };

        let channel = addr_channel(hdr.address);

        let matches = self
            .rfcomm_conn
            .as_ref()
            .map_or(false, |pending| pending.channel == channel);
        if matches {
            let pending = self.rfcomm_conn.take().unwrap();
            let handle = self.conns[idx].handle;
            if let Some(cb) = pending.cb {
                cb(self, handle, scid, false);
            }
        }
    }

    fn rfcomm_uih_recv(&mut self, idx: usize, scid: u16, data: &[u8]) {
        if data.len() < 3 {
            debug!("RFCOMM UIH: too short");
            return;
        }

        let addr = data[0];
        let (hdr_len, data_len) = if test_ea(data[2]) {
            (3, usize::from(crate::rfcomm::get_len8(data[2])))
        } else {
            if data.len() < 4 {
                debug!("RFCOMM UIH: too short");
                return;
            }
            (4, usize::from(crate::rfcomm::get_len16(data[2], data[3])))
        };

        if data.len() < hdr_len + data_len {
            debug!("RFCOMM UIH: {} != {}", data.len(), hdr_len + data_len);
            return;
        }

        let payload = &data[hdr_len..hdr_len + data_len];

        if addr_dlci(addr) != 0 {
            let hook = self.rfcomm_chan_hook_fn(idx, addr_channel(addr));
            if let Some(hook) = hook {
                if !payload.is_empty() {
                    hook(self, payload);
                }
            }
        } else {
            self.rfcomm_mcc_recv(idx, scid, payload);
        }
    }

    fn rfcomm_mcc_recv(&mut self, idx: usize, scid: u16, data: &[u8]) {
        let mut bytes = ByteReader::new(data);
        let mcc = match MccHeader::from_bytes(&mut bytes) {
            Ok(mcc) => mcc,
            Err(_) => return,
        };

        let cr = test_cr(mcc.mcc_type) as u8;

        match mcc_type_of(mcc.mcc_type) {
            MccType::Msc => {
                let msc = match Msc::from_bytes(&mut bytes) {
                    Ok(msc) => msc,
                    Err(_) => return,
                };
                self.rfcomm_msc_recv(idx, scid, cr, msc);
            }
            MccType::Pn => {
                let pn = match Pn::from_bytes(&mut bytes) {
                    Ok(pn) => pn,
                    Err(_) => return,
                };
                self.rfcomm_pn_recv(idx, scid, cr, pn);
            }
            MccType::Unknown(_) => {}
        }
    }

    fn rfcomm_msc_recv(&mut self, idx: usize, scid: u16, cr: u8, msc: Msc) {
        // Echo the modem status signals back.
        let payload = [msc.dlci, msc.v24_sig];
        self.rfcomm_send_mcc(
            idx,
            scid,
            address(0, 0),
            mcc_type(cr, MccType::Msc),
            &payload,
        );
    }

    fn rfcomm_pn_recv(&mut self, idx: usize, scid: u16, cr: u8, pn: Pn) {
        if cr == 0 {
            // The peer answered our negotiation; open the data DLCI.
            let channel = match self.rfcomm_conn.as_ref() {
                Some(pending) => pending.channel,
                None => return,
            };
            self.rfcomm_send_frame(idx, scid, FrameType::Sabm, 1, channel * 2);
            return;
        }

        let echo = Pn { credits: 255, ..pn };
        let payload = match encode_to_vec(&echo, Pn::SIZE) {
            Ok(payload) => payload,
            Err(_) => return,
        };
        self.rfcomm_send_mcc(idx, scid, address(1, 0), mcc_type(0, MccType::Pn), &payload);
    }
}
