//! The emulated host: state machine, transport plumbing and public API.
//!
//! A [`Host`] models exactly one peer. It owns every connection the counterpart establishes with
//! it, runs the HCI command pipeline with its credit accounting, fragments and reassembles
//! ACL/ISO traffic, and implements the L2CAP and RFCOMM state machines in the sibling modules.
//!
//! Everything is single-task cooperative: processing an inbound frame runs to completion before
//! [`Host::receive_h4`] returns, and every callback is invoked synchronously with `&mut Host` so
//! it can immediately issue requests of its own.
//!
//! [`Host`]: struct.Host.html
//! [`Host::receive_h4`]: struct.Host.html#method.receive_h4

mod event;
mod l2cap;
mod rfcomm;
#[cfg(test)]
mod tests;

use std::collections::VecDeque;
use std::rc::Rc;

use byteorder::{ByteOrder, LittleEndian};

use crate::bytes::{encode_to_vec, ToBytes};
use crate::hci::event::ExtAdvReport;
use crate::hci::{self, cmd, opcode, AclBoundary, AclHeader, IsoDataStart, IsoHeader, PacketType, ScoHeader};
use crate::l2cap::signaling::{ConnReq, EcredConnReq, LeConnReq, SigCode, SigHeader};
use crate::l2cap::{ChannelMode, Cid, Header as L2capHeader};
use crate::security::{NoSecurity, SecurityManager};
use crate::utils::HexSlice;
use crate::{Addr, AddrKind, Error};

/// Writes one outbound H4 frame to the transport.
pub type SendHandler = Box<dyn FnMut(&[u8])>;

/// Notification about a newly established connection handle.
pub type ConnCb = Rc<dyn Fn(&mut Host, u16)>;

/// Decides whether an incoming CIS request is accepted; a non-zero return is the reject reason.
pub type AcceptCisCb = Rc<dyn Fn(&mut Host, u16) -> u8>;

/// Observes `Command Complete`/`Command Status` events: `(opcode, status, return parameters)`.
pub type CmdCompleteCb = Rc<dyn Fn(&mut Host, u16, u8, &[u8])>;

/// One-shot callback fired when the reset sequence has finished.
pub type ReadyCb = Box<dyn FnOnce(&mut Host)>;

/// One-shot callback for an outstanding L2CAP signaling request: `(response code, payload)`.
///
/// When the host is destroyed with the request still pending, the callback fires with
/// `(0, &[])`.
pub type L2capRspCb = Box<dyn FnOnce(&mut Host, u8, &[u8])>;

/// Server notification about an accepted L2CAP connection: `(handle, cid)`.
pub type L2capConnectCb = Rc<dyn Fn(&mut Host, u16, u16)>;

/// Server notification about an L2CAP disconnection.
pub type L2capDisconnectCb = Rc<dyn Fn(&mut Host)>;

/// Notification about an RFCOMM channel: `(handle, carrier scid, success)`.
pub type RfcommConnectCb = Rc<dyn Fn(&mut Host, u16, u16, bool)>;

/// Receive tap for one CID.
pub type CidHookFn = Rc<dyn Fn(&mut Host, &[u8])>;

/// Receive tap for one RFCOMM channel.
pub type RfcommChanHookFn = Rc<dyn Fn(&mut Host, &[u8])>;

/// Receive tap for SCO data: `(payload, packet status)`.
pub type ScoHookFn = Rc<dyn Fn(&mut Host, &[u8], u8)>;

/// Receive tap for ISO data.
pub type IsoHookFn = Rc<dyn Fn(&mut Host, &[u8])>;

/// Teardown notification, invoked exactly once when the owning connection goes away.
pub type DestroyFn = Box<dyn FnOnce()>;

struct CidHook {
    cid: u16,
    func: CidHookFn,
    destroy: Option<DestroyFn>,
}

struct RfcommChanHook {
    channel: u8,
    func: RfcommChanHookFn,
    destroy: Option<DestroyFn>,
}

struct ScoHook {
    func: ScoHookFn,
    destroy: Option<DestroyFn>,
}

struct IsoHook {
    func: IsoHookFn,
    destroy: Option<DestroyFn>,
}

/// Reassembly buffer for one fragmented PDU or SDU.
struct RecvBuf {
    data: Vec<u8>,
    expected: usize,
}

impl RecvBuf {
    fn new(expected: usize) -> Self {
        RecvBuf {
            data: Vec::with_capacity(expected),
            expected,
        }
    }

    /// Appends a fragment; fails without modifying the buffer when it would overflow the
    /// announced length.
    fn append(&mut self, chunk: &[u8]) -> bool {
        if self.data.len() + chunk.len() > self.expected {
            return false;
        }
        self.data.extend_from_slice(chunk);
        true
    }

    fn is_complete(&self) -> bool {
        self.data.len() == self.expected
    }
}

/// One connected L2CAP channel pair on an ACL link.
pub(crate) struct L2Conn {
    pub(crate) scid: u16,
    pub(crate) dcid: u16,
    pub(crate) psm: u16,
    pub(crate) mode: ChannelMode,
    /// In-progress SDU on credit-based channels.
    recv: Option<RecvBuf>,
}

impl L2Conn {
    fn new(scid: u16, dcid: u16, psm: u16) -> Self {
        L2Conn {
            scid,
            dcid,
            psm,
            mode: ChannelMode::Basic,
            recv: None,
        }
    }
}

/// One open RFCOMM channel, keyed by its carrier channel's scid.
pub(crate) struct RcConn {
    pub(crate) channel: u8,
    pub(crate) scid: u16,
}

/// One ACL, SCO or ISO connection.
pub(crate) struct Conn {
    pub(crate) handle: u16,
    pub(crate) addr: Addr,
    pub(crate) encr_mode: u8,
    pub(crate) next_cid: u16,
    pub(crate) fixed_chan: u64,
    pub(crate) l2conns: Vec<L2Conn>,
    pub(crate) rcconns: Vec<RcConn>,
    cid_hooks: Vec<CidHook>,
    rfcomm_chan_hooks: Vec<RfcommChanHook>,
    sco_hook: Option<ScoHook>,
    iso_hook: Option<IsoHook>,
    /// In-progress ACL or ISO PDU reassembly.
    recv: Option<RecvBuf>,
}

impl Conn {
    fn new(handle: u16, addr: Addr) -> Self {
        Conn {
            handle,
            addr,
            encr_mode: 0,
            next_cid: Cid::FIRST_DYNAMIC.as_raw(),
            fixed_chan: 0,
            l2conns: Vec::new(),
            rcconns: Vec::new(),
            cid_hooks: Vec::new(),
            rfcomm_chan_hooks: Vec::new(),
            sco_hook: None,
            iso_hook: None,
            recv: None,
        }
    }

    pub(crate) fn alloc_cid(&mut self) -> u16 {
        let cid = self.next_cid;
        self.next_cid += 1;
        cid
    }

    pub(crate) fn l2conn_by_scid(&mut self, scid: u16) -> Option<&mut L2Conn> {
        self.l2conns.iter_mut().find(|l2| l2.scid == scid)
    }

    pub(crate) fn l2conn_by_dcid(&mut self, dcid: u16) -> Option<&mut L2Conn> {
        self.l2conns.iter_mut().find(|l2| l2.dcid == dcid)
    }

    pub(crate) fn rcconn_by_channel(&self, channel: u8) -> Option<&RcConn> {
        self.rcconns.iter().find(|rc| rc.channel == channel)
    }
}

pub(crate) struct L2capServer {
    pub(crate) psm: u16,
    pub(crate) mtu: u16,
    pub(crate) mps: u16,
    pub(crate) credits: u16,
    pub(crate) connect: Option<L2capConnectCb>,
    pub(crate) disconnect: Option<L2capDisconnectCb>,
}

pub(crate) struct RfcommServer {
    pub(crate) channel: u8,
    pub(crate) connect: Option<RfcommConnectCb>,
}

/// The single outstanding client-side RFCOMM connection attempt.
pub(crate) struct RfcommConnData {
    pub(crate) channel: u8,
    pub(crate) cb: Option<RfcommConnectCb>,
}

struct PendingReq {
    ident: u8,
    cb: L2capRspCb,
}

/// An emulated Bluetooth host peer.
///
/// Construct one with [`Host::new`], install a transport writer with
/// [`set_send_handler`], kick off the controller bring-up with [`start`], and feed every frame
/// the counterpart produces into [`receive_h4`].
///
/// [`Host::new`]: #method.new
/// [`set_send_handler`]: #method.set_send_handler
/// [`start`]: #method.start
/// [`receive_h4`]: #method.receive_h4
pub struct Host {
    ready: bool,
    ready_cb: Option<ReadyCb>,
    bdaddr: [u8; 6],
    features: [u8; 8],
    send_handler: Option<SendHandler>,
    cmd_queue: VecDeque<Vec<u8>>,
    ncmd: u8,
    pub(crate) conns: Vec<Conn>,
    cmd_complete_cb: Option<CmdCompleteCb>,
    pub(crate) new_conn_cb: Option<ConnCb>,
    pub(crate) new_sco_cb: Option<ConnCb>,
    pub(crate) new_iso_cb: Option<ConnCb>,
    pub(crate) accept_cis_cb: Option<AcceptCisCb>,
    acl_mtu: u16,
    iso_mtu: u16,
    pub(crate) rfcomm_conn: Option<RfcommConnData>,
    pub(crate) l2cap_servers: Vec<L2capServer>,
    pub(crate) rfcomm_servers: Vec<RfcommServer>,
    l2reqs: Vec<PendingReq>,
    next_ident: u8,
    pub(crate) pin: [u8; 16],
    pub(crate) pin_len: u8,
    pub(crate) io_capability: u8,
    pub(crate) auth_req: u8,
    pub(crate) reject_user_confirm: bool,
    smp: Option<Box<dyn SecurityManager>>,
    pub(crate) conn_init: bool,
    pub(crate) le: bool,
    pub(crate) sc: bool,
    pub(crate) ext_adv_reports: VecDeque<ExtAdvReport>,
}

impl Host {
    /// Creates a host with no connections, one command credit pending `start`, and the
    /// default pairing knobs (NoInputNoOutput I/O capability, no PIN, no keys).
    pub fn new() -> Self {
        Host {
            ready: false,
            ready_cb: None,
            bdaddr: [0; 6],
            features: [0; 8],
            send_handler: None,
            cmd_queue: VecDeque::new(),
            ncmd: 0,
            conns: Vec::new(),
            cmd_complete_cb: None,
            new_conn_cb: None,
            new_sco_cb: None,
            new_iso_cb: None,
            accept_cis_cb: None,
            acl_mtu: u16::max_value(),
            iso_mtu: u16::max_value(),
            rfcomm_conn: None,
            l2cap_servers: Vec::new(),
            rfcomm_servers: Vec::new(),
            l2reqs: Vec::new(),
            next_ident: 1,
            pin: [0; 16],
            pin_len: 0,
            io_capability: 0x03,
            auth_req: 0,
            reject_user_confirm: false,
            smp: Some(Box::new(NoSecurity)),
            conn_init: false,
            le: false,
            sc: false,
            ext_adv_reports: VecDeque::new(),
        }
    }

    /// Installs the transport writer that receives every outbound H4 frame.
    pub fn set_send_handler<F: FnMut(&[u8]) + 'static>(&mut self, handler: F) {
        self.send_handler = Some(Box::new(handler));
    }

    /// Replaces the external Security Manager.
    pub fn set_security_manager(&mut self, smp: Box<dyn SecurityManager>) {
        self.smp = Some(smp);
    }

    /// Limits outbound ACL fragments to `mtu` octets of H4 frame.
    pub fn set_acl_mtu(&mut self, mtu: u16) {
        self.acl_mtu = mtu;
    }

    /// Limits outbound ISO fragments to `mtu` octets past the H4 packet type.
    pub fn set_iso_mtu(&mut self, mtu: u16) {
        self.iso_mtu = mtu;
    }

    /// Registers the callback invoked once the reset sequence has completed.
    ///
    /// Fires immediately when the host is already up.
    pub fn notify_ready<F: FnOnce(&mut Host) + 'static>(&mut self, cb: F) {
        if self.ready {
            cb(self);
        } else {
            self.ready_cb = Some(Box::new(cb));
        }
    }

    /// Observes every `Command Complete`/`Command Status` event.
    pub fn set_cmd_complete_cb<F: Fn(&mut Host, u16, u8, &[u8]) + 'static>(&mut self, cb: F) {
        self.cmd_complete_cb = Some(Rc::new(cb));
    }

    /// Registers the new-ACL-connection callback.
    pub fn set_connect_cb<F: Fn(&mut Host, u16) + 'static>(&mut self, cb: F) {
        self.new_conn_cb = Some(Rc::new(cb));
    }

    /// Registers the new-SCO-connection callback.
    pub fn set_sco_cb<F: Fn(&mut Host, u16) + 'static>(&mut self, cb: F) {
        self.new_sco_cb = Some(Rc::new(cb));
    }

    /// Registers the accept filter and establishment callback for isochronous streams.
    pub fn set_iso_cb<A, F>(&mut self, accept: Option<A>, cb: F)
    where
        A: Fn(&mut Host, u16) -> u8 + 'static,
        F: Fn(&mut Host, u16) + 'static,
    {
        self.accept_cis_cb = accept.map(|a| Rc::new(a) as AcceptCisCb);
        self.new_iso_cb = Some(Rc::new(cb));
    }

    /// Returns the local device address learned from `Read BD_ADDR`.
    pub fn bdaddr(&self) -> &[u8; 6] {
        &self.bdaddr
    }

    /// Returns whether the controller advertises BR/EDR support.
    pub fn bredr_capable(&self) -> bool {
        self.features[4] & 0x20 == 0
    }

    /// Returns the fixed-channel mask the peer reported on this connection.
    pub fn conn_get_fixed_chan(&self, handle: u16) -> u64 {
        self.find_conn(handle).map_or(0, |conn| conn.fixed_chan)
    }

    // ---- transport ----

    /// Ingests one H4 frame from the transport.
    pub fn receive_h4(&mut self, data: &[u8]) {
        if data.is_empty() {
            return;
        }

        trace!("> {:?}", HexSlice(data));

        let payload = &data[1..];
        match PacketType::from(data[0]) {
            PacketType::Event => self.process_evt(payload),
            PacketType::AclData => self.process_acl(payload),
            PacketType::ScoData => self.process_sco(payload),
            PacketType::IsoData => self.process_iso(payload),
            other => debug!("Unsupported packet {:?}", other),
        }
    }

    fn send_packet(&mut self, frame: &[u8]) {
        trace!("< {:?}", HexSlice(frame));

        if let Some(handler) = self.send_handler.as_mut() {
            handler(frame);
        }
    }

    // ---- command pipeline ----

    pub(crate) fn send_command(&mut self, opcode: u16, params: &[u8]) {
        debug!("command 0x{:04x}", opcode);

        let mut frame = Vec::with_capacity(4 + params.len());
        frame.push(PacketType::Command.into());
        frame.extend_from_slice(&opcode.to_le_bytes());
        frame.push(params.len() as u8);
        frame.extend_from_slice(params);

        if self.ncmd > 0 {
            self.send_packet(&frame);
            self.ncmd -= 1;
        } else {
            self.cmd_queue.push_back(frame);
        }
    }

    pub(crate) fn send_command_obj<T: ToBytes>(&mut self, opcode: u16, params: &T) {
        match encode_to_vec(params, 256) {
            Ok(buf) => self.send_command(opcode, &buf),
            Err(e) => error!("failed to encode command 0x{:04x}: {}", opcode, e),
        }
    }

    /// Transmits queued commands while credits remain.
    pub(crate) fn next_cmd(&mut self) {
        while self.ncmd > 0 {
            match self.cmd_queue.pop_front() {
                Some(frame) => {
                    self.send_packet(&frame);
                    self.ncmd -= 1;
                }
                None => break,
            }
        }
    }

    pub(crate) fn set_ncmd(&mut self, ncmd: u8) {
        self.ncmd = ncmd;
    }

    /// Kicks off the controller bring-up: reset, feature query, address query.
    ///
    /// The initial credit is 1, so the two follow-up commands queue behind `Reset` until the
    /// controller acknowledges it.
    pub fn start(&mut self) {
        self.ncmd = 1;

        self.send_command(opcode::RESET, &[]);
        self.send_command(opcode::READ_LOCAL_FEATURES, &[]);
        self.send_command(opcode::READ_BD_ADDR, &[]);
    }

    // ---- connection table ----

    pub(crate) fn find_conn(&self, handle: u16) -> Option<&Conn> {
        self.conns.iter().find(|conn| conn.handle == handle)
    }

    pub(crate) fn find_conn_mut(&mut self, handle: u16) -> Option<&mut Conn> {
        self.conns.iter_mut().find(|conn| conn.handle == handle)
    }

    pub(crate) fn find_conn_by_bdaddr(&self, bdaddr: &[u8; 6]) -> Option<&Conn> {
        self.conns.iter().find(|conn| conn.addr.raw() == bdaddr)
    }

    pub(crate) fn conn_index(&self, handle: u16) -> Option<usize> {
        self.conns.iter().position(|conn| conn.handle == handle)
    }

    pub(crate) fn remove_conn(&mut self, handle: u16) {
        while let Some(idx) = self.conn_index(handle) {
            let conn = self.conns.remove(idx);
            self.teardown_conn(conn);
        }
    }

    fn teardown_conn(&mut self, mut conn: Conn) {
        self.with_smp(|smp, _| smp.conn_removed(conn.handle));

        for hook in conn.cid_hooks.drain(..) {
            if let Some(destroy) = hook.destroy {
                destroy();
            }
        }
        for hook in conn.rfcomm_chan_hooks.drain(..) {
            if let Some(destroy) = hook.destroy {
                destroy();
            }
        }
        if let Some(hook) = conn.sco_hook.take() {
            if let Some(destroy) = hook.destroy {
                destroy();
            }
        }
        if let Some(hook) = conn.iso_hook.take() {
            if let Some(destroy) = hook.destroy {
                destroy();
            }
        }
    }

    /// Runs a closure against the Security Manager, allowing it to reenter the host.
    pub(crate) fn with_smp<R>(
        &mut self,
        f: impl FnOnce(&mut dyn SecurityManager, &mut Host) -> R,
    ) -> Option<R> {
        let mut smp = self.smp.take()?;
        let r = f(&mut *smp, self);
        if self.smp.is_none() {
            self.smp = Some(smp);
        }
        Some(r)
    }

    // ---- hooks ----

    /// Taps every inbound L2CAP frame addressed to `cid` on `handle`.
    pub fn add_cid_hook<F>(&mut self, handle: u16, cid: u16, func: F, destroy: Option<DestroyFn>)
    where
        F: Fn(&mut Host, &[u8]) + 'static,
    {
        if let Some(conn) = self.find_conn_mut(handle) {
            conn.cid_hooks.push(CidHook {
                cid,
                func: Rc::new(func),
                destroy,
            });
        }
    }

    /// Taps inbound RFCOMM UIH data for `channel` on `handle`.
    pub fn add_rfcomm_chan_hook<F>(
        &mut self,
        handle: u16,
        channel: u8,
        func: F,
        destroy: Option<DestroyFn>,
    ) where
        F: Fn(&mut Host, &[u8]) + 'static,
    {
        if let Some(conn) = self.find_conn_mut(handle) {
            conn.rfcomm_chan_hooks.push(RfcommChanHook {
                channel,
                func: Rc::new(func),
                destroy,
            });
        }
    }

    /// Installs the single SCO receive tap for `handle`. A second registration is a no-op.
    pub fn add_sco_hook<F>(&mut self, handle: u16, func: F, destroy: Option<DestroyFn>)
    where
        F: Fn(&mut Host, &[u8], u8) + 'static,
    {
        if let Some(conn) = self.find_conn_mut(handle) {
            if conn.sco_hook.is_some() {
                return;
            }
            conn.sco_hook = Some(ScoHook {
                func: Rc::new(func),
                destroy,
            });
        }
    }

    /// Installs the single ISO receive tap for `handle`. A second registration is a no-op.
    pub fn add_iso_hook<F>(&mut self, handle: u16, func: F, destroy: Option<DestroyFn>)
    where
        F: Fn(&mut Host, &[u8]) + 'static,
    {
        if let Some(conn) = self.find_conn_mut(handle) {
            if conn.iso_hook.is_some() {
                return;
            }
            conn.iso_hook = Some(IsoHook {
                func: Rc::new(func),
                destroy,
            });
        }
    }

    pub(crate) fn cid_hook_fn(&self, handle_idx: usize, cid: u16) -> Option<CidHookFn> {
        self.conns[handle_idx]
            .cid_hooks
            .iter()
            .find(|hook| hook.cid == cid)
            .map(|hook| hook.func.clone())
    }

    pub(crate) fn rfcomm_chan_hook_fn(
        &self,
        handle_idx: usize,
        channel: u8,
    ) -> Option<RfcommChanHookFn> {
        self.conns[handle_idx]
            .rfcomm_chan_hooks
            .iter()
            .find(|hook| hook.channel == channel)
            .map(|hook| hook.func.clone())
    }

    // ---- ACL / SCO / ISO send paths ----

    /// Sends a raw L2CAP frame built from the given payload parts, fragmenting to the ACL MTU.
    fn send_l2cap_frame(&mut self, handle: u16, cid: u16, iov: &[&[u8]]) {
        let len: usize = iov.iter().map(|part| part.len()).sum();
        let mut frame = Vec::with_capacity(L2capHeader::SIZE + len);
        frame.extend_from_slice(&(len as u16).to_le_bytes());
        frame.extend_from_slice(&cid.to_le_bytes());
        for part in iov {
            frame.extend_from_slice(part);
        }

        self.send_acl_fragments(handle, &frame);
    }

    fn send_acl_fragments(&mut self, handle: u16, mut payload: &[u8]) {
        let mtu = usize::from(self.acl_mtu);
        if mtu <= 1 + AclHeader::SIZE {
            debug!("ACL MTU {} leaves no payload room", mtu);
            return;
        }
        let payload_mtu = mtu - 1 - AclHeader::SIZE;

        let mut pb = AclBoundary::FirstNonFlushable as u8;
        loop {
            let count = payload.len().min(payload_mtu);
            let (chunk, rest) = payload.split_at(count);

            let mut frame = Vec::with_capacity(1 + AclHeader::SIZE + count);
            frame.push(PacketType::AclData.into());
            frame.extend_from_slice(&hci::pack_handle(handle, pb).to_le_bytes());
            frame.extend_from_slice(&(count as u16).to_le_bytes());
            frame.extend_from_slice(chunk);
            self.send_packet(&frame);

            payload = rest;
            pb = AclBoundary::Continuation as u8;
            if payload.is_empty() {
                break;
            }
        }
    }

    pub(crate) fn send_acl(
        &mut self,
        handle: u16,
        cid: u16,
        sdu_hdr: bool,
        data: &[u8],
    ) {
        if sdu_hdr {
            let sdu = (data.len() as u16).to_le_bytes();
            self.send_l2cap_frame(handle, cid, &[&sdu, data]);
        } else {
            self.send_l2cap_frame(handle, cid, &[data]);
        }
    }

    /// Sends `data` on the L2CAP channel `cid`. A silent no-op when `handle` is unknown.
    ///
    /// On credit-based channels the SDU length prefix is added automatically.
    pub fn send_cid(&mut self, handle: u16, cid: u16, data: &[u8]) {
        let sdu_hdr = match self.find_conn_mut(handle) {
            Some(conn) => conn
                .l2conn_by_dcid(cid)
                .map_or(false, |l2conn| l2conn.mode.is_credit_based()),
            None => return,
        };

        self.send_acl(handle, cid, sdu_hdr, data);
    }

    /// Gathers `iov` into one L2CAP frame on `cid`. No SDU prefix is added.
    pub fn send_cid_v(&mut self, handle: u16, cid: u16, iov: &[&[u8]]) {
        if self.find_conn(handle).is_none() {
            return;
        }
        self.send_l2cap_frame(handle, cid, iov);
    }

    /// Sends one SCO packet. SCO data is never fragmented.
    pub fn send_sco(&mut self, handle: u16, pkt_status: u8, data: &[u8]) {
        if self.find_conn(handle).is_none() {
            return;
        }

        let hdr = ScoHeader::new(handle, pkt_status, data.len() as u8);
        let mut frame = Vec::with_capacity(1 + ScoHeader::SIZE + data.len());
        frame.push(PacketType::ScoData.into());
        frame.extend_from_slice(&hdr.handle.to_le_bytes());
        frame.push(hdr.dlen);
        frame.extend_from_slice(data);
        self.send_packet(&frame);
    }

    /// Sends one ISO SDU, fragmenting to the ISO MTU.
    ///
    /// The timestamp and the SDU load header travel only in the first fragment; `pkt_status`
    /// is packed into the top bits of the SDU length field.
    pub fn send_iso(
        &mut self,
        handle: u16,
        timestamp: Option<u32>,
        sn: u16,
        pkt_status: u8,
        data: &[u8],
    ) {
        if self.find_conn(handle).is_none() {
            return;
        }

        let mtu = usize::from(self.iso_mtu);
        if mtu <= IsoHeader::SIZE {
            debug!("ISO MTU {} leaves no payload room", mtu);
            return;
        }
        let payload_mtu = mtu - IsoHeader::SIZE;

        let mut payload = Vec::with_capacity(8 + data.len());
        if let Some(ts) = timestamp {
            payload.extend_from_slice(&ts.to_le_bytes());
        }
        let data_hdr = IsoDataStart {
            sn,
            slen: IsoDataStart::pack_slen(data.len() as u16, pkt_status),
        };
        payload.extend_from_slice(&data_hdr.sn.to_le_bytes());
        payload.extend_from_slice(&data_hdr.slen.to_le_bytes());
        payload.extend_from_slice(data);

        let mut rest = &payload[..];
        let mut first = true;
        let mut ts_flag = timestamp.is_some();
        loop {
            let fits = rest.len() <= payload_mtu;
            let pb = match (first, fits) {
                (true, true) => hci::IsoBoundary::Complete,
                (true, false) => hci::IsoBoundary::First,
                (false, true) => hci::IsoBoundary::Last,
                (false, false) => hci::IsoBoundary::Continuation,
            };
            let count = rest.len().min(payload_mtu);
            let (chunk, tail) = rest.split_at(count);

            let hdr = IsoHeader::new(handle, hci::iso_flags(pb as u8, ts_flag), count as u16);
            let mut frame = Vec::with_capacity(1 + IsoHeader::SIZE + count);
            frame.push(PacketType::IsoData.into());
            frame.extend_from_slice(&hdr.handle.to_le_bytes());
            frame.extend_from_slice(&hdr.dlen.to_le_bytes());
            frame.extend_from_slice(chunk);
            self.send_packet(&frame);

            first = false;
            ts_flag = false;
            rest = tail;
            if rest.is_empty() {
                break;
            }
        }
    }

    // ---- ACL / SCO / ISO receive paths ----

    fn process_acl(&mut self, data: &[u8]) {
        if data.len() < AclHeader::SIZE {
            return;
        }
        let word = LittleEndian::read_u16(&data[0..2]);
        let dlen = LittleEndian::read_u16(&data[2..4]);
        if data.len() != AclHeader::SIZE + usize::from(dlen) {
            return;
        }

        let handle = hci::handle(word);
        let flags = hci::flags(word);
        let payload = &data[AclHeader::SIZE..];

        let idx = match self.conn_index(handle) {
            Some(idx) => idx,
            None => {
                debug!("Unknown handle: 0x{:04x}", handle);
                return;
            }
        };

        match flags {
            // Start of a PDU, flushable or not.
            0x00 | 0x02 => {
                if self.conns[idx].recv.is_some() {
                    warn!("Unexpected ACL start frame");
                    self.conns[idx].recv = None;
                }

                if payload.len() < 2 {
                    debug!("ACL start frame too short for L2CAP header");
                    return;
                }
                let l2_len = usize::from(LittleEndian::read_u16(&payload[0..2])) + L2capHeader::SIZE;

                debug!("acl_len {} l2_len {}", payload.len(), l2_len);

                if payload.len() == l2_len {
                    self.process_l2cap(idx, payload);
                    return;
                }

                self.conns[idx].recv = Some(RecvBuf::new(l2_len));
                self.append_acl_data(idx, flags, payload);
            }
            // Continuing fragment.
            0x01 => self.append_acl_data(idx, flags, payload),
            // Complete automatically-flushable PDU.
            0x03 => self.process_l2cap(idx, payload),
            _ => debug!("Invalid ACL frame flags 0x{:02x}", flags),
        }
    }

    fn append_acl_data(&mut self, idx: usize, flags: u8, chunk: &[u8]) {
        let complete = {
            let conn = &mut self.conns[idx];
            match conn.recv.as_mut() {
                Some(buf) => {
                    if buf.append(chunk) {
                        buf.is_complete()
                    } else {
                        warn!(
                            "Unexpected ACL frame: handle 0x{:04x} flags 0x{:02x}",
                            conn.handle, flags
                        );
                        return;
                    }
                }
                None => {
                    warn!(
                        "Unexpected ACL frame: handle 0x{:04x} flags 0x{:02x}",
                        conn.handle, flags
                    );
                    return;
                }
            }
        };

        if complete {
            let buf = self.conns[idx].recv.take().unwrap();
            self.process_l2cap(idx, &buf.data);
        }
    }

    fn process_sco(&mut self, data: &[u8]) {
        if data.len() < ScoHeader::SIZE {
            return;
        }
        let word = LittleEndian::read_u16(&data[0..2]);
        let dlen = data[2];
        if data.len() != ScoHeader::SIZE + usize::from(dlen) {
            return;
        }

        let handle = hci::handle(word);
        let status = hci::flags(word) & 0x03;

        let idx = match self.conn_index(handle) {
            Some(idx) => idx,
            None => {
                debug!("Unknown handle: 0x{:04x}", handle);
                return;
            }
        };

        debug!("SCO data: {} bytes", dlen);

        let func = match self.conns[idx].sco_hook.as_ref() {
            Some(hook) => hook.func.clone(),
            None => return,
        };
        func(self, &data[ScoHeader::SIZE..], status);
    }

    fn process_iso(&mut self, data: &[u8]) {
        if data.len() < IsoHeader::SIZE {
            return;
        }
        let word = LittleEndian::read_u16(&data[0..2]);
        let dlen = LittleEndian::read_u16(&data[2..4]);
        if data.len() != IsoHeader::SIZE + usize::from(dlen) {
            return;
        }

        let handle = hci::handle(word);
        let flags = hci::iso_flags_pb(hci::flags(word));
        let payload = &data[IsoHeader::SIZE..];

        let idx = match self.conn_index(handle) {
            Some(idx) => idx,
            None => {
                debug!("Unknown handle: 0x{:04x}", handle);
                return;
            }
        };

        match flags {
            0x00 | 0x02 => {
                if self.conns[idx].recv.is_some() {
                    warn!("Unexpected ISO start frame");
                    self.conns[idx].recv = None;
                }

                if payload.len() < 4 {
                    debug!("ISO start frame too short for load header");
                    return;
                }
                let data_len =
                    usize::from(LittleEndian::read_u16(&payload[2..4]) & 0x3fff) + IsoDataStart::SIZE;

                debug!("iso_len {} data_len {}", payload.len(), data_len);

                if payload.len() == data_len {
                    self.process_iso_data(idx, payload);
                    return;
                }

                self.conns[idx].recv = Some(RecvBuf::new(data_len));
                self.append_iso_data(idx, flags, payload);
            }
            0x01 | 0x03 => self.append_iso_data(idx, flags, payload),
            _ => debug!("Invalid ISO frame flags 0x{:02x}", flags),
        }
    }

    fn append_iso_data(&mut self, idx: usize, flags: u8, chunk: &[u8]) {
        let complete = {
            let conn = &mut self.conns[idx];
            match conn.recv.as_mut() {
                Some(buf) => {
                    if buf.append(chunk) {
                        buf.is_complete()
                    } else {
                        warn!(
                            "Unexpected ISO frame: handle 0x{:04x} flags 0x{:02x}",
                            conn.handle, flags
                        );
                        return;
                    }
                }
                None => {
                    warn!(
                        "Unexpected ISO frame: handle 0x{:04x} flags 0x{:02x}",
                        conn.handle, flags
                    );
                    return;
                }
            }
        };

        if !complete {
            // An end fragment must finish the SDU.
            if flags == 0x03 {
                warn!("Unexpected ISO end frame");
                self.conns[idx].recv = None;
            }
            return;
        }

        let buf = self.conns[idx].recv.take().unwrap();
        self.process_iso_data(idx, &buf.data);
    }

    fn process_iso_data(&mut self, idx: usize, data: &[u8]) {
        if data.len() < IsoDataStart::SIZE {
            return;
        }
        let sn = LittleEndian::read_u16(&data[0..2]);
        let slen = LittleEndian::read_u16(&data[2..4]);
        let data_len = usize::from(slen & 0x3fff);
        if data.len() != IsoDataStart::SIZE + data_len {
            debug!(
                "ISO invalid length: {} != {}",
                data.len(),
                IsoDataStart::SIZE + data_len
            );
            return;
        }

        debug!("ISO data: {} bytes ({})", data_len, sn);

        let func = match self.conns[idx].iso_hook.as_ref() {
            Some(hook) => hook.func.clone(),
            None => return,
        };
        func(self, &data[IsoDataStart::SIZE..]);
    }

    // ---- L2CAP signaling plumbing ----

    fn alloc_ident(&mut self) -> u8 {
        let ident = self.next_ident;
        self.next_ident = self.next_ident.wrapping_add(1);
        if self.next_ident == 0 {
            self.next_ident = 1;
        }
        ident
    }

    /// Sends a signaling PDU on the channel matching the link type. Ident 0 allocates a fresh
    /// one; the ident actually used is returned.
    pub(crate) fn l2cap_sig_send(
        &mut self,
        handle: u16,
        code: SigCode,
        ident: u8,
        payload: &[u8],
    ) -> u8 {
        let kind = match self.find_conn(handle) {
            Some(conn) => conn.addr.kind(),
            None => return 0,
        };

        let ident = if ident == 0 { self.alloc_ident() } else { ident };

        let hdr = SigHeader {
            code,
            ident,
            length: payload.len() as u16,
        };
        let mut hdr_buf = [0; SigHeader::SIZE];
        hdr.to_bytes(&mut crate::bytes::ByteWriter::new(&mut hdr_buf))
            .unwrap();

        let cid = if kind == AddrKind::BrEdr {
            Cid::SIGNALING
        } else {
            Cid::LE_SIGNALING
        };
        self.send_l2cap_frame(handle, cid.as_raw(), &[&hdr_buf, payload]);

        ident
    }

    /// Sends a signaling request and registers `cb` for the matching response.
    ///
    /// Outgoing connection requests (`ConnReq`, `LeConnReq`, `EcredConnReq`) record their source
    /// CID(s) so the eventual response can bind the peer's CIDs onto them.
    pub fn l2cap_req(
        &mut self,
        handle: u16,
        code: SigCode,
        payload: &[u8],
        cb: Option<L2capRspCb>,
    ) -> Result<(), Error> {
        if self.find_conn(handle).is_none() {
            return Err(Error::UnknownConn);
        }

        self.record_outgoing_conn_req(handle, code, payload);

        let ident = self.l2cap_sig_send(handle, code, 0, payload);
        if ident == 0 {
            return Err(Error::UnknownConn);
        }

        if let Some(cb) = cb {
            self.l2reqs.push(PendingReq { ident, cb });
        }

        Ok(())
    }

    fn record_outgoing_conn_req(&mut self, handle: u16, code: SigCode, payload: &[u8]) {
        use crate::bytes::{ByteReader, FromBytes};

        let conn = match self.find_conn_mut(handle) {
            Some(conn) => conn,
            None => return,
        };

        match code {
            SigCode::ConnReq => {
                if let Ok(req) = ConnReq::from_bytes(&mut ByteReader::new(payload)) {
                    conn.l2conns.push(L2Conn::new(req.scid, 0, req.psm));
                }
            }
            SigCode::LeConnReq => {
                if let Ok(req) = LeConnReq::from_bytes(&mut ByteReader::new(payload)) {
                    let mut l2conn = L2Conn::new(req.scid, 0, req.psm);
                    l2conn.mode = ChannelMode::LeCredits;
                    conn.l2conns.push(l2conn);
                }
            }
            SigCode::EcredConnReq => {
                if let Ok(req) = EcredConnReq::from_bytes(&mut ByteReader::new(payload)) {
                    for scid in req.scids {
                        let mut l2conn = L2Conn::new(scid, 0, req.psm);
                        l2conn.mode = ChannelMode::EnhancedCredits;
                        conn.l2conns.push(l2conn);
                    }
                }
            }
            _ => {}
        }
    }

    /// Completes every pending request whose ident matches.
    pub(crate) fn handle_pending_l2reqs(&mut self, ident: u8, code: SigCode, payload: &[u8]) {
        let reqs = std::mem::replace(&mut self.l2reqs, Vec::new());
        let mut matched = Vec::new();
        for req in reqs {
            if req.ident == ident {
                matched.push(req.cb);
            } else {
                self.l2reqs.push(req);
            }
        }
        for cb in matched {
            cb(self, code.into(), payload);
        }
    }

    // ---- servers ----

    /// Registers an L2CAP server for `psm` with protocol defaults for MTU, MPS and credits.
    pub fn add_l2cap_server<F>(&mut self, psm: u16, connect: F, disconnect: Option<L2capDisconnectCb>)
    where
        F: Fn(&mut Host, u16, u16) + 'static,
    {
        self.add_l2cap_server_custom(psm, 0, 0, 0, Some(Rc::new(connect)), disconnect);
    }

    /// Registers an L2CAP server for `psm`. Zero MTU/MPS/credit values fall back to the
    /// protocol defaults when a credit-based connection is accepted.
    pub fn add_l2cap_server_custom(
        &mut self,
        psm: u16,
        mtu: u16,
        mps: u16,
        credits: u16,
        connect: Option<L2capConnectCb>,
        disconnect: Option<L2capDisconnectCb>,
    ) {
        self.l2cap_servers.push(L2capServer {
            psm,
            mtu,
            mps,
            credits,
            connect,
            disconnect,
        });
    }

    pub(crate) fn l2cap_server_for_psm(&self, psm: u16) -> Option<&L2capServer> {
        self.l2cap_servers.iter().find(|server| server.psm == psm)
    }

    /// Registers an RFCOMM server on `channel`.
    pub fn add_rfcomm_server<F>(&mut self, channel: u8, connect: F)
    where
        F: Fn(&mut Host, u16, u16, bool) + 'static,
    {
        self.rfcomm_servers.push(RfcommServer {
            channel,
            connect: Some(Rc::new(connect)),
        });
    }

    pub(crate) fn rfcomm_server_for_channel(&self, channel: u8) -> Option<&RfcommServer> {
        self.rfcomm_servers
            .iter()
            .find(|server| server.channel == channel)
    }

    // ---- link control ----

    /// Creates an outgoing connection to `addr` (classic paging or LE initiation).
    pub fn hci_connect(&mut self, addr: Addr) {
        self.conn_init = true;

        if addr.is_bredr() {
            let cc = cmd::CreateConn {
                bdaddr: *addr.raw(),
                ..cmd::CreateConn::default()
            };
            self.send_command_obj(opcode::CREATE_CONN, &cc);
        } else {
            let cc = cmd::LeCreateConn {
                peer_addr: *addr.raw(),
                peer_addr_type: if addr.kind() == AddrKind::LeRandom { 0x01 } else { 0x00 },
                scan_interval: 0x0060,
                scan_window: 0x0030,
                min_interval: 0x0028,
                max_interval: 0x0038,
                supv_timeout: 0x002a,
                ..cmd::LeCreateConn::default()
            };
            self.send_command_obj(opcode::LE_CREATE_CONN, &cc);
        }
    }

    /// Creates an outgoing LE connection using the extended command on the 1M PHY.
    pub fn hci_ext_connect(&mut self, addr: Addr) {
        self.conn_init = true;

        let cc = cmd::LeExtCreateConn {
            peer_addr: *addr.raw(),
            peer_addr_type: if addr.kind() == AddrKind::LeRandom { 0x01 } else { 0x00 },
            phys: 0x01,
            scan_interval: 0x0060,
            scan_window: 0x0030,
            min_interval: 0x0028,
            max_interval: 0x0038,
            supv_timeout: 0x002a,
            ..cmd::LeExtCreateConn::default()
        };
        self.send_command_obj(opcode::LE_EXT_CREATE_CONN, &cc);
    }

    /// Requests disconnection of `handle`.
    pub fn hci_disconnect(&mut self, handle: u16, reason: u8) {
        let disc = cmd::Disconnect { handle, reason };
        self.send_command_obj(opcode::DISCONNECT, &disc);
    }

    /// Requests authentication on a classic link, or starts SMP pairing on an LE link.
    pub fn request_auth(&mut self, handle: u16) {
        let kind = match self.find_conn(handle) {
            Some(conn) => conn.addr.kind(),
            None => return,
        };

        if kind == AddrKind::BrEdr {
            let cp = cmd::AuthRequested { handle };
            self.send_command_obj(opcode::AUTH_REQUESTED, &cp);
        } else {
            let mut auth_req = self.auth_req;
            if self.sc {
                auth_req |= 0x08;
            }
            let io_capability = self.io_capability;
            self.with_smp(|smp, host| smp.pair(host, handle, io_capability, auth_req));
        }
    }

    /// Starts LE link encryption with the given key.
    pub fn le_start_encrypt(&mut self, handle: u16, ltk: [u8; 16]) {
        let cp = cmd::LeStartEncrypt {
            handle,
            rand: 0,
            ediv: 0,
            ltk,
        };
        self.send_command_obj(opcode::LE_START_ENCRYPT, &cp);
    }

    // ---- pairing knobs ----

    /// Configures the PIN used to answer `PIN Code Request`. At most 16 octets are kept.
    pub fn set_pin_code(&mut self, pin: &[u8]) {
        let len = pin.len().min(16);
        self.pin[..len].copy_from_slice(&pin[..len]);
        self.pin_len = len as u8;
    }

    /// Sets the I/O capability advertised in `IO Capability Request Reply`.
    pub fn set_io_capability(&mut self, io_capability: u8) {
        self.io_capability = io_capability;
    }

    /// Returns the configured I/O capability.
    pub fn io_capability(&self) -> u8 {
        self.io_capability
    }

    /// Sets the authentication requirements byte.
    pub fn set_auth_req(&mut self, auth_req: u8) {
        self.auth_req = auth_req;
    }

    /// Returns the authentication requirements, with the Secure Connections bit folded in.
    pub fn auth_req(&self) -> u8 {
        if self.sc {
            self.auth_req | 0x08
        } else {
            self.auth_req
        }
    }

    /// Enables Secure Connections support, informing a BR/EDR capable controller.
    pub fn set_sc_support(&mut self, enable: bool) {
        self.sc = enable;

        if !self.bredr_capable() {
            return;
        }

        self.send_command(opcode::WRITE_SECURE_CONN_SUPPORT, &[enable as u8]);
    }

    /// Makes `User Confirmation Request` answer negatively.
    pub fn set_reject_user_confirm(&mut self, reject: bool) {
        self.reject_user_confirm = reject;
    }

    /// Returns whether user confirmations are rejected.
    pub fn reject_user_confirm(&self) -> bool {
        self.reject_user_confirm
    }

    // ---- scan / advertise / ISO setup ----

    /// Writes the page/inquiry scan enable setting.
    pub fn write_scan_enable(&mut self, scan: u8) {
        self.send_command(opcode::WRITE_SCAN_ENABLE, &[scan]);
    }

    /// Writes the Simple Pairing mode setting.
    pub fn write_ssp_mode(&mut self, mode: u8) {
        self.send_command(opcode::WRITE_SIMPLE_PAIRING_MODE, &[mode]);
    }

    /// Writes LE host support and remembers it for the fixed-channel mask.
    pub fn write_le_host_supported(&mut self, mode: u8) {
        self.le = mode != 0;

        let cmd = cmd::WriteLeHostSupported {
            supported: mode,
            simultaneous: 0,
        };
        self.send_command_obj(opcode::WRITE_LE_HOST_SUPPORTED, &cmd);
    }

    /// Sets legacy advertising data. Data beyond the 31-octet field is truncated.
    pub fn set_adv_data(&mut self, data: &[u8]) {
        let mut cp = cmd::LeSetAdvData::default();
        let len = data.len().min(31);
        cp.len = len as u8;
        cp.data[..len].copy_from_slice(&data[..len]);
        self.send_command_obj(opcode::LE_SET_ADV_DATA, &cp);
    }

    /// Sets extended advertising data on set 1 as a single complete fragment.
    pub fn set_ext_adv_data(&mut self, data: &[u8]) {
        let mut cp = cmd::LeSetExtAdvData {
            handle: 1,
            operation: 0x03,
            fragment_preference: 0x01,
            ..cmd::LeSetExtAdvData::default()
        };
        let len = data.len().min(31);
        cp.data_len = len as u8;
        cp.data[..len].copy_from_slice(&data[..len]);
        self.send_command_obj(opcode::LE_SET_EXT_ADV_DATA, &cp);
    }

    /// Writes default advertising parameters and flips legacy advertising.
    pub fn set_adv_enable(&mut self, enable: u8) {
        let cp = cmd::LeSetAdvParameters::default();
        self.send_command_obj(opcode::LE_SET_ADV_PARAMETERS, &cp);

        self.send_command(opcode::LE_SET_ADV_ENABLE, &[enable]);
    }

    /// Writes LE scan parameters.
    pub fn set_scan_params(&mut self, scan_type: u8, addr_type: u8, filter_policy: u8) {
        let cp = cmd::LeSetScanParameters {
            scan_type,
            own_addr_type: addr_type,
            filter_policy,
            ..cmd::LeSetScanParameters::default()
        };
        self.send_command_obj(opcode::LE_SET_SCAN_PARAMETERS, &cp);
    }

    /// Flips LE scanning.
    pub fn set_scan_enable(&mut self, enable: u8) {
        let cp = cmd::LeSetScanEnable {
            enable,
            filter_dup: 0,
        };
        self.send_command_obj(opcode::LE_SET_SCAN_ENABLE, &cp);
    }

    /// Writes extended advertising parameters for set 1: connectable legacy events at a 20 ms
    /// interval.
    pub fn set_ext_adv_params(&mut self, sid: u8) {
        let cp = cmd::LeSetExtAdvParams {
            handle: 0x01,
            evt_properties: 0x0013,
            min_interval: 0x000020,
            max_interval: 0x000020,
            sid,
            ..cmd::LeSetExtAdvParams::default()
        };
        self.send_command_obj(opcode::LE_SET_EXT_ADV_PARAMS, &cp);
    }

    /// Flips extended advertising for set 1.
    pub fn set_ext_adv_enable(&mut self, enable: u8) {
        let cp = cmd::LeSetExtAdvEnable {
            enable,
            num_of_sets: 1,
            set_handle: 1,
            ..cmd::LeSetExtAdvEnable::default()
        };
        self.send_command_obj(opcode::LE_SET_EXT_ADV_ENABLE, &cp);
    }

    /// Writes periodic advertising parameters for set 1.
    pub fn set_pa_params(&mut self) {
        let cp = cmd::LeSetPaParams {
            handle: 0x01,
            ..cmd::LeSetPaParams::default()
        };
        self.send_command_obj(opcode::LE_SET_PA_PARAMS, &cp);
    }

    /// Sets periodic advertising data, splitting into operation-tagged fragments when the data
    /// exceeds one command's capacity.
    pub fn set_pa_data(&mut self, data: &[u8]) {
        const MAX_FRAGMENT: usize = 252;

        let mut offset = 0;
        loop {
            let remaining = data.len() - offset;
            let (chunk_len, operation) = if remaining > MAX_FRAGMENT {
                (MAX_FRAGMENT, if offset == 0 { 0x01 } else { 0x00 })
            } else {
                (remaining, if offset == 0 { 0x03 } else { 0x02 })
            };

            let cp = cmd::LeSetPaData {
                handle: 1,
                operation,
                data: data[offset..offset + chunk_len].to_vec(),
            };
            self.send_command_obj(opcode::LE_SET_PA_DATA, &cp);

            offset += chunk_len;
            if operation == 0x02 || operation == 0x03 {
                break;
            }
        }
    }

    /// Flips periodic advertising for set 1.
    pub fn set_pa_enable(&mut self, enable: u8) {
        let cp = cmd::LeSetPaEnable {
            enable,
            handle: 0x01,
        };
        self.send_command_obj(opcode::LE_SET_PA_ENABLE, &cp);
    }

    /// Creates a BIG with `num_bis` streams and a fixed 10 ms / 40-octet SDU QoS.
    pub fn create_big(&mut self, num_bis: u8, encryption: u8, bcode: [u8; 16]) {
        let cp = cmd::LeCreateBig {
            handle: 0x01,
            adv_handle: 0x01,
            num_bis,
            sdu_interval: 10000,
            sdu: 40,
            latency: 10,
            rtn: 0x02,
            phy: 0x02,
            packing: 0,
            framing: 0,
            encryption,
            bcode,
        };
        self.send_command_obj(opcode::LE_CREATE_BIG, &cp);
    }

    /// Configures a CIG with one CIS. Zeroed QoS fields mirror the opposite direction.
    pub fn set_cig_params(&mut self, cig_id: u8, cis_id: u8, qos: &cmd::IsoQos) {
        let pick = |a: u32, b: u32| if a != 0 { a } else { b };
        let pick16 = |a: u16, b: u16| if a != 0 { a } else { b };
        let pick8 = |a: u8, b: u8| if a != 0 { a } else { b };

        let cp = cmd::LeSetCigParams {
            cig_id,
            c_interval: pick(qos.input.interval, qos.output.interval),
            p_interval: pick(qos.output.interval, qos.input.interval),
            c_latency: pick16(qos.input.latency, qos.output.latency),
            p_latency: pick16(qos.output.latency, qos.input.latency),
            cis: vec![cmd::CigCis {
                cis_id,
                c_sdu: qos.input.sdu,
                p_sdu: qos.output.sdu,
                c_phy: pick8(qos.input.phy, qos.output.phy),
                p_phy: pick8(qos.output.phy, qos.input.phy),
                c_rtn: qos.input.rtn,
                p_rtn: qos.output.rtn,
            }],
            ..cmd::LeSetCigParams::default()
        };
        self.send_command_obj(opcode::LE_SET_CIG_PARAMS, &cp);
    }

    /// Creates one CIS on an existing ACL.
    pub fn create_cis(&mut self, cis_handle: u16, acl_handle: u16) {
        let cp = cmd::LeCreateCis {
            cis: vec![cmd::CisHandlePair {
                cis_handle,
                acl_handle,
            }],
        };
        self.send_command_obj(opcode::LE_CREATE_CIS, &cp);
    }

    /// Polls the extended-advertising report queue for `addr`.
    pub fn search_ext_adv_addr(&self, addr: &[u8; 6]) -> bool {
        self.ext_adv_reports
            .iter()
            .any(|report| &report.addr == addr)
    }

    // ---- completion hooks used by the event decoder ----

    pub(crate) fn read_bd_addr_complete(&mut self, bdaddr: [u8; 6]) {
        info!("ready, bdaddr {:?}", HexSlice(&bdaddr));

        self.bdaddr = bdaddr;
        self.ready = true;

        if let Some(cb) = self.ready_cb.take() {
            cb(self);
        }
    }

    pub(crate) fn read_local_features_complete(&mut self, features: [u8; 8]) {
        self.features = features;
    }

    pub(crate) fn dispatch_cmd_complete(&mut self, opcode: u16, status: u8, params: &[u8]) {
        if let Some(cb) = self.cmd_complete_cb.clone() {
            cb(self, opcode, status, params);
        }
    }
}

impl Default for Host {
    fn default() -> Self {
        Host::new()
    }
}

impl Drop for Host {
    fn drop(&mut self) {
        // Every pending signaling request gets its cancellation callback exactly once.
        while let Some(req) = self.l2reqs.pop() {
            (req.cb)(self, 0, &[]);
        }

        let conns = std::mem::replace(&mut self.conns, Vec::new());
        for conn in conns {
            self.teardown_conn(conn);
        }
    }
}
