use std::cell::{Cell, RefCell};
use std::rc::Rc;

use super::*;
use crate::hci::opcode;
use crate::rfcomm::{self, CmdFrame, FrameType};
use crate::security::SecurityManager;

type Wire = Rc<RefCell<Vec<Vec<u8>>>>;

fn host_with_wire() -> (Host, Wire) {
    let wire: Wire = Rc::new(RefCell::new(Vec::new()));
    let mut host = Host::new();
    let sink = wire.clone();
    host.set_send_handler(move |frame| sink.borrow_mut().push(frame.to_vec()));
    (host, wire)
}

fn evt(code: u8, params: &[u8]) -> Vec<u8> {
    let mut frame = vec![0x04, code, params.len() as u8];
    frame.extend_from_slice(params);
    frame
}

fn le_meta(subcode: u8, params: &[u8]) -> Vec<u8> {
    let mut inner = vec![subcode];
    inner.extend_from_slice(params);
    evt(0x3e, &inner)
}

fn cmd_complete(ncmd: u8, opcode: u16, rparams: &[u8]) -> Vec<u8> {
    let mut params = vec![ncmd];
    params.extend_from_slice(&opcode.to_le_bytes());
    params.extend_from_slice(rparams);
    evt(0x0e, &params)
}

/// Wraps an L2CAP frame for `cid` into a complete single-fragment ACL packet.
fn acl(handle: u16, cid: u16, payload: &[u8]) -> Vec<u8> {
    let mut frame = vec![0x02];
    frame.extend_from_slice(&hci::pack_handle(handle, 0x02).to_le_bytes());
    frame.extend_from_slice(&((payload.len() + 4) as u16).to_le_bytes());
    frame.extend_from_slice(&(payload.len() as u16).to_le_bytes());
    frame.extend_from_slice(&cid.to_le_bytes());
    frame.extend_from_slice(payload);
    frame
}

fn sig(code: u8, ident: u8, payload: &[u8]) -> Vec<u8> {
    let mut pdu = vec![code, ident];
    pdu.extend_from_slice(&(payload.len() as u16).to_le_bytes());
    pdu.extend_from_slice(payload);
    pdu
}

/// Splits a captured single-fragment ACL packet into `(handle, pb, cid, payload)`.
fn parse_acl(frame: &[u8]) -> (u16, u8, u16, Vec<u8>) {
    assert_eq!(frame[0], 0x02, "not an ACL packet: {:?}", frame);
    let word = u16::from_le_bytes([frame[1], frame[2]]);
    let cid = u16::from_le_bytes([frame[7], frame[8]]);
    (
        hci::handle(word),
        hci::flags(word) & 0x03,
        cid,
        frame[9..].to_vec(),
    )
}

/// Splits a captured signaling packet into `(code, ident, payload)`.
fn parse_sig(frame: &[u8]) -> (u8, u8, Vec<u8>) {
    let (_, _, cid, pdu) = parse_acl(frame);
    assert!(cid == 0x0001 || cid == 0x0005, "not a signaling frame");
    (pdu[0], pdu[1], pdu[4..].to_vec())
}

fn parse_cmd(frame: &[u8]) -> (u16, Vec<u8>) {
    assert_eq!(frame[0], 0x01, "not a command packet: {:?}", frame);
    (
        u16::from_le_bytes([frame[1], frame[2]]),
        frame[4..].to_vec(),
    )
}

fn bring_up(host: &mut Host, wire: &Wire) {
    host.start();
    host.receive_h4(&cmd_complete(1, opcode::RESET, &[0]));
    let mut features = vec![0];
    features.extend_from_slice(&[0; 8]);
    host.receive_h4(&cmd_complete(1, opcode::READ_LOCAL_FEATURES, &features));
    let mut bdaddr = vec![0];
    bdaddr.extend_from_slice(&[0xc0, 0xde, 0xc0, 0xde, 0x00, 0x00]);
    host.receive_h4(&cmd_complete(1, opcode::READ_BD_ADDR, &bdaddr));
    wire.borrow_mut().clear();
}

/// Establishes a BR/EDR ACL connection with the given handle.
fn bredr_conn(host: &mut Host, wire: &Wire, handle: u16) {
    let mut params = vec![0x00];
    params.extend_from_slice(&handle.to_le_bytes());
    params.extend_from_slice(&[0x11, 0x22, 0x33, 0x44, 0x55, 0x66]);
    params.push(0x01); // ACL link
    params.push(0x00);
    host.receive_h4(&evt(0x03, &params));
    wire.borrow_mut().clear();
}

/// Establishes an LE ACL connection with the given handle.
fn le_conn(host: &mut Host, wire: &Wire, handle: u16) {
    let mut params = vec![0x00];
    params.extend_from_slice(&handle.to_le_bytes());
    params.push(0x01); // peripheral role
    params.push(0x00); // public peer address
    params.extend_from_slice(&[0x11, 0x22, 0x33, 0x44, 0x55, 0x66]);
    params.extend_from_slice(&[0x28, 0x00, 0x00, 0x00, 0x2a, 0x00, 0x00]);
    host.receive_h4(&le_meta(0x01, &params));
    wire.borrow_mut().clear();
}

#[test]
fn start_sequence_respects_initial_credit() {
    let (mut host, wire) = host_with_wire();

    let ready = Rc::new(Cell::new(false));
    let flag = ready.clone();
    host.notify_ready(move |_| flag.set(true));

    host.start();
    // Only RESET fits into the single initial credit.
    assert_eq!(wire.borrow().len(), 1);
    assert_eq!(parse_cmd(&wire.borrow()[0]).0, opcode::RESET);

    host.receive_h4(&cmd_complete(1, opcode::RESET, &[0]));
    assert_eq!(wire.borrow().len(), 2);
    assert_eq!(parse_cmd(&wire.borrow()[1]).0, opcode::READ_LOCAL_FEATURES);

    let mut features = vec![0];
    features.extend_from_slice(&[0; 8]);
    host.receive_h4(&cmd_complete(1, opcode::READ_LOCAL_FEATURES, &features));
    assert_eq!(parse_cmd(&wire.borrow()[2]).0, opcode::READ_BD_ADDR);
    assert!(!ready.get());

    let mut bdaddr = vec![0];
    bdaddr.extend_from_slice(&[1, 2, 3, 4, 5, 6]);
    host.receive_h4(&cmd_complete(1, opcode::READ_BD_ADDR, &bdaddr));
    assert!(ready.get());
    assert_eq!(host.bdaddr(), &[1, 2, 3, 4, 5, 6]);
}

// Scenario: with one credit, three queued commands drain in FIFO order as soon as a single
// completion advertises enough credits.
#[test]
fn command_queuing_is_fifo() {
    let (mut host, wire) = host_with_wire();
    bring_up(&mut host, &wire);

    host.write_scan_enable(0x03);
    host.write_ssp_mode(0x01);
    host.write_le_host_supported(0x01);

    {
        let wire = wire.borrow();
        assert_eq!(wire.len(), 1);
        assert_eq!(parse_cmd(&wire[0]).0, opcode::WRITE_SCAN_ENABLE);
    }

    host.receive_h4(&cmd_complete(2, opcode::WRITE_SCAN_ENABLE, &[0]));

    let wire = wire.borrow();
    assert_eq!(wire.len(), 3);
    assert_eq!(parse_cmd(&wire[1]).0, opcode::WRITE_SIMPLE_PAIRING_MODE);
    assert_eq!(parse_cmd(&wire[2]).0, opcode::WRITE_LE_HOST_SUPPORTED);
}

#[test]
fn conn_request_is_accepted() {
    let (mut host, wire) = host_with_wire();
    bring_up(&mut host, &wire);

    let mut params = vec![0x11, 0x22, 0x33, 0x44, 0x55, 0x66];
    params.extend_from_slice(&[0, 0, 0]); // device class
    params.push(0x01);
    host.receive_h4(&evt(0x04, &params));

    let wire = wire.borrow();
    let (opcode, cp) = parse_cmd(&wire[0]);
    assert_eq!(opcode, opcode::ACCEPT_CONN_REQUEST);
    assert_eq!(&cp[..6], &[0x11, 0x22, 0x33, 0x44, 0x55, 0x66]);
}

#[test]
fn bredr_conn_probes_fixed_channels() {
    let (mut host, wire) = host_with_wire();
    bring_up(&mut host, &wire);

    let mut params = vec![0x00];
    params.extend_from_slice(&0x002au16.to_le_bytes());
    params.extend_from_slice(&[0x11, 0x22, 0x33, 0x44, 0x55, 0x66]);
    params.push(0x01);
    params.push(0x00);
    host.receive_h4(&evt(0x03, &params));

    let wire = wire.borrow();
    assert_eq!(wire.len(), 1);
    let (code, ident, payload) = parse_sig(&wire[0]);
    assert_eq!(code, 0x0a); // information request
    assert_eq!(ident, 1);
    assert_eq!(payload, vec![0x03, 0x00]); // fixed channels supported
}

// Scenario S1: BR/EDR PSM echo.
#[test]
fn bredr_psm_server_echo() {
    let (mut host, wire) = host_with_wire();
    bring_up(&mut host, &wire);
    bredr_conn(&mut host, &wire, 0x002a);

    let connected = Rc::new(Cell::new(None));
    let seen = connected.clone();
    host.add_l2cap_server(0x1001, move |_, handle, cid| seen.set(Some((handle, cid))), None);

    // Peer connects to the PSM with scid 0x0040.
    let mut req = Vec::new();
    req.extend_from_slice(&0x1001u16.to_le_bytes());
    req.extend_from_slice(&0x0040u16.to_le_bytes());
    host.receive_h4(&acl(0x002a, 0x0001, &sig(0x02, 0x05, &req)));

    {
        let wire = wire.borrow();
        assert_eq!(wire.len(), 2);

        let (code, ident, payload) = parse_sig(&wire[0]);
        assert_eq!(code, 0x03);
        assert_eq!(ident, 0x05);
        assert_eq!(u16::from_le_bytes([payload[0], payload[1]]), 0x0040); // dcid
        assert_eq!(u16::from_le_bytes([payload[2], payload[3]]), 0x0040); // scid
        assert_eq!(u16::from_le_bytes([payload[4], payload[5]]), 0); // success

        let (code, _, payload) = parse_sig(&wire[1]);
        assert_eq!(code, 0x04);
        assert_eq!(u16::from_le_bytes([payload[0], payload[1]]), 0x0040);
    }
    assert_eq!(connected.get(), Some((0x002a, 0x0040)));

    // Configuration completes and data flows back out unmodified.
    let mut rsp = Vec::new();
    rsp.extend_from_slice(&0x0040u16.to_le_bytes());
    rsp.extend_from_slice(&[0, 0, 0, 0]); // flags, success
    host.receive_h4(&acl(0x002a, 0x0001, &sig(0x05, 0x06, &rsp)));

    wire.borrow_mut().clear();
    let data = [0xde, 0xad, 0xbe, 0xef, 0xca, 0xfe, 0xba, 0xbe];
    host.send_cid(0x002a, 0x0040, &data);

    let wire = wire.borrow();
    assert_eq!(wire.len(), 1);
    let (handle, _, cid, payload) = parse_acl(&wire[0]);
    assert_eq!(handle, 0x002a);
    assert_eq!(cid, 0x0040);
    assert_eq!(payload, data);
}

#[test]
fn unknown_psm_is_refused() {
    let (mut host, wire) = host_with_wire();
    bring_up(&mut host, &wire);
    bredr_conn(&mut host, &wire, 0x002a);

    let mut req = Vec::new();
    req.extend_from_slice(&0x1003u16.to_le_bytes());
    req.extend_from_slice(&0x0040u16.to_le_bytes());
    host.receive_h4(&acl(0x002a, 0x0001, &sig(0x02, 0x07, &req)));

    let wire = wire.borrow();
    assert_eq!(wire.len(), 1);
    let (code, _, payload) = parse_sig(&wire[0]);
    assert_eq!(code, 0x03);
    assert_eq!(u16::from_le_bytes([payload[4], payload[5]]), 0x0002);
}

#[test]
fn info_request_reports_feature_mask() {
    let (mut host, wire) = host_with_wire();
    bring_up(&mut host, &wire);
    bredr_conn(&mut host, &wire, 0x002a);

    host.receive_h4(&acl(0x002a, 0x0001, &sig(0x0a, 0x09, &[0x02, 0x00])));

    let wire = wire.borrow();
    let (code, ident, payload) = parse_sig(&wire[0]);
    assert_eq!(code, 0x0b);
    assert_eq!(ident, 0x09);
    assert_eq!(payload, vec![0x02, 0x00, 0x00, 0x00, 0x80, 0x00, 0x00, 0x00]);
}

#[test]
fn malformed_signaling_is_rejected() {
    let (mut host, wire) = host_with_wire();
    bring_up(&mut host, &wire);
    bredr_conn(&mut host, &wire, 0x002a);

    // Header announces more payload than the PDU carries.
    host.receive_h4(&acl(0x002a, 0x0001, &[0x02, 0x01, 0x08, 0x00, 0x01]));

    let wire = wire.borrow();
    assert_eq!(wire.len(), 1);
    let (code, _, _) = parse_sig(&wire[0]);
    assert_eq!(code, 0x01);
}

// Scenario S2: LE COC SDU reassembly with per-PDU credit returns.
#[test]
fn le_coc_reassembles_sdu() {
    let (mut host, wire) = host_with_wire();
    bring_up(&mut host, &wire);
    le_conn(&mut host, &wire, 0x002a);

    host.add_l2cap_server_custom(0x0080, 100, 23, 2, None, None);

    let mut req = Vec::new();
    req.extend_from_slice(&0x0080u16.to_le_bytes());
    req.extend_from_slice(&0x0041u16.to_le_bytes()); // peer scid
    req.extend_from_slice(&100u16.to_le_bytes());
    req.extend_from_slice(&23u16.to_le_bytes());
    req.extend_from_slice(&2u16.to_le_bytes());
    host.receive_h4(&acl(0x002a, 0x0005, &sig(0x14, 0x03, &req)));

    let dcid;
    {
        let wire = wire.borrow();
        assert_eq!(wire.len(), 1);
        let (code, ident, payload) = parse_sig(&wire[0]);
        assert_eq!(code, 0x15);
        assert_eq!(ident, 0x03);
        dcid = u16::from_le_bytes([payload[0], payload[1]]);
        assert_eq!(dcid, 0x0040);
        assert_eq!(u16::from_le_bytes([payload[2], payload[3]]), 100); // mtu
        assert_eq!(u16::from_le_bytes([payload[4], payload[5]]), 23); // mps
        assert_eq!(u16::from_le_bytes([payload[6], payload[7]]), 2); // credits
        assert_eq!(u16::from_le_bytes([payload[8], payload[9]]), 0); // success
    }
    wire.borrow_mut().clear();

    let sdu_out: Rc<RefCell<Vec<u8>>> = Rc::new(RefCell::new(Vec::new()));
    let sink = sdu_out.clone();
    host.add_cid_hook(
        0x002a,
        dcid,
        move |_, data| sink.borrow_mut().extend_from_slice(data),
        None,
    );

    let data: Vec<u8> = (0..42).collect();

    // First K-frame: SDU length prefix plus the first 22 octets.
    let mut kframe = Vec::new();
    kframe.extend_from_slice(&42u16.to_le_bytes());
    kframe.extend_from_slice(&data[..22]);
    host.receive_h4(&acl(0x002a, dcid, &kframe));

    {
        let wire = wire.borrow();
        assert_eq!(wire.len(), 1); // a returned credit, no delivery yet
        let (code, _, payload) = parse_sig(&wire[0]);
        assert_eq!(code, 0x16);
        assert_eq!(u16::from_le_bytes([payload[0], payload[1]]), dcid);
        assert_eq!(u16::from_le_bytes([payload[2], payload[3]]), 1);
    }
    assert!(sdu_out.borrow().is_empty());

    // Second K-frame completes the SDU.
    host.receive_h4(&acl(0x002a, dcid, &data[22..]));

    {
        let wire = wire.borrow();
        assert_eq!(wire.len(), 2);
        let (code, _, _) = parse_sig(&wire[1]);
        assert_eq!(code, 0x16);
    }
    assert_eq!(*sdu_out.borrow(), data);
}

#[test]
fn oversized_sdu_continuation_is_dropped() {
    let (mut host, wire) = host_with_wire();
    bring_up(&mut host, &wire);
    le_conn(&mut host, &wire, 0x002a);

    host.add_l2cap_server_custom(0x0080, 0, 0, 0, None, None);

    let mut req = Vec::new();
    req.extend_from_slice(&0x0080u16.to_le_bytes());
    req.extend_from_slice(&0x0041u16.to_le_bytes());
    req.extend_from_slice(&[23, 0, 23, 0, 1, 0]);
    host.receive_h4(&acl(0x002a, 0x0005, &sig(0x14, 0x03, &req)));
    wire.borrow_mut().clear();

    let delivered = Rc::new(Cell::new(0));
    let count = delivered.clone();
    host.add_cid_hook(0x002a, 0x0040, move |_, _| count.set(count.get() + 1), None);

    // Announce 4 octets, then deliver 8 in the continuation.
    host.receive_h4(&acl(0x002a, 0x0040, &[4, 0, 1, 2]));
    host.receive_h4(&acl(0x002a, 0x0040, &[3, 4, 5, 6, 7, 8, 9, 10]));

    assert_eq!(delivered.get(), 0);
}

// Scenario S3: client-side RFCOMM open handshake.
#[test]
fn rfcomm_client_open() {
    let (mut host, wire) = host_with_wire();
    bring_up(&mut host, &wire);
    bredr_conn(&mut host, &wire, 0x002a);

    let result = Rc::new(Cell::new(None));
    let seen = result.clone();
    host.connect_rfcomm(0x002a, 3, move |_, _, _, success| seen.set(Some(success)))
        .unwrap();

    // The carrier L2CAP channel on PSM 0x0003 comes first.
    let ident;
    {
        let wire = wire.borrow();
        assert_eq!(wire.len(), 1);
        let (code, id, payload) = parse_sig(&wire[0]);
        assert_eq!(code, 0x02);
        assert_eq!(u16::from_le_bytes([payload[0], payload[1]]), 0x0003);
        assert_eq!(u16::from_le_bytes([payload[2], payload[3]]), 0x0040);
        ident = id;
    }
    wire.borrow_mut().clear();

    let mut rsp = Vec::new();
    rsp.extend_from_slice(&0x0040u16.to_le_bytes()); // dcid
    rsp.extend_from_slice(&0x0040u16.to_le_bytes()); // scid
    rsp.extend_from_slice(&[0, 0, 0, 0]);
    host.receive_h4(&acl(0x002a, 0x0001, &sig(0x03, ident, &rsp)));

    {
        let wire = wire.borrow();
        assert_eq!(wire.len(), 1);
        assert_eq!(parse_sig(&wire[0]).0, 0x04); // configure request
    }
    wire.borrow_mut().clear();

    let mut conf = Vec::new();
    conf.extend_from_slice(&0x0040u16.to_le_bytes());
    conf.extend_from_slice(&[0, 0, 0, 0]);
    host.receive_h4(&acl(0x002a, 0x0001, &sig(0x05, 0x0a, &conf)));

    // Configuration done: SABM on DLCI 0.
    {
        let wire = wire.borrow();
        assert_eq!(wire.len(), 1);
        let (_, _, cid, payload) = parse_acl(&wire[0]);
        assert_eq!(cid, 0x0040);
        assert_eq!(payload[0], rfcomm::address(1, 0));
        assert_eq!(rfcomm::control_type(payload[1]), FrameType::Sabm);
        assert_eq!(payload[3], rfcomm::fcs(&payload[..3]));
    }
    wire.borrow_mut().clear();

    // UA on DLCI 0 triggers parameter negotiation for DLCI 6.
    let ua = CmdFrame::new(FrameType::Ua, 1, 0);
    host.receive_h4(&acl(
        0x002a,
        0x0040,
        &[ua.address, ua.control, ua.length, ua.fcs],
    ));

    {
        let wire = wire.borrow();
        assert_eq!(wire.len(), 1);
        let (_, _, cid, payload) = parse_acl(&wire[0]);
        assert_eq!(cid, 0x0040);
        assert_eq!(rfcomm::control_type(payload[1]), FrameType::Uih);
        assert_eq!(payload[3], rfcomm::mcc_type(1, rfcomm::MccType::Pn));
        assert_eq!(payload[5], 6); // dlci = channel * 2
        assert_eq!(payload[12], 7); // initial credits
        assert_eq!(payload[13], rfcomm::fcs(&payload[..2]));
    }
    wire.borrow_mut().clear();

    // PN response: SABM moves to the data DLCI.
    let mut pn_rsp = vec![
        rfcomm::address(1, 0),
        rfcomm::control(FrameType::Uih, 0),
        rfcomm::len8(10),
        rfcomm::mcc_type(0, rfcomm::MccType::Pn),
        rfcomm::len8(8),
    ];
    pn_rsp.extend_from_slice(&[6, 0, 7, 0, 0x9b, 0x02, 0, 7]);
    pn_rsp.push(rfcomm::fcs(&pn_rsp[..2]));
    host.receive_h4(&acl(0x002a, 0x0040, &pn_rsp));

    {
        let wire = wire.borrow();
        assert_eq!(wire.len(), 1);
        let (_, _, _, payload) = parse_acl(&wire[0]);
        assert_eq!(payload[0], rfcomm::address(1, 6));
        assert_eq!(rfcomm::control_type(payload[1]), FrameType::Sabm);
    }
    wire.borrow_mut().clear();
    assert_eq!(result.get(), None);

    // UA on the data DLCI completes the connect.
    let ua = CmdFrame::new(FrameType::Ua, 1, 6);
    host.receive_h4(&acl(
        0x002a,
        0x0040,
        &[ua.address, ua.control, ua.length, ua.fcs],
    ));
    assert_eq!(result.get(), Some(true));

    // Data now flows in UIH frames on the open channel.
    host.send_rfcomm_data(0x002a, 3, b"ping");
    let wire = wire.borrow();
    let (_, _, cid, payload) = parse_acl(&wire[0]);
    assert_eq!(cid, 0x0040);
    assert_eq!(payload[0], rfcomm::address(1, 6));
    assert_eq!(rfcomm::control_type(payload[1]), FrameType::Uih);
    assert_eq!(payload[2], rfcomm::len8(4));
    assert_eq!(&payload[3..7], b"ping");
    assert_eq!(payload[7], rfcomm::fcs(&payload[..2]));
}

#[test]
fn rfcomm_server_accepts_known_channel() {
    let (mut host, wire) = host_with_wire();
    bring_up(&mut host, &wire);
    bredr_conn(&mut host, &wire, 0x002a);

    let accepted = Rc::new(Cell::new(false));
    let seen = accepted.clone();
    host.add_rfcomm_server(5, move |_, _, _, success| seen.set(success));

    // Establish the carrier channel from the peer side.
    let mut req = Vec::new();
    req.extend_from_slice(&0x0003u16.to_le_bytes());
    req.extend_from_slice(&0x0040u16.to_le_bytes());
    host.add_l2cap_server(0x0003, |_, _, _| {}, None);
    host.receive_h4(&acl(0x002a, 0x0001, &sig(0x02, 0x01, &req)));
    wire.borrow_mut().clear();

    // Multiplexer open.
    let sabm = CmdFrame::new(FrameType::Sabm, 1, 0);
    host.receive_h4(&acl(
        0x002a,
        0x0040,
        &[sabm.address, sabm.control, sabm.length, sabm.fcs],
    ));
    {
        let wire = wire.borrow();
        assert_eq!(wire.len(), 1);
        let (_, _, _, payload) = parse_acl(&wire[0]);
        assert_eq!(rfcomm::control_type(payload[1]), FrameType::Ua);
    }
    wire.borrow_mut().clear();

    // SABM on the data DLCI for the registered channel.
    let sabm = CmdFrame::new(FrameType::Sabm, 1, 10);
    host.receive_h4(&acl(
        0x002a,
        0x0040,
        &[sabm.address, sabm.control, sabm.length, sabm.fcs],
    ));
    {
        let wire = wire.borrow();
        let (_, _, _, payload) = parse_acl(&wire[0]);
        assert_eq!(rfcomm::control_type(payload[1]), FrameType::Ua);
        assert_eq!(rfcomm::addr_dlci(payload[0]), 10);
    }
    assert!(accepted.get());
    wire.borrow_mut().clear();

    // An unregistered channel is refused with DM.
    let sabm = CmdFrame::new(FrameType::Sabm, 1, 14);
    host.receive_h4(&acl(
        0x002a,
        0x0040,
        &[sabm.address, sabm.control, sabm.length, sabm.fcs],
    ));
    let wire = wire.borrow();
    let (_, _, _, payload) = parse_acl(&wire[0]);
    assert_eq!(rfcomm::control_type(payload[1]), FrameType::Dm);
}

// Scenario S5: LTK requests are answered from the security manager, negatively on a miss.
#[test]
fn ltk_request_consults_security_manager() {
    struct OneKey;

    impl SecurityManager for OneKey {
        fn get_ltk(&mut self, _handle: u16, rand: u64, ediv: u16) -> Option<[u8; 16]> {
            if rand == 0x0102030405060708 && ediv == 0x1234 {
                Some([0xaa; 16])
            } else {
                None
            }
        }
    }

    let (mut host, wire) = host_with_wire();
    host.set_security_manager(Box::new(OneKey));
    bring_up(&mut host, &wire);
    le_conn(&mut host, &wire, 0x002a);

    let mut params = Vec::new();
    params.extend_from_slice(&0x002au16.to_le_bytes());
    params.extend_from_slice(&0x0102030405060708u64.to_le_bytes());
    params.extend_from_slice(&0x1234u16.to_le_bytes());
    host.receive_h4(&le_meta(0x05, &params));

    {
        let wire = wire.borrow();
        let (opcode, cp) = parse_cmd(&wire[0]);
        assert_eq!(opcode, opcode::LE_LTK_REQ_REPLY);
        assert_eq!(u16::from_le_bytes([cp[0], cp[1]]), 0x002a);
        assert_eq!(&cp[2..], &[0xaa; 16][..]);
    }
    wire.borrow_mut().clear();

    let mut params = Vec::new();
    params.extend_from_slice(&0x002au16.to_le_bytes());
    params.extend_from_slice(&0xffffffffffffffffu64.to_le_bytes());
    params.extend_from_slice(&0x0000u16.to_le_bytes());
    host.receive_h4(&le_meta(0x05, &params));

    let wire = wire.borrow();
    let (opcode, cp) = parse_cmd(&wire[0]);
    assert_eq!(opcode, opcode::LE_LTK_REQ_NEG_REPLY);
    assert_eq!(u16::from_le_bytes([cp[0], cp[1]]), 0x002a);
}

// Scenario S6: teardown runs every destroy callback exactly once and silences the data path.
#[test]
fn disconnection_runs_destroy_callbacks_once() {
    let (mut host, wire) = host_with_wire();
    bring_up(&mut host, &wire);
    bredr_conn(&mut host, &wire, 0x002a);

    let cid_destroyed = Rc::new(Cell::new(0));
    let sco_destroyed = Rc::new(Cell::new(0));

    let counter = cid_destroyed.clone();
    host.add_cid_hook(
        0x002a,
        0x0040,
        |_, _| {},
        Some(Box::new(move || counter.set(counter.get() + 1))),
    );
    let counter = sco_destroyed.clone();
    host.add_sco_hook(
        0x002a,
        |_, _, _| {},
        Some(Box::new(move || counter.set(counter.get() + 1))),
    );

    let mut params = vec![0x00];
    params.extend_from_slice(&0x002au16.to_le_bytes());
    params.push(0x13);
    host.receive_h4(&evt(0x05, &params));

    assert_eq!(cid_destroyed.get(), 1);
    assert_eq!(sco_destroyed.get(), 1);

    wire.borrow_mut().clear();
    host.send_cid(0x002a, 0x0040, &[1, 2, 3]);
    assert!(wire.borrow().is_empty());

    // Repeating the event must not fire the callbacks again.
    let mut params = vec![0x00];
    params.extend_from_slice(&0x002au16.to_le_bytes());
    params.push(0x13);
    host.receive_h4(&evt(0x05, &params));
    assert_eq!(cid_destroyed.get(), 1);
    assert_eq!(sco_destroyed.get(), 1);
}

// Universal property: fragment payloads concatenate back to the original frame and PB flags
// follow the start/continuation pattern.
#[test]
fn acl_fragmentation_round_trip() {
    let (mut host, wire) = host_with_wire();
    bring_up(&mut host, &wire);
    bredr_conn(&mut host, &wire, 0x002a);

    host.set_acl_mtu(10);

    let data: Vec<u8> = (0..20).collect();
    host.send_cid(0x002a, 0x0040, &data);

    let wire = wire.borrow();
    // 24 octets of L2CAP frame over a 5-octet fragment payload.
    assert_eq!(wire.len(), 5);

    let mut reassembled = Vec::new();
    for (i, frame) in wire.iter().enumerate() {
        let word = u16::from_le_bytes([frame[1], frame[2]]);
        let dlen = u16::from_le_bytes([frame[3], frame[4]]);
        assert_eq!(frame.len(), 5 + usize::from(dlen));
        let expected_pb = if i == 0 { 0x00 } else { 0x01 };
        assert_eq!(hci::flags(word) & 0x03, expected_pb);
        reassembled.extend_from_slice(&frame[5..]);
    }

    assert_eq!(u16::from_le_bytes([reassembled[0], reassembled[1]]), 20);
    assert_eq!(u16::from_le_bytes([reassembled[2], reassembled[3]]), 0x0040);
    assert_eq!(&reassembled[4..], &data[..]);
}

#[test]
fn acl_reassembly_accepts_fragmented_pdu() {
    let (mut host, wire) = host_with_wire();
    bring_up(&mut host, &wire);
    bredr_conn(&mut host, &wire, 0x002a);

    let received: Rc<RefCell<Vec<u8>>> = Rc::new(RefCell::new(Vec::new()));
    let sink = received.clone();
    host.add_cid_hook(
        0x002a,
        0x0040,
        move |_, data| sink.borrow_mut().extend_from_slice(data),
        None,
    );

    let payload: Vec<u8> = (0..10).collect();
    let mut l2 = Vec::new();
    l2.extend_from_slice(&10u16.to_le_bytes());
    l2.extend_from_slice(&0x0040u16.to_le_bytes());
    l2.extend_from_slice(&payload);

    // Start fragment with 6 octets, continuation with the rest.
    let mut first = vec![0x02];
    first.extend_from_slice(&hci::pack_handle(0x002a, 0x00).to_le_bytes());
    first.extend_from_slice(&6u16.to_le_bytes());
    first.extend_from_slice(&l2[..6]);
    host.receive_h4(&first);
    assert!(received.borrow().is_empty());

    let mut cont = vec![0x02];
    cont.extend_from_slice(&hci::pack_handle(0x002a, 0x01).to_le_bytes());
    cont.extend_from_slice(&((l2.len() - 6) as u16).to_le_bytes());
    cont.extend_from_slice(&l2[6..]);
    host.receive_h4(&cont);

    assert_eq!(*received.borrow(), payload);
}

#[test]
fn iso_single_and_multi_fragment() {
    let (mut host, wire) = host_with_wire();
    bring_up(&mut host, &wire);

    // CIS establishment creates the ISO connection.
    let mut params = vec![0x00];
    params.extend_from_slice(&0x0060u16.to_le_bytes());
    params.extend_from_slice(&[0; 26]);
    host.receive_h4(&le_meta(0x19, &params));
    wire.borrow_mut().clear();

    let data: Vec<u8> = (0..16).collect();
    host.send_iso(0x0060, None, 7, 0, &data);
    {
        let wire = wire.borrow();
        assert_eq!(wire.len(), 1);
        let word = u16::from_le_bytes([wire[0][1], wire[0][2]]);
        assert_eq!(hci::iso_flags_pb(hci::flags(word)), 0x02);
        assert_eq!(u16::from_le_bytes([wire[0][5], wire[0][6]]), 7); // sequence number
        assert_eq!(u16::from_le_bytes([wire[0][7], wire[0][8]]), 16); // SDU length
        assert_eq!(&wire[0][9..], &data[..]);
    }
    wire.borrow_mut().clear();

    host.set_iso_mtu(12);
    host.send_iso(0x0060, None, 8, 0, &data);

    let wire = wire.borrow();
    // 20 octets of load (4 header + 16 data) over 8-octet fragments.
    assert_eq!(wire.len(), 3);
    let pbs: Vec<u8> = wire
        .iter()
        .map(|frame| {
            let word = u16::from_le_bytes([frame[1], frame[2]]);
            hci::iso_flags_pb(hci::flags(word))
        })
        .collect();
    assert_eq!(pbs, vec![0x00, 0x01, 0x03]);

    let mut load = Vec::new();
    for frame in wire.iter() {
        load.extend_from_slice(&frame[5..]);
    }
    assert_eq!(u16::from_le_bytes([load[0], load[1]]), 8);
    assert_eq!(&load[4..], &data[..]);
}

#[test]
fn iso_receive_delivers_to_hook() {
    let (mut host, wire) = host_with_wire();
    bring_up(&mut host, &wire);

    let mut params = vec![0x00];
    params.extend_from_slice(&0x0060u16.to_le_bytes());
    params.extend_from_slice(&[0; 26]);
    host.receive_h4(&le_meta(0x19, &params));
    wire.borrow_mut().clear();

    let received: Rc<RefCell<Vec<u8>>> = Rc::new(RefCell::new(Vec::new()));
    let sink = received.clone();
    host.add_iso_hook(
        0x0060,
        move |_, data| sink.borrow_mut().extend_from_slice(data),
        None,
    );

    let data: Vec<u8> = (0..24).collect();
    let mut load = Vec::new();
    load.extend_from_slice(&3u16.to_le_bytes());
    load.extend_from_slice(&(data.len() as u16).to_le_bytes());
    load.extend_from_slice(&data);

    // First fragment, then the final one.
    let mut first = vec![0x05];
    first.extend_from_slice(&hci::pack_handle(0x0060, hci::iso_flags(0x00, false)).to_le_bytes());
    first.extend_from_slice(&16u16.to_le_bytes());
    first.extend_from_slice(&load[..16]);
    host.receive_h4(&first);
    assert!(received.borrow().is_empty());

    let mut last = vec![0x05];
    last.extend_from_slice(&hci::pack_handle(0x0060, hci::iso_flags(0x03, false)).to_le_bytes());
    last.extend_from_slice(&((load.len() - 16) as u16).to_le_bytes());
    last.extend_from_slice(&load[16..]);
    host.receive_h4(&last);

    assert_eq!(*received.borrow(), data);
}

#[test]
fn conn_param_update_triggers_conn_update_command() {
    let (mut host, wire) = host_with_wire();
    bring_up(&mut host, &wire);
    le_conn(&mut host, &wire, 0x002a);

    let mut req = Vec::new();
    req.extend_from_slice(&0x0010u16.to_le_bytes());
    req.extend_from_slice(&0x0020u16.to_le_bytes());
    req.extend_from_slice(&0x0004u16.to_le_bytes());
    req.extend_from_slice(&0x01f4u16.to_le_bytes());
    host.receive_h4(&acl(0x002a, 0x0005, &sig(0x12, 0x02, &req)));

    let wire = wire.borrow();
    assert_eq!(wire.len(), 2);

    let (opcode, cp) = parse_cmd(&wire[0]);
    assert_eq!(opcode, opcode::LE_CONN_UPDATE);
    assert_eq!(u16::from_le_bytes([cp[0], cp[1]]), 0x002a);
    assert_eq!(u16::from_le_bytes([cp[2], cp[3]]), 0x0010);
    assert_eq!(u16::from_le_bytes([cp[10], cp[11]]), 0x0001); // min ce length

    let (code, ident, payload) = parse_sig(&wire[1]);
    assert_eq!(code, 0x13);
    assert_eq!(ident, 0x02);
    assert_eq!(payload, vec![0, 0]);
}

#[test]
fn ecred_conn_allocates_up_to_five_channels() {
    let (mut host, wire) = host_with_wire();
    bring_up(&mut host, &wire);
    le_conn(&mut host, &wire, 0x002a);

    host.add_l2cap_server_custom(0x0080, 0, 0, 0, None, None);

    let mut req = Vec::new();
    req.extend_from_slice(&0x0080u16.to_le_bytes());
    req.extend_from_slice(&[64, 0, 64, 0, 1, 0]);
    for scid in 0x0050u16..0x0056 {
        req.extend_from_slice(&scid.to_le_bytes());
    }
    host.receive_h4(&acl(0x002a, 0x0005, &sig(0x17, 0x04, &req)));

    let wire = wire.borrow();
    let (code, ident, payload) = parse_sig(&wire[0]);
    assert_eq!(code, 0x18);
    assert_eq!(ident, 0x04);
    assert_eq!(u16::from_le_bytes([payload[0], payload[1]]), 64);
    assert_eq!(u16::from_le_bytes([payload[6], payload[7]]), 0); // success
    // Six requested channels, five accepted.
    assert_eq!(payload.len(), 8 + 5 * 2);
    for (i, dcid) in payload[8..].chunks(2).enumerate() {
        assert_eq!(
            u16::from_le_bytes([dcid[0], dcid[1]]),
            0x0040 + i as u16
        );
    }
}

#[test]
fn pending_request_callback_fires_on_response() {
    let (mut host, wire) = host_with_wire();
    bring_up(&mut host, &wire);
    bredr_conn(&mut host, &wire, 0x002a);

    let answered = Rc::new(Cell::new(None));
    let seen = answered.clone();
    let mut req = Vec::new();
    req.extend_from_slice(&0x1001u16.to_le_bytes());
    req.extend_from_slice(&0x0040u16.to_le_bytes());
    host.l2cap_req(
        0x002a,
        crate::l2cap::signaling::SigCode::ConnReq,
        &req,
        Some(Box::new(move |_, code, _| seen.set(Some(code)))),
    )
    .unwrap();

    let ident = {
        let wire = wire.borrow();
        parse_sig(&wire[0]).1
    };

    let mut rsp = Vec::new();
    rsp.extend_from_slice(&0x0041u16.to_le_bytes());
    rsp.extend_from_slice(&0x0040u16.to_le_bytes());
    rsp.extend_from_slice(&[0, 0, 0, 0]);
    host.receive_h4(&acl(0x002a, 0x0001, &sig(0x03, ident, &rsp)));

    assert_eq!(answered.get(), Some(0x03));
}

#[test]
fn pending_requests_are_cancelled_on_drop() {
    let (mut host, wire) = host_with_wire();
    bring_up(&mut host, &wire);
    bredr_conn(&mut host, &wire, 0x002a);

    let cancelled = Rc::new(Cell::new(None));
    let seen = cancelled.clone();
    let mut req = Vec::new();
    req.extend_from_slice(&0x1001u16.to_le_bytes());
    req.extend_from_slice(&0x0040u16.to_le_bytes());
    host.l2cap_req(
        0x002a,
        crate::l2cap::signaling::SigCode::ConnReq,
        &req,
        Some(Box::new(move |_, code, data| {
            seen.set(Some((code, data.len())))
        })),
    )
    .unwrap();

    drop(host);
    assert_eq!(cancelled.get(), Some((0, 0)));
}

#[test]
fn second_sco_hook_is_a_no_op() {
    let (mut host, wire) = host_with_wire();
    bring_up(&mut host, &wire);
    bredr_conn(&mut host, &wire, 0x002a);

    let first = Rc::new(Cell::new(0));
    let second = Rc::new(Cell::new(0));

    let counter = first.clone();
    host.add_sco_hook(0x002a, move |_, _, _| counter.set(counter.get() + 1), None);
    let counter = second.clone();
    host.add_sco_hook(0x002a, move |_, _, _| counter.set(counter.get() + 1), None);

    let mut frame = vec![0x03];
    frame.extend_from_slice(&hci::pack_handle(0x002a, 0x01).to_le_bytes());
    frame.push(3);
    frame.extend_from_slice(&[1, 2, 3]);
    host.receive_h4(&frame);

    assert_eq!(first.get(), 1);
    assert_eq!(second.get(), 0);
}

#[test]
fn ext_adv_reports_are_queued_and_searchable() {
    let (mut host, wire) = host_with_wire();
    bring_up(&mut host, &wire);

    let mut report = vec![0x01]; // one report
    report.extend_from_slice(&[0x13, 0x00]); // event type
    report.push(0x01); // random address
    report.extend_from_slice(&[0x0b, 0x0e, 0x0e, 0x0f, 0x00, 0x0d]);
    report.extend_from_slice(&[0; 7]);
    report.push(0x00);
    report.extend_from_slice(&[0; 6]);
    report.push(0x02); // data
    report.extend_from_slice(&[0xaa, 0xbb]);
    host.receive_h4(&le_meta(0x0d, &report));

    assert!(host.search_ext_adv_addr(&[0x0b, 0x0e, 0x0e, 0x0f, 0x00, 0x0d]));
    assert!(!host.search_ext_adv_addr(&[0; 6]));
    assert!(wire.borrow().is_empty());
}

#[test]
fn cis_request_honours_accept_filter() {
    let (mut host, wire) = host_with_wire();
    bring_up(&mut host, &wire);

    host.set_iso_cb(
        Some(|_: &mut Host, cis_handle: u16| if cis_handle == 0x0061 { 0x0d } else { 0 }),
        |_, _| {},
    );

    let mut params = Vec::new();
    params.extend_from_slice(&0x002au16.to_le_bytes());
    params.extend_from_slice(&0x0060u16.to_le_bytes());
    params.extend_from_slice(&[1, 1]);
    host.receive_h4(&le_meta(0x1a, &params));
    {
        let wire = wire.borrow();
        let (opcode, cp) = parse_cmd(&wire[0]);
        assert_eq!(opcode, opcode::LE_ACCEPT_CIS);
        assert_eq!(u16::from_le_bytes([cp[0], cp[1]]), 0x0060);
    }
    wire.borrow_mut().clear();

    let mut params = Vec::new();
    params.extend_from_slice(&0x002au16.to_le_bytes());
    params.extend_from_slice(&0x0061u16.to_le_bytes());
    params.extend_from_slice(&[1, 2]);
    host.receive_h4(&le_meta(0x1a, &params));

    let wire = wire.borrow();
    let (opcode, cp) = parse_cmd(&wire[0]);
    assert_eq!(opcode, opcode::LE_REJECT_CIS);
    assert_eq!(u16::from_le_bytes([cp[0], cp[1]]), 0x0061);
    assert_eq!(cp[2], 0x0d);
}

#[test]
fn user_confirm_follows_reject_knob() {
    let (mut host, wire) = host_with_wire();
    bring_up(&mut host, &wire);
    bredr_conn(&mut host, &wire, 0x002a);

    let mut params = vec![0x11, 0x22, 0x33, 0x44, 0x55, 0x66];
    params.extend_from_slice(&123456u32.to_le_bytes());
    host.receive_h4(&evt(0x33, &params));
    {
        let wire = wire.borrow();
        assert_eq!(parse_cmd(&wire[0]).0, opcode::USER_CONFIRM_REQUEST_REPLY);
    }
    wire.borrow_mut().clear();

    host.set_reject_user_confirm(true);
    let mut params = vec![0x11, 0x22, 0x33, 0x44, 0x55, 0x66];
    params.extend_from_slice(&123456u32.to_le_bytes());
    host.receive_h4(&evt(0x33, &params));

    let wire = wire.borrow();
    assert_eq!(
        parse_cmd(&wire[0]).0,
        opcode::USER_CONFIRM_REQUEST_NEG_REPLY
    );
}
