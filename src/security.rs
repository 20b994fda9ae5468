//! The Security Manager seam.
//!
//! Pairing and key management are not part of this crate. The host forwards everything
//! security-related through the [`SecurityManager`] trait: SMP PDUs arriving on the fixed L2CAP
//! channels `0x0006` (LE) and `0x0007` (BR/EDR), LTK lookups for `LE Long Term Key Request`, and
//! notifications about connection and encryption state. An implementation that wants to talk back
//! (eg. answer a pairing request) receives the [`Host`] and may call any of its public
//! operations.
//!
//! The default, [`NoSecurity`], ignores everything and never produces a key, which makes the
//! host answer LTK requests negatively and otherwise behave like a stack with no pairing support.
//!
//! [`SecurityManager`]: trait.SecurityManager.html
//! [`NoSecurity`]: struct.NoSecurity.html
//! [`Host`]: ../host/struct.Host.html

use crate::{Addr, Host};

/// Hooks through which the host consumes an external Security Manager.
pub trait SecurityManager {
    /// A new ACL connection was established.
    ///
    /// `initiator` is true when this host created the connection.
    fn conn_added(&mut self, _handle: u16, _local: Addr, _peer: Addr, _initiator: bool) {}

    /// The connection was torn down; all per-connection pairing state should be released.
    fn conn_removed(&mut self, _handle: u16) {}

    /// An SMP PDU arrived on the LE security manager channel (CID `0x0006`).
    fn deliver(&mut self, _host: &mut Host, _handle: u16, _data: &[u8]) {}

    /// An SMP PDU arrived on the BR/EDR security manager channel (CID `0x0007`).
    fn deliver_bredr(&mut self, _host: &mut Host, _handle: u16, _data: &[u8]) {}

    /// Looks up the Long Term Key identified by `rand` and `ediv`.
    ///
    /// Returning `None` makes the host send `LE Long Term Key Request Negative Reply`.
    fn get_ltk(&mut self, _handle: u16, _rand: u64, _ediv: u16) -> Option<[u8; 16]> {
        None
    }

    /// Link encryption changed to `encr_mode`.
    fn encrypted(&mut self, _host: &mut Host, _handle: u16, _encr_mode: u8) {}

    /// The application asked to pair on an LE link.
    fn pair(&mut self, _host: &mut Host, _handle: u16, _io_capability: u8, _auth_req: u8) {}
}

/// A security manager that supports no pairing and holds no keys.
#[derive(Debug, Default)]
pub struct NoSecurity;

impl SecurityManager for NoSecurity {}
