//! An emulated Bluetooth host.
//!
//! This crate implements the host side of the Host Controller Interface (HCI)
//! over an H4-framed byte stream, and the upper-stack state machines that ride
//! on top of it: ACL/SCO/ISO transport with fragmentation and reassembly,
//! L2CAP signaling for BR/EDR and LE (including credit-based and enhanced
//! credit-based channels), and the RFCOMM multiplexer.
//!
//! It is a *test-harness peer*: a synthetic device that a Bluetooth stack or a
//! controller emulator under test talks to. It owns no hardware. A pluggable
//! transport delivers raw H4 octets in both directions:
//!
//! * [`Host::receive_h4`] ingests one inbound H4 frame.
//! * The closure installed with [`Host::set_send_handler`] receives every
//!   outbound H4 frame.
//!
//! Everything runs on a single task: all callbacks are invoked synchronously
//! from within the call that produced them and receive `&mut Host`, so they
//! may immediately call back into any public operation.
//!
//! [`Host::receive_h4`]: host/struct.Host.html#method.receive_h4
//! [`Host::set_send_handler`]: host/struct.Host.html#method.set_send_handler

#[macro_use]
mod log;
#[macro_use]
mod utils;
mod addr;
pub mod bytes;
mod error;
pub mod hci;
pub mod host;
pub mod l2cap;
pub mod rfcomm;
pub mod security;

pub use self::addr::{Addr, AddrKind};
pub use self::error::Error;
pub use self::host::Host;
