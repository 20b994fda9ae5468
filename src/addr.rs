use core::fmt;

/// Specifies which address space a device address lives in.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum AddrKind {
    /// BR/EDR (classic) controller address.
    BrEdr,
    /// Publicly registered IEEE 802-2001 LAN MAC address, used on LE links.
    LePublic,
    /// Randomly generated LE address.
    LeRandom,
}

/// A Bluetooth device address.
#[derive(Copy, Clone, PartialEq, Eq)]
pub struct Addr {
    bytes: [u8; 6],
    kind: AddrKind,
}

impl Addr {
    /// Create a new device address from 6 raw Bytes and an address kind specifier.
    ///
    /// The `bytes` array contains the address Bytes as they are sent over the air (LSB first).
    pub fn new(bytes: [u8; 6], kind: AddrKind) -> Self {
        Addr { bytes, kind }
    }

    /// The all-zero address, used for isochronous streams that have no peer address.
    pub fn any(kind: AddrKind) -> Self {
        Addr {
            bytes: [0; 6],
            kind,
        }
    }

    /// Returns the address kind.
    pub fn kind(&self) -> AddrKind {
        self.kind
    }

    /// Returns whether this is a BR/EDR (classic) address.
    pub fn is_bredr(&self) -> bool {
        self.kind == AddrKind::BrEdr
    }

    /// Returns the raw bytes making up this address (LSB first).
    pub fn raw(&self) -> &[u8; 6] {
        &self.bytes
    }
}

impl fmt::Debug for Addr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Note: Bluetooth device addresses are usually displayed with MSB
        // first, so that the OUI (Organizationally Unique Identifier) is at
        // the start of the address and thus acts as a prefix, not as a suffix.
        for (i, b) in self.bytes.iter().rev().enumerate() {
            if i != 0 {
                f.write_str(":")?;
            }
            write!(f, "{:02x}", b)?;
        }

        write!(f, "[{:?}]", self.kind)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_representation() {
        let addr = Addr::new([0x5A, 0x92, 0x04, 0x26, 0xC6, 0x88], AddrKind::BrEdr);
        assert_eq!(format!("{:?}", addr), "88:c6:26:04:92:5a[BrEdr]");
    }
}
