use core::fmt;

/// Errors returned by the emulated host.
#[derive(Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// Packet specified an invalid length value or was too short.
    InvalidLength,

    /// Invalid value supplied for field.
    InvalidValue,

    /// Unexpectedly reached EOF while reading or writing data.
    ///
    /// This is returned when a PDU is too large for its buffer, and when
    /// reaching EOF prematurely while decoding data from a buffer.
    Eof,

    /// No connection with the given handle exists.
    UnknownConn,

    /// The operation conflicts with one that is still in progress.
    Busy,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Error::InvalidLength => "invalid length value specified",
            Error::InvalidValue => "invalid value for field",
            Error::Eof => "end of buffer",
            Error::UnknownConn => "unknown connection handle",
            Error::Busy => "a conflicting operation is still in progress",
        })
    }
}

impl std::error::Error for Error {}
