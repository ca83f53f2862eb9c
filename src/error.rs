//! Error types for the raw Ethernet transport.

use std::fmt;

/// Error type for transport setup and buffer management.
///
/// Datapath operations do not return errors: caller contract violations are
/// debug-asserted, and hardware submission failures are fatal (see
/// [`crate::transport::RawTransport`]).
#[derive(Debug)]
pub enum Error {
    /// IO error from the underlying device.
    Io(std::io::Error),
    /// Invalid configuration.
    InvalidConfig(String),
    /// Buffer too small.
    BufferTooSmall { required: usize, available: usize },
    /// Invalid magic number in a packet header.
    InvalidMagic { expected: u8, got: u8 },
    /// Invalid packet type.
    InvalidPacketType(u8),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "IO error: {}", e),
            Error::InvalidConfig(msg) => write!(f, "Invalid configuration: {}", msg),
            Error::BufferTooSmall { required, available } => {
                write!(
                    f,
                    "Buffer too small: required {} bytes, available {} bytes",
                    required, available
                )
            }
            Error::InvalidMagic { expected, got } => {
                write!(f, "Invalid magic: expected {:#x}, got {:#x}", expected, got)
            }
            Error::InvalidPacketType(t) => write!(f, "Invalid packet type: {}", t),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}

/// Result type for transport operations.
pub type Result<T> = std::result::Result<T, Error>;
