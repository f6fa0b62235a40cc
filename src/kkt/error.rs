//! Error taxonomy for the KKT transport core.

use crate::kkt::device_error::DeviceError;
use std::io;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, KktError>;

/// Every failure the core can hand back to a caller of `connect`,
/// `disconnect` or `exchange`.
#[derive(Debug, Error)]
pub enum KktError {
    /// The connection profile is unusable (unknown type, missing port/host).
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Opening the serial port or dialing the TCP endpoint failed.
    #[error("failed to connect to {target}: {source}")]
    Connection {
        target: String,
        #[source]
        source: io::Error,
    },

    /// `exchange` was called while the session is disconnected.
    #[error("not connected to the device")]
    NotConnected,

    /// Read or write failed at the transport level, including deadline expiry.
    #[error("{context}: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: io::Error,
    },

    /// Text could not be converted to or from Windows-1251.
    #[error("encoding error: {0}")]
    Encoding(String),

    /// Response LRC mismatch. Only raised when strict checksum mode is on.
    #[error("response checksum mismatch: expected 0x{expected:02X}, received 0x{received:02X}")]
    Checksum { expected: u8, received: u8 },

    /// The device answered with its own error element.
    #[error(transparent)]
    Device(#[from] DeviceError),

    /// The response carried the error marker but could not be parsed.
    #[error("device error (unrecognized): {raw}")]
    UnrecognizedDeviceError { raw: String },
}

impl KktError {
    pub(crate) fn io(context: &'static str, source: io::Error) -> Self {
        KktError::Io { context, source }
    }

    /// True when the failure was a read/write deadline expiring.
    pub fn is_timeout(&self) -> bool {
        match self {
            KktError::Io { source, .. } => matches!(
                source.kind(),
                io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock
            ),
            _ => false,
        }
    }

    /// The device's structured error, if this is one.
    pub fn device_error(&self) -> Option<&DeviceError> {
        match self {
            KktError::Device(e) => Some(e),
            _ => None,
        }
    }
}
