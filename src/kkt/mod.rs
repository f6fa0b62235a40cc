//! KKT (fiscal register) transport core.
//!
//! Moves XML commands to a register and answers back over a serial line or
//! TCP, handling Windows-1251 text, STX/ETX framing with an LRC checksum, and
//! the device's `<ERROR .../>` payloads. Command catalogs build on
//! [`SessionConnection::exchange`].

pub mod config;
pub mod device_error;
pub mod encoding;
pub mod error;
pub mod framing;
pub mod session;
pub mod transport;

pub use config::{ConnectionConfig, ConnectionType, TrafficLogger};
pub use device_error::DeviceError;
pub use error::{KktError, Result};
pub use session::SessionConnection;
pub use transport::{create_transport, KktTransport, NetworkTransport, SerialTransport};
