//! kkt-link
//!
//! Client-side transport for XML fiscal registers. A `SessionConnection`
//! owns one serial or TCP channel to one device and exposes a blocking,
//! mutually exclusive `exchange(command)`; everything above it (shift, check
//! and settings commands) is plain XML text built by the caller.

pub mod diagnostics;
pub mod kkt;
pub mod serial;

pub use kkt::{
    ConnectionConfig, ConnectionType, DeviceError, KktError, KktTransport, Result,
    SessionConnection,
};
