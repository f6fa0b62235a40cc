//! Session with one fiscal register.
//!
//! The device protocol is strictly half-duplex: one command, one answer, no
//! unsolicited traffic. `SessionConnection` owns the transport behind a mutex
//! and holds it for the full write/read cycle of every exchange, so
//! concurrent callers can never interleave frames on the wire.

use crate::kkt::config::ConnectionConfig;
use crate::kkt::device_error;
use crate::kkt::encoding;
use crate::kkt::error::{KktError, Result};
use crate::kkt::transport::{self, KktTransport};
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

pub struct SessionConnection {
    config: ConnectionConfig,
    transport: Mutex<Box<dyn KktTransport>>,
}

impl SessionConnection {
    /// Build a session for the transport selected by the profile. Nothing is
    /// opened until [`connect`](Self::connect).
    pub fn new(config: ConnectionConfig) -> Result<Self> {
        let transport = transport::create_transport(&config)?;
        Ok(Self::with_transport(config, transport))
    }

    /// Build a session over a caller-supplied transport (emulators, tests).
    pub fn with_transport(config: ConnectionConfig, transport: Box<dyn KktTransport>) -> Self {
        Self {
            config: config.normalized(),
            transport: Mutex::new(transport),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Box<dyn KktTransport>> {
        self.transport.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    pub fn description(&self) -> String {
        self.lock().description()
    }

    pub fn is_connected(&self) -> bool {
        self.lock().is_connected()
    }

    /// Open the channel. Calling it on an open session does nothing.
    pub fn connect(&self) -> Result<()> {
        let mut transport = self.lock();
        if transport.is_connected() {
            return Ok(());
        }
        transport.connect()?;
        info!("KKT session connected via {}", transport.description());
        Ok(())
    }

    /// Close the channel. Calling it on a closed session does nothing.
    pub fn disconnect(&self) -> Result<()> {
        let mut transport = self.lock();
        if transport.is_connected() {
            transport.disconnect();
            info!("KKT session on {} closed", transport.description());
        }
        Ok(())
    }

    /// Send one command and return the device's raw payload bytes.
    ///
    /// Bytes returned on success are verbatim Windows-1251 and are known not
    /// to carry the error marker. A device error element comes back as
    /// [`KktError::Device`].
    pub fn exchange(&self, command: &str) -> Result<Vec<u8>> {
        let mut transport = self.lock();
        if !transport.is_connected() {
            return Err(KktError::NotConnected);
        }

        if command.is_empty() {
            return Err(KktError::Encoding("empty command".into()));
        }
        let payload = encoding::encode(command)?;

        self.trace(|| format!(">> TX: {command}"));

        transport.send(&payload)?;
        let response = transport.receive()?;
        debug!(
            "Exchange on {}: {} bytes out, {} bytes in",
            transport.description(),
            payload.len(),
            response.len()
        );

        if device_error::detect(&response) {
            self.trace(|| format!("<< RX (ERR): {}", encoding::decode_lossy(&response)));
            let err = device_error::decode(&response);
            warn!("Device reported an error: {err}");
            return Err(err);
        }

        self.trace(|| format!("<< RX: {}", encoding::decode_lossy(&response)));
        Ok(response)
    }

    /// [`exchange`](Self::exchange) followed by a strict Windows-1251 decode,
    /// for callers that parse the answer as text.
    pub fn exchange_text(&self, command: &str) -> Result<String> {
        let raw = self.exchange(command)?;
        encoding::decode(&raw)
    }

    /// Hand a line to the traffic logger. A panicking logger is ignored.
    fn trace<F: FnOnce() -> String>(&self, line: F) {
        if let Some(ref logger) = self.config.logger {
            let line = line();
            if panic::catch_unwind(AssertUnwindSafe(|| logger(&line))).is_err() {
                debug!("Traffic logger panicked; line dropped");
            }
        }
    }
}

impl Drop for SessionConnection {
    fn drop(&mut self) {
        let transport = self
            .transport
            .get_mut()
            .unwrap_or_else(|e| e.into_inner());
        transport.disconnect();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
