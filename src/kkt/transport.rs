//! Transport layer for KKT device communication.
//!
//! Defines the `KktTransport` trait and its two implementations: serial
//! (COM / RS-232 / USB-serial) and network (TCP). Each variant owns its own
//! framing and read-termination rule, so the session above never branches on
//! the connection type.

use crate::kkt::config::{ConnectionConfig, ConnectionType};
use crate::kkt::error::{KktError, Result};
use crate::kkt::framing;
use std::io::{self, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::time::Duration;
use tracing::{debug, info, warn};

// ---------------------------------------------------------------------------
// Transport trait
// ---------------------------------------------------------------------------

/// Byte channel to one register, with variant-specific framing.
pub trait KktTransport: Send {
    /// Open the channel. A no-op when already open.
    fn connect(&mut self) -> Result<()>;

    /// Close the channel. A no-op when already closed.
    fn disconnect(&mut self);

    /// Whether the channel is open.
    fn is_connected(&self) -> bool;

    /// Frame and write one encoded command payload.
    fn send(&mut self, payload: &[u8]) -> Result<()>;

    /// Read one response and return its payload with the envelope removed.
    fn receive(&mut self) -> Result<Vec<u8>>;

    /// Human-readable description of the connection target.
    fn description(&self) -> String;
}

// ---------------------------------------------------------------------------
// Serial transport
// ---------------------------------------------------------------------------

/// Serial transport using the `serialport` crate. 8N1 at the configured baud.
pub struct SerialTransport {
    port_name: String,
    baud_rate: u32,
    timeout: Duration,
    strict_checksum: bool,
    port: Option<Box<dyn serialport::SerialPort>>,
}

impl SerialTransport {
    pub fn new(port_name: &str, baud_rate: u32, timeout_ms: u64, strict_checksum: bool) -> Self {
        Self {
            port_name: port_name.to_string(),
            baud_rate,
            timeout: Duration::from_millis(timeout_ms),
            strict_checksum,
            port: None,
        }
    }

    /// Build from an already normalized serial profile.
    pub fn from_config(cfg: &ConnectionConfig) -> Self {
        Self::new(&cfg.com_name, cfg.baud_rate, cfg.timeout_ms, cfg.strict_checksum)
    }
}

impl KktTransport for SerialTransport {
    fn connect(&mut self) -> Result<()> {
        if self.port.is_some() {
            return Ok(());
        }
        info!(
            "Opening serial port {} @ {} baud",
            self.port_name, self.baud_rate
        );

        let port = serialport::new(&self.port_name, self.baud_rate)
            .data_bits(serialport::DataBits::Eight)
            .parity(serialport::Parity::None)
            .stop_bits(serialport::StopBits::One)
            .timeout(self.timeout)
            .open()
            .map_err(|e| KktError::Connection {
                target: self.description(),
                source: io::Error::from(e),
            })?;

        self.port = Some(port);
        info!("Serial port {} connected", self.port_name);
        Ok(())
    }

    fn disconnect(&mut self) {
        if self.port.take().is_some() {
            info!("Serial port {} disconnected", self.port_name);
        }
    }

    fn is_connected(&self) -> bool {
        self.port.is_some()
    }

    fn send(&mut self, payload: &[u8]) -> Result<()> {
        let port = self.port.as_mut().ok_or(KktError::NotConnected)?;
        let packet = framing::wrap_serial_request(payload)?;
        debug!("Serial TX ({} bytes): {:02X?}", packet.len(), packet);
        port.write_all(&packet)
            .map_err(|e| KktError::io("serial write", e))?;
        port.flush()
            .map_err(|e| KktError::io("serial flush", e))?;
        Ok(())
    }

    fn receive(&mut self) -> Result<Vec<u8>> {
        let port = self.port.as_mut().ok_or(KktError::NotConnected)?;

        // Re-apply the read deadline for this exchange
        port.set_timeout(self.timeout)
            .map_err(|e| KktError::io("serial set timeout", io::Error::from(e)))?;

        let payload = framing::read_serial_response(&mut **port, self.strict_checksum)?;
        debug!("Serial RX ({} bytes): {:02X?}", payload.len(), payload);
        Ok(payload)
    }

    fn description(&self) -> String {
        format!("Serial({}@{})", self.port_name, self.baud_rate)
    }
}

// ---------------------------------------------------------------------------
// Network (TCP) transport
// ---------------------------------------------------------------------------

/// TCP transport for registers on the LAN. No envelope; every read and write
/// gets a fresh deadline.
pub struct NetworkTransport {
    host: String,
    port: u16,
    timeout: Duration,
    stream: Option<TcpStream>,
}

impl NetworkTransport {
    pub fn new(host: &str, port: u16, timeout_ms: u64) -> Self {
        Self {
            host: host.to_string(),
            port,
            timeout: Duration::from_millis(timeout_ms),
            stream: None,
        }
    }

    fn dial(&self) -> io::Result<TcpStream> {
        let mut last_err = None;
        for addr in (self.host.as_str(), self.port).to_socket_addrs()? {
            match TcpStream::connect_timeout(&addr, self.timeout) {
                Ok(stream) => return Ok(stream),
                Err(e) => {
                    debug!("TCP connect to {addr} failed: {e}");
                    last_err = Some(e);
                }
            }
        }
        Err(last_err.unwrap_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, "host resolved to no addresses")
        }))
    }
}

impl KktTransport for NetworkTransport {
    fn connect(&mut self) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }
        info!("Connecting TCP to {}:{}", self.host, self.port);

        let stream = self.dial().map_err(|e| KktError::Connection {
            target: self.description(),
            source: e,
        })?;
        if let Err(e) = stream.set_nodelay(true) {
            warn!("TCP_NODELAY not applied: {e}");
        }

        self.stream = Some(stream);
        info!("TCP connected to {}:{}", self.host, self.port);
        Ok(())
    }

    fn disconnect(&mut self) {
        if let Some(stream) = self.stream.take() {
            let _ = stream.shutdown(Shutdown::Both);
            info!("TCP disconnected from {}:{}", self.host, self.port);
        }
    }

    fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    fn send(&mut self, payload: &[u8]) -> Result<()> {
        let stream = self.stream.as_mut().ok_or(KktError::NotConnected)?;
        stream
            .set_write_timeout(Some(self.timeout))
            .map_err(|e| KktError::io("tcp set write timeout", e))?;
        debug!("TCP TX ({} bytes): {:02X?}", payload.len(), payload);
        stream
            .write_all(payload)
            .map_err(|e| KktError::io("tcp write", e))?;
        stream.flush().map_err(|e| KktError::io("tcp flush", e))?;
        Ok(())
    }

    fn receive(&mut self) -> Result<Vec<u8>> {
        let stream = self.stream.as_mut().ok_or(KktError::NotConnected)?;
        stream
            .set_read_timeout(Some(self.timeout))
            .map_err(|e| KktError::io("tcp set read timeout", e))?;
        let data = framing::read_tcp_response(stream)?;
        debug!("TCP RX ({} bytes): {:02X?}", data.len(), data);
        Ok(data)
    }

    fn description(&self) -> String {
        format!("TCP({}:{})", self.host, self.port)
    }
}

// ---------------------------------------------------------------------------
// Factory
// ---------------------------------------------------------------------------

/// Build the transport selected by the profile. Defaults are applied first.
pub fn create_transport(config: &ConnectionConfig) -> Result<Box<dyn KktTransport>> {
    config.validate()?;
    let cfg = config.normalized();
    match cfg.connection_type {
        ConnectionType::Serial => Ok(Box::new(SerialTransport::from_config(&cfg))),
        ConnectionType::Tcp => Ok(Box::new(NetworkTransport::new(
            &cfg.ip_address,
            cfg.tcp_port,
            cfg.timeout_ms,
        ))),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
