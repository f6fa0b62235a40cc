//! Connection profile for a fiscal register.
//!
//! Profiles are stored as camelCase JSON. `connectionType` uses the vendor's
//! numeric codes: `0` for a COM port, `6` for TCP/IP.

use crate::kkt::error::{KktError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::sync::Arc;

pub const DEFAULT_TIMEOUT_MS: u64 = 3000;
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Human-readable traffic sink. Invoked with lines such as `>> TX: <GET DEV=''/>`.
pub type TrafficLogger = Arc<dyn Fn(&str) + Send + Sync>;

// ---------------------------------------------------------------------------
// Connection type
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "i32", into = "i32")]
pub enum ConnectionType {
    Serial,
    Tcp,
}

impl ConnectionType {
    pub const SERIAL_CODE: i32 = 0;
    pub const TCP_CODE: i32 = 6;
}

impl TryFrom<i32> for ConnectionType {
    type Error = String;

    fn try_from(code: i32) -> std::result::Result<Self, Self::Error> {
        match code {
            Self::SERIAL_CODE => Ok(ConnectionType::Serial),
            Self::TCP_CODE => Ok(ConnectionType::Tcp),
            other => Err(format!("unknown connection type: {other}")),
        }
    }
}

impl From<ConnectionType> for i32 {
    fn from(t: ConnectionType) -> i32 {
        match t {
            ConnectionType::Serial => ConnectionType::SERIAL_CODE,
            ConnectionType::Tcp => ConnectionType::TCP_CODE,
        }
    }
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionConfig {
    pub connection_type: ConnectionType,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub com_name: String,
    #[serde(default)]
    pub baud_rate: u32,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub ip_address: String,
    #[serde(default)]
    pub tcp_port: u16,
    /// Per-operation timeout in milliseconds.
    #[serde(default, rename = "timeout")]
    pub timeout_ms: u64,
    /// Fail the exchange on a response LRC mismatch instead of logging it.
    #[serde(default)]
    pub strict_checksum: bool,
    #[serde(skip)]
    pub logger: Option<TrafficLogger>,
}

impl ConnectionConfig {
    pub fn serial(com_name: &str, baud_rate: u32) -> Self {
        Self {
            connection_type: ConnectionType::Serial,
            com_name: com_name.to_string(),
            baud_rate,
            ip_address: String::new(),
            tcp_port: 0,
            timeout_ms: 0,
            strict_checksum: false,
            logger: None,
        }
    }

    pub fn tcp(ip_address: &str, tcp_port: u16) -> Self {
        Self {
            connection_type: ConnectionType::Tcp,
            com_name: String::new(),
            baud_rate: 0,
            ip_address: ip_address.to_string(),
            tcp_port,
            timeout_ms: 0,
            strict_checksum: false,
            logger: None,
        }
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub fn with_strict_checksum(mut self, strict: bool) -> Self {
        self.strict_checksum = strict;
        self
    }

    pub fn with_logger<F>(mut self, logger: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.logger = Some(Arc::new(logger));
        self
    }

    /// Load a profile from a JSON value.
    pub fn from_json(value: &serde_json::Value) -> Result<Self> {
        serde_json::from_value(value.clone())
            .map_err(|e| KktError::Config(format!("invalid connection profile: {e}")))
    }

    /// Load a profile from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| KktError::Config(format!("cannot read {}: {e}", path.display())))?;
        serde_json::from_str(&text)
            .map_err(|e| KktError::Config(format!("invalid connection profile {}: {e}", path.display())))
    }

    /// Copy with defaults applied. Zero counts as unset.
    pub fn normalized(&self) -> Self {
        let mut cfg = self.clone();
        if cfg.timeout_ms == 0 {
            cfg.timeout_ms = DEFAULT_TIMEOUT_MS;
        }
        if cfg.baud_rate == 0 {
            cfg.baud_rate = DEFAULT_BAUD_RATE;
        }
        cfg
    }

    /// Check the parameter group selected by `connection_type`.
    pub fn validate(&self) -> Result<()> {
        match self.connection_type {
            ConnectionType::Serial => {
                if self.com_name.trim().is_empty() {
                    return Err(KktError::Config("serial connection requires 'comName'".into()));
                }
            }
            ConnectionType::Tcp => {
                if self.ip_address.trim().is_empty() {
                    return Err(KktError::Config("TCP connection requires 'ipAddress'".into()));
                }
                if self.tcp_port == 0 {
                    return Err(KktError::Config("TCP connection requires 'tcpPort'".into()));
                }
            }
        }
        Ok(())
    }

    /// Human-readable description of the connection target.
    pub fn description(&self) -> String {
        match self.connection_type {
            ConnectionType::Serial => format!("Serial({}@{})", self.com_name, self.baud_rate),
            ConnectionType::Tcp => format!("TCP({}:{})", self.ip_address, self.tcp_port),
        }
    }
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("connection_type", &self.connection_type)
            .field("com_name", &self.com_name)
            .field("baud_rate", &self.baud_rate)
            .field("ip_address", &self.ip_address)
            .field("tcp_port", &self.tcp_port)
            .field("timeout_ms", &self.timeout_ms)
            .field("strict_checksum", &self.strict_checksum)
            .field("logger", &self.logger.as_ref().map(|_| "<fn>"))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_json_serial_profile() {
        let cfg = ConnectionConfig::from_json(&serde_json::json!({
            "connectionType": 0,
            "comName": "COM9",
            "baudRate": 57600,
            "timeout": 5000
        }))
        .unwrap();
        assert_eq!(cfg.connection_type, ConnectionType::Serial);
        assert_eq!(cfg.com_name, "COM9");
        assert_eq!(cfg.baud_rate, 57600);
        assert_eq!(cfg.timeout_ms, 5000);
        assert!(!cfg.strict_checksum);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_from_json_tcp_profile() {
        let cfg = ConnectionConfig::from_json(&serde_json::json!({
            "connectionType": 6,
            "ipAddress": "192.168.1.50",
            "tcpPort": 8200
        }))
        .unwrap();
        assert_eq!(cfg.connection_type, ConnectionType::Tcp);
        assert_eq!(cfg.description(), "TCP(192.168.1.50:8200)");
    }

    #[test]
    fn test_unknown_connection_type_rejected() {
        let err = ConnectionConfig::from_json(&serde_json::json!({"connectionType": 3}))
            .unwrap_err();
        assert!(err.to_string().contains("unknown connection type: 3"));
    }

    #[test]
    fn test_defaults_applied() {
        let cfg = ConnectionConfig::serial("COM3", 0).normalized();
        assert_eq!(cfg.timeout_ms, DEFAULT_TIMEOUT_MS);
        assert_eq!(cfg.baud_rate, DEFAULT_BAUD_RATE);

        let cfg = ConnectionConfig::serial("COM3", 9600)
            .with_timeout_ms(1000)
            .normalized();
        assert_eq!(cfg.timeout_ms, 1000);
        assert_eq!(cfg.baud_rate, 9600);
    }

    #[test]
    fn test_validate_requires_selected_group() {
        assert!(ConnectionConfig::serial("", 9600).validate().is_err());
        assert!(ConnectionConfig::tcp("", 5000).validate().is_err());
        assert!(ConnectionConfig::tcp("10.0.0.1", 0).validate().is_err());
        // The other group is ignored.
        assert!(ConnectionConfig::tcp("10.0.0.1", 5000).validate().is_ok());
    }

    #[test]
    fn test_serialize_uses_numeric_type() {
        let v = serde_json::to_value(ConnectionConfig::tcp("10.0.0.1", 5000)).unwrap();
        assert_eq!(v["connectionType"], 6);
        assert_eq!(v["tcpPort"], 5000);
        assert!(v.get("comName").is_none());
        assert!(v.get("logger").is_none());
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("profile.json");
        std::fs::write(&path, r#"{"connectionType":0,"comName":"/dev/ttyUSB0"}"#).unwrap();
        let cfg = ConnectionConfig::from_file(&path).unwrap();
        assert_eq!(cfg.com_name, "/dev/ttyUSB0");
        assert!(ConnectionConfig::from_file(&dir.path().join("missing.json")).is_err());
    }

    #[test]
    fn test_debug_hides_logger() {
        let cfg = ConnectionConfig::serial("COM1", 9600).with_logger(|_| {});
        assert!(format!("{cfg:?}").contains("<fn>"));
    }
}
