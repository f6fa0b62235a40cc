//! Serial port discovery.
//!
//! Registers attached over RS-232 or USB-serial show up as ordinary COM /
//! tty ports. `list_ports()` wraps `serialport::available_ports()` so a
//! caller can pick the `comName` for a connection profile.

use serde::Serialize;
use tracing::debug;

/// Kind of a discovered port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PortKind {
    Usb,
    Bluetooth,
    Pci,
    Unknown,
}

/// A serial port available on this system.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PortInfo {
    pub name: String,
    pub kind: PortKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vid: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manufacturer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub serial_number: Option<String>,
}

impl From<serialport::SerialPortInfo> for PortInfo {
    fn from(p: serialport::SerialPortInfo) -> Self {
        let mut info = PortInfo {
            name: p.port_name,
            kind: PortKind::Unknown,
            vid: None,
            pid: None,
            manufacturer: None,
            product: None,
            serial_number: None,
        };
        match p.port_type {
            serialport::SerialPortType::UsbPort(usb) => {
                info.kind = PortKind::Usb;
                info.vid = Some(usb.vid);
                info.pid = Some(usb.pid);
                info.manufacturer = usb.manufacturer;
                info.product = usb.product;
                info.serial_number = usb.serial_number;
            }
            serialport::SerialPortType::BluetoothPort => info.kind = PortKind::Bluetooth,
            serialport::SerialPortType::PciPort => info.kind = PortKind::Pci,
            serialport::SerialPortType::Unknown => {}
        }
        info
    }
}

/// List available serial/COM ports on this system.
pub fn list_ports() -> Result<Vec<PortInfo>, String> {
    let ports = serialport::available_ports().map_err(|e| format!("Failed to list ports: {e}"))?;
    debug!("Found {} serial ports", ports.len());
    Ok(ports.into_iter().map(PortInfo::from).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usb_port_info_mapping() {
        let info = PortInfo::from(serialport::SerialPortInfo {
            port_name: "COM7".into(),
            port_type: serialport::SerialPortType::UsbPort(serialport::UsbPortInfo {
                vid: 0x0483,
                pid: 0x5740,
                serial_number: Some("00112233".into()),
                manufacturer: Some("Mitsu".into()),
                product: Some("KKT".into()),
            }),
        });
        assert_eq!(info.kind, PortKind::Usb);
        assert_eq!(info.vid, Some(0x0483));
        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["name"], "COM7");
        assert_eq!(json["kind"], "usb");
        assert_eq!(json["serialNumber"], "00112233");
    }

    #[test]
    fn test_unknown_port_info_mapping() {
        let info = PortInfo::from(serialport::SerialPortInfo {
            port_name: "/dev/ttyS0".into(),
            port_type: serialport::SerialPortType::Unknown,
        });
        assert_eq!(info.kind, PortKind::Unknown);
        let json = serde_json::to_value(&info).unwrap();
        assert!(json.get("vid").is_none());
    }
}
