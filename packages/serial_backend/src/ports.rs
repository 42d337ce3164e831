use serde::{Deserialize, Serialize};
use std::fmt;

/// Connection location for a port
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PortType {
    UsbPort,
    PciPort,
    BluetoothPort,
    #[default]
    Unknown,
}

/// A serial port the OS reports as present
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortInfo {
    pub name: String,
    pub port_type: PortType,
    pub product: String,
    pub serial_number: String,
    pub manufacturer: String,
}

impl From<serialport::SerialPortInfo> for PortInfo {
    fn from(info: serialport::SerialPortInfo) -> Self {
        let mut port = PortInfo {
            name: info.port_name,
            ..Default::default()
        };
        port.port_type = match info.port_type {
            serialport::SerialPortType::UsbPort(usb) => {
                port.product = usb.product.unwrap_or_default();
                port.serial_number = usb.serial_number.unwrap_or_default();
                port.manufacturer = usb.manufacturer.unwrap_or_default();
                PortType::UsbPort
            }
            serialport::SerialPortType::PciPort => PortType::PciPort,
            serialport::SerialPortType::BluetoothPort => PortType::BluetoothPort,
            serialport::SerialPortType::Unknown => PortType::Unknown,
        };
        port
    }
}

impl fmt::Display for PortInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:?})", self.name, self.port_type)?;
        let details: Vec<&str> = [&self.manufacturer, &self.product, &self.serial_number]
            .into_iter()
            .map(String::as_str)
            .filter(|s| !s.is_empty())
            .collect();
        if !details.is_empty() {
            write!(f, " {}", details.join(" / "))?;
        }
        Ok(())
    }
}

/// Ports currently present on this machine
pub fn list_ports() -> Result<Vec<PortInfo>, serialport::Error> {
    Ok(serialport::available_ports()?
        .into_iter()
        .map(PortInfo::from)
        .collect())
}
