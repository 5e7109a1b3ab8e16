//! Board and port detection
//!
//! Teensy boards are identified by USB VID/PID, Nano 33 BLE by its port
//! description. Auto-selection prefers a Nano 33 BLE, then a Teensy,
//! then the historical bench default port.

use crate::error::Result;
use serialport::{SerialPortInfo, SerialPortType};

/// PJRC vendor id
pub const TEENSY_VID: u16 = 0x16C0;

/// Teensy product ids seen across 3.x/4.x serial modes
pub const TEENSY_PIDS: [u16; 4] = [0x0483, 0x0486, 0x04D0, 0x04D1];

/// Bench default when nothing recognizable is connected
const FALLBACK_PORT: &str = "COM10";

/// What a serial port looks like to the calibration flows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortKind {
    Teensy,
    Nano33Ble,
    Other,
}

/// One enumerated serial port
#[derive(Debug, Clone)]
pub struct DetectedPort {
    pub name: String,
    pub description: Option<String>,
    pub manufacturer: Option<String>,
    pub kind: PortKind,
}

impl DetectedPort {
    /// One-line summary for port listings
    pub fn summary(&self) -> String {
        let mut out = self.name.clone();
        if let Some(desc) = &self.description {
            out.push_str(" - ");
            out.push_str(desc);
        }
        if let Some(mfg) = &self.manufacturer {
            out.push_str(&format!(" ({})", mfg));
        }
        match self.kind {
            PortKind::Teensy => out.push_str(" [TEENSY DETECTED]"),
            PortKind::Nano33Ble => out.push_str(" [NANO 33 BLE]"),
            PortKind::Other => {}
        }
        out
    }
}

/// Enumerate and classify every serial port on the host
pub fn list_ports() -> Result<Vec<DetectedPort>> {
    let ports = serialport::available_ports()?;
    Ok(ports.iter().map(classify_port).collect())
}

/// Classify a single enumerated port
pub fn classify_port(info: &SerialPortInfo) -> DetectedPort {
    let (description, manufacturer, vid_pid) = match &info.port_type {
        SerialPortType::UsbPort(usb) => (
            usb.product.clone(),
            usb.manufacturer.clone(),
            Some((usb.vid, usb.pid)),
        ),
        _ => (None, None, None),
    };

    let desc_lower = description.as_deref().unwrap_or("").to_ascii_lowercase();
    let mfg_lower = manufacturer.as_deref().unwrap_or("").to_ascii_lowercase();

    let kind = if desc_lower.contains("nano 33 ble") {
        PortKind::Nano33Ble
    } else if desc_lower.contains("teensy")
        || mfg_lower.contains("pjrc")
        || matches!(vid_pid, Some((TEENSY_VID, pid)) if TEENSY_PIDS.contains(&pid))
    {
        PortKind::Teensy
    } else {
        PortKind::Other
    };

    DetectedPort {
        name: info.port_name.clone(),
        description,
        manufacturer,
        kind,
    }
}

/// Pick the port the flows should default to, if any
pub fn auto_select(ports: &[DetectedPort]) -> Option<&DetectedPort> {
    ports
        .iter()
        .find(|p| p.kind == PortKind::Nano33Ble)
        .or_else(|| ports.iter().find(|p| p.kind == PortKind::Teensy))
        .or_else(|| ports.iter().find(|p| p.name == FALLBACK_PORT))
}

/// Core package an FQBN belongs to: the first two colon-separated
/// segments (`teensy:avr:teensy41` -> `teensy:avr`)
pub fn required_core_for(fqbn: &str) -> Option<String> {
    let mut parts = fqbn.split(':');
    match (parts.next(), parts.next()) {
        (Some(vendor), Some(arch)) if !vendor.is_empty() && !arch.is_empty() => {
            Some(format!("{}:{}", vendor, arch))
        }
        _ => None,
    }
}

/// Board-specific advice when an upload fails
pub fn upload_hint(fqbn: &str) -> Option<&'static str> {
    if fqbn.contains("mbed_nano") {
        Some("Double-press the reset button on the Nano 33 BLE to enter bootloader mode")
    } else if fqbn.contains("teensy") {
        Some("Press the program button on the Teensy, or retry with the Teensy Loader")
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serialport::UsbPortInfo;

    fn usb_port(name: &str, vid: u16, pid: u16, product: Option<&str>) -> SerialPortInfo {
        SerialPortInfo {
            port_name: name.to_string(),
            port_type: SerialPortType::UsbPort(UsbPortInfo {
                vid,
                pid,
                serial_number: None,
                manufacturer: None,
                product: product.map(str::to_string),
            }),
        }
    }

    #[test]
    fn teensy_detected_by_vid_pid() {
        let port = classify_port(&usb_port("/dev/ttyACM0", TEENSY_VID, 0x0483, None));
        assert_eq!(port.kind, PortKind::Teensy);
        assert!(port.summary().contains("TEENSY DETECTED"));
    }

    #[test]
    fn nano_detected_by_description() {
        let port = classify_port(&usb_port(
            "/dev/ttyACM1",
            0x2341,
            0x805a,
            Some("Arduino Nano 33 BLE"),
        ));
        assert_eq!(port.kind, PortKind::Nano33Ble);
    }

    #[test]
    fn unknown_usb_is_other() {
        let port = classify_port(&usb_port("/dev/ttyUSB0", 0x0403, 0x6001, Some("FT232R")));
        assert_eq!(port.kind, PortKind::Other);
    }

    #[test]
    fn auto_select_prefers_nano_then_teensy() {
        let teensy = classify_port(&usb_port("COM3", TEENSY_VID, 0x0486, None));
        let nano = classify_port(&usb_port("COM4", 0x2341, 0x805a, Some("Nano 33 BLE")));
        let other = classify_port(&usb_port("COM5", 0x0403, 0x6001, None));

        let ports = vec![other.clone(), teensy.clone(), nano.clone()];
        assert_eq!(auto_select(&ports).unwrap().name, "COM4");

        let ports = vec![other.clone(), teensy];
        assert_eq!(auto_select(&ports).unwrap().name, "COM3");

        assert!(auto_select(&[other]).is_none());
    }

    #[test]
    fn fallback_port_is_last_resort() {
        let fallback = classify_port(&usb_port(FALLBACK_PORT, 0x0403, 0x6001, None));
        let ports = vec![fallback];
        assert_eq!(auto_select(&ports).unwrap().name, FALLBACK_PORT);
    }

    #[test]
    fn core_derived_from_fqbn() {
        assert_eq!(
            required_core_for("teensy:avr:teensy41").as_deref(),
            Some("teensy:avr")
        );
        assert_eq!(
            required_core_for("arduino:mbed_nano:nano33ble").as_deref(),
            Some("arduino:mbed_nano")
        );
        assert_eq!(required_core_for("garbage"), None);
    }
}
