//! Line protocol spoken by the calibration sketch
//!
//! The wire format is newline-delimited ASCII with no framing, checksum,
//! or versioning: whatever the sketch prints is the protocol. Parsing is
//! a fixed cascade of pattern attempts; anything unrecognized is passed
//! through verbatim for display.

use crate::types::{ImuSlot, Telemetry};

/// Marker preceding the load cell factor in the sketch's output
const FACTOR_MARKER: &str = "calibration value has been set to:";

/// Number of fields in a telemetry line
const TELEMETRY_FIELDS: usize = 9;

/// Axis named in an offset report line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OffsetAxis {
    Pitch,
    Roll,
}

/// One parsed line from the device
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceMessage {
    /// `"IMU1 Pitch Offset: 0.012345"` and friends; radians
    OffsetReport {
        slot: ImuSlot,
        axis: OffsetAxis,
        radians: f64,
    },
    /// `"New calibration value has been set to: 696.0, use this..."`
    CalibrationFactor(f64),
    /// Nine-field CSV: accel, angles, live offsets
    Telemetry(Telemetry),
    /// Anything else, for the serial monitor
    Raw(String),
}

/// Offset report labels printed at the end of an on-device calibration run.
/// Order matters nowhere; each line is matched independently.
const OFFSET_LABELS: [(&str, ImuSlot, OffsetAxis); 4] = [
    ("IMU1 Pitch Offset:", ImuSlot::Imu1, OffsetAxis::Pitch),
    ("IMU1 Roll Offset:", ImuSlot::Imu1, OffsetAxis::Roll),
    ("IMU2 Roll Offset:", ImuSlot::Imu2, OffsetAxis::Roll),
    ("IMU3 Roll Offset:", ImuSlot::Imu3, OffsetAxis::Roll),
];

impl DeviceMessage {
    /// Classify one trimmed line.
    ///
    /// Attempts, in order: offset report, calibration factor, telemetry
    /// CSV, raw passthrough. Never fails; an unparseable line is `Raw`.
    pub fn parse(line: &str) -> DeviceMessage {
        if let Some(report) = parse_offset_report(line) {
            return report;
        }
        if let Some(factor) = parse_calibration_factor(line) {
            return DeviceMessage::CalibrationFactor(factor);
        }
        if let Some(telemetry) = parse_telemetry(line) {
            return DeviceMessage::Telemetry(telemetry);
        }
        DeviceMessage::Raw(line.to_string())
    }
}

fn parse_offset_report(line: &str) -> Option<DeviceMessage> {
    for (label, slot, axis) in OFFSET_LABELS {
        if let Some(rest) = line.strip_prefix(label) {
            let radians = rest.trim().parse::<f64>().ok()?;
            return Some(DeviceMessage::OffsetReport {
                slot,
                axis,
                radians,
            });
        }
    }
    None
}

fn parse_calibration_factor(line: &str) -> Option<f64> {
    let lower = line.to_ascii_lowercase();
    let start = lower.find(FACTOR_MARKER)? + FACTOR_MARKER.len();
    // Value runs up to the next comma: "...set to: 696.0, use this..."
    let value = line[start..].split(',').next()?.trim();
    value.parse::<f64>().ok()
}

fn parse_telemetry(line: &str) -> Option<Telemetry> {
    // Banner lines ("=== ...") contain no commas, but the sketch help text
    // can; the leading '=' check mirrors the original host's filter.
    if line.starts_with('=') || !line.contains(',') {
        return None;
    }
    let parts: Vec<&str> = line.split(',').collect();
    if parts.len() != TELEMETRY_FIELDS {
        return None;
    }
    let mut fields = [0.0f64; TELEMETRY_FIELDS];
    for (slot, part) in fields.iter_mut().zip(&parts) {
        *slot = part.trim().parse::<f64>().ok()?;
    }
    Some(Telemetry {
        ax: fields[0],
        ay: fields[1],
        az: fields[2],
        roll: fields[3],
        pitch: fields[4],
        yaw: fields[5],
        offset_x: fields[6],
        offset_y: fields[7],
        offset_z: fields[8],
    })
}

/// Accumulates raw byte chunks into complete lines.
///
/// Bytes are decoded lossily (the sketch occasionally emits garbage during
/// board reset); carriage returns and surrounding whitespace are trimmed,
/// and empty lines are dropped.
#[derive(Default)]
pub struct LineAssembler {
    pending: String,
}

impl LineAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk, returning every line completed by it
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.push_str(&String::from_utf8_lossy(chunk));

        let mut lines = Vec::new();
        while let Some(pos) = self.pending.find('\n') {
            let line = self.pending[..pos].trim().to_string();
            self.pending.drain(..=pos);
            if !line.is_empty() {
                lines.push(line);
            }
        }
        lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_nine_field_telemetry() {
        let msg = DeviceMessage::parse("0.01,-0.02,0.98,1.5,-0.3,12.0,0.001,0.002,0.003");
        match msg {
            DeviceMessage::Telemetry(t) => {
                assert_eq!(t.ax, 0.01);
                assert_eq!(t.az, 0.98);
                assert_eq!(t.roll, 1.5);
                assert_eq!(t.yaw, 12.0);
                assert_eq!(t.offset_z, 0.003);
            }
            other => panic!("expected telemetry, got {:?}", other),
        }
    }

    #[test]
    fn short_csv_is_not_telemetry() {
        // Fewer than nine fields falls through to raw handling
        let msg = DeviceMessage::parse("1.0,2.0,3.0");
        assert_eq!(msg, DeviceMessage::Raw("1.0,2.0,3.0".to_string()));
    }

    #[test]
    fn non_numeric_csv_is_not_telemetry() {
        let msg = DeviceMessage::parse("a,b,c,d,e,f,g,h,i");
        assert!(matches!(msg, DeviceMessage::Raw(_)));
    }

    #[test]
    fn banner_lines_stay_raw() {
        let msg = DeviceMessage::parse("=== Initialization Complete ===");
        assert!(matches!(msg, DeviceMessage::Raw(_)));
    }

    #[test]
    fn parses_offset_reports() {
        let msg = DeviceMessage::parse("IMU1 Pitch Offset: 0.034907");
        assert_eq!(
            msg,
            DeviceMessage::OffsetReport {
                slot: ImuSlot::Imu1,
                axis: OffsetAxis::Pitch,
                radians: 0.034907,
            }
        );

        let msg = DeviceMessage::parse("IMU3 Roll Offset: -0.001200");
        assert_eq!(
            msg,
            DeviceMessage::OffsetReport {
                slot: ImuSlot::Imu3,
                axis: OffsetAxis::Roll,
                radians: -0.0012,
            }
        );
    }

    #[test]
    fn parses_calibration_factor_line() {
        let line =
            "New calibration value has been set to: 696.123456, use this as calibration value \
             (calFactor) in your project sketch.";
        assert_eq!(
            DeviceMessage::parse(line),
            DeviceMessage::CalibrationFactor(696.123456)
        );
    }

    #[test]
    fn factor_match_is_case_insensitive() {
        let line = "Calibration Value Has Been Set To: 42.5,";
        assert_eq!(
            DeviceMessage::parse(line),
            DeviceMessage::CalibrationFactor(42.5)
        );
    }

    #[test]
    fn assembler_splits_across_chunks() {
        let mut assembler = LineAssembler::new();
        assert!(assembler.push(b"Load_cell out").is_empty());
        let lines = assembler.push(b"put val: 12.34\r\npartial");
        assert_eq!(lines, vec!["Load_cell output val: 12.34".to_string()]);
        let lines = assembler.push(b" line\n");
        assert_eq!(lines, vec!["partial line".to_string()]);
    }

    #[test]
    fn assembler_drops_blank_lines() {
        let mut assembler = LineAssembler::new();
        let lines = assembler.push(b"\r\n\r\nhello\r\n\r\n");
        assert_eq!(lines, vec!["hello".to_string()]);
    }
}
