//! Persisted calibration records
//!
//! One TOML file per completed calibration run, named
//! `Mars_<4-digit-id>_calibration_<timestamp>.toml` and kept in the app
//! data `calibrations/` directory. Format `"1.0"` carries the four angle
//! offsets; `"2.0"` adds the measured IMU2/IMU3 pitches. The loader
//! accepts both, the saver writes `"2.0"`.

use crate::error::{Error, Result};
use crate::types::{ImuOffsets, LoadCellCalibration};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

const FORMAT_V1: &str = "1.0";
const FORMAT_V2: &str = "2.0";

/// Record metadata table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metadata {
    /// Seconds since the Unix epoch at save time
    pub timestamp: u64,
    /// Record format version, "1.0" or "2.0"
    pub version: String,
    /// Device identifier, 0..=9999
    pub mars_id: u16,
}

/// Angle offsets as persisted. The pitch fields for IMU2/IMU3 only exist
/// in "2.0" records.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecordedOffsets {
    pub imu1_pitch_offset: f64,
    pub imu1_roll_offset: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub imu2_pitch_offset: Option<f64>,
    pub imu2_roll_offset: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub imu3_pitch_offset: Option<f64>,
    pub imu3_roll_offset: f64,
}

impl RecordedOffsets {
    pub fn from_offsets(offsets: &ImuOffsets) -> Self {
        Self {
            imu1_pitch_offset: offsets.imu1_pitch_offset,
            imu1_roll_offset: offsets.imu1_roll_offset,
            imu2_roll_offset: offsets.imu2_roll_offset,
            imu3_roll_offset: offsets.imu3_roll_offset,
            ..Default::default()
        }
    }

    pub fn to_offsets(&self) -> ImuOffsets {
        ImuOffsets {
            imu1_pitch_offset: self.imu1_pitch_offset,
            imu1_roll_offset: self.imu1_roll_offset,
            imu2_roll_offset: self.imu2_roll_offset,
            imu3_roll_offset: self.imu3_roll_offset,
        }
    }
}

/// One saved calibration run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalibrationRecord {
    pub metadata: Metadata,
    pub load_cell: LoadCellCalibration,
    pub imu_offsets: RecordedOffsets,
}

impl CalibrationRecord {
    /// Build a record stamped with the current time
    pub fn new(
        mars_id: u16,
        load_cell: LoadCellCalibration,
        imu_offsets: RecordedOffsets,
    ) -> Result<Self> {
        if mars_id > 9999 {
            return Err(Error::InvalidParameter(format!(
                "Mars ID must fit four digits, got {}",
                mars_id
            )));
        }
        Ok(Self {
            metadata: Metadata {
                timestamp: unix_now(),
                version: FORMAT_V2.to_string(),
                mars_id,
            },
            load_cell,
            imu_offsets,
        })
    }

    /// Canonical file name for this record
    pub fn file_name(&self) -> String {
        format!(
            "Mars_{:04}_calibration_{}.toml",
            self.metadata.mars_id, self.metadata.timestamp
        )
    }

    /// Write the record into `dir`, returning the full path
    pub fn save<P: AsRef<Path>>(&self, dir: P) -> Result<PathBuf> {
        fs::create_dir_all(&dir)?;
        let path = dir.as_ref().join(self.file_name());
        let contents = toml::to_string_pretty(self)?;
        fs::write(&path, contents)?;
        log::info!("Calibration record saved: {}", path.display());
        Ok(path)
    }

    /// Read and validate a record file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(&path)?;
        let record: CalibrationRecord = toml::from_str(&contents)?;
        match record.metadata.version.as_str() {
            FORMAT_V1 | FORMAT_V2 => Ok(record),
            other => Err(Error::InvalidParameter(format!(
                "unknown record format version {:?} in {}",
                other,
                path.as_ref().display()
            ))),
        }
    }
}

/// Load every record in `dir`, newest first. Unreadable files are logged
/// and skipped rather than failing the whole listing.
pub fn list_history<P: AsRef<Path>>(dir: P) -> Result<Vec<(PathBuf, CalibrationRecord)>> {
    let dir = dir.as_ref();
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut records = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) != Some("toml") {
            continue;
        }
        match CalibrationRecord::load(&path) {
            Ok(record) => records.push((path, record)),
            Err(e) => log::warn!("Skipping unreadable record {}: {}", path.display(), e),
        }
    }
    records.sort_by(|a, b| b.1.metadata.timestamp.cmp(&a.1.metadata.timestamp));
    Ok(records)
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_record(mars_id: u16) -> CalibrationRecord {
        let offsets = RecordedOffsets {
            imu1_pitch_offset: 0.034907,
            imu1_roll_offset: -0.004363,
            imu2_pitch_offset: Some(0.01),
            imu2_roll_offset: 0.002,
            imu3_pitch_offset: Some(-0.005),
            imu3_roll_offset: 0.0071,
        };
        CalibrationRecord::new(
            mars_id,
            LoadCellCalibration {
                calibration_factor: 696.5,
            },
            offsets,
        )
        .unwrap()
    }

    #[test]
    fn file_name_pads_mars_id() {
        let record = sample_record(42);
        let name = record.file_name();
        assert!(name.starts_with("Mars_0042_calibration_"));
        assert!(name.ends_with(".toml"));
    }

    #[test]
    fn rejects_five_digit_mars_id() {
        let result = CalibrationRecord::new(
            10_000,
            LoadCellCalibration::default(),
            RecordedOffsets::default(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn v2_roundtrip() {
        let record = sample_record(7);
        let text = toml::to_string_pretty(&record).unwrap();
        assert!(text.contains("[metadata]"));
        assert!(text.contains("[load_cell]"));
        assert!(text.contains("[imu_offsets]"));
        assert!(text.contains("version = \"2.0\""));

        let parsed: CalibrationRecord = toml::from_str(&text).unwrap();
        assert_eq!(parsed.metadata.mars_id, 7);
        assert_eq!(parsed.load_cell.calibration_factor, 696.5);
        assert_eq!(parsed.imu_offsets.imu2_pitch_offset, Some(0.01));
    }

    #[test]
    fn v1_record_without_pitch_fields_loads() {
        let text = r#"
[metadata]
timestamp = 1735689600
version = "1.0"
mars_id = 12

[load_cell]
calibration_factor = 412.25

[imu_offsets]
imu1_pitch_offset = 0.03
imu1_roll_offset = 0.01
imu2_roll_offset = -0.002
imu3_roll_offset = 0.005
"#;
        let record: CalibrationRecord = toml::from_str(text).unwrap();
        assert_eq!(record.metadata.version, FORMAT_V1);
        assert_eq!(record.imu_offsets.imu2_pitch_offset, None);
        assert_eq!(record.imu_offsets.to_offsets().imu3_roll_offset, 0.005);
    }

    #[test]
    fn history_sorts_newest_first() {
        let dir = std::env::temp_dir().join(format!("mars-cal-store-{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);

        let mut older = sample_record(1);
        older.metadata.timestamp = 1_000;
        let mut newer = sample_record(2);
        newer.metadata.timestamp = 2_000;

        older.save(&dir).unwrap();
        newer.save(&dir).unwrap();
        fs::write(dir.join("notes.txt"), "ignored").unwrap();

        let history = list_history(&dir).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].1.metadata.mars_id, 2);
        assert_eq!(history[1].1.metadata.mars_id, 1);

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn unknown_version_is_rejected() {
        let dir = std::env::temp_dir().join(format!("mars-cal-ver-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("Mars_0001_calibration_5.toml");
        let mut record = sample_record(1);
        record.metadata.version = "3.0".to_string();
        fs::write(&path, toml::to_string_pretty(&record).unwrap()).unwrap();

        assert!(CalibrationRecord::load(&path).is_err());
        fs::remove_dir_all(&dir).unwrap();
    }
}
