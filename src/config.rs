//! Configuration for the calibration host
//!
//! Loads configuration from a TOML file; every field has a default so a
//! missing file falls back to a usable setup for the standard Teensy rig.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Top-level application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AppConfig {
    pub serial: SerialConfig,
    pub board: BoardConfig,
    pub firmware: FirmwareConfig,
    pub calibration: CalibrationConfig,
}

/// Serial port configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SerialConfig {
    /// Load cell serial port; empty means auto-detect/prompt
    pub loadcell_port: String,
    /// IMU serial port; empty means auto-detect/prompt
    pub imu_port: String,
    /// Baud rate for both connections
    pub baud_rate: u32,
}

/// Target board configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BoardConfig {
    /// Fully Qualified Board Name passed to arduino-cli
    pub fqbn: String,
    /// Boards offered when the default is not the connected hardware
    pub fallback_fqbns: Vec<String>,
}

/// Firmware file locations
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FirmwareConfig {
    /// Production firmware sketch to patch and upload
    pub firmware_path: PathBuf,
    /// Directory where the embedded calibration sketch is materialized;
    /// empty means the app data `arduino_sketches` directory
    pub sketch_dir: PathBuf,
    /// Write a `.backup` copy before the first rewrite of a firmware file
    pub write_backup: bool,
}

/// Calibration run parameters
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CalibrationConfig {
    /// Default known mass placed on the load cell, grams
    pub known_mass_g: f64,
    /// Seconds to wait for the device to finish an IMU calibration run
    pub settle_timeout_secs: u64,
    /// Re-arm step while expected offset data has not arrived, seconds
    pub retry_step_secs: u64,
    /// Accelerometer samples averaged per IMU
    pub sample_count: usize,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            loadcell_port: String::new(),
            imu_port: String::new(),
            baud_rate: 115_200,
        }
    }
}

impl Default for BoardConfig {
    fn default() -> Self {
        Self {
            fqbn: "teensy:avr:teensy41".to_string(),
            fallback_fqbns: vec![
                "arduino:mbed_nano:nano33ble".to_string(),
                "arduino:samd:nano_33_iot".to_string(),
                "arduino:avr:uno".to_string(),
                "arduino:avr:nano".to_string(),
                "arduino:mbed_nano:nanorp2040connect".to_string(),
            ],
        }
    }
}

impl Default for FirmwareConfig {
    fn default() -> Self {
        Self {
            firmware_path: PathBuf::from("firmware/firmware.ino"),
            sketch_dir: PathBuf::new(),
            write_backup: true,
        }
    }
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            known_mass_g: 100.0,
            settle_timeout_secs: 12,
            retry_step_secs: 2,
            sample_count: 100,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            serial: SerialConfig::default(),
            board: BoardConfig::default(),
            firmware: FirmwareConfig::default(),
            calibration: CalibrationConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load from `path` if it exists, defaults otherwise
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        if path.as_ref().exists() {
            Self::from_file(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to a TOML file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let contents = toml::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.serial.baud_rate, 115_200);
        assert_eq!(config.board.fqbn, "teensy:avr:teensy41");
        assert_eq!(config.calibration.known_mass_g, 100.0);
        assert_eq!(config.calibration.settle_timeout_secs, 12);
        assert_eq!(config.calibration.retry_step_secs, 2);
        assert!(config.firmware.write_backup);
    }

    #[test]
    fn test_toml_serialization() {
        let config = AppConfig::default();
        let toml_string = toml::to_string_pretty(&config).unwrap();

        assert!(toml_string.contains("[serial]"));
        assert!(toml_string.contains("[board]"));
        assert!(toml_string.contains("[firmware]"));
        assert!(toml_string.contains("[calibration]"));
        assert!(toml_string.contains("baud_rate = 115200"));
        assert!(toml_string.contains("known_mass_g = 100.0"));
    }

    #[test]
    fn test_toml_deserialization() {
        let toml_content = r#"
[serial]
loadcell_port = "/dev/ttyACM0"
imu_port = "/dev/ttyACM1"
baud_rate = 9600

[board]
fqbn = "arduino:avr:uno"

[calibration]
known_mass_g = 250.0
sample_count = 50
"#;

        let config: AppConfig = toml::from_str(toml_content).unwrap();
        assert_eq!(config.serial.loadcell_port, "/dev/ttyACM0");
        assert_eq!(config.serial.baud_rate, 9600);
        assert_eq!(config.board.fqbn, "arduino:avr:uno");
        assert_eq!(config.calibration.known_mass_g, 250.0);
        assert_eq!(config.calibration.sample_count, 50);
        // Unspecified sections keep their defaults
        assert_eq!(config.calibration.settle_timeout_secs, 12);
        assert!(config.firmware.write_backup);
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let config = AppConfig::load_or_default("/nonexistent/mars-cal.toml").unwrap();
        assert_eq!(config.board.fqbn, "teensy:avr:teensy41");
    }
}
