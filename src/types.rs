//! Core data types shared across the calibration flows

use serde::{Deserialize, Serialize};

/// One accelerometer reading, in g, as sent by the calibration sketch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AccelSample {
    pub ax: f64,
    pub ay: f64,
    pub az: f64,
}

impl AccelSample {
    pub fn new(ax: f64, ay: f64, az: f64) -> Self {
        Self { ax, ay, az }
    }
}

/// Full telemetry line from the sketch:
/// `AX,AY,AZ,ROLL,PITCH,YAW,OFFSET_X,OFFSET_Y,OFFSET_Z`.
///
/// Angles are degrees, computed on the device. The host only displays
/// them; it never recomputes roll/pitch/yaw from the accelerometer fields.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Telemetry {
    pub ax: f64,
    pub ay: f64,
    pub az: f64,
    pub roll: f64,
    pub pitch: f64,
    pub yaw: f64,
    pub offset_x: f64,
    pub offset_y: f64,
    pub offset_z: f64,
}

impl Telemetry {
    pub fn accel(&self) -> AccelSample {
        AccelSample::new(self.ax, self.ay, self.az)
    }
}

/// Which of the three mounted IMUs a reading or offset belongs to.
///
/// Calibration is strictly sequential: IMU2's roll offset subtracts
/// IMU1's, and IMU3's subtracts both, mirroring the chained correction
/// the production firmware applies at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ImuSlot {
    Imu1,
    Imu2,
    Imu3,
}

impl ImuSlot {
    pub const ALL: [ImuSlot; 3] = [ImuSlot::Imu1, ImuSlot::Imu2, ImuSlot::Imu3];

    pub fn index(&self) -> usize {
        match self {
            ImuSlot::Imu1 => 0,
            ImuSlot::Imu2 => 1,
            ImuSlot::Imu3 => 2,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ImuSlot::Imu1 => "IMU1",
            ImuSlot::Imu2 => "IMU2",
            ImuSlot::Imu3 => "IMU3",
        }
    }
}

impl std::fmt::Display for ImuSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// The four formula-based angle offsets, in radians.
///
/// 0.0 doubles as "not yet calibrated"; a legitimately computed zero is
/// indistinguishable from an unset slot. `all_calibrated` inherits that
/// ambiguity on purpose.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ImuOffsets {
    pub imu1_pitch_offset: f64,
    pub imu1_roll_offset: f64,
    pub imu2_roll_offset: f64,
    pub imu3_roll_offset: f64,
}

impl ImuOffsets {
    /// All four offsets non-zero, the source's proxy for "every IMU done".
    pub fn all_calibrated(&self) -> bool {
        self.imu1_pitch_offset != 0.0
            && self.imu1_roll_offset != 0.0
            && self.imu2_roll_offset != 0.0
            && self.imu3_roll_offset != 0.0
    }
}

/// Load cell scale factor. 1.0 means "uncalibrated".
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LoadCellCalibration {
    pub calibration_factor: f64,
}

impl Default for LoadCellCalibration {
    fn default() -> Self {
        Self {
            calibration_factor: 1.0,
        }
    }
}

impl LoadCellCalibration {
    pub fn is_calibrated(&self) -> bool {
        self.calibration_factor != 1.0
    }
}
