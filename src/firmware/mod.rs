//! Firmware source handling: constant patching and the embedded sketch

mod patcher;
mod sketch;

pub use patcher::{
    patch_calibration_factor, patch_constant, patch_constant_with_precision, patch_factor_file,
    patch_file, try_patch_constant,
};
pub use sketch::{materialize_sketch, CALIBRATION_SKETCH};

/// Constant patched into the production firmware for the load cell.
/// Declared there as `float calibration_factor = <value>;` and formatted
/// with two decimals, matching the declaration it replaces.
pub const CALIBRATION_FACTOR_NAME: &str = "calibration_factor";

/// Angle offset constants in the production firmware's `variable.h`,
/// in calibration order.
pub const OFFSET_CONSTANT_NAMES: [&str; 4] = [
    "IMU1PITCHOFFSET",
    "IMU1ROLLOFFSET",
    "IMU2ROLLOFFSET",
    "IMU3ROLLOFFSET",
];
