//! Embedded calibration sketch
//!
//! The sketch ships inside the binary so the tool never depends on a
//! checkout being present next to the executable; it is written out to
//! the sketch directory right before compiling.

use crate::error::Result;
use std::fs;
use std::path::{Path, PathBuf};

/// The unified load cell + IMU calibration sketch
pub const CALIBRATION_SKETCH: &str = include_str!("../../assets/calibration.ino");

/// Sketch directory name; arduino-cli requires the `.ino` to live in a
/// directory of the same name.
const SKETCH_NAME: &str = "calibration";

/// Write the embedded sketch under `base_dir`, returning the sketch
/// directory to hand to arduino-cli.
pub fn materialize_sketch<P: AsRef<Path>>(base_dir: P) -> Result<PathBuf> {
    let sketch_dir = base_dir.as_ref().join(SKETCH_NAME);
    fs::create_dir_all(&sketch_dir)?;

    let ino_path = sketch_dir.join(format!("{SKETCH_NAME}.ino"));
    fs::write(&ino_path, CALIBRATION_SKETCH)?;
    log::debug!("Calibration sketch written to {}", ino_path.display());

    Ok(sketch_dir)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sketch_carries_the_protocol_strings() {
        // The host parser depends on these exact strings
        assert!(CALIBRATION_SKETCH.contains("calibration value has been set to: "));
        assert!(CALIBRATION_SKETCH.contains("IMU1 Pitch Offset: "));
        assert!(CALIBRATION_SKETCH.contains("IMU3 Roll Offset: "));
    }

    #[test]
    fn materialize_creates_nested_ino() {
        let base = std::env::temp_dir().join(format!("mars-cal-sketch-{}", std::process::id()));
        let dir = materialize_sketch(&base).unwrap();
        assert!(dir.ends_with("calibration"));
        assert!(dir.join("calibration.ino").exists());
        fs::remove_dir_all(&base).unwrap();
    }
}
