//! Application data directory layout

use crate::error::{Error, Result};
use directories::ProjectDirs;
use std::fs;
use std::path::{Path, PathBuf};

const APP_NAME: &str = "MarsLoadCellCalibration";

/// Per-OS application data directories.
///
/// Everything the tool writes lives under one root: logs, calibration
/// records, the arduino-cli binary (if locally installed), materialized
/// sketches, and scratch space.
#[derive(Debug, Clone)]
pub struct AppDirs {
    pub root: PathBuf,
    pub logs: PathBuf,
    pub calibrations: PathBuf,
    pub arduino_cli: PathBuf,
    pub sketches: PathBuf,
    pub temp: PathBuf,
}

impl AppDirs {
    /// Resolve against the platform's data directory
    /// (APPDATA / ~/Library/Application Support / ~/.local/share)
    pub fn resolve() -> Result<Self> {
        let dirs = ProjectDirs::from("", "", APP_NAME)
            .ok_or_else(|| Error::Other("no home directory available".to_string()))?;
        Ok(Self::under(dirs.data_dir()))
    }

    /// Lay the directory structure out under an explicit root
    pub fn under<P: AsRef<Path>>(root: P) -> Self {
        let root = root.as_ref().to_path_buf();
        Self {
            logs: root.join("logs"),
            calibrations: root.join("calibrations"),
            arduino_cli: root.join("arduino-cli"),
            sketches: root.join("arduino_sketches"),
            temp: root.join("temp"),
            root,
        }
    }

    /// Create every directory in the layout
    pub fn create_all(&self) -> Result<()> {
        for dir in [
            &self.root,
            &self.logs,
            &self.calibrations,
            &self.arduino_cli,
            &self.sketches,
            &self.temp,
        ] {
            fs::create_dir_all(dir)?;
        }
        Ok(())
    }

    /// Best-effort removal of scratch files; failures are logged only
    pub fn cleanup_temp(&self) {
        let Ok(entries) = fs::read_dir(&self.temp) else {
            return;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_file() {
                if let Err(e) = fs::remove_file(&path) {
                    log::warn!("Could not remove temp file {}: {}", path.display(), e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_under_root() {
        let dirs = AppDirs::under("/tmp/mars-cal-app");
        assert_eq!(dirs.logs, PathBuf::from("/tmp/mars-cal-app/logs"));
        assert_eq!(
            dirs.calibrations,
            PathBuf::from("/tmp/mars-cal-app/calibrations")
        );
        assert_eq!(
            dirs.sketches,
            PathBuf::from("/tmp/mars-cal-app/arduino_sketches")
        );
    }

    #[test]
    fn create_and_cleanup() {
        let root = std::env::temp_dir().join(format!("mars-cal-dirs-{}", std::process::id()));
        let dirs = AppDirs::under(&root);
        dirs.create_all().unwrap();
        assert!(dirs.temp.is_dir());

        fs::write(dirs.temp.join("scratch.bin"), b"x").unwrap();
        dirs.cleanup_temp();
        assert_eq!(fs::read_dir(&dirs.temp).unwrap().count(), 0);

        fs::remove_dir_all(&root).unwrap();
    }
}
