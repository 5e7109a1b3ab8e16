//! Error types for the calibration host

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Calibration host error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Serial port error
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parse error
    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// TOML serialize error
    #[error("TOML write error: {0}")]
    TomlWrite(#[from] toml::ser::Error),

    /// Device connection lost or never established
    #[error("Device disconnected")]
    Disconnected,

    /// Operation deadline expired
    #[error("Timed out: {0}")]
    Timeout(String),

    /// Firmware constant not found in source text
    #[error("Constant not found in firmware source: {0}")]
    PatternNotFound(String),

    /// arduino-cli binary could not be located
    #[error("arduino-cli not found (checked configured path, app data dir, and PATH)")]
    CliNotFound,

    /// External command exited with failure
    #[error("{program} failed ({status}): {stderr}")]
    CommandFailed {
        /// Program name, e.g. "arduino-cli compile"
        program: String,
        /// Exit status description
        status: String,
        /// Captured standard error
        stderr: String,
    },

    /// Required calibration value is missing
    #[error("Not calibrated: {0}")]
    NotCalibrated(String),

    /// Invalid parameter
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Generic error with message
    #[error("{0}")]
    Other(String),
}
