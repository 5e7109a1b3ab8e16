//! arduino-cli subprocess wrapper
//!
//! Every interaction with the toolchain goes through the `arduino-cli`
//! binary: index updates, core/library installs, compile, upload. Each
//! invocation runs to completion with a hard per-step deadline; a step
//! that overruns is killed and reported, never retried automatically.

mod boards;

pub use boards::{
    auto_select, classify_port, list_ports, required_core_for, upload_hint, DetectedPort,
    PortKind,
};

use crate::error::{Error, Result};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

/// Board support packages the calibration sketch can target
pub const REQUIRED_CORES: [&str; 4] = [
    "teensy:avr",
    "arduino:mbed_nano",
    "arduino:samd",
    "arduino:avr",
];

/// Libraries the sketches include
pub const REQUIRED_LIBRARIES: [&str; 2] = ["HX711 Arduino Library", "Arduino_LSM9DS1"];

const VERSION_TIMEOUT: Duration = Duration::from_secs(5);
const INDEX_TIMEOUT: Duration = Duration::from_secs(60);
const CORE_INSTALL_TIMEOUT: Duration = Duration::from_secs(300);
const LIB_INSTALL_TIMEOUT: Duration = Duration::from_secs(180);
const COMPILE_TIMEOUT: Duration = Duration::from_secs(120);
const UPLOAD_TIMEOUT: Duration = Duration::from_secs(60);

/// Handle to a located arduino-cli binary
pub struct ArduinoCli {
    binary: PathBuf,
}

impl ArduinoCli {
    /// Locate the binary: explicit path, then the app data dir, then PATH.
    ///
    /// Each candidate is probed with `version`; the first that answers
    /// wins.
    pub fn locate(configured: Option<&Path>, app_cli_dir: &Path) -> Result<Self> {
        let mut candidates: Vec<PathBuf> = Vec::new();
        if let Some(path) = configured {
            candidates.push(path.to_path_buf());
        }
        candidates.push(app_cli_dir.join(binary_name()));
        candidates.push(PathBuf::from("arduino-cli"));

        for candidate in candidates {
            let cli = ArduinoCli {
                binary: candidate.clone(),
            };
            match cli.version() {
                Ok(version) => {
                    log::info!("Using arduino-cli at {}: {}", candidate.display(), version);
                    return Ok(cli);
                }
                Err(e) => {
                    log::debug!("Probe failed for {}: {}", candidate.display(), e);
                }
            }
        }
        Err(Error::CliNotFound)
    }

    pub fn version(&self) -> Result<String> {
        let out = self.run("version", &["version"], VERSION_TIMEOUT)?;
        Ok(out.lines().next().unwrap_or_default().to_string())
    }

    pub fn core_update_index(&self) -> Result<()> {
        log::info!("Updating board package index...");
        self.run("core update-index", &["core", "update-index"], INDEX_TIMEOUT)?;
        Ok(())
    }

    pub fn installed_cores(&self) -> Result<String> {
        self.run("core list", &["core", "list"], INDEX_TIMEOUT)
    }

    pub fn core_install(&self, package: &str) -> Result<()> {
        log::info!("Installing board package: {}", package);
        self.run(
            "core install",
            &["core", "install", package],
            CORE_INSTALL_TIMEOUT,
        )?;
        Ok(())
    }

    pub fn installed_libraries(&self) -> Result<String> {
        self.run("lib list", &["lib", "list"], INDEX_TIMEOUT)
    }

    pub fn lib_install(&self, library: &str) -> Result<()> {
        log::info!("Installing library: {}", library);
        self.run("lib install", &["lib", "install", library], LIB_INSTALL_TIMEOUT)?;
        Ok(())
    }

    /// Compile a sketch directory for the given board
    pub fn compile(&self, sketch_dir: &Path, fqbn: &str) -> Result<String> {
        log::info!("Compiling {} for {}", sketch_dir.display(), fqbn);
        let sketch = sketch_dir.to_string_lossy();
        self.run(
            "compile",
            &["compile", "--fqbn", fqbn, sketch.as_ref()],
            COMPILE_TIMEOUT,
        )
    }

    /// Upload a compiled sketch to a port
    pub fn upload(&self, sketch_dir: &Path, fqbn: &str, port: &str) -> Result<String> {
        log::info!("Uploading {} to {} ({})", sketch_dir.display(), port, fqbn);
        let sketch = sketch_dir.to_string_lossy();
        let result = self.run(
            "upload",
            &["upload", "-p", port, "--fqbn", fqbn, sketch.as_ref()],
            UPLOAD_TIMEOUT,
        );
        if result.is_err() {
            if let Some(hint) = upload_hint(fqbn) {
                log::warn!("{}", hint);
            }
        }
        result
    }

    /// Install everything the sketches need. Individual failures are
    /// logged and skipped so one unavailable core does not block the rest.
    pub fn setup_environment(&self) -> Result<()> {
        self.core_update_index()?;

        let installed = self.installed_cores().unwrap_or_default();
        for core in REQUIRED_CORES {
            if installed.contains(core) {
                log::info!("Board package {} already installed", core);
                continue;
            }
            if let Err(e) = self.core_install(core) {
                log::warn!("Failed to install {}: {}", core, e);
            }
        }

        let installed = self.installed_libraries().unwrap_or_default();
        for library in REQUIRED_LIBRARIES {
            if installed.contains(library) {
                log::info!("Library {} already installed", library);
                continue;
            }
            if let Err(e) = self.lib_install(library) {
                log::warn!("Failed to install {}: {}", library, e);
            }
        }
        Ok(())
    }

    /// Run one CLI invocation with a deadline.
    ///
    /// stdout/stderr are drained on side threads (the pipes fill and
    /// deadlock otherwise); the child is polled until it exits or the
    /// deadline passes, in which case it is killed.
    fn run(&self, label: &str, args: &[&str], timeout: Duration) -> Result<String> {
        let mut child = Command::new(&self.binary)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let stdout_handle = thread::spawn(move || drain(stdout));
        let stderr_handle = thread::spawn(move || drain(stderr));

        let deadline = Instant::now() + timeout;
        let status = loop {
            if let Some(status) = child.try_wait()? {
                break status;
            }
            if Instant::now() >= deadline {
                let _ = child.kill();
                let _ = child.wait();
                return Err(Error::Timeout(format!(
                    "arduino-cli {} exceeded {}s",
                    label,
                    timeout.as_secs()
                )));
            }
            thread::sleep(Duration::from_millis(50));
        };

        let stdout = stdout_handle.join().unwrap_or_default();
        let stderr = stderr_handle.join().unwrap_or_default();

        if status.success() {
            Ok(stdout)
        } else {
            Err(Error::CommandFailed {
                program: format!("arduino-cli {}", label),
                status: status.to_string(),
                stderr: stderr.trim().to_string(),
            })
        }
    }
}

fn drain<R: Read>(pipe: Option<R>) -> String {
    let mut buf = String::new();
    if let Some(mut pipe) = pipe {
        let mut bytes = Vec::new();
        if pipe.read_to_end(&mut bytes).is_ok() {
            buf = String::from_utf8_lossy(&bytes).into_owned();
        }
    }
    buf
}

fn binary_name() -> &'static str {
    if cfg!(windows) {
        "arduino-cli.exe"
    } else {
        "arduino-cli"
    }
}
