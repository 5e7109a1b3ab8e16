//! Interactive calibration flows
//!
//! Thin orchestration over the library modules: prompts stand in for the
//! buttons of a control panel, serial events stream to stdout the way a
//! monitor pane would render them.

use crate::arduino::{self, ArduinoCli};
use crate::calibration::{mean_sample, ImuWait, LoadCellStep, LoadCellWizard, OffsetSolver};
use crate::config::AppConfig;
use crate::device::{Command, DeviceEvent, DeviceLink};
use crate::error::{Error, Result};
use crate::firmware::{self, materialize_sketch};
use crate::paths::AppDirs;
use crate::protocol::{DeviceMessage, OffsetAxis};
use crate::store::{list_history, CalibrationRecord, RecordedOffsets};
use crate::types::{AccelSample, ImuSlot, LoadCellCalibration};
use std::io::{BufRead, Write};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Poll granularity while waiting on device events
const EVENT_POLL: Duration = Duration::from_millis(100);

/// Pause after an upload before reopening the port; boards re-enumerate
const REBOOT_GRACE: Duration = Duration::from_secs(2);

/// Give up on a silent device after this many deadline extensions
const MAX_WAIT_EXTENSIONS: u32 = 10;

pub struct App {
    config: AppConfig,
    dirs: AppDirs,
}

impl App {
    pub fn new(config: AppConfig, dirs: AppDirs) -> Self {
        Self { config, dirs }
    }

    /// `ports`: list everything, flag recognized boards
    pub fn list_ports(&self) -> Result<()> {
        let ports = arduino::list_ports()?;
        if ports.is_empty() {
            log::warn!("No serial ports detected");
            return Ok(());
        }
        println!("Found {} serial port(s):", ports.len());
        for port in &ports {
            println!("  {}", port.summary());
        }
        if let Some(selected) = arduino::auto_select(&ports) {
            println!("Auto-selected: {}", selected.name);
        }
        Ok(())
    }

    /// `monitor`: stream parsed lines until Ctrl-C
    pub fn monitor(&self, port: Option<String>) -> Result<()> {
        let port = self.resolve_port(port, &self.config.serial.imu_port)?;
        let link = DeviceLink::open(&port, self.config.serial.baud_rate)?;
        println!("Connected to {}. Press Ctrl-C to stop.", port);

        let running = Arc::new(AtomicBool::new(true));
        let r = Arc::clone(&running);
        ctrlc::set_handler(move || {
            r.store(false, Ordering::Relaxed);
        })
        .map_err(|e| Error::Other(format!("Error setting Ctrl-C handler: {}", e)))?;

        while running.load(Ordering::Relaxed) {
            match link.events().recv_timeout(EVENT_POLL) {
                Ok(DeviceEvent::Message(message)) => print_message(&message),
                Ok(DeviceEvent::ConnectionLost) => {
                    log::error!("Connection lost");
                    break;
                }
                Err(_) => {} // poll timeout, check the flag again
            }
        }
        link.disconnect();
        Ok(())
    }

    /// `setup`: locate arduino-cli and install cores/libraries
    pub fn setup(&self) -> Result<()> {
        let cli = self.locate_cli()?;
        cli.setup_environment()?;
        println!("Arduino environment ready");
        Ok(())
    }

    /// `loadcell`: the three-step load cell wizard
    pub fn run_load_cell(
        &self,
        port: Option<String>,
        mars_id: u16,
        known_mass: Option<f64>,
    ) -> Result<()> {
        let port = self.resolve_port(port, &self.config.serial.loadcell_port)?;
        let known_mass = known_mass.unwrap_or(self.config.calibration.known_mass_g);
        let mut wizard = LoadCellWizard::new();

        // Step 1: upload the calibration sketch
        println!("Step 1/3: uploading calibration sketch to {}", port);
        let cli = self.locate_cli()?;
        self.upload_calibration_sketch(&cli, &port)?;
        wizard.sketch_uploaded();

        // Step 2: tare, calibrate, wait for the factor
        println!("Step 2/3: load cell calibration");
        std::thread::sleep(REBOOT_GRACE);
        let link = DeviceLink::open(&port, self.config.serial.baud_rate)?;
        link.send(Command::LoadCellMode)?;

        wait_for_enter("Remove any load from the cell, then press Enter to tare")?;
        link.send(Command::Tare)?;
        drain_for(&link, Duration::from_secs(3))?;

        wait_for_enter("Press Enter to start calibration")?;
        link.send(Command::StartLoadCellCalibration)?;
        drain_for(&link, Duration::from_secs(2))?;

        wait_for_enter(&format!(
            "Place the known mass ({:.1} g) on the cell, then press Enter",
            known_mass
        ))?;
        link.send(Command::KnownMass(known_mass))?;

        let factor = self.await_factor(&link)?;
        wizard.factor_received(factor);
        println!("Calibration factor: {:.2}", factor);
        link.disconnect();

        // Step 3: patch the factor into firmware and upload it
        println!("Step 3/3: patching and uploading firmware");
        let firmware = self.config.firmware.firmware_path.clone();
        firmware::patch_factor_file(&firmware, factor, self.config.firmware.write_backup)?;
        self.compile_and_upload(&cli, firmware.parent().unwrap_or(Path::new(".")), &port)?;
        wizard.firmware_uploaded();
        debug_assert_eq!(wizard.step(), LoadCellStep::Complete);

        let record = CalibrationRecord::new(
            mars_id,
            LoadCellCalibration {
                calibration_factor: factor,
            },
            self.latest_offsets().unwrap_or_default(),
        )?;
        let path = record.save(&self.dirs.calibrations)?;
        println!("Done. Record: {}", path.display());
        Ok(())
    }

    /// `imu`: sequential three-IMU calibration
    pub fn run_imu(&self, port: Option<String>, mars_id: u16) -> Result<()> {
        let port = self.resolve_port(port, &self.config.serial.imu_port)?;
        let link = DeviceLink::open(&port, self.config.serial.baud_rate)?;
        link.send(Command::ImuMode)?;

        let mut solver = OffsetSolver::new();
        for slot in ImuSlot::ALL {
            wait_for_enter(&format!(
                "Mount {} flat and level, keep it still, then press Enter",
                slot
            ))?;
            link.send(Command::StartImuCalibration)?;
            self.calibrate_slot(&link, &mut solver, slot)?;
            println!("{} done", slot);
        }
        link.disconnect();

        let offsets = solver.offsets();
        println!("IMU1 pitch offset: {:.6} rad", offsets.imu1_pitch_offset);
        println!("IMU1 roll offset:  {:.6} rad", offsets.imu1_roll_offset);
        println!("IMU2 roll offset:  {:.6} rad", offsets.imu2_roll_offset);
        println!("IMU3 roll offset:  {:.6} rad", offsets.imu3_roll_offset);
        if !offsets.all_calibrated() {
            log::warn!("Some offsets are exactly zero; they will read as uncalibrated");
        }

        let firmware = &self.config.firmware.firmware_path;
        let updates: Vec<(&str, f64)> = firmware::OFFSET_CONSTANT_NAMES
            .iter()
            .copied()
            .zip([
                offsets.imu1_pitch_offset,
                offsets.imu1_roll_offset,
                offsets.imu2_roll_offset,
                offsets.imu3_roll_offset,
            ])
            .collect();
        firmware::patch_file(firmware, &updates, self.config.firmware.write_backup)?;
        println!("Firmware updated: {}", firmware.display());

        let record = CalibrationRecord::new(
            mars_id,
            self.latest_factor().unwrap_or_default(),
            RecordedOffsets::from_offsets(&offsets),
        )?;
        let path = record.save(&self.dirs.calibrations)?;
        println!("Record: {}", path.display());
        Ok(())
    }

    /// `patch`: one-off constant rewrite
    pub fn patch(&self, file: &Path, name: &str, value: f64, backup: bool) -> Result<()> {
        firmware::patch_file(file, &[(name, value)], backup)?;
        println!("Patched {} = {:.6} in {}", name, value, file.display());
        Ok(())
    }

    /// `history`: saved calibration records, newest first
    pub fn history(&self) -> Result<()> {
        let records = list_history(&self.dirs.calibrations)?;
        if records.is_empty() {
            println!("No calibration records yet");
            return Ok(());
        }
        println!(
            "{:<8} {:>12} {:>10} {:>10} {:>10} {:>10} {:>10}",
            "Mars ID", "Factor", "IMU1 P", "IMU1 R", "IMU2 R", "IMU3 R", "Saved"
        );
        for (_, record) in records {
            let o = &record.imu_offsets;
            println!(
                "{:<8} {:>12.2} {:>10.6} {:>10.6} {:>10.6} {:>10.6} {:>10}",
                record.metadata.mars_id,
                record.load_cell.calibration_factor,
                o.imu1_pitch_offset,
                o.imu1_roll_offset,
                o.imu2_roll_offset,
                o.imu3_roll_offset,
                record.metadata.timestamp,
            );
        }
        Ok(())
    }

    // ---- internals ----

    fn locate_cli(&self) -> Result<ArduinoCli> {
        ArduinoCli::locate(None, &self.dirs.arduino_cli)
    }

    fn resolve_port(&self, explicit: Option<String>, configured: &str) -> Result<String> {
        if let Some(port) = explicit {
            return Ok(port);
        }
        if !configured.is_empty() {
            return Ok(configured.to_string());
        }
        let ports = arduino::list_ports()?;
        arduino::auto_select(&ports)
            .map(|p| p.name.clone())
            .ok_or_else(|| {
                Error::InvalidParameter(
                    "no port given, none configured, and auto-detect found nothing".to_string(),
                )
            })
    }

    fn upload_calibration_sketch(&self, cli: &ArduinoCli, port: &str) -> Result<()> {
        let base = if self.config.firmware.sketch_dir.as_os_str().is_empty() {
            self.dirs.sketches.clone()
        } else {
            self.config.firmware.sketch_dir.clone()
        };
        let sketch_dir = materialize_sketch(&base)?;
        self.compile_and_upload(cli, &sketch_dir, port)
    }

    fn compile_and_upload(&self, cli: &ArduinoCli, sketch_dir: &Path, port: &str) -> Result<()> {
        let fqbn = &self.config.board.fqbn;
        if let Some(core) = arduino::required_core_for(fqbn) {
            let installed = cli.installed_cores().unwrap_or_default();
            if !installed.contains(core.as_str()) {
                cli.core_install(&core)?;
            }
        }
        cli.compile(sketch_dir, fqbn)?;
        cli.upload(sketch_dir, fqbn, port)?;
        Ok(())
    }

    /// Print traffic while waiting for the calibration-factor line
    fn await_factor(&self, link: &DeviceLink) -> Result<f64> {
        let deadline = Instant::now()
            + Duration::from_secs(self.config.calibration.settle_timeout_secs)
            + Duration::from_secs(30);
        loop {
            match link.events().recv_timeout(EVENT_POLL) {
                Ok(DeviceEvent::Message(DeviceMessage::CalibrationFactor(factor))) => {
                    return Ok(factor);
                }
                Ok(DeviceEvent::Message(message)) => print_message(&message),
                Ok(DeviceEvent::ConnectionLost) => return Err(Error::Disconnected),
                Err(_) => {}
            }
            if Instant::now() >= deadline {
                return Err(Error::Timeout(
                    "no calibration factor received".to_string(),
                ));
            }
        }
    }

    /// Collect flat samples for one IMU and solve its offsets.
    ///
    /// Completion paths, in priority order: the device prints its own
    /// full offset report (onboard calculation); enough telemetry samples
    /// arrive to solve locally; the armed deadline finally runs dry.
    fn calibrate_slot(
        &self,
        link: &DeviceLink,
        solver: &mut OffsetSolver,
        slot: ImuSlot,
    ) -> Result<()> {
        let target = self.config.calibration.sample_count;
        let mut samples: Vec<AccelSample> = Vec::with_capacity(target);
        let mut reported_pitch: Option<f64> = None;
        let mut reported_roll: Option<f64> = None;

        let mut wait = ImuWait::arm(
            Duration::from_secs(self.config.calibration.settle_timeout_secs),
            Duration::from_secs(self.config.calibration.retry_step_secs),
        );
        let mut extensions = 0u32;
        let mut lines_at_arm = link.lines_received();

        loop {
            match link.events().recv_timeout(EVENT_POLL) {
                Ok(DeviceEvent::Message(DeviceMessage::Telemetry(t))) => {
                    samples.push(t.accel());
                    if samples.len() >= target {
                        let mean = mean_sample(&samples)
                            .ok_or_else(|| Error::NotCalibrated(slot.to_string()))?;
                        let out = solver.solve(slot, mean)?;
                        log::info!(
                            "{}: pitch {:.6} rad, roll {:.6} rad (from {} samples)",
                            slot,
                            out.pitch,
                            out.roll,
                            samples.len()
                        );
                        return Ok(());
                    }
                }
                Ok(DeviceEvent::Message(DeviceMessage::OffsetReport {
                    slot: reported,
                    axis,
                    radians,
                })) if reported == slot => {
                    match axis {
                        OffsetAxis::Pitch => reported_pitch = Some(radians),
                        OffsetAxis::Roll => reported_roll = Some(radians),
                    }
                    if let Some(roll) = reported_roll {
                        // IMU2/IMU3 only report roll; IMU1 needs both
                        if slot != ImuSlot::Imu1 || reported_pitch.is_some() {
                            solver.record_reported(slot, reported_pitch, roll);
                            log::info!("{}: offsets reported by device", slot);
                            return Ok(());
                        }
                    }
                }
                Ok(DeviceEvent::Message(message)) => print_message(&message),
                Ok(DeviceEvent::ConnectionLost) => return Err(Error::Disconnected),
                Err(_) => {}
            }

            let now = Instant::now();
            if wait.expired(now) {
                if !samples.is_empty() {
                    // Partial run: solve with what arrived
                    let mean = mean_sample(&samples)
                        .ok_or_else(|| Error::NotCalibrated(slot.to_string()))?;
                    log::warn!(
                        "{}: deadline reached with {}/{} samples, solving anyway",
                        slot,
                        samples.len(),
                        target
                    );
                    solver.solve(slot, mean)?;
                    return Ok(());
                }
                let lines_now = link.lines_received();
                if lines_now > lines_at_arm && extensions < MAX_WAIT_EXTENSIONS {
                    // Device is talking but the data has not arrived yet
                    wait.extend(now);
                    extensions += 1;
                    lines_at_arm = lines_now;
                    log::debug!("{}: deadline extended ({})", slot, extensions);
                } else {
                    return Err(Error::Timeout(format!(
                        "{} produced no calibration data",
                        slot
                    )));
                }
            }
        }
    }

    /// Factor from the newest saved record, for IMU-only runs
    fn latest_factor(&self) -> Option<LoadCellCalibration> {
        list_history(&self.dirs.calibrations)
            .ok()?
            .into_iter()
            .next()
            .map(|(_, r)| r.load_cell)
    }

    /// Offsets from the newest saved record, for load-cell-only runs
    fn latest_offsets(&self) -> Option<RecordedOffsets> {
        list_history(&self.dirs.calibrations)
            .ok()?
            .into_iter()
            .next()
            .map(|(_, r)| r.imu_offsets)
    }
}

fn print_message(message: &DeviceMessage) {
    match message {
        DeviceMessage::Raw(line) => println!("Device: {}", line),
        DeviceMessage::Telemetry(t) => println!(
            "ax {:+.4}  ay {:+.4}  az {:+.4}  roll {:+7.2}  pitch {:+7.2}  yaw {:+7.2}",
            t.ax, t.ay, t.az, t.roll, t.pitch, t.yaw
        ),
        DeviceMessage::OffsetReport {
            slot,
            axis,
            radians,
        } => {
            let axis = match axis {
                OffsetAxis::Pitch => "pitch",
                OffsetAxis::Roll => "roll",
            };
            println!("Device: {} {} offset {:.6} rad", slot, axis, radians);
        }
        DeviceMessage::CalibrationFactor(factor) => {
            println!("Device: calibration factor {:.2}", factor);
        }
    }
}

/// Echo device output for a fixed window, e.g. while a tare settles
fn drain_for(link: &DeviceLink, duration: Duration) -> Result<()> {
    let deadline = Instant::now() + duration;
    while Instant::now() < deadline {
        match link.events().recv_timeout(EVENT_POLL) {
            Ok(DeviceEvent::Message(message)) => print_message(&message),
            Ok(DeviceEvent::ConnectionLost) => return Err(Error::Disconnected),
            Err(_) => {}
        }
    }
    Ok(())
}

fn wait_for_enter(message: &str) -> Result<()> {
    print!("{} ", message);
    std::io::stdout().flush()?;
    let mut line = String::new();
    std::io::stdin().lock().read_line(&mut line)?;
    Ok(())
}
