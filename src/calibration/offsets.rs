//! Formula-based angle offset calculation
//!
//! An offset is the angle the production firmware's own formula computes
//! from an IMU held flat and level: ideally zero, in practice a small
//! sensor/mounting bias that the firmware later subtracts at runtime.
//!
//! The firmware chains its corrections (IMU2's roll has IMU1's subtracted,
//! IMU3's has both), so the offsets must pre-compensate in the same order:
//! IMU1 first, then IMU2, then IMU3. Single closed-form pass, no
//! iteration.
//!
//! Axis conventions differ per mount: IMU1 and IMU2 measure pitch around
//! X with gravity nominally on +Y; IMU3 is mounted rotated, swapping X
//! and Z in its formulas.

use crate::error::{Error, Result};
use crate::types::{AccelSample, ImuOffsets, ImuSlot};

/// Below this, cos(pitch) is treated as zero: the IMU is pointing straight
/// up or down and its roll is undefined, so the offset is pinned to 0.0
/// instead of dividing by a vanishing cosine.
pub const COS_PITCH_EPSILON: f64 = 0.001;

/// Offsets resolved for one slot, radians
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SlotOffsets {
    pub pitch: f64,
    pub roll: f64,
}

/// Mean of a set of flat-and-level accelerometer samples
pub fn mean_sample(samples: &[AccelSample]) -> Option<AccelSample> {
    if samples.is_empty() {
        return None;
    }
    let n = samples.len() as f64;
    let (mut ax, mut ay, mut az) = (0.0, 0.0, 0.0);
    for s in samples {
        ax += s.ax;
        ay += s.ay;
        az += s.az;
    }
    Some(AccelSample::new(ax / n, ay / n, az / n))
}

fn flat_pitch(slot: ImuSlot, s: AccelSample) -> f64 {
    match slot {
        ImuSlot::Imu1 | ImuSlot::Imu2 => s.ax.atan2((s.ay * s.ay + s.az * s.az).sqrt()),
        ImuSlot::Imu3 => (-s.az).atan2((s.ax * s.ax + s.ay * s.ay).sqrt()),
    }
}

fn flat_roll(slot: ImuSlot, s: AccelSample, pitch: f64) -> f64 {
    let cos_pitch = pitch.cos();
    if cos_pitch.abs() < COS_PITCH_EPSILON {
        return 0.0;
    }
    let raw = match slot {
        ImuSlot::Imu1 | ImuSlot::Imu2 => (-s.az / cos_pitch).atan2(s.ay / cos_pitch),
        ImuSlot::Imu3 => (-s.ax / cos_pitch).atan2(s.ay / cos_pitch),
    };
    -raw
}

/// Resolves the four calibration offsets from per-slot flat readings.
///
/// Slots must be solved in order; attempting IMU2 before IMU1 (or IMU3
/// before both) is an error because the chained subtraction would read
/// stale values.
#[derive(Debug, Default)]
pub struct OffsetSolver {
    offsets: ImuOffsets,
    solved: [bool; 3],
}

impl OffsetSolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Solve one slot from its mean flat sample.
    ///
    /// Returns the slot's own pitch/roll pair; the chained offset is
    /// recorded internally and visible via [`offsets`](Self::offsets).
    pub fn solve(&mut self, slot: ImuSlot, sample: AccelSample) -> Result<SlotOffsets> {
        for earlier in &ImuSlot::ALL[..slot.index()] {
            if !self.solved[earlier.index()] {
                return Err(Error::NotCalibrated(format!(
                    "{} must be calibrated before {}",
                    earlier, slot
                )));
            }
        }

        let pitch = flat_pitch(slot, sample);
        let roll = flat_roll(slot, sample, pitch);

        match slot {
            ImuSlot::Imu1 => {
                self.offsets.imu1_pitch_offset = pitch;
                self.offsets.imu1_roll_offset = roll;
            }
            ImuSlot::Imu2 => {
                self.offsets.imu2_roll_offset = roll - self.offsets.imu1_roll_offset;
            }
            ImuSlot::Imu3 => {
                self.offsets.imu3_roll_offset =
                    roll - self.offsets.imu1_roll_offset - self.offsets.imu2_roll_offset;
            }
        }
        self.solved[slot.index()] = true;

        Ok(SlotOffsets { pitch, roll })
    }

    /// Record a device-reported offset instead of solving locally.
    ///
    /// Used when the sketch runs the calculation onboard and prints the
    /// already-chained result.
    pub fn record_reported(&mut self, slot: ImuSlot, pitch: Option<f64>, roll: f64) {
        match slot {
            ImuSlot::Imu1 => {
                if let Some(p) = pitch {
                    self.offsets.imu1_pitch_offset = p;
                }
                self.offsets.imu1_roll_offset = roll;
            }
            ImuSlot::Imu2 => self.offsets.imu2_roll_offset = roll,
            ImuSlot::Imu3 => self.offsets.imu3_roll_offset = roll,
        }
        self.solved[slot.index()] = true;
    }

    pub fn is_solved(&self, slot: ImuSlot) -> bool {
        self.solved[slot.index()]
    }

    pub fn offsets(&self) -> ImuOffsets {
        self.offsets
    }
}
