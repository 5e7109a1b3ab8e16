//! Calibration math and wizard flow state

mod offsets;
mod wizard;

pub use offsets::{mean_sample, OffsetSolver, SlotOffsets, COS_PITCH_EPSILON};
pub use wizard::{ImuWait, LoadCellStep, LoadCellWizard};
