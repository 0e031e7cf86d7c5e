//! Unit conversion from raw sample words to calibrated physical units
//!
//! [`UnitConverter`] is the pure stage between acquisition and framing: it
//! applies a channel's offset/gain calibration to a completed sample block
//! and, in differential mode, combines two channels into one derived value.
//! It never blocks and is safe to call from the completion path.

use crate::error::{PipelineError, Result};
use crate::types::{CalibratedValue, Channel, SampleBuffer};

/// Applies per-channel calibration to completed sample blocks.
///
/// The scratch block is reused across calls so steady-state conversion does
/// not allocate.
#[derive(Debug, Default)]
pub struct UnitConverter {
    scratch: Vec<u32>,
}

impl UnitConverter {
    /// Create a new converter
    pub fn new() -> Self {
        Self::default()
    }

    /// Convert a completed buffer into a calibrated value.
    ///
    /// Every sample word in the block is calibrated into the scratch block;
    /// the reported value is the first element. Fails if the buffer is
    /// empty.
    pub fn convert(&mut self, buffer: &SampleBuffer, channel: &Channel) -> Result<CalibratedValue> {
        if buffer.is_empty() {
            return Err(PipelineError::Device(format!(
                "empty sample buffer on channel {}",
                channel.id
            )));
        }

        self.scratch.clear();
        self.scratch
            .extend(buffer.samples().iter().map(|&raw| channel.calibration.apply(raw)));

        Ok(CalibratedValue(self.scratch[0]))
    }

    /// The calibrated block from the most recent [`convert`](Self::convert)
    pub fn last_block(&self) -> &[u32] {
        &self.scratch
    }
}

/// Combine two calibrated values into the differential value `a - b`.
///
/// The subtraction is performed with 32-bit unsigned wraparound and the
/// result reinterpreted as signed 32-bit before widening: `combine(60, 100)`
/// is `-40`, never a clamped zero. Peers parse the value as a signed
/// decimal, so the reinterpretation is load-bearing.
pub fn combine(a: CalibratedValue, b: CalibratedValue) -> i64 {
    i64::from(a.0.wrapping_sub(b.0) as i32)
}
