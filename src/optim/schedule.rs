//! Piecewise-linear learning-rate schedule

use crate::error::{Error, Result};

/// Learning-rate multiplier defined by linear interpolation between
/// `(step, value)` anchor points.
///
/// Below the first anchor the multiplier ramps linearly from an implicit
/// `(0, 0.0)` origin, which is the warmup ramp when the first anchor is the warmup
/// step count. Beyond the last anchor the multiplier holds the last anchor's
/// value.
#[derive(Debug, Clone)]
pub struct PiecewiseLinearSchedule {
    anchors: Vec<(u64, f32)>,
}

impl PiecewiseLinearSchedule {
    /// Create a schedule from anchor points.
    ///
    /// Anchor steps must be strictly increasing and values finite and
    /// non-negative; otherwise construction fails.
    pub fn new(anchors: Vec<(u64, f32)>) -> Result<Self> {
        if anchors.is_empty() {
            return Err(Error::Config("learning-rate schedule needs at least one anchor".into()));
        }
        for window in anchors.windows(2) {
            if window[1].0 <= window[0].0 {
                return Err(Error::Config(format!(
                    "schedule anchors must be strictly increasing, got {} then {}",
                    window[0].0, window[1].0
                )));
            }
        }
        if anchors.iter().any(|&(_, v)| !v.is_finite() || v < 0.0) {
            return Err(Error::Config("schedule values must be finite and non-negative".into()));
        }
        Ok(Self { anchors })
    }

    /// Constant multiplier of 1.0
    pub fn constant() -> Self {
        Self { anchors: vec![(0, 1.0)] }
    }

    /// Warmup-then-decay shape: ramp to 1.0 at `warmup_steps * scale`,
    /// decay to 0.0 at `total_steps * scale`.
    pub fn warmup_decay(warmup_steps: u64, total_steps: u64, scale: u64) -> Result<Self> {
        Self::new(vec![(warmup_steps * scale, 1.0), (total_steps * scale, 0.0)])
    }

    /// Multiplier at `step`, in the same unit the anchors use
    pub fn multiplier(&self, step: u64) -> f32 {
        let mut prev = (0u64, 0.0f32);
        for &(anchor_step, value) in &self.anchors {
            if step < anchor_step {
                let span = (anchor_step - prev.0) as f32;
                let t = (step - prev.0) as f32 / span;
                return prev.1 + t * (value - prev.1);
            }
            prev = (anchor_step, value);
        }
        prev.1
    }
}
