// ABOUTME: Playback cadence ramp: frames-per-second as a saturating function of frame count.
// ABOUTME: Short sequences play slowly, long ones approach the cap asymptotically.

use std::num::NonZeroUsize;

use thiserror::Error;

/// Lower bound applied to fps before inverting it into a frame duration.
const MIN_DIVISOR_FPS: f64 = 0.001;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CadenceError {
    #[error("min fps must be positive and finite, got {0}")]
    InvalidMin(f64),

    #[error("max fps ({max}) must be finite and greater than min fps ({min})")]
    InvalidMax { min: f64, max: f64 },

    #[error("rate constant must be positive and finite, got {0}")]
    InvalidRate(f64),
}

/// Ease-out curve `fps(n) = min + (max - min) * (1 - e^(-n / rate))`.
///
/// `rate` is the e-folding constant of the curve: at `n = rate` playback has
/// covered about 63% of the way from `min` to `max`, and the halfway point is
/// reached at `n = rate * ln 2`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RampCurve {
    min_fps: f64,
    max_fps: f64,
    rate_constant: f64,
}

impl Default for RampCurve {
    fn default() -> Self {
        Self {
            min_fps: 1.0,
            max_fps: 8.0,
            rate_constant: 40.0,
        }
    }
}

impl RampCurve {
    pub fn new(min_fps: f64, max_fps: f64, rate_constant: f64) -> Result<Self, CadenceError> {
        if !(min_fps.is_finite() && min_fps > 0.0) {
            return Err(CadenceError::InvalidMin(min_fps));
        }
        if !(max_fps.is_finite() && max_fps > min_fps) {
            return Err(CadenceError::InvalidMax {
                min: min_fps,
                max: max_fps,
            });
        }
        if !(rate_constant.is_finite() && rate_constant > 0.0) {
            return Err(CadenceError::InvalidRate(rate_constant));
        }
        Ok(Self {
            min_fps,
            max_fps,
            rate_constant,
        })
    }

    pub fn min_fps(&self) -> f64 {
        self.min_fps
    }

    pub fn max_fps(&self) -> f64 {
        self.max_fps
    }

    pub fn rate_constant(&self) -> f64 {
        self.rate_constant
    }

    /// Playback rate for a sequence of `frames` frames. Zero frames has no
    /// cadence, which the `NonZeroUsize` argument rules out.
    pub fn fps(&self, frames: NonZeroUsize) -> f64 {
        let n = frames.get() as f64;
        let progress = 1.0 - (-n / self.rate_constant).exp();
        self.min_fps + (self.max_fps - self.min_fps) * progress
    }

    /// Seconds each frame stays on screen.
    pub fn frame_duration(&self, frames: NonZeroUsize) -> f64 {
        1.0 / self.fps(frames).max(MIN_DIVISOR_FPS)
    }
}
