use crate::{config::Config, source::Frame, BeatlightError, Result};

/// Scalar loudness measurement for a single frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnergySample {
    pub frame_index: u64,
    /// Normalized RMS in [0, 1].
    pub level: f32,
}

/// Computes one normalized RMS loudness value per frame.
///
/// Pure: same frame in, same sample out, no side effects. The only failure
/// mode is a frame of the wrong length.
#[derive(Debug, Clone)]
pub struct EnergyEstimator {
    chunk_size: usize,
    reference_level: f32,
}

impl EnergyEstimator {
    pub fn new(config: &Config) -> Self {
        Self {
            chunk_size: config.audio.chunk_size,
            reference_level: config.analysis.reference_level,
        }
    }

    /// Root-mean-square of the frame, normalized against the reference
    /// level and saturated at 1.0 so output is comparable across frames.
    /// Non-finite samples contribute silence.
    pub fn estimate(&self, frame: &Frame) -> Result<EnergySample> {
        if frame.samples.len() != self.chunk_size {
            return Err(BeatlightError::InvalidFrame {
                expected: self.chunk_size,
                actual: frame.samples.len(),
            });
        }

        let sum: f32 = frame
            .samples
            .iter()
            .map(|s| if s.is_finite() { s * s } else { 0.0 })
            .sum();
        let rms = (sum / frame.samples.len() as f32).sqrt();

        Ok(EnergySample {
            frame_index: frame.index,
            level: (rms / self.reference_level).min(1.0),
        })
    }
}
