use serde::{Deserialize, Serialize};

use cascade_foundation::CascadeError;

use crate::constants::SAMPLE_RATE_HZ;

/// Tuning for the probability-to-event hysteresis.
///
/// `speech_pad_ms` widens both edges of an emitted segment;
/// `min_silence_duration_ms` is how long the probability must stay below
/// the release threshold before an `end` is committed. The two are
/// independent knobs even though they happen to default to the same value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VadConfig {
    /// Speech probability threshold, exclusive (0, 1).
    pub threshold: f32,
    pub speech_pad_ms: u32,
    pub min_silence_duration_ms: u32,
    pub sample_rate: u32,
}

impl Default for VadConfig {
    fn default() -> Self {
        Self {
            threshold: 0.5,
            speech_pad_ms: 100,
            min_silence_duration_ms: 100,
            sample_rate: SAMPLE_RATE_HZ,
        }
    }
}

impl VadConfig {
    pub fn validate(&self) -> Result<(), CascadeError> {
        if !(self.threshold > 0.0 && self.threshold < 1.0) {
            return Err(CascadeError::Config(format!(
                "threshold must be in (0, 1), got {}",
                self.threshold
            )));
        }
        if self.sample_rate != SAMPLE_RATE_HZ {
            return Err(CascadeError::Config(format!(
                "sample_rate must be {} Hz, got {}",
                SAMPLE_RATE_HZ, self.sample_rate
            )));
        }
        Ok(())
    }

    pub fn pad_samples(&self) -> u64 {
        self.speech_pad_ms as u64 * self.sample_rate as u64 / 1000
    }

    pub fn min_silence_samples(&self) -> u64 {
        self.min_silence_duration_ms as u64 * self.sample_rate as u64 / 1000
    }
}
