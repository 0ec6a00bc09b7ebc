use tracing::trace;

use crate::config::VadConfig;
use crate::constants::FRAME_SIZE_SAMPLES;

/// Edge event produced by the hysteresis, with pad-adjusted timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VadTransition {
    SpeechStart { timestamp_ms: u64 },
    SpeechEnd { timestamp_ms: u64 },
}

/// Translates per-frame speech probabilities into start/end edges.
///
/// Trigger at `threshold`, release at `threshold - 0.15` (the Silero
/// margin; downstream consumers depend on it) held for at least
/// `min_silence_duration_ms`. A probability back above the threshold
/// while triggered discards a provisional end, which is what merges
/// segments separated by sub-minimum pauses.
pub struct VadIterator {
    config: VadConfig,
    triggered: bool,
    /// Sample index where the current provisional silence run began.
    temp_end: Option<u64>,
    /// Sample index one past the most recently processed frame.
    current_sample: u64,
}

/// Release margin below the trigger threshold (Silero convention).
const RELEASE_MARGIN: f32 = 0.15;

impl VadIterator {
    pub fn new(config: VadConfig) -> Self {
        Self {
            config,
            triggered: false,
            temp_end: None,
            current_sample: 0,
        }
    }

    /// Advance one frame and return the edge it produces, if any.
    pub fn process(&mut self, probability: f32) -> Option<VadTransition> {
        self.current_sample += FRAME_SIZE_SAMPLES as u64;

        if probability >= self.config.threshold && self.temp_end.is_some() {
            // Speech resumed inside the provisional silence window.
            self.temp_end = None;
        }

        if probability >= self.config.threshold && !self.triggered {
            self.triggered = true;
            let start_sample = self
                .current_sample
                .saturating_sub(FRAME_SIZE_SAMPLES as u64 + self.config.pad_samples());
            let timestamp_ms = self.samples_to_ms(start_sample);
            trace!(probability, timestamp_ms, "speech start");
            return Some(VadTransition::SpeechStart { timestamp_ms });
        }

        if probability < self.config.threshold - RELEASE_MARGIN && self.triggered {
            let silence_began = *self.temp_end.get_or_insert(self.current_sample);
            if self.current_sample - silence_began >= self.config.min_silence_samples() {
                self.triggered = false;
                self.temp_end = None;
                let timestamp_ms = self.samples_to_ms(silence_began + self.config.pad_samples());
                trace!(probability, timestamp_ms, "speech end");
                return Some(VadTransition::SpeechEnd { timestamp_ms });
            }
        }

        None
    }

    /// Forget the start edge just emitted. Used when the onset was
    /// refused downstream, so the next loud frame re-emits a start.
    pub fn rollback_start(&mut self) {
        self.triggered = false;
        self.temp_end = None;
    }

    /// Close an in-flight speech run at the current stream position, as
    /// if an end edge had arrived. No pad is applied: the stream is over.
    pub fn force_end(&mut self) -> Option<VadTransition> {
        if !self.triggered {
            return None;
        }
        self.triggered = false;
        let end_sample = self.temp_end.take().unwrap_or(self.current_sample);
        Some(VadTransition::SpeechEnd {
            timestamp_ms: self.samples_to_ms(end_sample),
        })
    }

    pub fn is_triggered(&self) -> bool {
        self.triggered
    }

    pub fn current_sample(&self) -> u64 {
        self.current_sample
    }

    pub fn reset(&mut self) {
        self.triggered = false;
        self.temp_end = None;
        self.current_sample = 0;
    }

    fn samples_to_ms(&self, samples: u64) -> u64 {
        samples * 1000 / self.config.sample_rate as u64
    }
}
