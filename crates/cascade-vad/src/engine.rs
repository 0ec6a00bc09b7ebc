use crate::constants::{FRAME_SIZE_SAMPLES, SAMPLE_RATE_HZ};

/// Inference seam for voice-activity models.
///
/// One engine instance belongs to exactly one stream and is owned by that
/// stream's inference worker; recurrent model state (the Silero LSTM
/// cells) is therefore per-stream by construction. `reset_states` is
/// called when the stream opens and again after finalize.
pub trait VadEngine: Send {
    /// Run the model over one full frame and return P(speech) in [0, 1].
    fn infer(&mut self, frame: &[f32]) -> Result<f32, String>;

    /// Clear recurrent model state.
    fn reset_states(&mut self);

    fn required_sample_rate(&self) -> u32 {
        SAMPLE_RATE_HZ
    }

    fn required_frame_size_samples(&self) -> usize {
        FRAME_SIZE_SAMPLES
    }
}
