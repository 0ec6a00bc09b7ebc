use thiserror::Error;

#[derive(Error, Debug)]
pub enum CascadeError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid input: {0}")]
    InvalidInput(#[from] AudioError),

    #[error("Inference failed: {0}")]
    InferenceFailure(String),

    #[error("State violation: {0}")]
    StateViolation(String),

    #[error("Operation not permitted in this lifecycle phase: {0}")]
    LifecycleMisuse(&'static str),

    #[error("Stream cancelled")]
    Cancelled,
}

impl CascadeError {
    /// A recoverable error leaves the stream usable; the offending input is
    /// dropped and counted. `StateViolation` means an internal invariant
    /// broke and the stream must terminate.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, CascadeError::StateViolation(_))
    }
}

#[derive(Error, Debug)]
pub enum AudioError {
    #[error("Chunk length {len} is not a multiple of the {sample_size}-byte sample size")]
    InvalidLength { len: usize, sample_size: usize },

    #[error("Chunk of {len} bytes exceeds the {max} byte limit")]
    ChunkTooLarge { len: usize, max: usize },

    #[error("Unsupported sample format: {0}")]
    UnsupportedFormat(String),

    #[error("Unsupported sample rate: {rate} Hz (engine requires {required} Hz)")]
    UnsupportedSampleRate { rate: u32, required: u32 },

    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_violation_is_fatal() {
        let err = CascadeError::StateViolation("end without start".into());
        assert!(!err.is_recoverable());
    }

    #[test]
    fn input_errors_are_recoverable() {
        let err = CascadeError::InvalidInput(AudioError::InvalidLength {
            len: 3,
            sample_size: 2,
        });
        assert!(err.is_recoverable());
        assert!(CascadeError::InferenceFailure("worker died".into()).is_recoverable());
        assert!(CascadeError::Cancelled.is_recoverable());
    }

    #[test]
    fn audio_error_converts_into_invalid_input() {
        let err: CascadeError = AudioError::UnsupportedFormat("pcm_u8".into()).into();
        assert!(matches!(err, CascadeError::InvalidInput(_)));
    }
}
