//! Fixed parameters of the inference model's input contract.

/// Sample rate the model was trained on (Hz).
pub const SAMPLE_RATE_HZ: u32 = 16_000;

/// Model input window in samples. 512 samples at 16 kHz; a different
/// sample rate would require a different window size.
pub const FRAME_SIZE_SAMPLES: usize = 512;

/// Integer duration of one full frame: 32 ms.
pub const FRAME_DURATION_MS: u64 = FRAME_SIZE_SAMPLES as u64 * 1000 / SAMPLE_RATE_HZ as u64;
