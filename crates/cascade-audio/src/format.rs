use serde::{Deserialize, Serialize};

use cascade_foundation::AudioError;

/// PCM wire formats accepted at the stream boundary. Mono, 16 kHz.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleFormat {
    /// 16-bit signed integer, little-endian.
    S16Le,
    /// 32-bit float, little-endian.
    F32Le,
}

impl SampleFormat {
    pub fn bytes_per_sample(self) -> usize {
        match self {
            SampleFormat::S16Le => 2,
            SampleFormat::F32Le => 4,
        }
    }

    /// Decode a byte chunk into f32 samples, appending to `out`.
    ///
    /// The chunk length must already be validated as a whole number of
    /// samples; trailing partial bytes would silently corrupt alignment.
    pub(crate) fn decode_into(self, bytes: &[u8], out: &mut Vec<f32>) {
        match self {
            SampleFormat::S16Le => {
                out.extend(bytes.chunks_exact(2).map(|pair| {
                    i16::from_le_bytes([pair[0], pair[1]]) as f32 / 32768.0
                }));
            }
            SampleFormat::F32Le => {
                out.extend(bytes.chunks_exact(4).map(|quad| {
                    f32::from_le_bytes([quad[0], quad[1], quad[2], quad[3]])
                }));
            }
        }
    }

    /// Validate that `len` bytes is a whole number of samples.
    pub fn check_alignment(self, len: usize) -> Result<(), AudioError> {
        let sample_size = self.bytes_per_sample();
        if len % sample_size != 0 {
            return Err(AudioError::InvalidLength { len, sample_size });
        }
        Ok(())
    }
}

/// Encode f32 samples as 16-bit signed little-endian bytes.
pub fn encode_s16le(samples: &[f32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(samples.len() * 2);
    for &sample in samples {
        let clamped = sample.clamp(-1.0, 1.0);
        let value = (clamped * 32767.0).round() as i16;
        out.extend_from_slice(&value.to_le_bytes());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn s16le_decode_scales_by_32768() {
        let bytes = [0x00, 0x80, 0x00, 0x00, 0xff, 0x7f]; // -32768, 0, 32767
        let mut out = Vec::new();
        SampleFormat::S16Le.decode_into(&bytes, &mut out);
        assert_eq!(out.len(), 3);
        assert!((out[0] - (-1.0)).abs() < 1e-6);
        assert_eq!(out[1], 0.0);
        assert!((out[2] - 32767.0 / 32768.0).abs() < 1e-6);
    }

    #[test]
    fn f32le_decode_is_bit_exact() {
        let samples = [0.25f32, -0.5, 1.0];
        let bytes: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
        let mut out = Vec::new();
        SampleFormat::F32Le.decode_into(&bytes, &mut out);
        assert_eq!(out, samples);
    }

    #[test]
    fn alignment_check_rejects_partial_samples() {
        assert!(SampleFormat::S16Le.check_alignment(3).is_err());
        assert!(SampleFormat::S16Le.check_alignment(4).is_ok());
        assert!(SampleFormat::F32Le.check_alignment(6).is_err());
        assert!(SampleFormat::F32Le.check_alignment(8).is_ok());
    }

    #[test]
    fn s16le_round_trip_within_quantization() {
        let samples = [0.0f32, 0.5, -0.5, 0.999];
        let bytes = encode_s16le(&samples);
        let mut decoded = Vec::new();
        SampleFormat::S16Le.decode_into(&bytes, &mut decoded);
        for (a, b) in samples.iter().zip(&decoded) {
            assert!((a - b).abs() < 1.0 / 32000.0, "{} vs {}", a, b);
        }
    }
}
