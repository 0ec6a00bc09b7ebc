use std::path::Path;

use cascade_foundation::AudioError;
use hound::{SampleFormat as WavSampleFormat, WavReader};
use tracing::info;

/// Decoded WAV audio, folded to mono, ready to feed a stream processor.
///
/// No resampling is performed: the engine runs at a fixed rate, so files
/// at any other rate are rejected up front.
#[derive(Debug)]
pub struct WavAudio {
    samples: Vec<i16>,
    sample_rate: u32,
}

impl WavAudio {
    pub fn load<P: AsRef<Path>>(path: P, required_rate: u32) -> Result<Self, AudioError> {
        let mut reader = WavReader::open(path.as_ref())?;
        let spec = reader.spec();

        info!(
            "Loading WAV: {} Hz, {} channels, {} bits",
            spec.sample_rate, spec.channels, spec.bits_per_sample
        );

        if spec.sample_rate != required_rate {
            return Err(AudioError::UnsupportedSampleRate {
                rate: spec.sample_rate,
                required: required_rate,
            });
        }

        let interleaved: Vec<i16> = match spec.sample_format {
            WavSampleFormat::Int => reader
                .samples::<i16>()
                .collect::<Result<Vec<_>, _>>()?,
            WavSampleFormat::Float => reader
                .samples::<f32>()
                .map(|s| s.map(|v| (v.clamp(-1.0, 1.0) * 32767.0) as i16))
                .collect::<Result<Vec<_>, _>>()?,
        };

        let samples = fold_to_mono(&interleaved, spec.channels);
        info!("WAV loaded: {} mono samples at {} Hz", samples.len(), spec.sample_rate);

        Ok(Self {
            samples,
            sample_rate: spec.sample_rate,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Iterate the audio as s16le byte chunks of at most
    /// `samples_per_chunk` samples, emulating live capture pacing.
    pub fn s16le_chunks(&self, samples_per_chunk: usize) -> impl Iterator<Item = Vec<u8>> + '_ {
        self.samples.chunks(samples_per_chunk).map(|chunk| {
            chunk
                .iter()
                .flat_map(|s| s.to_le_bytes())
                .collect::<Vec<u8>>()
        })
    }
}

fn fold_to_mono(interleaved: &[i16], channels: u16) -> Vec<i16> {
    if channels <= 1 {
        return interleaved.to_vec();
    }
    let channels = channels as usize;
    interleaved
        .chunks_exact(channels)
        .map(|group| {
            let sum: i32 = group.iter().map(|&s| s as i32).sum();
            (sum / channels as i32) as i16
        })
        .collect()
}
