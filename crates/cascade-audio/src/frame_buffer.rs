use std::collections::VecDeque;

use cascade_foundation::AudioError;
use tracing::trace;

use crate::format::SampleFormat;
use crate::frame::AudioFrame;

/// Bridges arbitrary-size input chunks to fixed-size inference frames.
///
/// A monotonic append-only logical buffer with two cursors:
/// `total_samples_written` counts everything appended, and
/// `total_samples_consumed` counts everything handed out as frames. The
/// next frame always starts at sample index `total_samples_consumed`, so
/// frame timestamps are derived from sample counts alone and successive
/// frames are exactly `frame_size * 1000 / sample_rate` ms apart.
pub struct FrameAlignedBuffer {
    pending: VecDeque<f32>,
    decode_scratch: Vec<f32>,
    frame_size: usize,
    sample_rate: u32,
    total_samples_written: u64,
    total_samples_consumed: u64,
}

impl Default for FrameAlignedBuffer {
    fn default() -> Self {
        Self::new(512, 16_000)
    }
}

impl FrameAlignedBuffer {
    pub fn new(frame_size: usize, sample_rate: u32) -> Self {
        Self {
            pending: VecDeque::with_capacity(frame_size * 4),
            decode_scratch: Vec::new(),
            frame_size,
            sample_rate,
            total_samples_written: 0,
            total_samples_consumed: 0,
        }
    }

    /// Append a chunk of raw PCM bytes in the given format.
    ///
    /// The chunk must be a whole number of samples; a misaligned chunk is
    /// rejected without consuming any of it.
    pub fn append(&mut self, bytes: &[u8], format: SampleFormat) -> Result<(), AudioError> {
        if bytes.is_empty() {
            return Ok(());
        }
        format.check_alignment(bytes.len())?;

        self.decode_scratch.clear();
        format.decode_into(bytes, &mut self.decode_scratch);
        self.pending.extend(self.decode_scratch.iter().copied());
        self.total_samples_written += self.decode_scratch.len() as u64;
        trace!(
            appended = self.decode_scratch.len(),
            pending = self.pending.len(),
            "buffer append"
        );
        Ok(())
    }

    /// Pop the next full frame if one is available. Never blocks.
    pub fn pop_frame(&mut self) -> Option<AudioFrame> {
        if self.pending.len() < self.frame_size {
            return None;
        }
        let start_timestamp_ms = self.next_frame_timestamp_ms();
        let samples: Vec<f32> = self.pending.drain(..self.frame_size).collect();
        self.total_samples_consumed += self.frame_size as u64;

        Some(AudioFrame {
            samples,
            start_timestamp_ms,
            sample_rate: self.sample_rate,
        })
    }

    /// Drain any residual samples as a final frame, zero-padded on the
    /// right to the full frame size. Returns `None` when nothing remains.
    pub fn flush(&mut self) -> Option<AudioFrame> {
        if self.pending.is_empty() {
            return None;
        }
        let residual = self.pending.len();
        debug_assert!(residual < self.frame_size);
        let start_timestamp_ms = self.next_frame_timestamp_ms();
        let mut samples: Vec<f32> = self.pending.drain(..).collect();
        samples.resize(self.frame_size, 0.0);
        self.total_samples_consumed += residual as u64;
        trace!(residual, "buffer flush, zero-padding final frame");

        Some(AudioFrame {
            samples,
            start_timestamp_ms,
            sample_rate: self.sample_rate,
        })
    }

    /// Samples appended but not yet consumed into a frame.
    pub fn buffered_samples(&self) -> usize {
        self.pending.len()
    }

    pub fn total_samples_written(&self) -> u64 {
        self.total_samples_written
    }

    pub fn total_samples_consumed(&self) -> u64 {
        self.total_samples_consumed
    }

    /// Stream position in integer milliseconds (position of the next
    /// unconsumed sample).
    pub fn position_ms(&self) -> u64 {
        self.total_samples_consumed * 1000 / self.sample_rate as u64
    }

    fn next_frame_timestamp_ms(&self) -> u64 {
        self.total_samples_consumed * 1000 / self.sample_rate as u64
    }
}
