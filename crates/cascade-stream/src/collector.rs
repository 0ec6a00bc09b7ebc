use std::collections::VecDeque;

use cascade_audio::AudioFrame;
use cascade_foundation::CascadeError;
use cascade_vad::{VadConfig, FRAME_SIZE_SAMPLES};
use tracing::debug;

use crate::types::SpeechSegment;

/// Accumulates the audio of one speech span between start and end events.
///
/// While idle it keeps a short rolling window of recently seen frames so
/// that an accepted onset (whose timestamp is pad-adjusted into the past)
/// can prepend the audio that preceded the trigger frame.
///
/// Event ordering is strict: a start while a segment is open, or an end
/// without one, is an invariant bug upstream and is fatal.
pub struct SegmentCollector {
    pad_window: VecDeque<AudioFrame>,
    pad_window_capacity: usize,
    active: Option<ActiveSegment>,
    segments_completed: u64,
    sample_rate: u32,
}

struct ActiveSegment {
    audio: Vec<f32>,
    start_timestamp_ms: u64,
    frames: u64,
}

impl SegmentCollector {
    pub fn new(config: &VadConfig) -> Self {
        // Enough whole frames to cover speech_pad_ms of look-back.
        let pad_window_capacity =
            (config.pad_samples() as usize).div_ceil(FRAME_SIZE_SAMPLES);
        Self {
            pad_window: VecDeque::with_capacity(pad_window_capacity),
            pad_window_capacity,
            active: None,
            segments_completed: 0,
            sample_rate: config.sample_rate,
        }
    }

    pub fn is_collecting(&self) -> bool {
        self.active.is_some()
    }

    pub fn segments_completed(&self) -> u64 {
        self.segments_completed
    }

    /// Record an idle frame as pre-pad material for the next segment.
    pub fn observe_idle(&mut self, frame: &AudioFrame) {
        if self.pad_window_capacity == 0 {
            return;
        }
        if self.pad_window.len() == self.pad_window_capacity {
            self.pad_window.pop_front();
        }
        self.pad_window.push_back(frame.clone());
    }

    /// Open a segment at the (pad-adjusted) start timestamp, prepending
    /// buffered look-back frames that overlap it.
    pub fn on_start(&mut self, timestamp_ms: u64) -> Result<(), CascadeError> {
        if self.active.is_some() {
            return Err(CascadeError::StateViolation(
                "speech start while a segment is already open".into(),
            ));
        }

        let mut audio = Vec::new();
        for frame in self.pad_window.drain(..) {
            if frame.end_timestamp_ms() > timestamp_ms {
                audio.extend_from_slice(&frame.samples);
            }
        }
        debug!(
            timestamp_ms,
            pad_samples = audio.len(),
            "opening speech segment"
        );

        self.active = Some(ActiveSegment {
            audio,
            start_timestamp_ms: timestamp_ms,
            frames: 0,
        });
        Ok(())
    }

    /// Append one frame's audio to the open segment.
    pub fn on_frame(&mut self, frame: &AudioFrame) -> Result<(), CascadeError> {
        let active = self.active.as_mut().ok_or_else(|| {
            CascadeError::StateViolation("speech frame without an open segment".into())
        })?;
        active.audio.extend_from_slice(&frame.samples);
        active.frames += 1;
        Ok(())
    }

    /// Close the open segment at the (pad-adjusted) end timestamp.
    pub fn on_end(&mut self, timestamp_ms: u64) -> Result<SpeechSegment, CascadeError> {
        let active = self.active.take().ok_or_else(|| {
            CascadeError::StateViolation("speech end without an open segment".into())
        })?;

        self.segments_completed += 1;
        debug!(
            start_ms = active.start_timestamp_ms,
            end_ms = timestamp_ms,
            frames = active.frames,
            "closing speech segment"
        );

        Ok(SpeechSegment {
            audio: active.audio,
            start_timestamp_ms: active.start_timestamp_ms,
            end_timestamp_ms: timestamp_ms,
            sample_rate: self.sample_rate,
        })
    }

    pub fn reset(&mut self) {
        self.pad_window.clear();
        self.active = None;
    }
}
