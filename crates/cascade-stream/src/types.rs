use serde::{Deserialize, Serialize};

use cascade_audio::{format::encode_s16le, AudioFrame};

/// Dialogue-layer phase for one connection.
///
/// `Collecting` is owned by the VAD side: it is entered only when a
/// speech onset is admitted and left only when that speech ends. The
/// remaining states are set by the dialogue layer through the switch
/// guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SystemState {
    Idle,
    Collecting,
    Processing,
    Responding,
}

/// One emitted result. Exactly one variant per frame-time position;
/// consumers match exhaustively.
#[derive(Debug, Clone)]
pub enum CascadeResult {
    /// A frame with no speech activity.
    Frame {
        frame: AudioFrame,
        timestamp_ms: u64,
    },
    /// A completed speech span.
    Segment { segment: SpeechSegment },
    /// Voice onset while the dialogue layer was busy.
    Interruption { event: InterruptionEvent },
}

/// Contiguous speech audio delimited by start/end events plus padding.
#[derive(Debug, Clone)]
pub struct SpeechSegment {
    pub audio: Vec<f32>,
    pub start_timestamp_ms: u64,
    pub end_timestamp_ms: u64,
    pub sample_rate: u32,
}

impl SpeechSegment {
    pub fn duration_ms(&self) -> u64 {
        self.end_timestamp_ms - self.start_timestamp_ms
    }

    pub fn sample_count(&self) -> usize {
        self.audio.len()
    }

    /// The segment audio re-encoded as 16-bit little-endian PCM bytes.
    pub fn to_s16le(&self) -> Vec<u8> {
        encode_s16le(&self.audio)
    }
}

/// Onset-while-busy notification.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct InterruptionEvent {
    pub timestamp_ms: u64,
    /// The state the dialogue layer was in when the user started talking.
    pub interrupted_state: SystemState,
    /// Raw probability of the frame that crossed the threshold.
    pub confidence: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterruptionConfig {
    pub enabled: bool,
    /// Minimum spacing between admitted onsets; anything closer is
    /// throttled by the entry guard.
    pub min_interval_ms: u32,
}

impl Default for InterruptionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_interval_ms: 500,
        }
    }
}

/// Entry-guard verdict for a speech onset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnsetDecision {
    /// Admit the onset; a segment begins.
    Accept,
    /// Refuse the onset; the frame is passed through as non-speech.
    Reject,
    /// Admit the onset and report which busy state it cut off.
    Interrupt(SystemState),
}
