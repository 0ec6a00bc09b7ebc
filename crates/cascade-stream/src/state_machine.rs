use cascade_audio::AudioFrame;
use cascade_foundation::CascadeError;
use cascade_vad::{VadConfig, VadIterator, VadTransition};
use tracing::{debug, warn};

use crate::collector::SegmentCollector;
use crate::interruption::{InterruptionManager, InterruptionStats};
use crate::types::{
    CascadeResult, InterruptionConfig, InterruptionEvent, OnsetDecision, SystemState,
};

/// Orchestrates hysteresis, segment collection and the interruption
/// guards into one per-frame step.
///
/// For every admitted start exactly one end is produced before the next
/// start (or at finalize). When the entry guard refuses an onset the
/// hysteresis is rolled back so the physical trigger state cannot drift
/// from the dialogue state.
pub struct VadStateMachine {
    iterator: VadIterator,
    collector: SegmentCollector,
    interruption: InterruptionManager,
}

impl VadStateMachine {
    pub fn new(vad_config: VadConfig, interruption_config: InterruptionConfig) -> Self {
        Self {
            iterator: VadIterator::new(vad_config.clone()),
            collector: SegmentCollector::new(&vad_config),
            interruption: InterruptionManager::new(interruption_config),
        }
    }

    pub fn process_frame(
        &mut self,
        frame: AudioFrame,
        probability: f32,
    ) -> Result<Option<CascadeResult>, CascadeError> {
        match self.iterator.process(probability) {
            Some(VadTransition::SpeechStart { timestamp_ms }) => {
                match self.interruption.on_speech_onset(timestamp_ms) {
                    OnsetDecision::Reject => {
                        // Entry guard said no: forget the trigger so the
                        // hysteresis and the dialogue state stay in step,
                        // and pass the frame through as non-speech.
                        self.iterator.rollback_start();
                        debug!(timestamp_ms, "speech onset refused, rolling back trigger");
                        Ok(Some(self.pass_through(frame)))
                    }
                    OnsetDecision::Interrupt(interrupted_state) => {
                        self.collector.on_start(timestamp_ms)?;
                        self.collector.on_frame(&frame)?;
                        Ok(Some(CascadeResult::Interruption {
                            event: InterruptionEvent {
                                timestamp_ms,
                                interrupted_state,
                                confidence: probability,
                            },
                        }))
                    }
                    OnsetDecision::Accept => {
                        self.collector.on_start(timestamp_ms)?;
                        self.collector.on_frame(&frame)?;
                        Ok(None)
                    }
                }
            }
            Some(VadTransition::SpeechEnd { timestamp_ms }) => {
                // The closing frame's audio belongs to the segment; the
                // end timestamp is already pad-adjusted into the past.
                self.collector.on_frame(&frame)?;
                let segment = self.collector.on_end(timestamp_ms)?;
                self.interruption.on_speech_offset();
                Ok(Some(CascadeResult::Segment { segment }))
            }
            None => {
                if self.collector.is_collecting() {
                    self.collector.on_frame(&frame)?;
                    Ok(None)
                } else {
                    Ok(Some(self.pass_through(frame)))
                }
            }
        }
    }

    /// Flush an in-progress segment as if an end event had arrived at the
    /// current stream position.
    pub fn finalize(&mut self) -> Result<Option<CascadeResult>, CascadeError> {
        match self.iterator.force_end() {
            Some(VadTransition::SpeechEnd { timestamp_ms }) => {
                if !self.collector.is_collecting() {
                    return Err(CascadeError::StateViolation(
                        "hysteresis triggered with no open segment at finalize".into(),
                    ));
                }
                let segment = self.collector.on_end(timestamp_ms)?;
                self.interruption.on_speech_offset();
                debug!(end_ms = timestamp_ms, "finalize flushed trailing segment");
                Ok(Some(CascadeResult::Segment { segment }))
            }
            _ => {
                if self.collector.is_collecting() {
                    // force_end only returns None when untriggered, so an
                    // open segment here means the two halves diverged.
                    return Err(CascadeError::StateViolation(
                        "segment open with no triggered hysteresis at finalize".into(),
                    ));
                }
                Ok(None)
            }
        }
    }

    pub fn request_state(&mut self, new_state: SystemState) -> bool {
        if new_state == SystemState::Collecting {
            warn!("external callers may not set the collecting state");
            return false;
        }
        self.interruption.request_state(new_state)
    }

    pub fn system_state(&self) -> SystemState {
        self.interruption.state()
    }

    pub fn interruption_stats(&self) -> InterruptionStats {
        self.interruption.stats()
    }

    pub fn is_collecting(&self) -> bool {
        self.collector.is_collecting()
    }

    fn pass_through(&mut self, frame: AudioFrame) -> CascadeResult {
        self.collector.observe_idle(&frame);
        let timestamp_ms = frame.start_timestamp_ms;
        CascadeResult::Frame {
            frame,
            timestamp_ms,
        }
    }
}
