use serde::Serialize;
use tracing::{debug, info};

use crate::types::{InterruptionConfig, OnsetDecision, SystemState};

/// Owns the dialogue state and arbitrates who may change it.
///
/// Two guards keep the VAD side and the dialogue side from overwriting
/// each other's notion of "the user is speaking right now":
///
/// - the *entry guard* (`on_speech_onset`) decides whether a detected
///   onset may move the state to `Collecting`, throttling onsets that
///   arrive within `min_interval_ms` of the last admitted one;
/// - the *switch guard* (`request_state`) refuses every external
///   transition while `Collecting`, and otherwise only honors the edges
///   `Idle -> Processing`, `Processing -> Responding` and `* -> Idle`.
pub struct InterruptionManager {
    config: InterruptionConfig,
    current_state: SystemState,
    last_onset_ts_ms: Option<u64>,
    onsets_accepted: u64,
    onsets_throttled: u64,
    interruptions: u64,
    external_transitions: u64,
    external_rejections: u64,
}

/// Queryable snapshot of guard activity.
#[derive(Debug, Clone, Serialize)]
pub struct InterruptionStats {
    pub current_state: SystemState,
    pub onsets_accepted: u64,
    pub onsets_throttled: u64,
    pub interruptions: u64,
    pub external_transitions: u64,
    pub external_rejections: u64,
}

impl InterruptionManager {
    pub fn new(config: InterruptionConfig) -> Self {
        Self {
            config,
            current_state: SystemState::Idle,
            last_onset_ts_ms: None,
            onsets_accepted: 0,
            onsets_throttled: 0,
            interruptions: 0,
            external_transitions: 0,
            external_rejections: 0,
        }
    }

    /// Entry guard: decide the fate of a speech onset at `ts_ms`.
    pub fn on_speech_onset(&mut self, ts_ms: u64) -> OnsetDecision {
        if !self.config.enabled {
            // Detection disabled: never report interruptions, but still
            // claim the state so segment collection stays coherent.
            if self.current_state == SystemState::Collecting {
                return OnsetDecision::Reject;
            }
            self.current_state = SystemState::Collecting;
            self.onsets_accepted += 1;
            return OnsetDecision::Accept;
        }

        if let Some(last) = self.last_onset_ts_ms {
            if ts_ms.saturating_sub(last) < self.config.min_interval_ms as u64 {
                debug!(
                    ts_ms,
                    last_onset = last,
                    "onset throttled by min_interval guard"
                );
                self.onsets_throttled += 1;
                return OnsetDecision::Reject;
            }
        }
        self.last_onset_ts_ms = Some(ts_ms);

        match self.current_state {
            SystemState::Processing | SystemState::Responding => {
                let interrupted = self.current_state;
                self.current_state = SystemState::Collecting;
                self.interruptions += 1;
                info!(ts_ms, ?interrupted, "user interrupted the system");
                OnsetDecision::Interrupt(interrupted)
            }
            SystemState::Idle => {
                self.current_state = SystemState::Collecting;
                self.onsets_accepted += 1;
                OnsetDecision::Accept
            }
            // A second onset while already collecting cannot come from a
            // well-formed event stream; refuse it.
            SystemState::Collecting => OnsetDecision::Reject,
        }
    }

    /// The speech that claimed the state has ended.
    pub fn on_speech_offset(&mut self) {
        debug!(from = ?self.current_state, "speech offset, returning to idle");
        self.current_state = SystemState::Idle;
    }

    /// Switch guard: apply an externally requested transition, or refuse.
    pub fn request_state(&mut self, new_state: SystemState) -> bool {
        if self.current_state == SystemState::Collecting {
            debug!(?new_state, "state change refused: user is speaking");
            self.external_rejections += 1;
            return false;
        }

        let valid = matches!(
            (self.current_state, new_state),
            (SystemState::Idle, SystemState::Processing)
                | (SystemState::Processing, SystemState::Responding)
                | (_, SystemState::Idle)
        );
        if !valid {
            debug!(
                from = ?self.current_state,
                to = ?new_state,
                "state change refused: invalid transition"
            );
            self.external_rejections += 1;
            return false;
        }

        info!(from = ?self.current_state, to = ?new_state, "dialogue state change");
        self.current_state = new_state;
        self.external_transitions += 1;
        true
    }

    pub fn state(&self) -> SystemState {
        self.current_state
    }

    pub fn stats(&self) -> InterruptionStats {
        InterruptionStats {
            current_state: self.current_state,
            onsets_accepted: self.onsets_accepted,
            onsets_throttled: self.onsets_throttled,
            interruptions: self.interruptions,
            external_transitions: self.external_transitions,
            external_rejections: self.external_rejections,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager(min_interval_ms: u32) -> InterruptionManager {
        InterruptionManager::new(InterruptionConfig {
            enabled: true,
            min_interval_ms,
        })
    }

    #[test]
    fn onset_from_idle_is_accepted_and_claims_state() {
        let mut m = manager(500);
        assert_eq!(m.on_speech_onset(100), OnsetDecision::Accept);
        assert_eq!(m.state(), SystemState::Collecting);
        m.on_speech_offset();
        assert_eq!(m.state(), SystemState::Idle);
    }

    #[test]
    fn onset_while_responding_interrupts() {
        let mut m = manager(500);
        assert!(m.request_state(SystemState::Processing));
        assert!(m.request_state(SystemState::Responding));

        let decision = m.on_speech_onset(1000);
        assert_eq!(decision, OnsetDecision::Interrupt(SystemState::Responding));
        assert_eq!(m.state(), SystemState::Collecting);
        assert_eq!(m.stats().interruptions, 1);
    }

    #[test]
    fn rapid_second_onset_is_throttled() {
        let mut m = manager(500);
        assert_eq!(m.on_speech_onset(0), OnsetDecision::Accept);
        m.on_speech_offset();

        assert_eq!(m.on_speech_onset(200), OnsetDecision::Reject);
        assert_eq!(m.state(), SystemState::Idle);
        // The throttled onset must not refresh the interval window.
        assert_eq!(m.on_speech_onset(510), OnsetDecision::Accept);
    }

    #[test]
    fn switch_guard_refuses_everything_while_collecting() {
        let mut m = manager(0);
        m.on_speech_onset(0);
        assert_eq!(m.state(), SystemState::Collecting);

        for target in [
            SystemState::Idle,
            SystemState::Processing,
            SystemState::Responding,
        ] {
            assert!(!m.request_state(target));
            assert_eq!(m.state(), SystemState::Collecting);
        }
        assert_eq!(m.stats().external_rejections, 3);
    }

    #[test]
    fn only_documented_edges_are_honored() {
        let mut m = manager(500);
        assert!(!m.request_state(SystemState::Responding)); // Idle -> Responding
        assert!(!m.request_state(SystemState::Collecting)); // never external
        assert!(m.request_state(SystemState::Processing));
        assert!(!m.request_state(SystemState::Processing)); // self-loop
        assert!(m.request_state(SystemState::Responding));
        assert!(!m.request_state(SystemState::Processing)); // backwards
        assert!(m.request_state(SystemState::Idle));
    }

    #[test]
    fn disabled_detection_still_collects_but_never_interrupts() {
        let mut m = InterruptionManager::new(InterruptionConfig {
            enabled: false,
            min_interval_ms: 500,
        });
        m.request_state(SystemState::Processing);
        assert_eq!(m.on_speech_onset(0), OnsetDecision::Accept);
        assert_eq!(m.state(), SystemState::Collecting);
        assert_eq!(m.stats().interruptions, 0);
        // Double start is still refused.
        assert_eq!(m.on_speech_onset(32), OnsetDecision::Reject);
    }
}
