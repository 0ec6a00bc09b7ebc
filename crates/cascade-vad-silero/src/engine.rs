use cascade_vad::{VadEngine, FRAME_SIZE_SAMPLES, SAMPLE_RATE_HZ};
use tracing::debug;
use voice_activity_detector::VoiceActivityDetector;

/// Silero VAD engine. Bundles its own model; recurrent state lives inside
/// the detector and is cleared by `reset_states`.
pub struct SileroEngine {
    detector: VoiceActivityDetector,
    frames_processed: u64,
    last_probability: f32,
}

impl SileroEngine {
    pub fn new() -> Result<Self, String> {
        let detector = VoiceActivityDetector::builder()
            .sample_rate(SAMPLE_RATE_HZ as i64)
            .chunk_size(FRAME_SIZE_SAMPLES)
            .build()
            .map_err(|e| format!("Failed to create Silero VAD: {}", e))?;

        Ok(Self {
            detector,
            frames_processed: 0,
            last_probability: 0.0,
        })
    }

    pub fn last_probability(&self) -> f32 {
        self.last_probability
    }
}

impl VadEngine for SileroEngine {
    fn infer(&mut self, frame: &[f32]) -> Result<f32, String> {
        if frame.len() != FRAME_SIZE_SAMPLES {
            return Err(format!(
                "Silero VAD requires {} samples, got {}",
                FRAME_SIZE_SAMPLES,
                frame.len()
            ));
        }

        let probability = self.detector.predict(frame.iter().copied());
        self.last_probability = probability;
        self.frames_processed += 1;

        Ok(probability)
    }

    fn reset_states(&mut self) {
        debug!(
            frames_processed = self.frames_processed,
            "resetting Silero model state"
        );
        self.detector.reset();
        self.last_probability = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_creates_and_reports_requirements() {
        let engine = SileroEngine::new().expect("SileroEngine should create successfully");
        assert_eq!(engine.required_sample_rate(), 16_000);
        assert_eq!(engine.required_frame_size_samples(), 512);
    }

    #[test]
    fn silence_scores_below_speech_threshold() {
        let mut engine = SileroEngine::new().expect("SileroEngine should create successfully");
        let silence = vec![0.0f32; 512];
        let probability = engine.infer(&silence).expect("inference should succeed");
        assert!(
            probability < 0.5,
            "silence should score below 0.5, got {}",
            probability
        );
    }

    #[test]
    fn rejects_incorrect_frame_sizes() {
        let mut engine = SileroEngine::new().expect("SileroEngine should create successfully");
        let too_short = vec![0.0f32; 511];
        let too_long = vec![0.0f32; 513];
        let err_short = engine.infer(&too_short).unwrap_err();
        let err_long = engine.infer(&too_long).unwrap_err();
        assert!(err_short.contains("512"), "{}", err_short);
        assert!(err_long.contains("512"), "{}", err_long);
    }

    #[test]
    fn reset_clears_last_probability() {
        let mut engine = SileroEngine::new().expect("SileroEngine should create successfully");
        let tone: Vec<f32> = (0..512).map(|i| (i as f32 * 0.1).sin() * 0.5).collect();
        let _ = engine.infer(&tone).unwrap();
        engine.reset_states();
        assert_eq!(engine.last_probability(), 0.0);
    }
}
