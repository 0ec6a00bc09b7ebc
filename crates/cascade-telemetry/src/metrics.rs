use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{error, warn};

/// Resident-set estimate for one loaded engine instance, in MiB.
const ENGINE_FOOTPRINT_MB: f64 = 80.0;

/// Don't evaluate performance alarms until this many chunks have been seen.
const ALARM_MIN_CHUNKS: u64 = 10;

/// Shared counters for one stream processor.
///
/// Cloned handles all point at the same counters, so the processor task,
/// the inference worker and external stats readers see one view. Counters
/// reset only at processor open (or an explicit `reset`).
#[derive(Clone)]
pub struct ProcessorMetrics {
    pub chunks_processed: Arc<AtomicU64>,
    pub processing_time_us: Arc<AtomicU64>,
    pub speech_segments: Arc<AtomicU64>,
    pub single_frames: Arc<AtomicU64>,
    pub interruptions: Arc<AtomicU64>,
    pub inference_errors: Arc<AtomicU64>,
    pub invalid_chunks: Arc<AtomicU64>,
    pub buffered_samples: Arc<AtomicUsize>,
    pub engine_resident: Arc<AtomicBool>,
    pub is_speaking: Arc<AtomicBool>,
    pub last_speech_time: Arc<RwLock<Option<Instant>>>,
}

impl Default for ProcessorMetrics {
    fn default() -> Self {
        Self {
            chunks_processed: Arc::new(AtomicU64::new(0)),
            processing_time_us: Arc::new(AtomicU64::new(0)),
            speech_segments: Arc::new(AtomicU64::new(0)),
            single_frames: Arc::new(AtomicU64::new(0)),
            interruptions: Arc::new(AtomicU64::new(0)),
            inference_errors: Arc::new(AtomicU64::new(0)),
            invalid_chunks: Arc::new(AtomicU64::new(0)),
            buffered_samples: Arc::new(AtomicUsize::new(0)),
            engine_resident: Arc::new(AtomicBool::new(false)),
            is_speaking: Arc::new(AtomicBool::new(false)),
            last_speech_time: Arc::new(RwLock::new(None)),
        }
    }
}

impl ProcessorMetrics {
    pub fn record_chunk(&self, elapsed: Duration) {
        self.chunks_processed.fetch_add(1, Ordering::Relaxed);
        self.processing_time_us
            .fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);
    }

    pub fn record_segment(&self) {
        self.speech_segments.fetch_add(1, Ordering::Relaxed);
        self.is_speaking.store(false, Ordering::Relaxed);
        *self.last_speech_time.write() = Some(Instant::now());
    }

    pub fn record_speech_onset(&self) {
        self.is_speaking.store(true, Ordering::Relaxed);
    }

    pub fn record_single_frame(&self) {
        self.single_frames.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_interruption(&self) {
        self.interruptions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_inference_error(&self) {
        self.inference_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_inference_errors(&self, count: u64) {
        self.inference_errors.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_invalid_chunk(&self) {
        self.invalid_chunks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn update_buffered_samples(&self, samples: usize) {
        self.buffered_samples.store(samples, Ordering::Relaxed);
    }

    pub fn set_engine_resident(&self, resident: bool) {
        self.engine_resident.store(resident, Ordering::Relaxed);
    }

    /// Compute the derived stats snapshot, logging performance alarms
    /// once enough chunks have been observed for the rates to mean much.
    pub fn snapshot(&self) -> ProcessorStats {
        let chunks = self.chunks_processed.load(Ordering::Relaxed);
        let total_time_ms = self.processing_time_us.load(Ordering::Relaxed) as f64 / 1000.0;
        let segments = self.speech_segments.load(Ordering::Relaxed);
        let frames = self.single_frames.load(Ordering::Relaxed);
        let error_count = self.inference_errors.load(Ordering::Relaxed)
            + self.invalid_chunks.load(Ordering::Relaxed);

        let average_processing_time_ms = if chunks > 0 {
            total_time_ms / chunks as f64
        } else {
            0.0
        };
        let throughput_chunks_per_second = if total_time_ms > 0.0 {
            chunks as f64 / (total_time_ms / 1000.0)
        } else {
            0.0
        };
        let total_results = segments + frames;
        let speech_ratio = if total_results > 0 {
            segments as f64 / total_results as f64
        } else {
            0.0
        };
        let error_rate = if chunks > 0 {
            error_count as f64 / chunks as f64
        } else {
            0.0
        };

        let mut memory_usage_mb =
            self.buffered_samples.load(Ordering::Relaxed) as f64 * 4.0 / (1024.0 * 1024.0);
        if self.engine_resident.load(Ordering::Relaxed) {
            memory_usage_mb += ENGINE_FOOTPRINT_MB;
        }

        if chunks > ALARM_MIN_CHUNKS {
            if average_processing_time_ms > 100.0 {
                warn!(
                    "Average chunk processing time {:.2}ms exceeds 100ms budget",
                    average_processing_time_ms
                );
            }
            if error_rate > 0.05 {
                error!(
                    "Error rate {:.1}% ({}/{} chunks)",
                    error_rate * 100.0,
                    error_count,
                    chunks
                );
            }
        }

        ProcessorStats {
            total_chunks_processed: chunks,
            total_processing_time_ms: total_time_ms,
            average_processing_time_ms,
            throughput_chunks_per_second,
            speech_segments: segments,
            single_frames: frames,
            speech_ratio,
            interruptions: self.interruptions.load(Ordering::Relaxed),
            error_count,
            error_rate,
            memory_usage_mb,
        }
    }

    pub fn reset(&self) {
        self.chunks_processed.store(0, Ordering::Relaxed);
        self.processing_time_us.store(0, Ordering::Relaxed);
        self.speech_segments.store(0, Ordering::Relaxed);
        self.single_frames.store(0, Ordering::Relaxed);
        self.interruptions.store(0, Ordering::Relaxed);
        self.inference_errors.store(0, Ordering::Relaxed);
        self.invalid_chunks.store(0, Ordering::Relaxed);
        self.buffered_samples.store(0, Ordering::Relaxed);
        self.is_speaking.store(false, Ordering::Relaxed);
        *self.last_speech_time.write() = None;
    }
}

/// Point-in-time view of a processor's counters and derived rates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessorStats {
    pub total_chunks_processed: u64,
    pub total_processing_time_ms: f64,
    pub average_processing_time_ms: f64,
    pub throughput_chunks_per_second: f64,
    pub speech_segments: u64,
    pub single_frames: u64,
    pub speech_ratio: f64,
    pub interruptions: u64,
    pub error_count: u64,
    pub error_rate: f64,
    pub memory_usage_mb: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_metrics_snapshot_is_zeroed() {
        let metrics = ProcessorMetrics::default();
        let stats = metrics.snapshot();
        assert_eq!(stats.total_chunks_processed, 0);
        assert_eq!(stats.average_processing_time_ms, 0.0);
        assert_eq!(stats.speech_ratio, 0.0);
        assert_eq!(stats.error_rate, 0.0);
        assert_eq!(stats.memory_usage_mb, 0.0);
    }

    #[test]
    fn averages_and_ratios_derive_from_counters() {
        let metrics = ProcessorMetrics::default();
        metrics.record_chunk(Duration::from_millis(4));
        metrics.record_chunk(Duration::from_millis(6));
        metrics.record_segment();
        metrics.record_single_frame();
        metrics.record_single_frame();
        metrics.record_single_frame();
        metrics.record_inference_error();

        let stats = metrics.snapshot();
        assert_eq!(stats.total_chunks_processed, 2);
        assert!((stats.average_processing_time_ms - 5.0).abs() < 0.1);
        assert!((stats.speech_ratio - 0.25).abs() < 1e-9);
        assert_eq!(stats.error_count, 1);
        assert!((stats.error_rate - 0.5).abs() < 1e-9);
    }

    #[test]
    fn engine_residency_dominates_memory_estimate() {
        let metrics = ProcessorMetrics::default();
        assert_eq!(metrics.snapshot().memory_usage_mb, 0.0);
        metrics.set_engine_resident(true);
        assert!(metrics.snapshot().memory_usage_mb >= ENGINE_FOOTPRINT_MB);
        metrics.set_engine_resident(false);
        metrics.update_buffered_samples(1024 * 1024);
        assert!((metrics.snapshot().memory_usage_mb - 4.0).abs() < 1e-9);
    }

    #[test]
    fn reset_clears_everything() {
        let metrics = ProcessorMetrics::default();
        metrics.record_chunk(Duration::from_millis(1));
        metrics.record_segment();
        metrics.record_interruption();
        metrics.record_invalid_chunk();
        metrics.reset();

        let stats = metrics.snapshot();
        assert_eq!(stats.total_chunks_processed, 0);
        assert_eq!(stats.speech_segments, 0);
        assert_eq!(stats.interruptions, 0);
        assert_eq!(stats.error_count, 0);
    }

    #[test]
    fn clones_share_counters() {
        let metrics = ProcessorMetrics::default();
        let clone = metrics.clone();
        clone.record_chunk(Duration::from_millis(1));
        assert_eq!(metrics.snapshot().total_chunks_processed, 1);
    }
}
