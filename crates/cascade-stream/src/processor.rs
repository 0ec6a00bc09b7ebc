use std::path::Path;
use std::time::Instant;

use cascade_audio::{FrameAlignedBuffer, SampleFormat, WavAudio};
use cascade_foundation::CascadeError;
use cascade_telemetry::{ProcessorMetrics, ProcessorStats};
use cascade_vad::{VadConfig, VadEngine, FRAME_SIZE_SAMPLES, SAMPLE_RATE_HZ};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use crate::interruption::InterruptionStats;
use crate::state_machine::VadStateMachine;
use crate::types::{CascadeResult, InterruptionConfig, SystemState};
use crate::worker::{InferenceWorker, WorkerReply};

/// Upper bound on one input chunk; anything larger is dropped as malformed.
const MAX_CHUNK_BYTES: usize = 512 * 1024;

/// Depth of the control-command channel between handles and the processor.
const CONTROL_QUEUE_DEPTH: usize = 8;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessorConfig {
    pub vad: VadConfig,
    pub interruption: InterruptionConfig,
    pub input_format: SampleFormat,
    /// Capacity of the inference request/reply channels. Deliberately
    /// small so a slow model backpressures the input path early.
    pub inference_queue_depth: usize,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            vad: VadConfig::default(),
            interruption: InterruptionConfig::default(),
            input_format: SampleFormat::S16Le,
            inference_queue_depth: 8,
        }
    }
}

impl ProcessorConfig {
    pub fn validate(&self) -> Result<(), CascadeError> {
        self.vad.validate()?;
        if self.inference_queue_depth == 0 {
            return Err(CascadeError::Config(
                "inference_queue_depth must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Created,
    Open,
    Finalized,
    Closed,
}

enum ControlCommand {
    SetState {
        state: SystemState,
        reply: oneshot::Sender<bool>,
    },
    GetState {
        reply: oneshot::Sender<SystemState>,
    },
}

/// One connection's processing unit: a frame buffer, a state machine, an
/// interruption manager and a dedicated inference worker, created and
/// released together. Instances are never shared across streams.
///
/// The hot path (`process_chunk`) and the cold path (`set_system_state`)
/// are both `&mut self`, so one task drives everything and no guard state
/// needs locking. A [`ProcessorHandle`] lets the dialogue layer reach the
/// cold path while `process_stream` owns the processor; its commands are
/// executed on the stream task between chunks.
pub struct StreamProcessor {
    config: ProcessorConfig,
    frame_buffer: FrameAlignedBuffer,
    state_machine: VadStateMachine,
    metrics: ProcessorMetrics,
    engine: Option<Box<dyn VadEngine>>,
    worker: Option<InferenceWorker>,
    control_tx: mpsc::Sender<ControlCommand>,
    control_rx: Option<mpsc::Receiver<ControlCommand>>,
    lifecycle: Lifecycle,
}

impl std::fmt::Debug for StreamProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamProcessor")
            .field("config", &self.config)
            .field("lifecycle", &self.lifecycle)
            .finish()
    }
}

impl StreamProcessor {
    pub fn new(config: ProcessorConfig, engine: Box<dyn VadEngine>) -> Result<Self, CascadeError> {
        config.validate()?;
        if engine.required_sample_rate() != config.vad.sample_rate {
            return Err(CascadeError::Config(format!(
                "engine requires {} Hz but config specifies {} Hz",
                engine.required_sample_rate(),
                config.vad.sample_rate
            )));
        }
        if engine.required_frame_size_samples() != FRAME_SIZE_SAMPLES {
            return Err(CascadeError::Config(format!(
                "engine requires {}-sample frames, expected {}",
                engine.required_frame_size_samples(),
                FRAME_SIZE_SAMPLES
            )));
        }

        let (control_tx, control_rx) = mpsc::channel(CONTROL_QUEUE_DEPTH);
        let frame_buffer = FrameAlignedBuffer::new(FRAME_SIZE_SAMPLES, config.vad.sample_rate);
        let state_machine =
            VadStateMachine::new(config.vad.clone(), config.interruption.clone());

        Ok(Self {
            config,
            frame_buffer,
            state_machine,
            metrics: ProcessorMetrics::default(),
            engine: Some(engine),
            worker: None,
            control_tx,
            control_rx: Some(control_rx),
            lifecycle: Lifecycle::Created,
        })
    }

    /// Spawn the inference worker and reset counters. The engine's
    /// recurrent state is cleared by the worker before the first frame.
    pub fn open(&mut self) -> Result<(), CascadeError> {
        match self.lifecycle {
            Lifecycle::Created => {}
            Lifecycle::Open => {
                warn!("processor already open");
                return Ok(());
            }
            Lifecycle::Finalized | Lifecycle::Closed => {
                return Err(CascadeError::LifecycleMisuse("processor cannot be reopened"));
            }
        }

        let engine = self
            .engine
            .take()
            .ok_or(CascadeError::LifecycleMisuse("engine already consumed"))?;
        let worker =
            InferenceWorker::spawn(engine, self.config.inference_queue_depth, self.metrics.clone())?;
        self.worker = Some(worker);
        self.metrics.reset();
        self.metrics.set_engine_resident(true);
        self.lifecycle = Lifecycle::Open;
        info!("stream processor open");
        Ok(())
    }

    /// Feed one chunk of raw PCM bytes in the configured input format and
    /// collect the results it completes.
    ///
    /// Recoverable input problems (misaligned or oversized chunks) drop
    /// the chunk, count it and return an empty batch; only fatal errors
    /// surface as `Err`, after which the processor is closed.
    pub async fn process_chunk(
        &mut self,
        chunk: &[u8],
    ) -> Result<Vec<CascadeResult>, CascadeError> {
        let format = self.config.input_format;
        let outcome = self.ingest(chunk, format).await;
        self.close_on_fatal(outcome.as_ref().err());
        outcome
    }

    /// Flush residual audio (zero-padded) and any in-progress segment,
    /// then clear the engine's recurrent state. The stream is over;
    /// only `close` is valid afterwards.
    pub async fn finalize(&mut self) -> Result<Vec<CascadeResult>, CascadeError> {
        let outcome = self.run_finalize().await;
        self.close_on_fatal(outcome.as_ref().err());
        outcome
    }

    /// Release the worker and the engine. Idempotent; an in-progress
    /// segment is discarded.
    pub fn close(&mut self) {
        if self.lifecycle == Lifecycle::Closed {
            return;
        }
        if self.lifecycle == Lifecycle::Open {
            match self.state_machine.finalize() {
                Ok(Some(_)) => debug!("discarding trailing segment at close"),
                Ok(None) => {}
                Err(e) => warn!("state machine error during close: {}", e),
            }
        }
        if let Some(worker) = self.worker.take() {
            worker.shutdown();
        }
        self.metrics.set_engine_resident(false);
        self.lifecycle = Lifecycle::Closed;
        info!("stream processor closed");
    }

    /// Drive a whole stream: chunks in, results out, control commands
    /// applied in between. Ends when the audio channel closes (emitting
    /// any trailing segment) or the consumer goes away.
    pub async fn process_stream(
        &mut self,
        mut audio_rx: mpsc::Receiver<Vec<u8>>,
        result_tx: mpsc::Sender<CascadeResult>,
    ) -> Result<(), CascadeError> {
        if self.lifecycle == Lifecycle::Created {
            self.open()?;
        }
        let mut control_rx = self
            .control_rx
            .take()
            .ok_or(CascadeError::LifecycleMisuse("stream is already being driven"))?;

        let outcome = self.drive(&mut audio_rx, &result_tx, &mut control_rx).await;
        self.control_rx = Some(control_rx);

        if let Err(e) = &outcome {
            error!("stream terminated: {}", e);
        }
        self.close_on_fatal(outcome.as_ref().err());
        outcome
    }

    /// Convenience over `process_stream` for a 16 kHz WAV file.
    pub async fn process_file<P: AsRef<Path>>(
        &mut self,
        path: P,
        result_tx: mpsc::Sender<CascadeResult>,
    ) -> Result<(), CascadeError> {
        let wav = WavAudio::load(path, SAMPLE_RATE_HZ).map_err(CascadeError::from)?;
        if self.lifecycle == Lifecycle::Created {
            self.open()?;
        }

        for chunk in wav.s16le_chunks(FRAME_SIZE_SAMPLES) {
            let results = match self.ingest(&chunk, SampleFormat::S16Le).await {
                Ok(results) => results,
                Err(e) => {
                    error!("file stream terminated: {}", e);
                    self.close_on_fatal(Some(&e));
                    return Err(e);
                }
            };
            for result in results {
                if result_tx.send(result).await.is_err() {
                    debug!("result consumer dropped, cancelling file stream");
                    return Ok(());
                }
            }
        }
        for result in self.finalize().await? {
            if result_tx.send(result).await.is_err() {
                break;
            }
        }
        Ok(())
    }

    /// Switch-guarded dialogue state change (cold path, direct drive).
    pub fn set_system_state(&mut self, state: SystemState) -> bool {
        self.state_machine.request_state(state)
    }

    pub fn system_state(&self) -> SystemState {
        self.state_machine.system_state()
    }

    pub fn stats(&self) -> ProcessorStats {
        self.metrics.snapshot()
    }

    pub fn interruption_stats(&self) -> InterruptionStats {
        self.state_machine.interruption_stats()
    }

    pub fn reset_stats(&self) {
        self.metrics.reset();
    }

    /// Clonable cold-path handle for the dialogue layer. Commands are
    /// executed on the stream task inside `process_stream`, never on the
    /// calling task, so guard state stays single-owner.
    pub fn handle(&self) -> ProcessorHandle {
        ProcessorHandle {
            control_tx: self.control_tx.clone(),
            metrics: self.metrics.clone(),
        }
    }

    async fn drive(
        &mut self,
        audio_rx: &mut mpsc::Receiver<Vec<u8>>,
        result_tx: &mpsc::Sender<CascadeResult>,
        control_rx: &mut mpsc::Receiver<ControlCommand>,
    ) -> Result<(), CascadeError> {
        loop {
            tokio::select! {
                Some(cmd) = control_rx.recv() => {
                    self.apply_control(cmd);
                }
                maybe_chunk = audio_rx.recv() => {
                    match maybe_chunk {
                        Some(chunk) => {
                            let format = self.config.input_format;
                            for result in self.ingest(&chunk, format).await? {
                                if result_tx.send(result).await.is_err() {
                                    debug!("result consumer dropped, cancelling stream");
                                    return Ok(());
                                }
                            }
                        }
                        None => break,
                    }
                }
            }
        }

        for result in self.run_finalize().await? {
            if result_tx.send(result).await.is_err() {
                break;
            }
        }
        Ok(())
    }

    fn apply_control(&mut self, cmd: ControlCommand) {
        match cmd {
            ControlCommand::SetState { state, reply } => {
                let _ = reply.send(self.set_system_state(state));
            }
            ControlCommand::GetState { reply } => {
                let _ = reply.send(self.system_state());
            }
        }
    }

    async fn ingest(
        &mut self,
        chunk: &[u8],
        format: SampleFormat,
    ) -> Result<Vec<CascadeResult>, CascadeError> {
        self.ensure_open()?;
        if chunk.is_empty() {
            return Ok(Vec::new());
        }

        let started = Instant::now();

        if chunk.len() > MAX_CHUNK_BYTES {
            warn!(
                len = chunk.len(),
                max = MAX_CHUNK_BYTES,
                "dropping oversized chunk"
            );
            self.metrics.record_invalid_chunk();
            return Ok(Vec::new());
        }
        if let Err(e) = self.frame_buffer.append(chunk, format) {
            warn!("dropping malformed chunk: {}", e);
            self.metrics.record_invalid_chunk();
            return Ok(Vec::new());
        }

        let mut results = Vec::new();
        let mut in_flight = 0usize;

        while let Some(frame) = self.frame_buffer.pop_frame() {
            // Drain whatever inference already finished before queueing
            // more, keeping the pipeline full without unbounded buffering.
            while let Some(reply) = self.worker_mut()?.try_recv() {
                in_flight -= 1;
                self.apply_reply(reply, &mut results)?;
            }
            match self.worker_mut()?.submit(frame).await {
                Ok(()) => in_flight += 1,
                Err(frame) => {
                    // Worker gone: the frame is still ours, so score it
                    // as silence and keep the stream flowing.
                    warn!("inference worker unavailable, treating frame as silence");
                    self.metrics.record_inference_error();
                    self.apply_reply(
                        WorkerReply {
                            frame,
                            probability: 0.0,
                        },
                        &mut results,
                    )?;
                }
            }
        }
        while in_flight > 0 {
            match self.worker_mut()?.recv().await {
                Some(reply) => {
                    in_flight -= 1;
                    self.apply_reply(reply, &mut results)?;
                }
                None => {
                    warn!(
                        lost = in_flight,
                        "inference worker died with frames in flight"
                    );
                    self.metrics.record_inference_errors(in_flight as u64);
                    in_flight = 0;
                }
            }
        }

        self.metrics
            .update_buffered_samples(self.frame_buffer.buffered_samples());
        self.metrics.record_chunk(started.elapsed());
        Ok(results)
    }

    async fn run_finalize(&mut self) -> Result<Vec<CascadeResult>, CascadeError> {
        self.ensure_open()?;

        let mut results = Vec::new();
        if let Some(frame) = self.frame_buffer.flush() {
            match self.worker_mut()?.submit(frame).await {
                Ok(()) => match self.worker_mut()?.recv().await {
                    Some(reply) => self.apply_reply(reply, &mut results)?,
                    None => {
                        warn!("inference worker died before scoring the final frame");
                        self.metrics.record_inference_error();
                    }
                },
                Err(frame) => {
                    warn!("inference worker unavailable, treating final frame as silence");
                    self.metrics.record_inference_error();
                    self.apply_reply(
                        WorkerReply {
                            frame,
                            probability: 0.0,
                        },
                        &mut results,
                    )?;
                }
            }
        }
        if let Some(result) = self.state_machine.finalize()? {
            if let CascadeResult::Segment { .. } = &result {
                self.metrics.record_segment();
            }
            results.push(result);
        }
        if !self.worker_mut()?.reset().await {
            warn!("inference worker unavailable, skipping model state reset");
        }
        self.metrics.update_buffered_samples(0);
        self.lifecycle = Lifecycle::Finalized;
        info!("stream finalized");
        Ok(results)
    }

    fn apply_reply(
        &mut self,
        reply: WorkerReply,
        out: &mut Vec<CascadeResult>,
    ) -> Result<(), CascadeError> {
        let was_collecting = self.state_machine.is_collecting();
        let produced = self
            .state_machine
            .process_frame(reply.frame, reply.probability)?;
        if !was_collecting && self.state_machine.is_collecting() {
            self.metrics.record_speech_onset();
        }
        if let Some(result) = produced {
            match &result {
                CascadeResult::Frame { .. } => self.metrics.record_single_frame(),
                CascadeResult::Segment { .. } => self.metrics.record_segment(),
                CascadeResult::Interruption { .. } => self.metrics.record_interruption(),
            }
            out.push(result);
        }
        Ok(())
    }

    fn ensure_open(&self) -> Result<(), CascadeError> {
        match self.lifecycle {
            Lifecycle::Open => Ok(()),
            Lifecycle::Created => Err(CascadeError::LifecycleMisuse("processor is not open")),
            Lifecycle::Finalized => Err(CascadeError::LifecycleMisuse("stream already finalized")),
            Lifecycle::Closed => Err(CascadeError::LifecycleMisuse("processor is closed")),
        }
    }

    fn worker_mut(&mut self) -> Result<&mut InferenceWorker, CascadeError> {
        self.worker
            .as_mut()
            .ok_or(CascadeError::LifecycleMisuse("processor is not open"))
    }

    /// Only an invariant break is unrecoverable; release everything so
    /// the caller sees a closed processor. Inference trouble, including a
    /// dead worker, degrades frames to silence and leaves the stream open.
    fn close_on_fatal(&mut self, error: Option<&CascadeError>) {
        if let Some(e) = error {
            if matches!(e, CascadeError::StateViolation(_)) {
                error!("fatal error, closing stream: {}", e);
                self.close();
            }
        }
    }
}

impl Drop for StreamProcessor {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.take() {
            worker.shutdown();
        }
    }
}

/// Cold-path handle for the dialogue layer while `process_stream` owns
/// the processor.
#[derive(Clone)]
pub struct ProcessorHandle {
    control_tx: mpsc::Sender<ControlCommand>,
    metrics: ProcessorMetrics,
}

impl ProcessorHandle {
    /// Request a dialogue state change through the switch guard. Returns
    /// `false` when the guard refuses or the stream is gone.
    pub async fn set_system_state(&self, state: SystemState) -> bool {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self
            .control_tx
            .send(ControlCommand::SetState {
                state,
                reply: reply_tx,
            })
            .await
            .is_err()
        {
            return false;
        }
        reply_rx.await.unwrap_or(false)
    }

    pub async fn system_state(&self) -> Option<SystemState> {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self
            .control_tx
            .send(ControlCommand::GetState { reply: reply_tx })
            .await
            .is_err()
        {
            return None;
        }
        reply_rx.await.ok()
    }

    pub fn stats(&self) -> ProcessorStats {
        self.metrics.snapshot()
    }
}
