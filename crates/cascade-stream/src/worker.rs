use cascade_audio::AudioFrame;
use cascade_foundation::CascadeError;
use cascade_telemetry::ProcessorMetrics;
use cascade_vad::VadEngine;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::SendError;
use tracing::{debug, warn};

pub(crate) enum WorkerRequest {
    Frame(AudioFrame),
    Reset,
}

pub(crate) struct WorkerReply {
    pub frame: AudioFrame,
    pub probability: f32,
}

/// Dedicated inference thread for one stream.
///
/// The engine is owned by the thread, so recurrent model state never
/// needs locking. Both channels are bounded and FIFO: frames come back in
/// submission order, and a slow model fills the request channel, which
/// the processor observes as backpressure on `submit`.
///
/// Inference failures never escalate past this seam. A failing `infer`
/// call is downgraded on the spot: the frame is reported with
/// probability 0.0 and the error is counted. If the thread itself dies
/// (an engine panic), `submit` hands the frame back and `recv` reports
/// exhaustion, and the processor applies the same downgrade from its
/// side; either way the stream keeps flowing.
pub(crate) struct InferenceWorker {
    request_tx: mpsc::Sender<WorkerRequest>,
    reply_rx: mpsc::Receiver<WorkerReply>,
    thread: Option<std::thread::JoinHandle<()>>,
}

impl InferenceWorker {
    pub fn spawn(
        mut engine: Box<dyn VadEngine>,
        queue_depth: usize,
        metrics: ProcessorMetrics,
    ) -> Result<Self, CascadeError> {
        let (request_tx, mut request_rx) = mpsc::channel::<WorkerRequest>(queue_depth);
        let (reply_tx, reply_rx) = mpsc::channel::<WorkerReply>(queue_depth);

        let thread = std::thread::Builder::new()
            .name("cascade-inference".into())
            .spawn(move || {
                engine.reset_states();
                while let Some(request) = request_rx.blocking_recv() {
                    match request {
                        WorkerRequest::Reset => engine.reset_states(),
                        WorkerRequest::Frame(frame) => {
                            let probability = match engine.infer(&frame.samples) {
                                Ok(p) => p.clamp(0.0, 1.0),
                                Err(e) => {
                                    warn!("inference failed, treating frame as silence: {}", e);
                                    metrics.record_inference_error();
                                    0.0
                                }
                            };
                            if reply_tx
                                .blocking_send(WorkerReply { frame, probability })
                                .is_err()
                            {
                                break;
                            }
                        }
                    }
                }
                debug!("inference worker exiting");
            })
            .map_err(|e| {
                CascadeError::InferenceFailure(format!("failed to spawn inference worker: {}", e))
            })?;

        Ok(Self {
            request_tx,
            reply_rx,
            thread: Some(thread),
        })
    }

    /// Queue a frame. Suspends when the request channel is full. When the
    /// worker is gone the frame is handed back so the caller can degrade
    /// it instead of losing its audio.
    pub async fn submit(&self, frame: AudioFrame) -> Result<(), AudioFrame> {
        match self.request_tx.send(WorkerRequest::Frame(frame)).await {
            Ok(()) => Ok(()),
            Err(SendError(WorkerRequest::Frame(frame))) => Err(frame),
            Err(SendError(WorkerRequest::Reset)) => {
                unreachable!("submit only sends frames")
            }
        }
    }

    /// Ask the engine to clear its recurrent state. Returns `false` when
    /// the worker is gone.
    pub async fn reset(&self) -> bool {
        self.request_tx.send(WorkerRequest::Reset).await.is_ok()
    }

    pub fn try_recv(&mut self) -> Option<WorkerReply> {
        self.reply_rx.try_recv().ok()
    }

    /// Await the next reply; `None` means the worker died and no more
    /// replies will come.
    pub async fn recv(&mut self) -> Option<WorkerReply> {
        self.reply_rx.recv().await
    }

    /// Close both channels and join the thread. An inflight frame
    /// finishes first; its reply is discarded with the channel.
    pub fn shutdown(self) {
        let Self {
            request_tx,
            reply_rx,
            thread,
        } = self;
        drop(request_tx);
        drop(reply_rx);
        if let Some(thread) = thread {
            if thread.join().is_err() {
                warn!("inference worker panicked during shutdown");
            }
        }
    }
}
