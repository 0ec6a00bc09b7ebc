pub mod collector;
pub mod interruption;
pub mod processor;
pub mod state_machine;
pub mod types;
mod worker;

pub use interruption::{InterruptionManager, InterruptionStats};
pub use processor::{ProcessorConfig, ProcessorHandle, StreamProcessor};
pub use state_machine::VadStateMachine;
pub use types::{
    CascadeResult, InterruptionConfig, InterruptionEvent, OnsetDecision, SpeechSegment,
    SystemState,
};
