pub mod metrics;

pub use metrics::{ProcessorMetrics, ProcessorStats};
