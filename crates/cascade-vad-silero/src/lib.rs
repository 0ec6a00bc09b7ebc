pub mod engine;

pub use engine::SileroEngine;
