pub mod error;

pub use error::{AudioError, CascadeError};
