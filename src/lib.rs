pub mod error;
pub mod logging;
pub mod visualization;

pub use error::{NeuralTrackError, Result};
pub use logging::{GradientLogger, LossLogger};
