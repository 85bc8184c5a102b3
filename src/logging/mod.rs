//! Per-epoch loss and gradient logging.
//!
//! - `LossLogger` averages the batch losses of each epoch and persists the
//!   log in the background.
//! - `GradientLogger` snapshots gradient statistics every `log_interval`
//!   epochs and persists the log before returning.

mod epoch_log;
mod gradient;
mod json_float;
mod loss;
mod persist;

pub use epoch_log::{epoch_key, parse_epoch_key, EpochLog};
pub use gradient::{
    layer_display_name, EpochGradientRecord, GradientLogger, GradientLoggerConfig, GradientStats,
    NamedParameter, ParameterSource, DEFAULT_GRADIENT_LOG_PATH, DEFAULT_LOG_INTERVAL,
};
pub use loss::{EpochAccumulator, EpochLossRecord, LossLogger, DEFAULT_LOSS_LOG_PATH};
pub use persist::PersistHandle;
