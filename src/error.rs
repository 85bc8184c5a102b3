use std::{error::Error, fmt, io, path::PathBuf};

/// The result type used across the crate.
pub type Result<T> = std::result::Result<T, NeuralTrackError>;

/// All errors that can occur while logging or plotting training metrics.
#[derive(Debug)]
pub enum NeuralTrackError {
    /// Failed to create, read or write a log or plot file.
    Io(io::Error),
    /// A log file could not be encoded or decoded.
    Json(serde_json::Error),
    /// An epoch was logged before any epoch was started.
    EpochNotStarted,
    /// An epoch was logged without a single batch contribution.
    EmptyEpoch { epoch: usize },
    /// A background persist task was cancelled or panicked.
    PersistTask(String),
    /// The log file to plot does not exist.
    MissingLog { path: PathBuf },
    /// The log file to plot holds no epochs.
    EmptyLog { path: PathBuf },
    /// The requested epoch is not present in the log file.
    UnknownEpoch { epoch: usize, path: PathBuf },
    /// A top level key of a log file is not of the form `epoch_<N>`.
    InvalidEpochKey { key: String },
    /// The saved chart could not be opened in a viewer.
    Open { path: PathBuf, source: io::Error },
}

impl fmt::Display for NeuralTrackError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "io error: {e}"),
            Self::Json(e) => write!(f, "json error: {e}"),
            Self::EpochNotStarted => {
                write!(f, "epoch has not been started, call `start_epoch` first")
            }
            Self::EmptyEpoch { epoch } => {
                write!(f, "no batch losses were added before logging epoch {epoch}")
            }
            Self::PersistTask(msg) => write!(f, "background persist failed: {msg}"),
            Self::MissingLog { path } => {
                write!(f, "log file '{}' not found", path.display())
            }
            Self::EmptyLog { path } => {
                write!(f, "log file '{}' holds no epochs", path.display())
            }
            Self::UnknownEpoch { epoch, path } => write!(
                f,
                "epoch {epoch} not found in the log file '{}'",
                path.display()
            ),
            Self::InvalidEpochKey { key } => {
                write!(f, "invalid epoch key '{key}', expected 'epoch_<N>'")
            }
            Self::Open { path, source } => {
                write!(f, "cannot open '{}': {source}", path.display())
            }
        }
    }
}

impl Error for NeuralTrackError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Json(e) => Some(e),
            Self::Open { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<io::Error> for NeuralTrackError {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<serde_json::Error> for NeuralTrackError {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(value)
    }
}
