//! Offline chart rendering of the loss and gradient logs.

mod gradient_plot;
mod loss_plot;
mod svg;

use std::{
    fmt,
    path::{Path, PathBuf},
    str::FromStr,
};

pub use gradient_plot::{is_bias_layer, GradientPlotter, DEFAULT_GRADIENT_PLOT_DIR};
pub use loss_plot::{LossPlotter, DEFAULT_LOSS_PLOT_DIR};

use crate::{
    error::{NeuralTrackError, Result},
    logging::{EpochGradientRecord, EpochLog, EpochLossRecord},
};

/// The way series are drawn.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum ChartType {
    Bar,
    #[default]
    Line,
}

impl fmt::Display for ChartType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bar => write!(f, "bar"),
            Self::Line => write!(f, "line"),
        }
    }
}

impl FromStr for ChartType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "bar" => Ok(Self::Bar),
            "line" => Ok(Self::Line),
            other => Err(format!("unknown chart type: {other}")),
        }
    }
}

/// Where a plotter reads its log and saves its charts, and how it draws them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlotConfig {
    pub log_path: PathBuf,
    /// Created on the first plot if missing.
    pub save_dir: PathBuf,
    /// Only used by gradient charts, loss charts are always drawn as lines.
    pub chart_type: ChartType,
    /// Only used by gradient charts.
    pub include_bias: bool,
}

impl PlotConfig {
    /// Loss chart configuration saving into `LossPlots`.
    pub fn loss(log_path: impl Into<PathBuf>) -> Self {
        Self::with_save_dir(log_path, DEFAULT_LOSS_PLOT_DIR)
    }

    /// Gradient chart configuration saving into `GradientPlots`, line charts without bias layers.
    pub fn gradient(log_path: impl Into<PathBuf>) -> Self {
        Self::with_save_dir(log_path, DEFAULT_GRADIENT_PLOT_DIR)
    }

    fn with_save_dir(log_path: impl Into<PathBuf>, save_dir: &str) -> Self {
        Self {
            log_path: log_path.into(),
            save_dir: PathBuf::from(save_dir),
            chart_type: ChartType::default(),
            include_bias: false,
        }
    }
}

/// Loads a loss log written by [`crate::LossLogger`].
///
/// # Errors
/// `MissingLog` if there's no file at `path`, otherwise an io or decoding error.
pub fn load_loss_log(path: &Path) -> Result<EpochLog<EpochLossRecord>> {
    EpochLog::read_from(path)
}

/// Loads a gradient log written by [`crate::GradientLogger`].
///
/// # Errors
/// `MissingLog` if there's no file at `path`, otherwise an io or decoding error.
pub fn load_gradient_log(path: &Path) -> Result<EpochLog<EpochGradientRecord>> {
    EpochLog::read_from(path)
}

/// Opens a saved chart with the platform's default viewer.
///
/// # Errors
/// `Open` if no viewer could be launched.
pub fn show(path: &Path) -> Result<()> {
    open::that(path).map_err(|source| NeuralTrackError::Open {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chart_type_from_str() {
        assert_eq!("bar".parse::<ChartType>().unwrap(), ChartType::Bar);
        assert_eq!("line".parse::<ChartType>().unwrap(), ChartType::Line);
        assert!("pie".parse::<ChartType>().is_err());
        assert_eq!(ChartType::default().to_string(), "line");
    }

    #[test]
    fn plot_config_defaults() {
        let config = PlotConfig::loss("loss_log.json");
        assert_eq!(config.log_path, PathBuf::from("loss_log.json"));
        assert_eq!(config.save_dir, PathBuf::from("LossPlots"));
        assert_eq!(config.chart_type, ChartType::Line);
        assert!(!config.include_bias);

        let config = PlotConfig::gradient("gradient_log.json");
        assert_eq!(config.save_dir, PathBuf::from("GradientPlots"));
        assert_eq!(config.chart_type, ChartType::Line);
        assert!(!config.include_bias);
    }
}
