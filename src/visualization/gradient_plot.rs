use std::{
    fs,
    path::{Path, PathBuf},
};

use log::info;

use super::{
    load_gradient_log,
    svg::{Series, SvgChart},
    PlotConfig,
};
use crate::{
    error::{NeuralTrackError, Result},
    logging::{EpochGradientRecord, GradientStats},
};

pub const DEFAULT_GRADIENT_PLOT_DIR: &str = "GradientPlots";
const BAR_WIDTH: f64 = 0.2;

/// Label, color, offset and accessor of every drawn statistic.
const STATS: [(&str, &str, f64, fn(&GradientStats) -> f64); 4] = [
    ("Mean", "blue", -0.3, |s: &GradientStats| s.mean),
    ("Median", "green", -0.1, |s: &GradientStats| s.median),
    ("Max", "red", 0.1, |s: &GradientStats| s.max),
    ("Min", "purple", 0.3, |s: &GradientStats| s.min),
];

/// Whether a layer display name refers to a bias parameter.
pub fn is_bias_layer(layer: &str) -> bool {
    layer.contains("bias")
}

/// Renders the per-layer gradient statistics of a gradient log, one chart per epoch.
#[derive(Debug, Clone)]
pub struct GradientPlotter {
    config: PlotConfig,
}

impl GradientPlotter {
    pub fn new(config: PlotConfig) -> Self {
        Self { config }
    }

    pub fn log_path(&self) -> &Path {
        &self.config.log_path
    }

    /// Plots the gradient statistics of `epoch`, or of every logged epoch if `None`.
    ///
    /// Each chart is saved as `gradient_plot_epoch_<N>.svg`.
    ///
    /// # Returns
    /// The paths of the saved charts in epoch order.
    ///
    /// # Errors
    /// `MissingLog`, `EmptyLog` or `UnknownEpoch` before anything is written, otherwise an io error.
    pub fn plot_gradients(&self, epoch: Option<usize>) -> Result<Vec<PathBuf>> {
        let log = load_gradient_log(&self.config.log_path)?;

        let epochs: Vec<usize> = match epoch {
            Some(epoch) if !log.contains(epoch) => {
                return Err(NeuralTrackError::UnknownEpoch {
                    epoch,
                    path: self.config.log_path.clone(),
                });
            }
            Some(epoch) => vec![epoch],
            None => log.epochs().collect(),
        };

        if epochs.is_empty() {
            return Err(NeuralTrackError::EmptyLog {
                path: self.config.log_path.clone(),
            });
        }

        fs::create_dir_all(&self.config.save_dir)?;

        let mut saved = Vec::with_capacity(epochs.len());
        for (epoch, record) in log.iter().filter(|(e, _)| epochs.contains(e)) {
            let save_path = self.config.save_dir.join(format!("gradient_plot_epoch_{epoch}.svg"));
            fs::write(&save_path, self.chart(epoch, record).render())?;

            info!("gradient plot for epoch {epoch} saved at {}", save_path.display());
            saved.push(save_path);
        }

        Ok(saved)
    }

    fn chart(&self, epoch: usize, record: &EpochGradientRecord) -> SvgChart {
        let layers: Vec<(&str, &GradientStats)> = record
            .iter()
            .filter(|(layer, _)| self.config.include_bias || !is_bias_layer(layer))
            .collect();

        let series = STATS
            .iter()
            .map(|&(label, color, offset, stat)| Series {
                label: label.to_string(),
                color,
                points: layers
                    .iter()
                    .enumerate()
                    .map(|(i, &(_, stats))| (i as f64, stat(stats)))
                    .collect(),
                offset,
            })
            .collect();

        SvgChart {
            title: Some(format!("Gradient Statistics at Epoch {epoch}")),
            x_label: "Layers".to_string(),
            y_label: "Gradient Value".to_string(),
            x_ticks: layers
                .iter()
                .enumerate()
                .map(|(i, &(layer, _))| (i as f64, layer.to_string()))
                .collect(),
            rotate_x_ticks: true,
            style: self.config.chart_type,
            bar_width: BAR_WIDTH,
            series,
        }
    }
}
