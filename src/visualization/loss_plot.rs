use std::{
    collections::BTreeSet,
    fs,
    path::{Path, PathBuf},
};

use log::info;

use super::{
    load_loss_log,
    svg::{Series, SvgChart},
    ChartType, PlotConfig,
};
use crate::{
    error::{NeuralTrackError, Result},
    logging::{EpochLog, EpochLossRecord},
};

pub const DEFAULT_LOSS_PLOT_DIR: &str = "LossPlots";
const LOSS_PLOT_FILE: &str = "loss_plot.svg";
const PALETTE: [&str; 10] = [
    "#1f77b4", "#ff7f0e", "#2ca02c", "#d62728", "#9467bd", "#8c564b", "#e377c2", "#7f7f7f",
    "#bcbd22", "#17becf",
];

/// Renders every loss component of a loss log over the logged epochs, as lines.
#[derive(Debug, Clone)]
pub struct LossPlotter {
    config: PlotConfig,
}

impl LossPlotter {
    /// Creates a new `LossPlotter`, the chart type and bias flag of `config` are ignored.
    pub fn new(config: PlotConfig) -> Self {
        Self { config }
    }

    pub fn log_path(&self) -> &Path {
        &self.config.log_path
    }

    /// Plots one series per loss component and saves it as `loss_plot.svg`.
    ///
    /// # Returns
    /// The path of the saved chart.
    ///
    /// # Errors
    /// `MissingLog` or `EmptyLog` before anything is written, otherwise an io error.
    pub fn plot_losses(&self) -> Result<PathBuf> {
        let log = load_loss_log(&self.config.log_path)?;
        if log.is_empty() {
            return Err(NeuralTrackError::EmptyLog {
                path: self.config.log_path.clone(),
            });
        }

        let chart = chart(&log);
        fs::create_dir_all(&self.config.save_dir)?;
        let save_path = self.config.save_dir.join(LOSS_PLOT_FILE);
        fs::write(&save_path, chart.render())?;

        info!("loss plot saved at {}", save_path.display());
        Ok(save_path)
    }
}

fn chart(log: &EpochLog<EpochLossRecord>) -> SvgChart {
    let components: BTreeSet<&str> = log
        .iter()
        .flat_map(|(_, record)| record.components.keys().map(String::as_str))
        .collect();

    let series = components
        .into_iter()
        .enumerate()
        .map(|(i, name)| Series {
            label: name.to_string(),
            color: PALETTE[i % PALETTE.len()],
            points: log
                .iter()
                .filter_map(|(epoch, record)| {
                    record.components.get(name).map(|v| (epoch as f64, *v))
                })
                .collect(),
            offset: 0.0,
        })
        .collect();

    SvgChart {
        title: Some("Loss Components Over Epochs".to_string()),
        x_label: "Epoch".to_string(),
        y_label: "Loss".to_string(),
        x_ticks: log
            .epochs()
            .map(|epoch| (epoch as f64, epoch.to_string()))
            .collect(),
        rotate_x_ticks: false,
        style: ChartType::Line,
        bar_width: 0.0,
        series,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    fn record(components: &[(&str, f64)]) -> EpochLossRecord {
        EpochLossRecord {
            time_for_epoch: 0.1,
            total_time_elapsed: 0.2,
            components: components
                .iter()
                .map(|(k, v)| (k.to_string(), *v))
                .collect::<BTreeMap<_, _>>(),
        }
    }

    #[test]
    fn one_series_per_component_with_gaps_for_missing_epochs() {
        let mut log = EpochLog::new();
        log.insert(0, record(&[("mse", 2.0), ("kl", 1.0)]));
        log.insert(1, record(&[("mse", 1.0)]));

        let chart = chart(&log);

        let labels: Vec<_> = chart.series.iter().map(|s| s.label.as_str()).collect();
        assert_eq!(labels, ["kl", "mse"]);
        assert_eq!(chart.series[0].points, [(0.0, 1.0)]);
        assert_eq!(chart.series[1].points, [(0.0, 2.0), (1.0, 1.0)]);
        assert_eq!(chart.x_ticks.len(), 2);
    }

    #[test]
    fn loss_chart_is_always_lines() {
        let mut log = EpochLog::new();
        log.insert(0, record(&[("mse", 2.0), ("kl", 1.0)]));

        let chart = chart(&log);

        assert_eq!(chart.style, ChartType::Line);
        assert!(chart.series.iter().all(|s| s.offset == 0.0));
    }
}
