use std::path::PathBuf;

use clap::Parser;
use log::info;

use neuraltrack::visualization::{
    self, ChartType, GradientPlotter, PlotConfig, DEFAULT_GRADIENT_PLOT_DIR,
};

/// Plot gradient statistics from a log file.
#[derive(Debug, Parser)]
#[command(name = "neuraltrack-plot-gradient", version)]
struct Args {
    /// Path to the gradient log file.
    #[arg(long = "log_path")]
    log_path: PathBuf,

    /// Directory the plots are saved to.
    #[arg(long = "save_dir", default_value = DEFAULT_GRADIENT_PLOT_DIR)]
    save_dir: PathBuf,

    /// Type of the chart.
    #[arg(long = "chart_type", value_enum, default_value_t = ChartType::Line)]
    chart_type: ChartType,

    /// Open the saved plots in the default viewer.
    #[arg(long = "show_plot")]
    show_plot: bool,

    /// Epoch to plot.
    #[arg(long = "epoch", default_value_t = 1)]
    epoch: usize,

    /// Plot every logged epoch instead of a single one.
    #[arg(long = "all_epochs", conflicts_with = "epoch")]
    all_epochs: bool,

    /// Include bias layers in the plots.
    #[arg(long = "include_bias")]
    include_bias: bool,
}

impl Args {
    fn plot_config(&self) -> PlotConfig {
        PlotConfig {
            save_dir: self.save_dir.clone(),
            chart_type: self.chart_type,
            include_bias: self.include_bias,
            ..PlotConfig::gradient(&self.log_path)
        }
    }

    /// The epoch to plot, `None` for every logged one.
    fn selected_epoch(&self) -> Option<usize> {
        (!self.all_epochs).then_some(self.epoch)
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    info!("plotting gradients of '{}'", args.log_path.display());
    let plotter = GradientPlotter::new(args.plot_config());

    for save_path in plotter.plot_gradients(args.selected_epoch())? {
        println!("Gradient plot saved at {}", save_path.display());

        if args.show_plot {
            visualization::show(&save_path)?;
        }
    }

    Ok(())
}
