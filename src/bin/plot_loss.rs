use std::path::PathBuf;

use clap::Parser;
use log::info;

use neuraltrack::visualization::{self, LossPlotter, PlotConfig, DEFAULT_LOSS_PLOT_DIR};

/// Plot loss curves from a log file.
#[derive(Debug, Parser)]
#[command(name = "neuraltrack-plot-loss", version)]
struct Args {
    /// Path to the loss log file.
    #[arg(long = "log_path")]
    log_path: PathBuf,

    /// Directory the plot is saved to.
    #[arg(long = "save_dir", default_value = DEFAULT_LOSS_PLOT_DIR)]
    save_dir: PathBuf,

    /// Open the saved plot in the default viewer.
    #[arg(long = "show_plot")]
    show_plot: bool,
}

impl Args {
    fn plot_config(&self) -> PlotConfig {
        PlotConfig {
            save_dir: self.save_dir.clone(),
            ..PlotConfig::loss(&self.log_path)
        }
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    info!("plotting losses of '{}'", args.log_path.display());
    let save_path = LossPlotter::new(args.plot_config()).plot_losses()?;
    println!("Loss plot saved at {}", save_path.display());

    if args.show_plot {
        visualization::show(&save_path)?;
    }

    Ok(())
}
