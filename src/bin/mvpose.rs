//! mvpose - multi-view ego/exo capture pipeline driver
//!
//! Runs one stage of the pipeline against a capture:
//! `preprocess -> bbox -> pose2d -> pose3d -> multi_view_vis`.
//! A missing upstream artifact prints which stage to run first and exits
//! non-zero without writing anything.

use std::io::IsTerminal;
use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;

use mvpose::ui::Ui;
use mvpose::{run_stage, Mode, PipelineConfig, PipelineError, StageToolkit};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Path to the pipeline config file (TOML).
    #[arg(long, default_value = "mvpose.toml", env = "MVPOSE_CONFIG")]
    config: PathBuf,
    /// Stage to run; overrides the config's `mode`.
    #[arg(long, value_enum)]
    mode: Option<Mode>,
    /// UI mode for stderr progress (auto|plain|pretty)
    #[arg(long, default_value = "auto", value_name = "MODE")]
    ui: String,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    if let Err(err) = run(&args) {
        match err.downcast_ref::<PipelineError>() {
            Some(PipelineError::MissingArtifact { .. }) => log::error!("{err}"),
            _ => log::error!("{err:#}"),
        }
        std::process::exit(1);
    }
}

fn run(args: &Args) -> Result<()> {
    let is_tty = std::io::stderr().is_terminal();
    let ui = Ui::from_args(Some(&args.ui), is_tty);

    let mut config = PipelineConfig::load(&args.config)?;
    if let Some(mode) = args.mode {
        config.mode = Some(mode);
    }

    let mut toolkit = StageToolkit::from_config(&config, ui)?;
    run_stage(&config, &mut toolkit)
}
