//! Model bake-off - Main Entry Point
//!
//! Runs the bake-off described by the configuration file, or inspects saved models.

use clap::Parser;
use model_bakeoff::cli::{
    cmd_grids, cmd_inspect, cmd_run, init_tracing, load_config, log_filter, Cli, Commands,
};

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Subscriber first so loading the configuration is logged
    let filter = init_tracing();
    let config = load_config(cli.config.as_deref())?;
    filter.reload(log_filter(Some(config.logging.level.as_str())))?;

    match cli.command {
        Some(Commands::Run { data, target, model_dir }) => {
            let config = config.with_data(data, target).with_model_dir(model_dir);
            cmd_run(&config)?;
        }
        Some(Commands::Inspect { model, model_dir }) => {
            let dir = model_dir.unwrap_or_else(|| config.output.model_dir.clone());
            cmd_inspect(model.as_deref(), &dir)?;
        }
        Some(Commands::Grids) => {
            cmd_grids(&config)?;
        }
        None => {
            cmd_run(&config)?;
        }
    }

    Ok(())
}
