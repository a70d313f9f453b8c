use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use strata_config::DetectorConfig;
use sync_engine::SyncEngine;

/// Synchronizes the module streams of a detector and announces full images.
#[derive(Parser, Debug)]
#[command(name = "strata-sync")]
struct Args {
    /// Detector config file (.toml or .json)
    config: PathBuf,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let config = DetectorConfig::load(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    strata_core::logging::init(&config.log_level)?;

    let stop = strata_core::shutdown::stop_on_signal()?;
    let mut engine = SyncEngine::from_config(&config).context("attaching to module buffers")?;

    if let Err(e) = engine.run(&stop) {
        tracing::error!(error = %e, "sync aborted, restart required");
        return Err(e.into());
    }
    Ok(())
}
