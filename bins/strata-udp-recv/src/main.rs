use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use strata_config::DetectorConfig;
use udp_recv_engine::UdpRecvEngine;

/// Receives one detector module's UDP stream into its frame buffer.
#[derive(Parser, Debug)]
#[command(name = "strata-udp-recv")]
struct Args {
    /// Detector config file (.toml or .json)
    config: PathBuf,

    /// Module to receive, counted from 0
    module_id: u16,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let config = DetectorConfig::load(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    strata_core::logging::init(&config.log_level)?;

    let stop = strata_core::shutdown::stop_on_signal()?;
    let mut engine = UdpRecvEngine::from_config(&config, args.module_id)
        .with_context(|| format!("starting receiver of module {}", args.module_id))?;

    engine.run(&stop)?;
    tracing::info!(module_id = args.module_id, "exiting");
    Ok(())
}
