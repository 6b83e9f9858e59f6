//! Runs the training pipeline from the command line.
//!
//! Usage: `textsum-pipeline [all | ingestion | <stage id>]` (default `all`).
use anyhow::{bail, Context};
use textsum_config::ConfigurationManager;
use textsum_stages::{run_pipeline, PipelineSelection};
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let selection: PipelineSelection = std::env::args().nth(1).unwrap_or_default().parse()?;
    let manager = ConfigurationManager::from_env().context("loading configuration")?;

    let report = run_pipeline(&manager, &selection).map_err(|e| {
        tracing::error!(error = %e, pipeline = %selection, "pipeline failed");
        e
    })?;
    println!("{}", report.render());

    if let Some(stage) = report.aborted_at {
        bail!("pipeline aborted at {stage}");
    }
    Ok(())
}
