//! Entry point for the ipmeshd binary.
//!
//! Loads the engine configuration, builds every node of the configured
//! topology and writes the process plan for the supervisor.

use anyhow::{Context, Result, bail};
use ipmeshd::{config::Config, logging, pipeline::Engine};

#[tokio::main]
async fn main() -> Result<()> {
    let cfg = Config::load().context("failed to load configuration")?;
    logging::init(cfg.log_format);
    tracing::info!(topology = %cfg.topology_path.display(), "ipmeshd starting");

    let report = Engine::new(cfg)
        .run()
        .await
        .context("configuration build aborted")?;
    let failed = report.failures().count();
    if failed > 0 {
        bail!("{failed} of {} nodes failed to build", report.nodes().len());
    }
    Ok(())
}
