//! `nimbus start` command

use anyhow::{Context, Result};
use nimbus_core::{planner, provision, ConfigMap, LifecycleController};
use std::path::Path;
use tracing::info;

/// Provision shared infrastructure and start every in-scope service in
/// dependency order. Returns the process exit code.
pub async fn run(config_path: &Path) -> Result<i32> {
    let engine = super::connect().await?;

    let config = ConfigMap::load(config_path)
        .with_context(|| format!("loading configuration from {}", config_path.display()))?;

    let topology = planner::plan(&config);
    info!(services = topology.len(), "starting topology");

    provision::provision(engine.as_ref(), &topology)
        .await
        .context("provisioning shared infrastructure")?;

    let controller = LifecycleController::new(engine);
    let report = controller.start(&topology, &config).await?;

    super::print_report("start", &report);
    Ok(if report.success() { 0 } else { 1 })
}
