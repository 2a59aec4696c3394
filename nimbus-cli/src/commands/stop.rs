//! `nimbus stop` command

use anyhow::{Context, Result};
use nimbus_core::{planner, ConfigMap, LifecycleController, StopMode, StopOptions};
use std::path::Path;
use tracing::info;

/// Stop services in reverse dependency order (or all at once with
/// `--force`). Returns the process exit code.
pub async fn run(config_path: &Path, remove: bool, cleanup: bool, force: bool) -> Result<i32> {
    let engine = super::connect().await?;

    let config = ConfigMap::load(config_path)
        .with_context(|| format!("loading configuration from {}", config_path.display()))?;

    let topology = planner::plan(&config);
    let options = StopOptions {
        mode: if force { StopMode::Forced } else { StopMode::Ordered },
        remove,
        cleanup,
    };
    info!(services = topology.len(), mode = ?options.mode, "stopping topology");

    let controller = LifecycleController::new(engine);
    let report = controller.stop(&topology, &options).await?;

    super::print_report("stop", &report);
    Ok(if report.success() { 0 } else { 1 })
}
