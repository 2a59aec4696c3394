//! Shared infrastructure provisioning.
//!
//! Ensures the isolated network and every volume the topology references
//! exist before any container is touched. Idempotent: existence is checked
//! first and nothing is created twice.

use crate::catalog::NETWORK_NAME;
use crate::engine::ContainerEngine;
use crate::error::Result;
use crate::planner::Topology;
use tracing::{debug, info, instrument};

/// Ensure the shared network and all in-scope volumes exist.
///
/// Fails before any container operation when the engine is unreachable or
/// an object cannot be created.
#[instrument(skip_all)]
pub async fn provision(engine: &dyn ContainerEngine, topology: &Topology) -> Result<()> {
    ensure_network(engine, NETWORK_NAME).await?;
    for volume in topology.volumes() {
        ensure_volume(engine, volume).await?;
    }
    Ok(())
}

/// Create the network if it does not exist yet.
pub async fn ensure_network(engine: &dyn ContainerEngine, name: &str) -> Result<()> {
    if engine.network_exists(name).await? {
        debug!(network = %name, "network present");
        return Ok(());
    }
    info!(network = %name, "creating network");
    engine.create_network(name).await
}

/// Create a volume if it does not exist yet.
pub async fn ensure_volume(engine: &dyn ContainerEngine, name: &str) -> Result<()> {
    if engine.volume_exists(name).await? {
        debug!(volume = %name, "volume present");
        return Ok(());
    }
    info!(volume = %name, "creating volume");
    engine.create_volume(name).await
}
