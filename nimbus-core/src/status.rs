//! Read-side status reporting.
//!
//! Queries current container state across the whole catalog, enabled or
//! not, without side effects. Safe to call at any time, including before
//! the first start.

use crate::catalog::{self, NETWORK_NAME};
use crate::config::ConfigMap;
use crate::engine::ContainerEngine;
use crate::error::Result;
use crate::planner;
use crate::types::runtime::{Presence, RuntimeState};
use crate::types::service::ServiceSpec;
use std::sync::Arc;

/// Status of one catalog entry.
#[derive(Debug, Clone)]
pub struct ServiceReport {
    pub name: &'static str,
    pub container: String,
    pub required: bool,

    /// Whether the service is in scope for the current configuration.
    pub enabled: bool,

    pub state: RuntimeState,
}

impl ServiceReport {
    /// A disabled optional service with no container is an expected
    /// absence; a required (or enabled) service with no container is not.
    pub fn expected_absence(&self) -> bool {
        !self.enabled && self.state.presence == Presence::Missing
    }
}

/// Status of one named volume.
#[derive(Debug, Clone)]
pub struct VolumeReport {
    pub name: String,
    pub exists: bool,
    pub size_bytes: Option<u64>,
}

/// Full topology status snapshot.
#[derive(Debug, Clone)]
pub struct StatusSnapshot {
    pub services: Vec<ServiceReport>,
    pub network: String,
    pub network_exists: bool,
    pub volumes: Vec<VolumeReport>,

    /// Configured public endpoint, when the configuration provides one.
    pub endpoint: Option<String>,
}

/// Builds status snapshots from the engine.
pub struct StatusReporter {
    engine: Arc<dyn ContainerEngine>,
}

impl StatusReporter {
    pub fn new(engine: Arc<dyn ContainerEngine>) -> Self {
        Self { engine }
    }

    /// Snapshot every catalog entry, the shared network, and all volumes.
    ///
    /// `with_usage` additionally samples resource usage for running
    /// containers (one extra engine call each).
    pub async fn snapshot(&self, config: &ConfigMap, with_usage: bool) -> Result<StatusSnapshot> {
        let topology = planner::plan(config);

        let mut services = Vec::with_capacity(catalog::catalog().len());
        for spec in catalog::catalog() {
            services.push(self.service_report(spec, topology.contains(spec.name), with_usage).await?);
        }

        let network_exists = self.engine.network_exists(NETWORK_NAME).await?;

        // Report in-scope volumes plus any optional-service volume that
        // exists from an earlier enablement.
        let mut volumes = Vec::new();
        for spec in catalog::catalog() {
            for volume in volume_names(spec) {
                let exists = self.engine.volume_exists(volume).await?;
                if !exists && !topology.contains(spec.name) {
                    continue;
                }
                let size_bytes =
                    if exists { self.engine.volume_size(volume).await? } else { None };
                volumes.push(VolumeReport { name: volume.to_string(), exists, size_bytes });
            }
        }

        Ok(StatusSnapshot {
            services,
            network: NETWORK_NAME.to_string(),
            network_exists,
            volumes,
            endpoint: endpoint(config),
        })
    }

    async fn service_report(
        &self,
        spec: &'static ServiceSpec,
        enabled: bool,
        with_usage: bool,
    ) -> Result<ServiceReport> {
        let container = spec.container_name();
        let state = match self.engine.inspect(&container).await? {
            None => RuntimeState::missing(),
            Some(details) => {
                let usage = if with_usage && details.running {
                    self.engine.stats(&container).await?
                } else {
                    None
                };
                RuntimeState {
                    presence: if details.running { Presence::Running } else { Presence::Stopped },
                    health: details.health,
                    started_at: if details.running { details.started_at } else { None },
                    image: Some(details.image),
                    usage,
                }
            }
        };
        Ok(ServiceReport {
            name: spec.name,
            container,
            required: !spec.optional,
            enabled,
            state,
        })
    }
}

fn volume_names(spec: &ServiceSpec) -> impl Iterator<Item = &'static str> + '_ {
    use crate::types::service::MountSource;
    spec.launch.mounts.iter().filter_map(|m| match m.source {
        MountSource::Volume(name) => Some(name),
        MountSource::HostPath(_) => None,
    })
}

/// Public endpoint from the configured domain and port. The default
/// HTTPS port is omitted from the rendering.
pub fn endpoint(config: &ConfigMap) -> Option<String> {
    let domain = config.get("CLOUD_DOMAIN")?;
    match config.get_u16("PUBLIC_PORT", 443) {
        Ok(443) | Err(_) => Some(format!("https://{}", domain)),
        Ok(port) => Some(format!("https://{}:{}", domain, port)),
    }
}
