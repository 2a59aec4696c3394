//! Container lifecycle control.
//!
//! Start walks the topology in tier order: stale-instance cleanup, launch
//! parameter resolution, the run call, then the readiness probe. Stop walks
//! the reverse order with per-service grace periods and a kill escalation.
//! Per-service outcomes are collected into a [`RunReport`] instead of being
//! raised on first error.

use crate::catalog::NETWORK_NAME;
use crate::config::ConfigMap;
use crate::engine::{ContainerEngine, PublishedPort, ResolvedMount, RunRequest};
use crate::error::{NimbusError, Result};
use crate::health::{HealthMonitor, ProbeState};
use crate::planner::Topology;
use crate::types::service::{
    container_name, MountSource, PortSource, ServiceSpec, TemplateValue,
};
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, instrument, warn};

/// Grace period per container in the forced parallel stop.
pub const FORCED_STOP_TIMEOUT: Duration = Duration::from_secs(10);

/// Grace period when clearing a stale instance before a fresh start.
const STALE_STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// Restart policy applied to every container.
const RESTART_POLICY: &str = "unless-stopped";

/// Outcome of one lifecycle step for one service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The step completed.
    Ok,

    /// The step completed with a caveat worth surfacing (e.g. an optional
    /// service started but never confirmed readiness).
    Warning(String),

    /// Nothing to do (already stopped, or aborted before this service was
    /// reached).
    Skipped(String),

    /// The step failed; the run report carries the reason.
    Failed(String),
}

/// One service's outcome within a run.
#[derive(Debug, Clone)]
pub struct ServiceOutcome {
    pub service: String,
    pub outcome: Outcome,
}

/// Collected outcomes of a start or stop run.
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub outcomes: Vec<ServiceOutcome>,
}

impl RunReport {
    fn record(&mut self, service: &str, outcome: Outcome) {
        self.outcomes.push(ServiceOutcome { service: service.to_string(), outcome });
    }

    /// True when no service failed.
    pub fn success(&self) -> bool {
        !self.outcomes.iter().any(|o| matches!(o.outcome, Outcome::Failed(_)))
    }

    pub fn failures(&self) -> impl Iterator<Item = &ServiceOutcome> {
        self.outcomes.iter().filter(|o| matches!(o.outcome, Outcome::Failed(_)))
    }
}

/// How a stop run behaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StopMode {
    /// Reverse topology order, one service at a time, per-service grace.
    #[default]
    Ordered,

    /// All running services concurrently with a fixed short grace each.
    /// Trades ordering guarantees for speed; explicit request only.
    Forced,
}

/// Options layered on top of a stop run.
#[derive(Debug, Clone, Copy, Default)]
pub struct StopOptions {
    pub mode: StopMode,

    /// Remove containers after stopping them.
    pub remove: bool,

    /// Remove containers and the shared network. Volumes are never touched.
    pub cleanup: bool,
}

/// Issues create/start/stop/kill calls per service in topology order.
pub struct LifecycleController {
    engine: Arc<dyn ContainerEngine>,
    monitor: HealthMonitor,
}

impl LifecycleController {
    pub fn new(engine: Arc<dyn ContainerEngine>) -> Self {
        let monitor = HealthMonitor::new(engine.clone());
        Self { engine, monitor }
    }

    /// Use a caller-provided monitor (tests inject a simulated clock).
    pub fn with_monitor(engine: Arc<dyn ContainerEngine>, monitor: HealthMonitor) -> Self {
        Self { engine, monitor }
    }

    /// Start every service in the topology, in order.
    ///
    /// A run-call failure, or a readiness timeout on a required service,
    /// ends the run; services already started stay running (no rollback)
    /// and the remaining services are reported as skipped.
    #[instrument(skip_all)]
    pub async fn start(&self, topology: &Topology, config: &ConfigMap) -> Result<RunReport> {
        let mut report = RunReport::default();
        let order = topology.start_order();

        for (idx, spec) in order.iter().enumerate() {
            info!(service = %spec.name, "[{}/{}] starting", idx + 1, order.len());

            if let Err(e) = self.start_service(spec, config).await {
                error!(service = %spec.name, error = %e, "start failed");
                report.record(spec.name, Outcome::Failed(e.to_string()));
                self.skip_rest(&mut report, &order[idx + 1..], spec.name);
                return Ok(report);
            }

            match self.monitor.await_ready(spec).await? {
                ProbeState::TimedOut if !spec.optional => {
                    let (attempts, _) = spec.probe.budget().unwrap_or((0, Duration::ZERO));
                    let e = NimbusError::ReadinessTimeout {
                        service: spec.name.to_string(),
                        attempts,
                    };
                    error!(service = %spec.name, error = %e, "required service never became ready");
                    report.record(spec.name, Outcome::Failed(e.to_string()));
                    self.skip_rest(&mut report, &order[idx + 1..], spec.name);
                    return Ok(report);
                }
                ProbeState::TimedOut => {
                    warn!(service = %spec.name, "started, readiness not confirmed");
                    report.record(
                        spec.name,
                        Outcome::Warning("readiness not confirmed".to_string()),
                    );
                }
                _ => {
                    info!(service = %spec.name, "ready");
                    report.record(spec.name, Outcome::Ok);
                }
            }
        }

        // Informational: the topology may still be converging.
        if !self.monitor.await_topology(topology).await? {
            warn!("not all services settled within the aggregate wait");
        }

        Ok(report)
    }

    /// Start protocol for one service.
    async fn start_service(&self, spec: &ServiceSpec, config: &ConfigMap) -> Result<()> {
        let container = spec.container_name();

        // Clean slate: a stale instance from a previous run, running or
        // stopped, is stopped and removed first. Errors are ignored so a
        // half-removed leftover cannot wedge the start.
        let stale = self.engine.list_containers(&container, true).await?;
        if !stale.is_empty() {
            info!(service = %spec.name, "removing stale instance");
            let _ = self.engine.stop(&container, STALE_STOP_TIMEOUT).await;
            let _ = self.engine.remove(&container).await;
        }

        let request = build_run_request(spec, config)?;
        self.engine.run(&request).await.map_err(|e| NimbusError::StartFailed {
            service: spec.name.to_string(),
            reason: e.to_string(),
        })
    }

    fn skip_rest(&self, report: &mut RunReport, rest: &[&ServiceSpec], failed: &str) {
        for spec in rest {
            report.record(
                spec.name,
                Outcome::Skipped(format!("aborted after {} failed", failed)),
            );
        }
    }

    /// Stop services per the selected mode.
    #[instrument(skip_all)]
    pub async fn stop(&self, topology: &Topology, options: &StopOptions) -> Result<RunReport> {
        let mut report = match options.mode {
            StopMode::Ordered => self.stop_ordered(topology).await?,
            StopMode::Forced => self.stop_forced(topology).await?,
        };

        if options.remove || options.cleanup {
            self.remove_containers(topology, &mut report).await;
        }
        if options.cleanup {
            match self.engine.network_exists(NETWORK_NAME).await {
                Ok(true) => {
                    if let Err(e) = self.engine.remove_network(NETWORK_NAME).await {
                        warn!(network = NETWORK_NAME, error = %e, "failed to remove network");
                    } else {
                        info!(network = NETWORK_NAME, "network removed");
                    }
                }
                Ok(false) => {}
                Err(e) => warn!(error = %e, "could not check network"),
            }
        }

        Ok(report)
    }

    /// Default mode: reverse topology order, graceful stop, kill escalation.
    /// Failures are recorded and processing continues (best-effort
    /// shutdown).
    async fn stop_ordered(&self, topology: &Topology) -> Result<RunReport> {
        let mut report = RunReport::default();

        for spec in topology.shutdown_order() {
            let outcome = self.stop_service(spec, spec.stop_timeout).await;
            if let Outcome::Failed(reason) = &outcome {
                error!(service = %spec.name, %reason, "stop failed, continuing");
            }
            report.record(spec.name, outcome);
        }
        Ok(report)
    }

    /// Forced mode: every running service concurrently, fixed short grace.
    async fn stop_forced(&self, topology: &Topology) -> Result<RunReport> {
        let mut report = RunReport::default();
        let mut running = Vec::new();

        for spec in topology.shutdown_order() {
            match self.engine.inspect(&spec.container_name()).await? {
                Some(details) if details.running => running.push(spec),
                _ => report.record(spec.name, Outcome::Skipped("not running".to_string())),
            }
        }

        info!(count = running.len(), "forcing stop of all running services");
        let outcomes = join_all(
            running.iter().map(|spec| self.stop_service(spec, FORCED_STOP_TIMEOUT)),
        )
        .await;

        for (spec, outcome) in running.iter().zip(outcomes) {
            report.record(spec.name, outcome);
        }
        Ok(report)
    }

    /// Stop protocol for one service: skip if not running, graceful stop,
    /// kill escalation, post-condition check.
    async fn stop_service(&self, spec: &ServiceSpec, grace: Duration) -> Outcome {
        let container = spec.container_name();

        match self.engine.inspect(&container).await {
            Ok(Some(details)) if details.running => {}
            Ok(_) => return Outcome::Skipped("not running".to_string()),
            Err(e) => return Outcome::Failed(format!("inspect failed: {}", e)),
        }

        info!(service = %spec.name, grace_secs = grace.as_secs(), "stopping");
        if let Err(e) = self.engine.stop(&container, grace).await {
            warn!(service = %spec.name, error = %e, "graceful stop failed");
        }

        if !self.still_running(&container).await {
            return Outcome::Ok;
        }

        warn!(service = %spec.name, "did not exit within grace period, killing");
        if let Err(e) = self.engine.kill(&container).await {
            warn!(service = %spec.name, error = %e, "kill failed");
        }

        if self.still_running(&container).await {
            Outcome::Failed("still running after kill".to_string())
        } else {
            Outcome::Ok
        }
    }

    async fn still_running(&self, container: &str) -> bool {
        matches!(
            self.engine.inspect(container).await,
            Ok(Some(details)) if details.running
        )
    }

    /// Remove stopped containers; failures are warnings, not outcomes.
    async fn remove_containers(&self, topology: &Topology, report: &mut RunReport) {
        for spec in topology.shutdown_order() {
            let container = container_name(spec.name);
            match self.engine.list_containers(&container, true).await {
                Ok(found) if !found.is_empty() => {
                    if let Err(e) = self.engine.remove(&container).await {
                        warn!(service = %spec.name, error = %e, "failed to remove container");
                        report.record(spec.name, Outcome::Failed(format!("remove: {}", e)));
                    } else {
                        info!(service = %spec.name, "container removed");
                    }
                }
                Ok(_) => {}
                Err(e) => warn!(service = %spec.name, error = %e, "could not list container"),
            }
        }
    }
}

/// Resolve a service's launch template against the configuration.
///
/// Substitutes configuration values, cross-references other services'
/// hostnames, and applies the image override when configured.
pub fn build_run_request(spec: &ServiceSpec, config: &ConfigMap) -> Result<RunRequest> {
    let image = match spec.image_override.and_then(|key| config.get(key)) {
        Some(custom) => custom.to_string(),
        None => spec.image.to_string(),
    };

    let mut env = Vec::with_capacity(spec.launch.env.len());
    for entry in &spec.launch.env {
        env.push((entry.key.to_string(), resolve(&entry.value, config)?));
    }

    let bind_address = config.get("BIND_ADDRESS").map(str::to_string);
    let mut ports = Vec::with_capacity(spec.launch.ports.len());
    for port in &spec.launch.ports {
        let host_port = match port.host {
            PortSource::Fixed(p) => p,
            PortSource::Config(key, default) => config.get_u16(key, default)?,
        };
        ports.push(PublishedPort {
            host_ip: bind_address.clone(),
            host_port,
            container_port: port.container,
            protocol: port.protocol.to_string(),
        });
    }

    let mut mounts = Vec::with_capacity(spec.launch.mounts.len());
    for mount in &spec.launch.mounts {
        let source = match mount.source {
            MountSource::Volume(name) => name.to_string(),
            MountSource::HostPath(key) => match config.get(key) {
                Some(path) => path.to_string(),
                None if mount.optional => continue,
                None => return Err(NimbusError::MissingConfig { key: key.to_string() }),
            },
        };
        mounts.push(ResolvedMount {
            source,
            target: mount.target.to_string(),
            read_only: mount.read_only,
        });
    }

    let mut command = Vec::with_capacity(spec.launch.command.len());
    for value in &spec.launch.command {
        command.push(resolve(value, config)?);
    }

    Ok(RunRequest {
        name: spec.container_name(),
        image,
        network: NETWORK_NAME.to_string(),
        restart_policy: RESTART_POLICY.to_string(),
        user: spec.launch.user.map(str::to_string),
        read_only: spec.launch.read_only,
        tmpfs: spec.launch.tmpfs.iter().map(|s| s.to_string()).collect(),
        cap_drop: spec.launch.cap_drop.iter().map(|s| s.to_string()).collect(),
        cap_add: spec.launch.cap_add.iter().map(|s| s.to_string()).collect(),
        ports,
        env,
        mounts,
        command,
    })
}

fn resolve(value: &TemplateValue, config: &ConfigMap) -> Result<String> {
    Ok(match *value {
        TemplateValue::Literal(v) => v.to_string(),
        TemplateValue::Config(key) => config.require(key)?.to_string(),
        TemplateValue::ConfigOr(key, default) => {
            config.get(key).unwrap_or(default).to_string()
        }
        TemplateValue::ServiceHost(service) => container_name(service),
    })
}
