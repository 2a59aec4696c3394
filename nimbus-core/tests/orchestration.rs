//! Integration tests for the orchestration pipeline.
//!
//! These cover the end-to-end scenarios: planning, provisioning, ordered
//! start with readiness probing, ordered and forced stop with escalation,
//! and status reporting. A mock engine stands in for Docker so the tests
//! run without a container runtime and without real delays.

use async_trait::async_trait;
use chrono::Utc;
use nimbus_core::engine::{ContainerDetails, ContainerEngine, RunRequest};
use nimbus_core::health::{HealthMonitor, Sleeper};
use nimbus_core::lifecycle::{
    LifecycleController, Outcome, StopMode, StopOptions,
};
use nimbus_core::status::StatusReporter;
use nimbus_core::types::runtime::{Health, Presence, ResourceUsage};
use nimbus_core::{planner, provision, ConfigMap, NimbusError};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Mock engine tracking networks, volumes, and containers in memory.
///
/// Every call is appended to `calls` so tests can assert ordering.
#[derive(Default)]
struct MockEngine {
    networks: Mutex<BTreeSet<String>>,
    volumes: Mutex<BTreeSet<String>>,
    /// Container name -> running.
    containers: Mutex<BTreeMap<String, bool>>,
    calls: Mutex<Vec<String>>,
    /// Containers whose run call fails.
    fail_run: Mutex<BTreeSet<String>>,
    /// Exit codes for exec probes (default 0).
    exec_codes: Mutex<BTreeMap<String, i32>>,
    /// Containers that ignore the graceful stop.
    stubborn: Mutex<BTreeSet<String>>,
    /// Containers that survive even a kill.
    unkillable: Mutex<BTreeSet<String>>,
}

impl MockEngine {
    fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn record(&self, call: impl Into<String>) {
        self.calls.lock().unwrap().push(call.into());
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn call_index(&self, call: &str) -> Option<usize> {
        self.calls().iter().position(|c| c == call)
    }

    fn count_calls(&self, call: &str) -> usize {
        self.calls().iter().filter(|c| c.as_str() == call).count()
    }

    fn seed_container(&self, name: &str, running: bool) {
        self.containers.lock().unwrap().insert(name.to_string(), running);
    }

    fn is_running(&self, name: &str) -> bool {
        self.containers.lock().unwrap().get(name).copied().unwrap_or(false)
    }

    fn fail_run(&self, name: &str) {
        self.fail_run.lock().unwrap().insert(name.to_string());
    }

    fn set_exec_code(&self, name: &str, code: i32) {
        self.exec_codes.lock().unwrap().insert(name.to_string(), code);
    }

    fn make_stubborn(&self, name: &str) {
        self.stubborn.lock().unwrap().insert(name.to_string());
    }

    fn make_unkillable(&self, name: &str) {
        self.stubborn.lock().unwrap().insert(name.to_string());
        self.unkillable.lock().unwrap().insert(name.to_string());
    }
}

#[async_trait]
impl ContainerEngine for MockEngine {
    async fn ping(&self) -> nimbus_core::Result<()> {
        Ok(())
    }

    async fn network_exists(&self, name: &str) -> nimbus_core::Result<bool> {
        Ok(self.networks.lock().unwrap().contains(name))
    }

    async fn create_network(&self, name: &str) -> nimbus_core::Result<()> {
        self.record(format!("network.create {}", name));
        self.networks.lock().unwrap().insert(name.to_string());
        Ok(())
    }

    async fn remove_network(&self, name: &str) -> nimbus_core::Result<()> {
        self.record(format!("network.rm {}", name));
        self.networks.lock().unwrap().remove(name);
        Ok(())
    }

    async fn volume_exists(&self, name: &str) -> nimbus_core::Result<bool> {
        Ok(self.volumes.lock().unwrap().contains(name))
    }

    async fn create_volume(&self, name: &str) -> nimbus_core::Result<()> {
        self.record(format!("volume.create {}", name));
        self.volumes.lock().unwrap().insert(name.to_string());
        Ok(())
    }

    async fn volume_size(&self, name: &str) -> nimbus_core::Result<Option<u64>> {
        Ok(self.volumes.lock().unwrap().contains(name).then_some(4096))
    }

    async fn list_containers(&self, name: &str, all: bool) -> nimbus_core::Result<Vec<String>> {
        let containers = self.containers.lock().unwrap();
        Ok(match containers.get(name) {
            Some(&running) if all || running => vec![name.to_string()],
            _ => vec![],
        })
    }

    async fn run(&self, request: &RunRequest) -> nimbus_core::Result<()> {
        self.record(format!("run {}", request.name));
        if self.fail_run.lock().unwrap().contains(&request.name) {
            return Err(NimbusError::EngineCommand {
                command: "docker run".to_string(),
                detail: format!("port already bound for {}", request.name),
            });
        }
        self.containers.lock().unwrap().insert(request.name.clone(), true);
        Ok(())
    }

    async fn exec(&self, container: &str, _command: &[&str]) -> nimbus_core::Result<i32> {
        self.record(format!("exec {}", container));
        if !self.is_running(container) {
            return Ok(125);
        }
        Ok(self.exec_codes.lock().unwrap().get(container).copied().unwrap_or(0))
    }

    async fn inspect(&self, container: &str) -> nimbus_core::Result<Option<ContainerDetails>> {
        let containers = self.containers.lock().unwrap();
        Ok(containers.get(container).map(|&running| ContainerDetails {
            running,
            health: Health::None,
            started_at: running.then(Utc::now),
            image: "mock:latest".to_string(),
        }))
    }

    async fn stop(&self, container: &str, timeout: Duration) -> nimbus_core::Result<()> {
        self.record(format!("stop {} {}", container, timeout.as_secs()));
        if !self.stubborn.lock().unwrap().contains(container) {
            if let Some(running) = self.containers.lock().unwrap().get_mut(container) {
                *running = false;
            }
        }
        Ok(())
    }

    async fn kill(&self, container: &str) -> nimbus_core::Result<()> {
        self.record(format!("kill {}", container));
        if !self.unkillable.lock().unwrap().contains(container) {
            if let Some(running) = self.containers.lock().unwrap().get_mut(container) {
                *running = false;
            }
        }
        Ok(())
    }

    async fn remove(&self, container: &str) -> nimbus_core::Result<()> {
        self.record(format!("rm {}", container));
        let mut containers = self.containers.lock().unwrap();
        if containers.get(container).copied().unwrap_or(false) {
            return Err(NimbusError::EngineCommand {
                command: "docker rm".to_string(),
                detail: format!("{} is running", container),
            });
        }
        containers.remove(container);
        Ok(())
    }

    async fn stats(&self, container: &str) -> nimbus_core::Result<Option<ResourceUsage>> {
        Ok(self.is_running(container).then(|| ResourceUsage {
            cpu_percent: 1.5,
            memory_usage: "64MiB / 8GiB".to_string(),
            memory_percent: 0.8,
        }))
    }

    async fn logs(&self, _container: &str, _tail: u32) -> nimbus_core::Result<String> {
        Ok(String::new())
    }

    fn name(&self) -> &str {
        "mock"
    }
}

/// Sleeper that returns immediately and counts invocations.
#[derive(Default)]
struct InstantSleeper {
    sleeps: Mutex<Vec<Duration>>,
}

#[async_trait]
impl Sleeper for InstantSleeper {
    async fn sleep(&self, duration: Duration) {
        self.sleeps.lock().unwrap().push(duration);
    }
}

fn core_config() -> ConfigMap {
    ConfigMap::from_pairs([
        ("CLOUD_DOMAIN", "cloud.example.com"),
        ("ADMIN_PASSWORD", "admin-pw"),
        ("DATABASE_PASSWORD", "db-pw"),
        ("CACHE_PASSWORD", "cache-pw"),
        ("DATA_DIR", "/srv/nimbus/data"),
    ])
}

fn config_with(extra: &[(&str, &str)]) -> ConfigMap {
    let mut pairs: Vec<(String, String)> = core_config()
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    pairs.extend(extra.iter().map(|(k, v)| (k.to_string(), v.to_string())));
    ConfigMap::from_pairs(pairs)
}

fn controller(engine: &Arc<MockEngine>) -> LifecycleController {
    let dyn_engine: Arc<dyn ContainerEngine> = engine.clone();
    let monitor = HealthMonitor::with_sleeper(dyn_engine.clone(), Arc::new(InstantSleeper::default()));
    LifecycleController::with_monitor(dyn_engine, monitor)
}

#[tokio::test]
async fn provisioning_is_idempotent() {
    let engine = MockEngine::new();
    let topology = planner::plan(&core_config());

    provision::provision(engine.as_ref(), &topology).await.expect("first provision");
    let creates_after_first =
        engine.calls().iter().filter(|c| c.contains("create")).count();
    assert_eq!(creates_after_first, 5); // network + 4 core volumes

    provision::provision(engine.as_ref(), &topology).await.expect("second provision");
    let creates_after_second =
        engine.calls().iter().filter(|c| c.contains("create")).count();
    assert_eq!(creates_after_first, creates_after_second, "second run must create nothing");
}

#[tokio::test]
async fn enabling_one_service_provisions_exactly_one_extra_volume() {
    let engine = MockEngine::new();
    let core = planner::plan(&core_config());
    provision::provision(engine.as_ref(), &core).await.unwrap();
    let baseline = engine.count_calls("volume.create nimbus_clamav");
    assert_eq!(baseline, 0);

    let with_clamav = planner::plan(&config_with(&[("CLAMAV_ENABLED", "yes")]));
    assert_eq!(with_clamav.len(), core.len() + 1);
    provision::provision(engine.as_ref(), &with_clamav).await.unwrap();

    let creates: Vec<String> = engine
        .calls()
        .iter()
        .skip_while(|c| !c.contains("nimbus_clamav"))
        .filter(|c| c.contains("create"))
        .cloned()
        .collect();
    assert_eq!(creates, ["volume.create nimbus_clamav"]);
}

#[tokio::test]
async fn status_before_first_start_reports_core_missing() {
    let engine = MockEngine::new();
    let reporter = StatusReporter::new(engine.clone() as Arc<dyn ContainerEngine>);
    let snapshot = reporter.snapshot(&core_config(), false).await.unwrap();

    let core: Vec<_> = snapshot.services.iter().filter(|s| s.required).collect();
    assert_eq!(core.len(), 5);
    for service in &core {
        assert_eq!(service.state.presence, Presence::Missing);
        assert!(service.enabled);
        assert!(!service.expected_absence());
    }

    let optional: Vec<_> = snapshot.services.iter().filter(|s| !s.required).collect();
    assert_eq!(optional.len(), 8);
    for service in optional {
        assert!(service.expected_absence());
    }

    assert!(!snapshot.network_exists);
    assert_eq!(snapshot.endpoint.as_deref(), Some("https://cloud.example.com"));
}

#[tokio::test]
async fn start_brings_up_core_in_tier_order() {
    let engine = MockEngine::new();
    let config = core_config();
    let topology = planner::plan(&config);
    provision::provision(engine.as_ref(), &topology).await.unwrap();

    let report = controller(&engine).start(&topology, &config).await.unwrap();
    assert!(report.success());
    assert_eq!(report.outcomes.len(), 5);

    for name in ["nimbus-db", "nimbus-cache", "nimbus-server", "nimbus-push", "nimbus-proxy"] {
        assert!(engine.is_running(name), "{} should be running", name);
    }

    let db = engine.call_index("run nimbus-db").unwrap();
    let cache = engine.call_index("run nimbus-cache").unwrap();
    let server = engine.call_index("run nimbus-server").unwrap();
    let proxy = engine.call_index("run nimbus-proxy").unwrap();
    assert!(db < cache && cache < server && server < proxy);
}

#[tokio::test]
async fn start_cleans_up_stale_instances_first() {
    let engine = MockEngine::new();
    engine.seed_container("nimbus-db", false);
    let config = core_config();
    let topology = planner::plan(&config);

    let report = controller(&engine).start(&topology, &config).await.unwrap();
    assert!(report.success());

    let removed = engine.call_index("rm nimbus-db").expect("stale instance removed");
    let started = engine.call_index("run nimbus-db").unwrap();
    assert!(removed < started);
}

#[tokio::test]
async fn db_probe_exhaustion_aborts_the_run() {
    let engine = MockEngine::new();
    engine.set_exec_code("nimbus-db", 1);
    let config = core_config();
    let topology = planner::plan(&config);

    let sleeper = Arc::new(InstantSleeper::default());
    let dyn_engine: Arc<dyn ContainerEngine> = engine.clone();
    let controller = LifecycleController::with_monitor(
        dyn_engine.clone(),
        HealthMonitor::with_sleeper(dyn_engine, sleeper.clone()),
    );

    let report = controller.start(&topology, &config).await.unwrap();
    assert!(!report.success());

    // The probe runs exactly its retry budget (30 for the db), sleeping
    // its fixed interval between attempts; it must not hang indefinitely.
    assert_eq!(engine.count_calls("exec nimbus-db"), 30);
    let sleeps = sleeper.sleeps.lock().unwrap();
    assert_eq!(sleeps.len(), 29);
    assert!(sleeps.iter().all(|d| *d == Duration::from_secs(5)));
    drop(sleeps);

    // No later-tier service was started.
    assert_eq!(engine.call_index("run nimbus-cache"), None);
    assert_eq!(engine.call_index("run nimbus-server"), None);

    let skipped = report
        .outcomes
        .iter()
        .filter(|o| matches!(o.outcome, Outcome::Skipped(_)))
        .count();
    assert_eq!(skipped, 4);
}

#[tokio::test]
async fn run_failure_leaves_earlier_services_running() {
    let engine = MockEngine::new();
    engine.fail_run("nimbus-server");
    let config = core_config();
    let topology = planner::plan(&config);

    let report = controller(&engine).start(&topology, &config).await.unwrap();
    assert!(!report.success());

    // db and cache stay up; no rollback.
    assert!(engine.is_running("nimbus-db"));
    assert!(engine.is_running("nimbus-cache"));
    assert!(!engine.is_running("nimbus-server"));
    assert_eq!(engine.call_index("run nimbus-push"), None);
}

#[tokio::test]
async fn ordered_stop_reverses_start_order() {
    let engine = MockEngine::new();
    let config = core_config();
    let topology = planner::plan(&config);
    let controller = controller(&engine);

    controller.start(&topology, &config).await.unwrap();
    let report = controller.stop(&topology, &StopOptions::default()).await.unwrap();
    assert!(report.success());

    for name in ["nimbus-db", "nimbus-cache", "nimbus-server", "nimbus-push", "nimbus-proxy"] {
        assert!(!engine.is_running(name), "{} should be stopped", name);
    }

    // Front-end tier stops before the database tier.
    let calls = engine.calls();
    let proxy_stop = calls.iter().position(|c| c.starts_with("stop nimbus-proxy")).unwrap();
    let db_stop = calls.iter().position(|c| c.starts_with("stop nimbus-db")).unwrap();
    assert!(proxy_stop < db_stop);

    // Stopping again skips everything without error.
    let second = controller.stop(&topology, &StopOptions::default()).await.unwrap();
    assert!(second.success());
    assert!(second
        .outcomes
        .iter()
        .all(|o| matches!(o.outcome, Outcome::Skipped(_))));
}

#[tokio::test]
async fn stop_uses_each_services_grace_period() {
    let engine = MockEngine::new();
    engine.seed_container("nimbus-db", true);
    let topology = planner::plan(&core_config());

    controller(&engine).stop(&topology, &StopOptions::default()).await.unwrap();

    // The db's long drain window is passed through to the engine.
    assert!(engine.call_index("stop nimbus-db 600").is_some());
}

#[tokio::test]
async fn stubborn_container_is_killed_after_grace() {
    let engine = MockEngine::new();
    engine.seed_container("nimbus-cache", true);
    engine.make_stubborn("nimbus-cache");
    let topology = planner::plan(&core_config());

    let report = controller(&engine).stop(&topology, &StopOptions::default()).await.unwrap();
    assert!(report.success());
    assert!(engine.call_index("kill nimbus-cache").is_some());
    assert!(!engine.is_running("nimbus-cache"));
}

#[tokio::test]
async fn unkillable_container_reports_failure_but_does_not_abort() {
    let engine = MockEngine::new();
    engine.seed_container("nimbus-cache", true);
    engine.seed_container("nimbus-db", true);
    engine.make_unkillable("nimbus-cache");
    let topology = planner::plan(&core_config());

    let report = controller(&engine).stop(&topology, &StopOptions::default()).await.unwrap();
    assert!(!report.success());

    let failed: Vec<_> = report.failures().map(|o| o.service.as_str()).collect();
    assert_eq!(failed, ["cache"]);

    // Later services in the shutdown order were still processed.
    assert!(!engine.is_running("nimbus-db"));
}

#[tokio::test]
async fn forced_stop_hits_every_running_service_with_short_grace() {
    let engine = MockEngine::new();
    let config = core_config();
    let topology = planner::plan(&config);
    let controller = controller(&engine);

    controller.start(&topology, &config).await.unwrap();
    let options = StopOptions { mode: StopMode::Forced, ..StopOptions::default() };
    let report = controller.stop(&topology, &options).await.unwrap();
    assert!(report.success());

    for name in ["nimbus-db", "nimbus-cache", "nimbus-server", "nimbus-push", "nimbus-proxy"] {
        assert!(!engine.is_running(name));
        assert!(engine.call_index(&format!("stop {} 10", name)).is_some());
    }
}

#[tokio::test]
async fn cleanup_removes_containers_and_network_but_not_volumes() {
    let engine = MockEngine::new();
    let config = core_config();
    let topology = planner::plan(&config);
    provision::provision(engine.as_ref(), &topology).await.unwrap();
    let controller = controller(&engine);

    controller.start(&topology, &config).await.unwrap();
    let options = StopOptions { cleanup: true, ..StopOptions::default() };
    let report = controller.stop(&topology, &options).await.unwrap();
    assert!(report.success());

    assert!(engine.containers.lock().unwrap().is_empty());
    assert!(engine.call_index("network.rm nimbus-net").is_some());
    // Volumes survive a cleanup.
    assert!(engine.volumes.lock().unwrap().contains("nimbus_db"));
}

#[tokio::test]
async fn status_after_start_reports_running_with_usage() {
    let engine = MockEngine::new();
    let config = core_config();
    let topology = planner::plan(&config);
    controller(&engine).start(&topology, &config).await.unwrap();

    let reporter = StatusReporter::new(engine.clone() as Arc<dyn ContainerEngine>);
    let snapshot = reporter.snapshot(&config, true).await.unwrap();

    for service in snapshot.services.iter().filter(|s| s.required) {
        assert_eq!(service.state.presence, Presence::Running);
        let usage = service.state.usage.as_ref().expect("usage sampled");
        assert!(usage.cpu_percent > 0.0);
    }
}

#[tokio::test]
async fn optional_service_joins_the_topology_at_its_tier() {
    let engine = MockEngine::new();
    let config = config_with(&[("CLAMAV_ENABLED", "yes")]);
    let topology = planner::plan(&config);
    assert_eq!(topology.len(), 6);

    controller(&engine).start(&topology, &config).await.unwrap();

    let cache = engine.call_index("run nimbus-cache").unwrap();
    let clamav = engine.call_index("run nimbus-clamav").unwrap();
    let server = engine.call_index("run nimbus-server").unwrap();
    assert!(cache < clamav && clamav < server);
}
