//! Container engine abstraction.
//!
//! The orchestrator decides which engine calls to make, in what order, with
//! what parameters; the engine itself is an external system behind this
//! trait. The production implementation shells out to the Docker CLI
//! ([`docker::DockerCli`]); tests substitute a mock.

pub mod docker;

use crate::error::Result;
use crate::types::runtime::{Health, ResourceUsage};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;

pub use docker::DockerCli;

/// A fully resolved container launch request.
#[derive(Debug, Clone, Default)]
pub struct RunRequest {
    pub name: String,
    pub image: String,
    pub network: String,
    pub restart_policy: String,
    pub user: Option<String>,
    pub read_only: bool,
    pub tmpfs: Vec<String>,
    pub cap_drop: Vec<String>,
    pub cap_add: Vec<String>,
    pub ports: Vec<PublishedPort>,
    pub env: Vec<(String, String)>,
    pub mounts: Vec<ResolvedMount>,
    pub command: Vec<String>,
}

/// A host-published port.
#[derive(Debug, Clone)]
pub struct PublishedPort {
    /// Host address to bind; all interfaces when absent.
    pub host_ip: Option<String>,
    pub host_port: u16,
    pub container_port: u16,
    /// "tcp" or "udp".
    pub protocol: String,
}

/// A resolved mount (named volume or host path).
#[derive(Debug, Clone)]
pub struct ResolvedMount {
    pub source: String,
    pub target: String,
    pub read_only: bool,
}

/// What `inspect` reports about an existing container.
#[derive(Debug, Clone)]
pub struct ContainerDetails {
    pub running: bool,
    pub health: Health,
    pub started_at: Option<DateTime<Utc>>,
    pub image: String,
}

/// Operations consumed from the container engine.
///
/// Every method maps onto one engine call; implementations perform no
/// orchestration of their own.
#[async_trait]
pub trait ContainerEngine: Send + Sync {
    /// Verify the engine is reachable. Called before any mutation.
    async fn ping(&self) -> Result<()>;

    async fn network_exists(&self, name: &str) -> Result<bool>;
    async fn create_network(&self, name: &str) -> Result<()>;
    async fn remove_network(&self, name: &str) -> Result<()>;

    async fn volume_exists(&self, name: &str) -> Result<bool>;
    async fn create_volume(&self, name: &str) -> Result<()>;

    /// Size of a volume in bytes, when the engine can report one.
    async fn volume_size(&self, name: &str) -> Result<Option<u64>>;

    /// Names of containers matching `name` exactly; `all` includes
    /// stopped containers.
    async fn list_containers(&self, name: &str, all: bool) -> Result<Vec<String>>;

    /// Create and start a container.
    async fn run(&self, request: &RunRequest) -> Result<()>;

    /// Run a command inside a container, returning its exit code.
    async fn exec(&self, container: &str, command: &[&str]) -> Result<i32>;

    /// Inspect a container; `None` when no such container exists.
    async fn inspect(&self, container: &str) -> Result<Option<ContainerDetails>>;

    /// Graceful stop with a grace period before the engine escalates.
    async fn stop(&self, container: &str, timeout: Duration) -> Result<()>;

    /// Forceful termination.
    async fn kill(&self, container: &str) -> Result<()>;

    /// Remove a (stopped) container.
    async fn remove(&self, container: &str) -> Result<()>;

    /// Resource usage snapshot; `None` when the container is not running.
    async fn stats(&self, container: &str) -> Result<Option<ResourceUsage>>;

    /// Tail of the container's log.
    async fn logs(&self, container: &str, tail: u32) -> Result<String>;

    /// Engine name for log messages.
    fn name(&self) -> &str;
}
