//! nimbus core library.
//!
//! Lifecycle orchestration for the nimbus suite's fixed container topology:
//! service catalog, topology planning, resource provisioning, ordered
//! start/stop with readiness probing, and status reporting.

pub mod catalog;
pub mod config;
pub mod engine;
pub mod error;
pub mod health;
pub mod lifecycle;
pub mod planner;
pub mod provision;
pub mod status;
pub mod types;

// Re-export commonly used items
pub use catalog::{catalog, NETWORK_NAME};
pub use config::ConfigMap;
pub use engine::{ContainerEngine, DockerCli, RunRequest};
pub use error::{NimbusError, Result};
pub use health::{HealthMonitor, ProbeState, Sleeper};
pub use lifecycle::{LifecycleController, Outcome, RunReport, StopMode, StopOptions};
pub use planner::{plan, Topology};
pub use status::{StatusReporter, StatusSnapshot};
pub use types::{Health, Presence, ResourceUsage, RuntimeState};
