//! Domain types shared across the orchestrator.

pub mod runtime;
pub mod service;

pub use runtime::{Health, Presence, ResourceUsage, RuntimeState};
pub use service::{
    EnvSpec, LaunchSpec, MountSource, MountSpec, PortSpec, Protocol, ReadinessProbe, ServiceSpec,
    TemplateValue, CONTAINER_PREFIX,
};
