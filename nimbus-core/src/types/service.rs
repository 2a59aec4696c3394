//! Static service definitions.
//!
//! A [`ServiceSpec`] describes one member of the fixed topology: how it is
//! launched, where it sits in the start order, whether it is gated by a
//! feature flag, and how readiness is confirmed. The catalog of all specs
//! lives in [`crate::catalog`]; nothing here is resolved against the
//! configuration yet.

use std::time::Duration;

/// Prefix applied to every container name (`db` runs as `nimbus-db`).
pub const CONTAINER_PREFIX: &str = "nimbus-";

/// One member of the fixed topology.
#[derive(Debug)]
pub struct ServiceSpec {
    /// Unique identifier, also the container name suffix.
    pub name: &'static str,

    /// Image reference launched for this service.
    pub image: &'static str,

    /// Configuration key whose value, when set, replaces `image`.
    /// Used by the one service that may run a locally built derivative.
    pub image_override: Option<&'static str>,

    /// Start-order rank. Lower tiers start first; shutdown is the reverse.
    pub tier: u32,

    /// Whether this service is gated by a feature flag.
    pub optional: bool,

    /// Configuration key read for inclusion; the value must be exactly "yes".
    pub enable_flag: Option<&'static str>,

    /// Container launch parameters, unresolved.
    pub launch: LaunchSpec,

    /// How readiness is confirmed after start.
    pub probe: ReadinessProbe,

    /// Grace period for the ordered stop before escalating to kill.
    pub stop_timeout: Duration,
}

impl ServiceSpec {
    /// Container name for this service.
    pub fn container_name(&self) -> String {
        container_name(self.name)
    }
}

/// Container name for a service identifier.
pub fn container_name(service: &str) -> String {
    format!("{}{}", CONTAINER_PREFIX, service)
}

/// Launch parameters before configuration substitution.
#[derive(Debug, Default)]
pub struct LaunchSpec {
    /// User (or uid[:gid]) the container runs as.
    pub user: Option<&'static str>,

    /// Read-only root filesystem.
    pub read_only: bool,

    /// Writable tmpfs mounts, scoped paths only.
    pub tmpfs: Vec<&'static str>,

    /// Capabilities dropped from the default set.
    pub cap_drop: Vec<&'static str>,

    /// Capabilities added on top of whatever survives `cap_drop`.
    pub cap_add: Vec<&'static str>,

    /// Published ports. Host side binds to the configured bind address.
    pub ports: Vec<PortSpec>,

    /// Environment variable template.
    pub env: Vec<EnvSpec>,

    /// Volume and host-path mounts.
    pub mounts: Vec<MountSpec>,

    /// Command override, resolved like environment values.
    pub command: Vec<TemplateValue>,
}

/// A value resolved at launch time.
#[derive(Debug, Clone, Copy)]
pub enum TemplateValue {
    /// Fixed value.
    Literal(&'static str),

    /// Required configuration key; launch fails if absent.
    Config(&'static str),

    /// Configuration key with a fallback.
    ConfigOr(&'static str, &'static str),

    /// Hostname of another service on the shared network
    /// (its container name).
    ServiceHost(&'static str),
}

/// One environment variable in the launch template.
#[derive(Debug, Clone, Copy)]
pub struct EnvSpec {
    pub key: &'static str,
    pub value: TemplateValue,
}

impl EnvSpec {
    pub const fn new(key: &'static str, value: TemplateValue) -> Self {
        Self { key, value }
    }
}

/// Source of the host port for a published port.
#[derive(Debug, Clone, Copy)]
pub enum PortSource {
    /// Fixed host port.
    Fixed(u16),

    /// Configuration key with a fallback port.
    Config(&'static str, u16),
}

/// A published port.
#[derive(Debug, Clone, Copy)]
pub struct PortSpec {
    pub host: PortSource,
    pub container: u16,
    pub protocol: Protocol,
}

/// Network protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Tcp,
    Udp,
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Protocol::Tcp => write!(f, "tcp"),
            Protocol::Udp => write!(f, "udp"),
        }
    }
}

/// Where a mount's data lives.
#[derive(Debug, Clone, Copy)]
pub enum MountSource {
    /// Named volume, provisioned before any container starts.
    Volume(&'static str),

    /// Host path read from a configuration key.
    HostPath(&'static str),
}

/// One mount into the container.
#[derive(Debug, Clone, Copy)]
pub struct MountSpec {
    pub source: MountSource,
    pub target: &'static str,
    pub read_only: bool,

    /// Skipped without error when the configuration key is absent.
    /// Only meaningful for [`MountSource::HostPath`].
    pub optional: bool,
}

impl MountSpec {
    pub const fn volume(name: &'static str, target: &'static str) -> Self {
        Self { source: MountSource::Volume(name), target, read_only: false, optional: false }
    }

    pub const fn host(key: &'static str, target: &'static str) -> Self {
        Self { source: MountSource::HostPath(key), target, read_only: false, optional: false }
    }

    pub const fn host_optional(key: &'static str, target: &'static str) -> Self {
        Self { source: MountSource::HostPath(key), target, read_only: false, optional: true }
    }
}

/// How readiness is confirmed for a started service.
#[derive(Debug, Default, Clone, Copy)]
pub enum ReadinessProbe {
    /// Considered ready as soon as the run call returns.
    #[default]
    None,

    /// Ready once the container reports the running state.
    Running { retries: u32, interval: Duration },

    /// Ready once the command exits zero inside the container.
    Exec { command: &'static [&'static str], retries: u32, interval: Duration },
}

impl ReadinessProbe {
    /// Retry budget and interval, if the probe polls at all.
    pub fn budget(&self) -> Option<(u32, Duration)> {
        match *self {
            ReadinessProbe::None => None,
            ReadinessProbe::Running { retries, interval }
            | ReadinessProbe::Exec { retries, interval, .. } => Some((retries, interval)),
        }
    }
}
