//! Runtime state derived from the engine.
//!
//! Rebuilt on every query, never cached across invocations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Whether a container for the service exists, and if so, whether it runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Presence {
    /// No container with the service's name exists.
    Missing,

    /// A container exists but is not running.
    Stopped,

    /// The container is running.
    Running,
}

impl std::fmt::Display for Presence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Missing => write!(f, "missing"),
            Self::Stopped => write!(f, "stopped"),
            Self::Running => write!(f, "running"),
        }
    }
}

/// Engine-reported health of a running container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Health {
    /// The image defines no health check.
    #[default]
    None,

    Starting,
    Healthy,
    Unhealthy,
}

impl Health {
    /// Parse the engine's health status string.
    pub fn parse(s: &str) -> Self {
        match s {
            "starting" => Self::Starting,
            "healthy" => Self::Healthy,
            "unhealthy" => Self::Unhealthy,
            _ => Self::None,
        }
    }
}

impl std::fmt::Display for Health {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => write!(f, "-"),
            Self::Starting => write!(f, "starting"),
            Self::Healthy => write!(f, "healthy"),
            Self::Unhealthy => write!(f, "unhealthy"),
        }
    }
}

/// Resource usage snapshot for one running container.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceUsage {
    /// CPU usage percentage (0-100, can exceed 100 on multi-core).
    pub cpu_percent: f64,

    /// Memory usage as reported by the engine (e.g. "85.2MiB / 7.6GiB").
    pub memory_usage: String,

    /// Memory usage percentage (0-100).
    pub memory_percent: f64,
}

/// Per-service runtime state, rebuilt from the engine on each query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeState {
    pub presence: Presence,
    pub health: Health,

    /// When the container was last started, if it ever was.
    pub started_at: Option<DateTime<Utc>>,

    /// Image the container was created from.
    pub image: Option<String>,

    /// Usage snapshot; only populated when explicitly requested.
    pub usage: Option<ResourceUsage>,
}

impl RuntimeState {
    /// State for a service with no container.
    pub fn missing() -> Self {
        Self { presence: Presence::Missing, health: Health::None, started_at: None, image: None, usage: None }
    }
}
