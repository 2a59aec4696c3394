//! Readiness probing.
//!
//! Each probe is an explicit state machine: `Pending → Polling → Ready` or
//! `Pending → Polling → TimedOut` once the retry budget is spent. Sleeping
//! goes through an injectable [`Sleeper`] so tests can simulate time.

use crate::catalog::{AGGREGATE_WAIT_INTERVAL, AGGREGATE_WAIT_TIMEOUT};
use crate::engine::ContainerEngine;
use crate::error::Result;
use crate::planner::Topology;
use crate::types::service::{ReadinessProbe, ServiceSpec};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Probe progression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeState {
    Pending,
    Polling,
    Ready,
    TimedOut,
}

impl std::fmt::Display for ProbeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Polling => write!(f, "polling"),
            Self::Ready => write!(f, "ready"),
            Self::TimedOut => write!(f, "timed-out"),
        }
    }
}

/// Clock seam for the polling loops.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Real sleeper backed by the tokio timer.
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Polls service readiness against the engine.
pub struct HealthMonitor {
    engine: Arc<dyn ContainerEngine>,
    sleeper: Arc<dyn Sleeper>,
}

impl HealthMonitor {
    pub fn new(engine: Arc<dyn ContainerEngine>) -> Self {
        Self::with_sleeper(engine, Arc::new(TokioSleeper))
    }

    pub fn with_sleeper(engine: Arc<dyn ContainerEngine>, sleeper: Arc<dyn Sleeper>) -> Self {
        Self { engine, sleeper }
    }

    /// Wait until the service reports ready or its retry budget is spent.
    ///
    /// Returns the terminal state; deciding whether `TimedOut` is fatal is
    /// the caller's business (it depends on whether the service is
    /// required).
    pub async fn await_ready(&self, spec: &ServiceSpec) -> Result<ProbeState> {
        let Some((retries, interval)) = spec.probe.budget() else {
            return Ok(ProbeState::Ready);
        };

        let mut attempts = 0u32;
        let mut state = ProbeState::Pending;
        loop {
            state = match state {
                ProbeState::Pending => ProbeState::Polling,
                ProbeState::Polling => {
                    if self.check(spec).await? {
                        ProbeState::Ready
                    } else {
                        attempts += 1;
                        if attempts >= retries {
                            ProbeState::TimedOut
                        } else {
                            debug!(service = %spec.name, attempt = attempts, "not ready yet");
                            self.sleeper.sleep(interval).await;
                            ProbeState::Polling
                        }
                    }
                }
                ProbeState::Ready | ProbeState::TimedOut => break,
            };
        }
        Ok(state)
    }

    /// One probe attempt.
    async fn check(&self, spec: &ServiceSpec) -> Result<bool> {
        let container = spec.container_name();
        match spec.probe {
            ReadinessProbe::None => Ok(true),
            ReadinessProbe::Running { .. } => {
                let details = self.engine.inspect(&container).await?;
                Ok(details.map(|d| d.running).unwrap_or(false))
            }
            ReadinessProbe::Exec { command, .. } => {
                match self.engine.exec(&container, command).await {
                    Ok(code) => Ok(code == 0),
                    // The container may not accept exec yet; count as not
                    // ready rather than aborting the poll.
                    Err(e) => {
                        debug!(service = %spec.name, error = %e, "probe exec failed");
                        Ok(false)
                    }
                }
            }
        }
    }

    /// Aggregate wait across the whole topology.
    ///
    /// Polls every in-scope service until all are simultaneously ready or
    /// the global timeout lapses. A lapse is advisory (the system may still
    /// be converging), so the result is a bool, not an error.
    pub async fn await_topology(&self, topology: &Topology) -> Result<bool> {
        self.await_topology_within(topology, AGGREGATE_WAIT_TIMEOUT, AGGREGATE_WAIT_INTERVAL)
            .await
    }

    pub async fn await_topology_within(
        &self,
        topology: &Topology,
        timeout: Duration,
        interval: Duration,
    ) -> Result<bool> {
        let rounds = (timeout.as_millis() / interval.as_millis().max(1)).max(1) as u32;
        for round in 0..rounds {
            let mut all_ready = true;
            for spec in topology.start_order() {
                if !self.check(spec).await? {
                    all_ready = false;
                    break;
                }
            }
            if all_ready {
                return Ok(true);
            }
            if round + 1 < rounds {
                self.sleeper.sleep(interval).await;
            }
        }
        warn!("topology not fully ready within the aggregate wait");
        Ok(false)
    }
}
