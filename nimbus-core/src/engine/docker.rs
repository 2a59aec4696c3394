//! Docker CLI engine.
//!
//! Drives a local Docker daemon through the `docker` binary. Each trait
//! method is one CLI invocation; output parsing is limited to the JSON
//! formats `docker inspect` and `docker stats` emit.

use super::{ContainerDetails, ContainerEngine, RunRequest};
use crate::error::{NimbusError, Result};
use crate::types::runtime::{Health, ResourceUsage};
use async_trait::async_trait;
use chrono::{DateTime, Datelike, Utc};
use serde::Deserialize;
use std::process::Output;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, trace};

/// Engine implementation shelling out to the Docker CLI.
pub struct DockerCli {
    binary: String,
}

impl DockerCli {
    pub fn new() -> Self {
        Self { binary: "docker".to_string() }
    }

    /// Use a different binary (e.g. podman's docker shim).
    pub fn with_binary(binary: impl Into<String>) -> Self {
        Self { binary: binary.into() }
    }

    /// Run the engine binary with `args`, returning the raw output.
    /// A non-zero exit is not an error at this level; callers decide.
    async fn output<S: AsRef<str>>(&self, args: &[S]) -> Result<Output> {
        let args: Vec<&str> = args.iter().map(|a| a.as_ref()).collect();
        trace!(engine = %self.binary, ?args, "engine call");
        Command::new(&self.binary)
            .args(&args)
            .output()
            .await
            .map_err(|e| NimbusError::EngineUnavailable {
                reason: format!("failed to execute `{}`: {}", self.binary, e),
            })
    }

    /// Run the engine binary and require a zero exit, returning stdout.
    async fn checked<S: AsRef<str>>(&self, args: &[S]) -> Result<String> {
        let output = self.output(args).await?;
        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).into_owned())
        } else {
            let command = args
                .iter()
                .map(|a| a.as_ref())
                .take(2)
                .collect::<Vec<&str>>()
                .join(" ");
            Err(NimbusError::EngineCommand {
                command: format!("{} {}", self.binary, command),
                detail: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }

    /// Existence check via `inspect`: exit zero means the object exists.
    async fn object_exists(&self, kind: &str, name: &str) -> Result<bool> {
        let output = self.output(&[kind, "inspect", name]).await?;
        Ok(output.status.success())
    }
}

impl Default for DockerCli {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ContainerEngine for DockerCli {
    async fn ping(&self) -> Result<()> {
        let output = self.output(&["version", "--format", "{{.Server.Version}}"]).await?;
        if output.status.success() {
            let version = String::from_utf8_lossy(&output.stdout).trim().to_string();
            debug!(engine = %self.binary, %version, "engine reachable");
            Ok(())
        } else {
            Err(NimbusError::EngineUnavailable {
                reason: format!(
                    "`{} version` failed: {}",
                    self.binary,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            })
        }
    }

    async fn network_exists(&self, name: &str) -> Result<bool> {
        self.object_exists("network", name).await
    }

    async fn create_network(&self, name: &str) -> Result<()> {
        self.checked(&["network", "create", name]).await.map(|_| ())
    }

    async fn remove_network(&self, name: &str) -> Result<()> {
        self.checked(&["network", "rm", name]).await.map(|_| ())
    }

    async fn volume_exists(&self, name: &str) -> Result<bool> {
        self.object_exists("volume", name).await
    }

    async fn create_volume(&self, name: &str) -> Result<()> {
        self.checked(&["volume", "create", name]).await.map(|_| ())
    }

    async fn volume_size(&self, name: &str) -> Result<Option<u64>> {
        // Sizes only surface through `system df`; tolerate format drift.
        let output = self.output(&["system", "df", "-v", "--format", "{{json .}}"]).await?;
        if !output.status.success() {
            return Ok(None);
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        for line in stdout.lines() {
            let Ok(df) = serde_json::from_str::<DfPayload>(line) else { continue };
            for volume in df.volumes {
                if volume.name == name {
                    return Ok(parse_size(&volume.size));
                }
            }
        }
        Ok(None)
    }

    async fn list_containers(&self, name: &str, all: bool) -> Result<Vec<String>> {
        let filter = format!("name=^{}$", name);
        let mut args = vec!["ps", "--filter", filter.as_str(), "--format", "{{.Names}}"];
        if all {
            args.insert(1, "-a");
        }
        let stdout = self.checked(&args).await?;
        Ok(stdout.lines().map(str::to_string).filter(|l| !l.is_empty()).collect())
    }

    async fn run(&self, request: &RunRequest) -> Result<()> {
        let args = run_args(request);
        self.checked(&args).await.map(|_| ())
    }

    async fn exec(&self, container: &str, command: &[&str]) -> Result<i32> {
        let mut args = vec!["exec", container];
        args.extend_from_slice(command);
        let output = self.output(&args).await?;
        Ok(output.status.code().unwrap_or(-1))
    }

    async fn inspect(&self, container: &str) -> Result<Option<ContainerDetails>> {
        let output = self.output(&["inspect", "--format", "{{json .}}", container]).await?;
        if !output.status.success() {
            return Ok(None);
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        let line = stdout.lines().next().unwrap_or_default();
        let payload: InspectPayload = serde_json::from_str(line)
            .map_err(|e| NimbusError::engine(format!("{} inspect", self.binary), e))?;
        Ok(Some(payload.into_details()))
    }

    async fn stop(&self, container: &str, timeout: Duration) -> Result<()> {
        let secs = timeout.as_secs().to_string();
        self.checked(&["stop", "-t", secs.as_str(), container]).await.map(|_| ())
    }

    async fn kill(&self, container: &str) -> Result<()> {
        self.checked(&["kill", container]).await.map(|_| ())
    }

    async fn remove(&self, container: &str) -> Result<()> {
        self.checked(&["rm", container]).await.map(|_| ())
    }

    async fn stats(&self, container: &str) -> Result<Option<ResourceUsage>> {
        let output = self
            .output(&["stats", "--no-stream", "--format", "{{json .}}", container])
            .await?;
        if !output.status.success() {
            return Ok(None);
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        let line = stdout.lines().next().unwrap_or_default();
        let Ok(stats) = serde_json::from_str::<StatsPayload>(line) else {
            return Ok(None);
        };
        Ok(Some(ResourceUsage {
            cpu_percent: parse_percent(&stats.cpu_perc),
            memory_usage: stats.mem_usage,
            memory_percent: parse_percent(&stats.mem_perc),
        }))
    }

    async fn logs(&self, container: &str, tail: u32) -> Result<String> {
        let tail = tail.to_string();
        let output = self.output(&["logs", "--tail", tail.as_str(), container]).await?;
        // The engine writes container output to both streams.
        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        text.push_str(&String::from_utf8_lossy(&output.stderr));
        Ok(text)
    }

    fn name(&self) -> &str {
        &self.binary
    }
}

/// Build the full `docker run` argument list for a request.
pub fn run_args(request: &RunRequest) -> Vec<String> {
    let mut args: Vec<String> = vec![
        "run".into(),
        "-d".into(),
        "--name".into(),
        request.name.clone(),
        "--network".into(),
        request.network.clone(),
    ];
    if !request.restart_policy.is_empty() {
        args.push("--restart".into());
        args.push(request.restart_policy.clone());
    }
    if let Some(user) = &request.user {
        args.push("--user".into());
        args.push(user.clone());
    }
    if request.read_only {
        args.push("--read-only".into());
    }
    for path in &request.tmpfs {
        args.push("--tmpfs".into());
        args.push(path.clone());
    }
    for cap in &request.cap_drop {
        args.push("--cap-drop".into());
        args.push(cap.clone());
    }
    for cap in &request.cap_add {
        args.push("--cap-add".into());
        args.push(cap.clone());
    }
    for port in &request.ports {
        args.push("-p".into());
        let mapping = match &port.host_ip {
            Some(ip) => {
                format!("{}:{}:{}/{}", ip, port.host_port, port.container_port, port.protocol)
            }
            None => format!("{}:{}/{}", port.host_port, port.container_port, port.protocol),
        };
        args.push(mapping);
    }
    for (key, value) in &request.env {
        args.push("-e".into());
        args.push(format!("{}={}", key, value));
    }
    for mount in &request.mounts {
        args.push("-v".into());
        if mount.read_only {
            args.push(format!("{}:{}:ro", mount.source, mount.target));
        } else {
            args.push(format!("{}:{}", mount.source, mount.target));
        }
    }
    args.push(request.image.clone());
    args.extend(request.command.iter().cloned());
    args
}

#[derive(Deserialize)]
struct InspectPayload {
    #[serde(rename = "State", default)]
    state: InspectState,
    #[serde(rename = "Config", default)]
    config: InspectConfig,
}

#[derive(Deserialize, Default)]
struct InspectState {
    #[serde(rename = "Running", default)]
    running: bool,
    #[serde(rename = "StartedAt", default)]
    started_at: String,
    #[serde(rename = "Health")]
    health: Option<InspectHealth>,
}

#[derive(Deserialize)]
struct InspectHealth {
    #[serde(rename = "Status", default)]
    status: String,
}

#[derive(Deserialize, Default)]
struct InspectConfig {
    #[serde(rename = "Image", default)]
    image: String,
}

impl InspectPayload {
    fn into_details(self) -> ContainerDetails {
        let health =
            self.state.health.map(|h| Health::parse(&h.status)).unwrap_or_default();
        ContainerDetails {
            running: self.state.running,
            health,
            started_at: parse_started_at(&self.state.started_at),
            image: self.config.image,
        }
    }
}

#[derive(Deserialize)]
struct StatsPayload {
    #[serde(rename = "CPUPerc", default)]
    cpu_perc: String,
    #[serde(rename = "MemUsage", default)]
    mem_usage: String,
    #[serde(rename = "MemPerc", default)]
    mem_perc: String,
}

#[derive(Deserialize)]
struct DfPayload {
    #[serde(rename = "Volumes", default)]
    volumes: Vec<DfVolume>,
}

#[derive(Deserialize)]
struct DfVolume {
    #[serde(rename = "Name", default)]
    name: String,
    #[serde(rename = "Size", default)]
    size: String,
}

/// Parse the zero value the engine reports for never-started containers
/// ("0001-01-01T00:00:00Z") as absent.
fn parse_started_at(value: &str) -> Option<DateTime<Utc>> {
    let parsed = DateTime::parse_from_rfc3339(value).ok()?.with_timezone(&Utc);
    if parsed.year() <= 1 {
        None
    } else {
        Some(parsed)
    }
}

/// Parse a percentage string like "0.07%".
fn parse_percent(value: &str) -> f64 {
    value.trim().trim_end_matches('%').parse().unwrap_or(0.0)
}

/// Parse a humanized size like "85.3MB" into bytes.
fn parse_size(value: &str) -> Option<u64> {
    let value = value.trim();
    let split = value.find(|c: char| c.is_ascii_alphabetic())?;
    let number: f64 = value[..split].parse().ok()?;
    let factor: f64 = match value[split..].to_ascii_uppercase().as_str() {
        "B" => 1.0,
        "KB" | "KIB" => 1024.0,
        "MB" | "MIB" => 1024.0 * 1024.0,
        "GB" | "GIB" => 1024.0 * 1024.0 * 1024.0,
        "TB" | "TIB" => 1024.0_f64.powi(4),
        _ => return None,
    };
    Some((number * factor) as u64)
}
