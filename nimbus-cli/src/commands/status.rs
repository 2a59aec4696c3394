//! `nimbus status` command

use anyhow::Result;
use chrono::{DateTime, Utc};
use colored::Colorize;
use nimbus_core::status::{ServiceReport, StatusReporter};
use nimbus_core::types::runtime::Presence;
use nimbus_core::ConfigMap;
use std::path::Path;
use tabled::{settings::Style, Table, Tabled};
use tracing::warn;

/// Log lines shown per container with `--logs`.
const LOG_TAIL: u32 = 40;

pub struct StatusArgs {
    pub simple: bool,
    pub logs: bool,
    pub resources: bool,
    pub show_config: bool,
}

#[derive(Tabled)]
struct ServiceRow {
    #[tabled(rename = "SERVICE")]
    service: String,
    #[tabled(rename = "CONTAINER")]
    container: String,
    #[tabled(rename = "STATE")]
    state: String,
    #[tabled(rename = "HEALTH")]
    health: String,
    #[tabled(rename = "UPTIME")]
    uptime: String,
}

#[derive(Tabled)]
struct ResourceRow {
    #[tabled(rename = "SERVICE")]
    service: String,
    #[tabled(rename = "CPU%")]
    cpu: String,
    #[tabled(rename = "MEMORY")]
    memory: String,
    #[tabled(rename = "MEM%")]
    mem_percent: String,
}

/// Report topology status. Safe at any time, including before first start.
/// Returns the process exit code (always zero; status never mutates).
pub async fn run(config_path: &Path, args: StatusArgs) -> Result<i32> {
    let engine = super::connect().await?;

    // Status works without configuration; disabled/enabled classification
    // and the endpoint just degrade.
    let config = match ConfigMap::load(config_path) {
        Ok(config) => config,
        Err(e) => {
            warn!(error = %e, "configuration not available, reporting core services only");
            ConfigMap::default()
        }
    };

    let reporter = StatusReporter::new(engine.clone());
    let snapshot = reporter.snapshot(&config, args.resources).await?;

    if args.simple {
        for service in &snapshot.services {
            println!("{}: {}", service.name, display_state(service));
        }
        return Ok(0);
    }

    let rows: Vec<ServiceRow> = snapshot
        .services
        .iter()
        .map(|service| ServiceRow {
            service: service.name.to_string(),
            container: service.container.clone(),
            state: display_state(service),
            health: service.state.health.to_string(),
            uptime: format_uptime(service.state.started_at),
        })
        .collect();
    let mut table = Table::new(rows);
    table.with(Style::modern());
    println!("{}", table);

    let network_state =
        if snapshot.network_exists { "present".green() } else { "absent".yellow() };
    println!("\nnetwork {}: {}", snapshot.network, network_state);
    for volume in &snapshot.volumes {
        let rendered = if volume.exists {
            match volume.size_bytes {
                Some(bytes) => format!("{} ({})", "present".green(), format_bytes(bytes)),
                None => format!("{}", "present".green()),
            }
        } else {
            format!("{}", "absent".yellow())
        };
        println!("volume {}: {}", volume.name, rendered);
    }

    if args.resources {
        let rows: Vec<ResourceRow> = snapshot
            .services
            .iter()
            .filter_map(|service| {
                service.state.usage.as_ref().map(|usage| ResourceRow {
                    service: service.name.to_string(),
                    cpu: format!("{:.2}", usage.cpu_percent),
                    memory: usage.memory_usage.clone(),
                    mem_percent: format!("{:.2}", usage.memory_percent),
                })
            })
            .collect();
        if rows.is_empty() {
            println!("\nno running containers to sample");
        } else {
            let mut table = Table::new(rows);
            table.with(Style::modern());
            println!("\n{}", table);
        }
    }

    if args.logs {
        for service in &snapshot.services {
            if service.state.presence == Presence::Missing {
                continue;
            }
            println!("\n=== {} ===", service.container);
            match engine.logs(&service.container, LOG_TAIL).await {
                Ok(text) if text.is_empty() => println!("(no output)"),
                Ok(text) => print!("{}", text),
                Err(e) => warn!(service = %service.name, error = %e, "could not fetch logs"),
            }
        }
    }

    if args.show_config {
        match &snapshot.endpoint {
            Some(endpoint) => println!("\nendpoint: {}", endpoint),
            None => println!("\nendpoint: not configured"),
        }
        if !config.is_empty() {
            println!("configuration ({}):", config_path.display());
            for (key, value) in config.iter() {
                println!("  {} = {}", key, redact(key, value));
            }
        }
    }

    Ok(0)
}

/// Distinguish an expected absence (disabled feature) from a missing
/// required service.
fn display_state(service: &ServiceReport) -> String {
    match service.state.presence {
        Presence::Running => "running".green().to_string(),
        Presence::Stopped => "stopped".yellow().to_string(),
        Presence::Missing if service.expected_absence() => "disabled".dimmed().to_string(),
        Presence::Missing => "missing".red().to_string(),
    }
}

fn format_uptime(started_at: Option<DateTime<Utc>>) -> String {
    match started_at {
        None => "-".to_string(),
        Some(started) => {
            let seconds = (Utc::now() - started).num_seconds().max(0);
            format_duration(seconds as u64)
        }
    }
}

fn format_duration(seconds: u64) -> String {
    if seconds >= 86_400 {
        format!("{}d {}h", seconds / 86_400, (seconds % 86_400) / 3_600)
    } else if seconds >= 3_600 {
        format!("{}h {}m", seconds / 3_600, (seconds % 3_600) / 60)
    } else if seconds >= 60 {
        format!("{}m {}s", seconds / 60, seconds % 60)
    } else {
        format!("{}s", seconds)
    }
}

fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", bytes, UNITS[unit])
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}

/// Mask secret-like configuration values.
fn redact(key: &str, value: &str) -> String {
    if key.contains("PASSWORD") || key.contains("SECRET") {
        "********".to_string()
    } else {
        value.to_string()
    }
}
