//! Subcommand implementations.

pub mod start;
pub mod status;
pub mod stop;

use anyhow::{Context, Result};
use colored::Colorize;
use nimbus_core::{ContainerEngine, DockerCli, Outcome, RunReport};
use std::sync::Arc;

/// Connect to the container engine, failing with a pointed message when
/// the daemon is missing or unreachable.
pub(crate) async fn connect() -> Result<Arc<dyn ContainerEngine>> {
    let engine: Arc<dyn ContainerEngine> = Arc::new(DockerCli::new());
    engine
        .ping()
        .await
        .context("container engine unreachable (is the Docker daemon installed and running?)")?;
    Ok(engine)
}

/// Print per-service outcomes and a one-line summary.
pub(crate) fn print_report(action: &str, report: &RunReport) {
    for entry in &report.outcomes {
        let rendered = match &entry.outcome {
            Outcome::Ok => "ok".green().to_string(),
            Outcome::Warning(reason) => format!("{} ({})", "warning".yellow(), reason),
            Outcome::Skipped(reason) => format!("{} ({})", "skipped".dimmed(), reason),
            Outcome::Failed(reason) => format!("{} ({})", "failed".red(), reason),
        };
        println!("{:<16} {}", entry.service, rendered);
    }

    let failures = report.failures().count();
    if failures == 0 {
        println!("\n{} completed", action);
    } else {
        println!("\n{} finished with {} failure(s)", action, failures);
    }
}
