use anyhow::Result;
use clap::{Parser, Subcommand};
use nimbus_core::ConfigMap;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "nimbus")]
#[command(about = "Lifecycle orchestrator for the nimbus suite", version)]
struct Cli {
    /// Path to the configuration file (also NIMBUS_CONFIG)
    #[arg(short = 'c', long = "config-file", global = true)]
    config_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Provision shared infrastructure and start all in-scope services
    Start,

    /// Stop services in reverse dependency order
    Stop {
        /// Remove containers after stopping them
        #[arg(long)]
        remove: bool,

        /// Remove containers and the shared network (volumes are kept)
        #[arg(long)]
        cleanup: bool,

        /// Stop all running services concurrently with a short grace period
        #[arg(long)]
        force: bool,
    },

    /// Report state, health, and resources across the whole topology
    Status {
        /// One line per service
        #[arg(long)]
        simple: bool,

        /// Include recent log lines per present container
        #[arg(long)]
        logs: bool,

        /// Include a resource usage table
        #[arg(long)]
        resources: bool,

        /// Show the configured endpoint and a redacted configuration summary
        #[arg(long)]
        config: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let config_path = ConfigMap::resolve_path(cli.config_file);

    let exit_code = match cli.command {
        Commands::Start => commands::start::run(&config_path).await?,
        Commands::Stop { remove, cleanup, force } => {
            commands::stop::run(&config_path, remove, cleanup, force).await?
        }
        Commands::Status { simple, logs, resources, config } => {
            let args = commands::status::StatusArgs {
                simple,
                logs,
                resources,
                show_config: config,
            };
            commands::status::run(&config_path, args).await?
        }
    };

    if exit_code != 0 {
        std::process::exit(exit_code);
    }
    Ok(())
}
