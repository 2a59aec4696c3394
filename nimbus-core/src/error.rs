//! Error types for nimbus.
//!
//! All errors use `thiserror` for ergonomic error handling and proper error chains.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for nimbus operations.
pub type Result<T> = std::result::Result<T, NimbusError>;

/// Main error type for nimbus.
#[derive(Error, Debug)]
pub enum NimbusError {
    // Environment errors
    #[error("Container engine unavailable: {reason}")]
    EngineUnavailable { reason: String },

    #[error("Engine command `{command}` failed: {detail}")]
    EngineCommand { command: String, detail: String },

    // Service lifecycle errors
    #[error("Failed to start service {service}: {reason}")]
    StartFailed { service: String, reason: String },

    #[error("Failed to stop service {service}: {reason}")]
    StopFailed { service: String, reason: String },

    #[error("Service {service} not ready after {attempts} probe attempts")]
    ReadinessTimeout { service: String, attempts: u32 },

    // Resource provisioning errors
    #[error("Failed to provision {kind} {name}: {reason}")]
    ProvisionFailed { kind: &'static str, name: String, reason: String },

    // Configuration errors
    #[error("Missing configuration key: {key}")]
    MissingConfig { key: String },

    #[error("Invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    // File system errors
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl NimbusError {
    /// Create an EngineCommand error from a command name and any error type.
    pub fn engine(command: impl Into<String>, err: impl std::fmt::Display) -> Self {
        Self::EngineCommand { command: command.into(), detail: err.to_string() }
    }
}
