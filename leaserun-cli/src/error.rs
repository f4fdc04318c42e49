//! Error types for the leaserun binary

use std::io;
use std::path::PathBuf;
use std::process::ExitStatus;

use leaserun_election::ElectionError;

/// Errors raised while configuring or supervising an election
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Settings could not be merged or extracted
    #[error("Configuration error: {0}")]
    Config(#[from] figment::Error),

    /// An explicitly requested settings file does not exist
    #[error("Config file not found: {}", .0.display())]
    ConfigNotFound(PathBuf),

    /// A setting is missing or unusable
    #[error("Invalid setting '{name}': {message}")]
    InvalidSetting { name: &'static str, message: String },

    /// A hook command template could not be parsed or rendered
    #[error("Failed to render command '{template}': {message}")]
    Template { template: String, message: String },

    /// A hook command could not be started
    #[error("Failed to run '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },

    /// A hook command exited unsuccessfully
    #[error("Command exited with {status}: {command}")]
    CommandFailed { command: String, status: ExitStatus },

    /// The pid file is missing or does not hold a pid
    #[error("Cannot read pid from {}: {message}", path.display())]
    PidFile { path: PathBuf, message: String },

    #[error(transparent)]
    Election(#[from] ElectionError),
}

impl CliError {
    pub fn invalid_setting(name: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidSetting {
            name,
            message: message.into(),
        }
    }
}

/// Result type for the leaserun binary
pub type Result<T> = std::result::Result<T, CliError>;
