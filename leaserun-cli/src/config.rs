//! Layered settings for the leaserun binary
//!
//! Settings are merged with figment, lowest precedence first:
//! 1. Built-in defaults
//! 2. The TOML file given with `--config`
//! 3. `LEASERUN_*` environment variables (`LEASERUN_SHARED_LOCK`, `LEASERUN_LEASE`, ...)
//! 4. Flags given on the command line

use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use leaserun_election::ElectionConfig;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::cli::Cli;
use crate::error::{CliError, Result};

/// Prefix of environment variables read as settings
pub const ENV_PREFIX: &str = "LEASERUN_";

pub const DEFAULT_NAMESPACE: &str = "default";
pub const DEFAULT_LEASE_SECONDS: f64 = 10.0;
pub const DEFAULT_RETRY_SECONDS: f64 = 2.0;

/// Fully merged settings for one leaserun process
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Name of the shared lock. Required.
    pub shared_lock: Option<String>,
    pub namespace: String,
    pub identity: String,
    pub lock_dir: PathBuf,

    /// Hook command templates
    pub elect: Option<String>,
    pub start: Option<String>,
    pub stop: Option<String>,

    /// Lease duration in seconds
    pub lease: f64,
    /// Retry period in seconds
    pub retry: f64,
    /// Renew deadline in seconds; derived from the lease when unset
    pub renew_deadline: Option<f64>,

    pub pid_file: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            shared_lock: None,
            namespace: DEFAULT_NAMESPACE.to_string(),
            identity: std::env::var("HOSTNAME").unwrap_or_default(),
            lock_dir: std::env::temp_dir(),
            elect: None,
            start: None,
            stop: None,
            lease: DEFAULT_LEASE_SECONDS,
            retry: DEFAULT_RETRY_SECONDS,
            renew_deadline: None,
            pid_file: None,
        }
    }
}

impl Settings {
    /// Merge every settings source for this invocation
    pub fn load(cli: &Cli) -> Result<Self> {
        let settings: Settings = Self::figment(cli)?.extract()?;
        debug!("Loaded settings: {:?}", settings);
        Ok(settings)
    }

    fn figment(cli: &Cli) -> Result<Figment> {
        let mut figment = Figment::new().merge(Serialized::defaults(Settings::default()));

        if let Some(path) = &cli.config {
            if !path.is_file() {
                return Err(CliError::ConfigNotFound(path.clone()));
            }
            debug!("Loading settings file: {}", path.display());
            figment = figment.merge(Toml::file(path));
        }

        Ok(figment
            .merge(Env::prefixed(ENV_PREFIX))
            .merge(Serialized::defaults(cli)))
    }

    /// Name of the shared lock
    pub fn lock_name(&self) -> Result<&str> {
        self.shared_lock
            .as_deref()
            .filter(|name| !name.trim().is_empty())
            .ok_or_else(|| CliError::invalid_setting("shared_lock", "a lock name is required"))
    }

    pub fn lease_duration(&self) -> Result<Duration> {
        seconds("lease", self.lease)
    }

    pub fn retry_period(&self) -> Result<Duration> {
        seconds("retry", self.retry)
    }

    /// Renew deadline to use: the configured one, or two thirds of the lease
    /// but never less than the retry period.
    pub fn renew_deadline(&self) -> Result<Duration> {
        match self.renew_deadline {
            Some(value) => seconds("renew_deadline", value),
            None => Ok((self.lease_duration()? * 2 / 3).max(self.retry_period()?)),
        }
    }

    /// Engine configuration described by these settings
    pub fn election_config(&self) -> Result<ElectionConfig> {
        if self.identity.trim().is_empty() {
            return Err(CliError::invalid_setting(
                "identity",
                "no identity given and $HOSTNAME is not set",
            ));
        }

        let config = ElectionConfig::new(self.identity.clone())
            .with_lease_duration(self.lease_duration()?)
            .with_renew_deadline(self.renew_deadline()?)
            .with_retry_period(self.retry_period()?);
        config.validate()?;
        Ok(config)
    }

    pub fn pid_file(&self) -> Option<&Path> {
        self.pid_file.as_deref()
    }
}

/// A setting given in (possibly fractional) seconds
fn seconds(name: &'static str, value: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(value).map_err(|_| {
        CliError::invalid_setting(name, format!("{} is not a number of seconds", value))
    })
}
