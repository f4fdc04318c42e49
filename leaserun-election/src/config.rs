//! Timing and identity configuration for an election run

use std::time::Duration;

use crate::error::{ElectionError, Result};

/// Default time a claimed lease stays valid for observers
pub const DEFAULT_LEASE_DURATION: Duration = Duration::from_secs(15);

/// Default time a leader waits for one renewal before giving up
pub const DEFAULT_RENEW_DEADLINE: Duration = Duration::from_secs(10);

/// Default delay between attempts
pub const DEFAULT_RETRY_PERIOD: Duration = Duration::from_secs(2);

/// Multiplier applied to the acquire retry delay after every attempt.
///
/// Kept at 1.0 so the delay stays constant. Growing the delay made recovery
/// after a long outage far slower than the lease itself.
pub const DEFAULT_JITTER_FACTOR: f64 = 1.0;

/// Configuration for a [`LeaderElector`](crate::LeaderElector)
///
/// ```
/// use std::time::Duration;
/// use leaserun_election::ElectionConfig;
///
/// let config = ElectionConfig::new("node-a")
///     .with_lease_duration(Duration::from_secs(10))
///     .with_renew_deadline(Duration::from_secs(6))
///     .with_retry_period(Duration::from_secs(2));
///
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ElectionConfig {
    /// Unique holder string of this participant
    pub identity: String,
    /// How long a claimed lease is valid before it can be contested
    pub lease_duration: Duration,
    /// How long one renewal may take before leadership is given up
    pub renew_deadline: Duration,
    /// Delay between unsuccessful attempts
    pub retry_period: Duration,
    /// Backoff multiplier for the acquire delay
    pub jitter_factor: f64,
}

impl ElectionConfig {
    /// Create a configuration with default timings
    pub fn new(identity: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            lease_duration: DEFAULT_LEASE_DURATION,
            renew_deadline: DEFAULT_RENEW_DEADLINE,
            retry_period: DEFAULT_RETRY_PERIOD,
            jitter_factor: DEFAULT_JITTER_FACTOR,
        }
    }

    /// Set the lease duration
    pub fn with_lease_duration(mut self, lease_duration: Duration) -> Self {
        self.lease_duration = lease_duration;
        self
    }

    /// Set the renew deadline
    pub fn with_renew_deadline(mut self, renew_deadline: Duration) -> Self {
        self.renew_deadline = renew_deadline;
        self
    }

    /// Set the retry period
    pub fn with_retry_period(mut self, retry_period: Duration) -> Self {
        self.retry_period = retry_period;
        self
    }

    /// Set the acquire backoff multiplier
    pub fn with_jitter_factor(mut self, jitter_factor: f64) -> Self {
        self.jitter_factor = jitter_factor;
        self
    }

    /// Check that the configuration can drive an election
    pub fn validate(&self) -> Result<()> {
        if self.identity.is_empty() {
            return Err(ElectionError::Config("identity must not be empty".to_string()));
        }

        for (name, value) in [
            ("lease_duration", self.lease_duration),
            ("renew_deadline", self.renew_deadline),
            ("retry_period", self.retry_period),
        ] {
            if value.is_zero() {
                return Err(ElectionError::Config(format!("{} must be greater than zero", name)));
            }
        }

        if !self.jitter_factor.is_finite() || self.jitter_factor < 1.0 {
            return Err(ElectionError::Config(format!(
                "jitter_factor must be a finite number >= 1.0, got {}",
                self.jitter_factor
            )));
        }

        Ok(())
    }
}
