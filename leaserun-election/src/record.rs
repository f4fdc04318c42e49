//! The persisted election record and its comparison rules

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Ownership record stored in the shared lock resource
///
/// A record is written whole by a single `create` or `update`; readers never
/// observe a partially written record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElectionRecord {
    /// Identity of the current holder. Empty or absent means unheld.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub holder_identity: Option<String>,

    /// Validity window claimed by the holder
    #[serde(default)]
    pub lease_duration_seconds: i64,

    /// When the current holder first acquired the lease
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acquire_time: Option<DateTime<Utc>>,

    /// When the current holder last renewed the lease
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub renew_time: Option<DateTime<Utc>>,

    /// Number of times the lease changed hands
    #[serde(default)]
    pub leader_transitions: u64,
}

impl ElectionRecord {
    /// Build a fresh claim for `identity`, acquired and renewed at `now`.
    pub fn claim(
        identity: impl Into<String>,
        lease_duration: Duration,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            holder_identity: Some(identity.into()),
            lease_duration_seconds: i64::try_from(lease_duration.as_secs()).unwrap_or(i64::MAX),
            acquire_time: Some(now),
            renew_time: Some(now),
            leader_transitions: 0,
        }
    }

    /// The holder identity, if it is present and non-empty
    pub fn holder(&self) -> Option<&str> {
        self.holder_identity.as_deref().filter(|id| !id.is_empty())
    }

    /// Whether the record is held by exactly `identity`
    pub fn is_held_by(&self, identity: &str) -> bool {
        !identity.is_empty() && self.holder() == Some(identity)
    }

    /// A lock resource can exist without carrying a usable record. Only records
    /// with a holder and both timestamps take part in contests.
    pub fn is_valid(&self) -> bool {
        self.holder_identity.is_some() && self.acquire_time.is_some() && self.renew_time.is_some()
    }
}

/// Whether `current` differs from the last `observed` record.
///
/// Only the holder and the two timestamps are compared. `leader_transitions`
/// and `lease_duration_seconds` are metadata and never count as a change.
pub fn is_modified(observed: Option<&ElectionRecord>, current: &ElectionRecord) -> bool {
    match observed {
        None => true,
        Some(observed) => {
            observed.acquire_time != current.acquire_time
                || observed.renew_time != current.renew_time
                || observed.holder_identity != current.holder_identity
        }
    }
}
