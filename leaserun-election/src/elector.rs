//! The lease election engine
//!
//! A [`LeaderElector`] races other participants for the lock record, then keeps
//! renewing its lease until a renewal misses the deadline, the lease is lost to
//! another holder, or the run is cancelled.
//!
//! Every attempt runs as its own task and carries the epoch that was current
//! when it started. An attempt that outlives its timer is abandoned: the epoch
//! is bumped and its cancellation token fired. An abandoned attempt may still
//! complete a write that was already in flight, but it never changes the
//! engine's observed state, which is only written while the epoch matches.

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use chrono::Utc;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::ElectionConfig;
use crate::error::{ElectionError, LockError, Result};
use crate::events::{ElectionHandler, NoopHandler};
use crate::lock::ResourceLock;
use crate::record::{is_modified, ElectionRecord};

#[derive(Debug, Default)]
struct EngineState {
    observed_record: Option<ElectionRecord>,
    /// Local time at which `observed_record` last changed
    observed_time: Option<Instant>,
    reported_leader: Option<String>,
    epoch: u64,
}

impl EngineState {
    fn is_leader(&self, identity: &str) -> bool {
        self.observed_record
            .as_ref()
            .is_some_and(|record| record.is_held_by(identity))
    }

    fn observe(&mut self, record: ElectionRecord) {
        self.observed_record = Some(record);
        self.observed_time = Some(Instant::now());
    }

    fn lease_expired(&self, lease_duration: Duration, now: Instant) -> bool {
        match self.observed_time {
            Some(observed) => observed
                .checked_add(lease_duration)
                .is_some_and(|expiry| expiry <= now),
            None => true,
        }
    }
}

/// Lease-based leader election engine
///
/// Clones share the same engine state, so a clone can be handed to another
/// task to poll [`is_leader`](Self::is_leader) while [`run`](Self::run) is in
/// progress.
#[derive(Clone)]
pub struct LeaderElector {
    config: Arc<ElectionConfig>,
    lock: Arc<dyn ResourceLock>,
    handler: Arc<dyn ElectionHandler>,
    state: Arc<RwLock<EngineState>>,
}

impl LeaderElector {
    /// Create an engine racing on `lock`
    pub fn new(config: ElectionConfig, lock: Arc<dyn ResourceLock>) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            config: Arc::new(config),
            lock,
            handler: Arc::new(NoopHandler),
            state: Arc::new(RwLock::new(EngineState::default())),
        })
    }

    /// Deliver leadership notifications to `handler`
    pub fn with_handler(mut self, handler: Arc<dyn ElectionHandler>) -> Self {
        self.handler = handler;
        self
    }

    pub fn config(&self) -> &ElectionConfig {
        &self.config
    }

    /// Whether the last observed record names this participant as holder.
    ///
    /// Answered from local state only; the store is never contacted.
    pub fn is_leader(&self) -> bool {
        self.read_state().is_leader(&self.config.identity)
    }

    /// Holder identity of the last observed record
    pub fn current_leader(&self) -> Option<String> {
        self.read_state()
            .observed_record
            .as_ref()
            .and_then(|record| record.holder_identity.clone())
    }

    /// The last record this engine observed or wrote
    pub fn observed_record(&self) -> Option<ElectionRecord> {
        self.read_state().observed_record.clone()
    }

    /// Acquire leadership, then lead until the lease can no longer be kept.
    ///
    /// Returns `Ok(())` once leadership is given up, and
    /// `Err(ElectionError::Cancelled)` when `cancel` fires. "Stopped leading" is
    /// delivered before returning whenever "started leading" was delivered.
    #[tracing::instrument(
        skip_all,
        fields(identity = %self.config.identity, lock = %self.lock.describe())
    )]
    pub async fn run(&self, cancel: &CancellationToken) -> Result<()> {
        self.acquire(cancel).await?;

        let handler = Arc::clone(&self.handler);
        let _stopped = scopeguard::guard((), move |_| {
            info!("Stopped leading");
            handler.on_stopped_leading();
        });

        info!("Started leading");
        self.handler.on_started_leading();

        self.renew(cancel).await
    }

    /// Make one attempt to acquire or renew the lease.
    ///
    /// Returns true if this engine holds the lease afterwards.
    pub async fn try_acquire_or_renew(&self, cancel: &CancellationToken) -> bool {
        let epoch = self.epoch();
        self.attempt(epoch, cancel).await
    }

    /// Fire "new leader" if the observed holder changed since the last report
    pub fn maybe_report_transition(&self) {
        let leader = {
            let mut state = self.write_state();
            let Some(holder) = state
                .observed_record
                .as_ref()
                .map(|record| record.holder_identity.clone().unwrap_or_default())
            else {
                return;
            };
            if state.reported_leader.as_deref() == Some(holder.as_str()) {
                return;
            }
            state.reported_leader = Some(holder.clone());
            holder
        };

        info!("New leader elected: {}", leader);
        self.handler.on_new_leader(&leader);
    }

    async fn acquire(&self, cancel: &CancellationToken) -> Result<()> {
        let mut delay = self.config.retry_period;

        loop {
            if cancel.is_cancelled() {
                return Err(ElectionError::Cancelled);
            }

            let epoch = self.epoch();
            let attempt_cancel = cancel.child_token();
            let attempt = tokio::spawn({
                let elector = self.clone();
                let attempt_cancel = attempt_cancel.clone();
                async move { elector.attempt(epoch, &attempt_cancel).await }
            });

            let acquired = tokio::select! {
                _ = cancel.cancelled() => {
                    self.abandon(&attempt_cancel);
                    return Err(ElectionError::Cancelled);
                }
                joined = attempt => joined.unwrap_or_else(|e| {
                    warn!("Acquire attempt failed: {}", e);
                    false
                }),
                _ = sleep(delay) => {
                    debug!("Acquire attempt still pending after {:?}, starting another", delay);
                    self.abandon(&attempt_cancel);
                    self.maybe_report_transition();
                    delay = next_delay(delay, self.config.jitter_factor);
                    continue;
                }
            };

            self.maybe_report_transition();
            if acquired {
                return Ok(());
            }

            tokio::select! {
                _ = cancel.cancelled() => return Err(ElectionError::Cancelled),
                _ = sleep(delay) => {}
            }
            delay = next_delay(delay, self.config.jitter_factor);
        }
    }

    async fn renew(&self, cancel: &CancellationToken) -> Result<()> {
        let deadline = self.config.renew_deadline;

        loop {
            if cancel.is_cancelled() {
                return Err(ElectionError::Cancelled);
            }

            let epoch = self.epoch();
            let attempt_cancel = cancel.child_token();
            let attempt = tokio::spawn(self.clone().renew_attempt(epoch, attempt_cancel.clone()));

            tokio::select! {
                _ = cancel.cancelled() => {
                    self.abandon(&attempt_cancel);
                    return Err(ElectionError::Cancelled);
                }
                joined = attempt => match joined {
                    Ok(true) => {}
                    Ok(false) if cancel.is_cancelled() => return Err(ElectionError::Cancelled),
                    Ok(false) => {
                        info!("Lease is held by {:?}, giving up leadership", self.current_leader());
                        return Ok(());
                    }
                    Err(e) => {
                        warn!("Renew attempt failed: {}", e);
                        return Ok(());
                    }
                },
                _ = sleep(deadline) => {
                    // The attempt keeps running detached; its results are discarded
                    self.abandon(&attempt_cancel);
                    warn!("Failed to renew lease within {:?}", deadline);
                    return Ok(());
                }
            }

            tokio::select! {
                _ = cancel.cancelled() => return Err(ElectionError::Cancelled),
                _ = sleep(self.config.retry_period) => {}
            }
        }
    }

    /// Renew, retrying transient failures until success, loss of the lease to
    /// another holder, or abandonment.
    async fn renew_attempt(self, epoch: u64, cancel: CancellationToken) -> bool {
        loop {
            if cancel.is_cancelled() || !self.is_current(epoch) {
                return false;
            }

            let renewed = self.attempt(epoch, &cancel).await;
            if !self.is_current(epoch) {
                return false;
            }
            self.maybe_report_transition();

            if renewed {
                return true;
            }
            if !self.is_leader() {
                return false;
            }

            debug!("Lease renewal failed, retrying in {:?}", self.config.retry_period);
            tokio::select! {
                _ = cancel.cancelled() => return false,
                _ = sleep(self.config.retry_period) => {}
            }
        }
    }

    async fn attempt(&self, epoch: u64, cancel: &CancellationToken) -> bool {
        let identity = self.config.identity.as_str();
        let mut candidate = ElectionRecord::claim(identity, self.config.lease_duration, Utc::now());

        // 1. Obtain the record, or create it if there is none
        let existing = match self.lock.get(cancel).await {
            Ok(record) if record.is_valid() => record,
            Ok(_) | Err(LockError::NotFound) => {
                if !self.lock.create(&candidate, cancel).await {
                    debug!("Could not create election record on {}", self.lock.describe());
                    return false;
                }
                return self.apply(epoch, candidate);
            }
            Err(LockError::Cancelled) => return false,
            Err(e) => {
                warn!("Failed to read election record {}: {}", self.lock.describe(), e);
                return false;
            }
        };

        // 2. Record obtained; check the holder and how long ago it changed
        let leading = {
            let mut state = self.write_state();
            if state.epoch != epoch {
                return false;
            }
            if is_modified(state.observed_record.as_ref(), &existing) {
                state.observe(existing.clone());
            }

            let leading = state.is_leader(identity);
            if let Some(holder) = existing.holder() {
                if !leading && !state.lease_expired(self.config.lease_duration, Instant::now()) {
                    debug!("Lock is held by {} and has not yet expired", holder);
                    return false;
                }
            }
            leading
        };

        // 3. Claim or renew
        if leading {
            candidate.acquire_time = existing.acquire_time;
            candidate.leader_transitions = existing.leader_transitions;
        } else {
            candidate.leader_transitions = existing.leader_transitions.saturating_add(1);
        }

        if !self.lock.update(&candidate, cancel).await {
            debug!("Could not update election record on {}", self.lock.describe());
            return false;
        }
        self.apply(epoch, candidate)
    }

    /// Adopt a record this engine just wrote, unless the attempt was abandoned
    fn apply(&self, epoch: u64, record: ElectionRecord) -> bool {
        let mut state = self.write_state();
        if state.epoch != epoch {
            debug!("Discarding result of abandoned attempt");
            return false;
        }
        state.observe(record);
        true
    }

    fn abandon(&self, attempt_cancel: &CancellationToken) {
        self.write_state().epoch += 1;
        attempt_cancel.cancel();
    }

    fn epoch(&self) -> u64 {
        self.read_state().epoch
    }

    fn is_current(&self, epoch: u64) -> bool {
        self.epoch() == epoch
    }

    fn read_state(&self) -> RwLockReadGuard<'_, EngineState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, EngineState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for LeaderElector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LeaderElector")
            .field("config", &self.config)
            .field("lock", &self.lock.describe())
            .field("state", &*self.read_state())
            .finish()
    }
}

fn next_delay(delay: Duration, jitter_factor: f64) -> Duration {
    Duration::try_from_secs_f64(delay.as_secs_f64() * jitter_factor).unwrap_or(delay)
}
