//! In-process lock backend
//!
//! Every [`MemoryLock`] handed out by one [`MemoryStore`] races on the same
//! slots, with a version counter standing in for a server-side resource
//! version.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::ResourceLock;
use crate::error::LockError;
use crate::record::ElectionRecord;

#[derive(Debug, Default)]
struct Slot {
    record: Option<ElectionRecord>,
    version: u64,
}

/// Shared in-memory store of election records, keyed by `namespace/name`
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    slots: Arc<Mutex<HashMap<String, Slot>>>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Hand out a lock handle for `namespace/name`
    pub fn lock(&self, namespace: &str, name: &str) -> MemoryLock {
        MemoryLock {
            store: self.clone(),
            key: slot_key(namespace, name),
            seen_version: Mutex::new(None),
        }
    }

    /// Current record of `namespace/name`, if any
    pub fn record(&self, namespace: &str, name: &str) -> Option<ElectionRecord> {
        self.slots()
            .get(&slot_key(namespace, name))
            .and_then(|slot| slot.record.clone())
    }

    /// Number of successful writes to `namespace/name`
    pub fn version(&self, namespace: &str, name: &str) -> u64 {
        self.slots()
            .get(&slot_key(namespace, name))
            .map_or(0, |slot| slot.version)
    }

    /// Overwrite `namespace/name` unconditionally, as an outside writer would
    pub fn put(&self, namespace: &str, name: &str, record: ElectionRecord) {
        let mut slots = self.slots();
        let slot = slots.entry(slot_key(namespace, name)).or_default();
        slot.record = Some(record);
        slot.version += 1;
    }

    fn slots(&self) -> MutexGuard<'_, HashMap<String, Slot>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn slot_key(namespace: &str, name: &str) -> String {
    format!("{}/{}", namespace, name)
}

/// One participant's handle on a [`MemoryStore`] slot
#[derive(Debug)]
pub struct MemoryLock {
    store: MemoryStore,
    key: String,
    seen_version: Mutex<Option<u64>>,
}

impl MemoryLock {
    fn remember(&self, version: u64) {
        *self.seen_version.lock().unwrap_or_else(PoisonError::into_inner) = Some(version);
    }

    fn seen(&self) -> Option<u64> {
        *self.seen_version.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl ResourceLock for MemoryLock {
    fn describe(&self) -> String {
        self.key.clone()
    }

    async fn get(&self, cancel: &CancellationToken) -> Result<ElectionRecord, LockError> {
        if cancel.is_cancelled() {
            return Err(LockError::Cancelled);
        }

        let slots = self.store.slots();
        let slot = slots.get(&self.key).ok_or(LockError::NotFound)?;
        let record = slot.record.clone().ok_or(LockError::NotFound)?;
        self.remember(slot.version);
        Ok(record)
    }

    async fn create(&self, record: &ElectionRecord, cancel: &CancellationToken) -> bool {
        if cancel.is_cancelled() {
            return false;
        }

        let mut slots = self.store.slots();
        let slot = slots.entry(self.key.clone()).or_default();
        if slot.record.as_ref().is_some_and(ElectionRecord::is_valid) {
            tracing::debug!("Create of {} lost the race", self.key);
            return false;
        }

        slot.record = Some(record.clone());
        slot.version += 1;
        self.remember(slot.version);
        true
    }

    async fn update(&self, record: &ElectionRecord, cancel: &CancellationToken) -> bool {
        if cancel.is_cancelled() {
            return false;
        }

        let mut slots = self.store.slots();
        let Some(slot) = slots.get_mut(&self.key) else {
            return false;
        };

        if self.seen() != Some(slot.version) {
            tracing::debug!(
                "Update of {} rejected: record changed since last read",
                self.key
            );
            return false;
        }

        slot.record = Some(record.clone());
        slot.version += 1;
        self.remember(slot.version);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::time::Duration;

    fn claim(identity: &str) -> ElectionRecord {
        ElectionRecord::claim(identity, Duration::from_secs(15), Utc::now())
    }

    #[tokio::test]
    async fn test_get_missing_is_not_found() {
        let store = MemoryStore::new();
        let lock = store.lock("default", "lease");
        let cancel = CancellationToken::new();

        let err = lock.get(&cancel).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_create_then_get() {
        let store = MemoryStore::new();
        let lock = store.lock("default", "lease");
        let cancel = CancellationToken::new();

        assert!(lock.create(&claim("a"), &cancel).await);
        let record = lock.get(&cancel).await.unwrap();
        assert_eq!(record.holder(), Some("a"));
        assert_eq!(store.version("default", "lease"), 1);
    }

    #[tokio::test]
    async fn test_second_create_loses() {
        let store = MemoryStore::new();
        let a = store.lock("default", "lease");
        let b = store.lock("default", "lease");
        let cancel = CancellationToken::new();

        assert!(a.create(&claim("a"), &cancel).await);
        assert!(!b.create(&claim("b"), &cancel).await);
        assert_eq!(store.record("default", "lease").unwrap().holder(), Some("a"));
    }

    #[tokio::test]
    async fn test_create_over_invalid_record() {
        let store = MemoryStore::new();
        store.put("default", "lease", ElectionRecord::default());
        let lock = store.lock("default", "lease");
        let cancel = CancellationToken::new();

        assert!(lock.create(&claim("a"), &cancel).await);
        assert_eq!(store.version("default", "lease"), 2);
    }

    #[tokio::test]
    async fn test_update_rejects_stale_read() {
        let store = MemoryStore::new();
        let a = store.lock("default", "lease");
        let b = store.lock("default", "lease");
        let cancel = CancellationToken::new();

        assert!(a.create(&claim("a"), &cancel).await);
        b.get(&cancel).await.unwrap();
        a.get(&cancel).await.unwrap();

        assert!(a.update(&claim("a"), &cancel).await);
        // b read before a's update
        assert!(!b.update(&claim("b"), &cancel).await);

        b.get(&cancel).await.unwrap();
        assert!(b.update(&claim("b"), &cancel).await);
        assert_eq!(store.record("default", "lease").unwrap().holder(), Some("b"));
    }

    #[tokio::test]
    async fn test_update_without_read_is_rejected() {
        let store = MemoryStore::new();
        store.put("default", "lease", claim("a"));
        let lock = store.lock("default", "lease");

        assert!(!lock.update(&claim("b"), &CancellationToken::new()).await);
    }

    #[tokio::test]
    async fn test_cancelled_operations_do_nothing() {
        let store = MemoryStore::new();
        let lock = store.lock("default", "lease");
        let cancel = CancellationToken::new();
        cancel.cancel();

        assert!(matches!(lock.get(&cancel).await, Err(LockError::Cancelled)));
        assert!(!lock.create(&claim("a"), &cancel).await);
        assert_eq!(store.version("default", "lease"), 0);
    }

    #[test]
    fn test_slots_are_namespaced() {
        let store = MemoryStore::new();
        store.put("one", "lease", claim("a"));

        assert!(store.record("two", "lease").is_none());
        assert_eq!(store.lock("one", "lease").describe(), "one/lease");
    }
}
