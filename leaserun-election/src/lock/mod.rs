//! The lock abstraction the election engine races on
//!
//! A lock is a named, namespaced resource holding one [`ElectionRecord`]. The
//! engine only needs three operations with optimistic semantics: it reads the
//! record, then either creates it (when none exists) or updates it, and the
//! backend rejects the write if another participant got there first.

mod file;
mod memory;

pub use file::FileLock;
pub use memory::{MemoryLock, MemoryStore};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::LockError;
use crate::record::ElectionRecord;

/// Shared lock resource used for the election
///
/// Implementations never retry internally; the engine decides when to try
/// again. A handle tracks the version of the record it last read so that
/// `update` can reject writes based on a stale read.
#[async_trait]
pub trait ResourceLock: Send + Sync {
    /// `namespace/name` label used in logs
    fn describe(&self) -> String;

    /// Read the current record.
    ///
    /// Fails with [`LockError::NotFound`] when nothing has been written yet.
    async fn get(&self, cancel: &CancellationToken) -> Result<ElectionRecord, LockError>;

    /// Write the first valid record. Returns false if one already exists.
    async fn create(&self, record: &ElectionRecord, cancel: &CancellationToken) -> bool;

    /// Replace the record. Returns false if it changed since this handle's last read.
    async fn update(&self, record: &ElectionRecord, cancel: &CancellationToken) -> bool;
}
