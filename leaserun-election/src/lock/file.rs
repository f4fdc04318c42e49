//! File-backed lock for participants sharing a filesystem
//!
//! The record lives as JSON in `<dir>/<namespace>/<name>.json` together with a
//! version counter. Every operation takes an exclusive `flock` on a sibling
//! `.lock` file for the duration of its read-modify-write, and replaces the
//! record file by rename, so readers only ever see whole records.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use super::ResourceLock;
use crate::error::{LockError, Result};
use crate::record::ElectionRecord;

type LockResult<T> = std::result::Result<T, LockError>;

/// On-disk layout of the record file
#[derive(Debug, Default, Serialize, Deserialize)]
struct StoredRecord {
    version: u64,
    #[serde(default)]
    record: ElectionRecord,
}

#[derive(Debug)]
struct Paths {
    record: PathBuf,
    guard: PathBuf,
}

impl Paths {
    /// Hold the exclusive guard lock while `f` runs
    fn exclusive<T>(&self, f: impl FnOnce() -> LockResult<T>) -> LockResult<T> {
        let guard = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&self.guard)
            .map_err(LockError::Io)?;
        guard.lock_exclusive().map_err(LockError::Io)?;
        let result = f();
        let _ = FileExt::unlock(&guard);
        result
    }

    /// Read the stored record; `None` when the file does not exist
    fn read(&self) -> LockResult<Option<StoredRecord>> {
        match fs::read(&self.record) {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => {
                Ok(Some(StoredRecord::default()))
            }
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(LockError::Io(e)),
        }
    }

    fn write(&self, stored: &StoredRecord) -> LockResult<()> {
        let tmp = self.record.with_extension("json.tmp");
        {
            let mut file = File::create(&tmp).map_err(LockError::Io)?;
            file.write_all(&serde_json::to_vec_pretty(stored)?)
                .map_err(LockError::Io)?;
            file.sync_all().map_err(LockError::Io)?;
        }
        fs::rename(&tmp, &self.record).map_err(LockError::Io)
    }
}

/// Lock backed by a JSON file on a shared filesystem
///
/// Each handle remembers the version it last read; `update` is rejected when
/// the file has moved on since then.
#[derive(Debug)]
pub struct FileLock {
    namespace: String,
    name: String,
    paths: Arc<Paths>,
    seen_version: Arc<Mutex<Option<u64>>>,
}

impl FileLock {
    /// Open (without creating) the lock `namespace/name` under `dir`.
    ///
    /// The namespace directory is created if needed.
    pub fn new(dir: impl AsRef<Path>, namespace: &str, name: &str) -> Result<Self> {
        let ns_dir = dir.as_ref().join(namespace);
        fs::create_dir_all(&ns_dir).map_err(LockError::Io)?;

        Ok(Self {
            namespace: namespace.to_string(),
            name: name.to_string(),
            paths: Arc::new(Paths {
                record: ns_dir.join(format!("{}.json", name)),
                guard: ns_dir.join(format!("{}.lock", name)),
            }),
            seen_version: Arc::new(Mutex::new(None)),
        })
    }

    /// Path of the JSON record file
    pub fn record_path(&self) -> &Path {
        &self.paths.record
    }

    /// Run a blocking file operation off the async runtime.
    ///
    /// Cancellation stops waiting for the result; an operation already holding
    /// the file lock still runs to completion.
    async fn blocking<T, F>(&self, cancel: &CancellationToken, f: F) -> LockResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Paths, &Mutex<Option<u64>>) -> LockResult<T> + Send + 'static,
    {
        if cancel.is_cancelled() {
            return Err(LockError::Cancelled);
        }

        let paths = Arc::clone(&self.paths);
        let seen = Arc::clone(&self.seen_version);
        let task = tokio::task::spawn_blocking(move || f(&paths, &seen));

        tokio::select! {
            _ = cancel.cancelled() => Err(LockError::Cancelled),
            joined = task => joined
                .map_err(|e| LockError::Store(format!("lock file task failed: {}", e)))
                .and_then(|result| result),
        }
    }

    fn log_failure(&self, op: &str, error: &LockError) {
        match error {
            LockError::Cancelled => tracing::debug!("{} of {} cancelled", op, self.describe()),
            _ => tracing::warn!("{} of {} failed: {}", op, self.describe(), error),
        }
    }
}

fn remember(seen: &Mutex<Option<u64>>, version: u64) {
    *seen.lock().unwrap_or_else(PoisonError::into_inner) = Some(version);
}

#[async_trait]
impl ResourceLock for FileLock {
    fn describe(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }

    async fn get(&self, cancel: &CancellationToken) -> LockResult<ElectionRecord> {
        self.blocking(cancel, |paths, seen| {
            paths.exclusive(|| {
                let stored = paths.read()?.ok_or(LockError::NotFound)?;
                remember(seen, stored.version);
                Ok(stored.record)
            })
        })
        .await
    }

    async fn create(&self, record: &ElectionRecord, cancel: &CancellationToken) -> bool {
        let record = record.clone();
        let result = self
            .blocking(cancel, move |paths, seen| {
                paths.exclusive(|| {
                    let current = paths.read()?;
                    if current.as_ref().is_some_and(|stored| stored.record.is_valid()) {
                        return Ok(false);
                    }

                    let version = current.map_or(0, |stored| stored.version) + 1;
                    paths.write(&StoredRecord { version, record })?;
                    remember(seen, version);
                    Ok(true)
                })
            })
            .await;

        match result {
            Ok(created) => created,
            Err(e) => {
                self.log_failure("Create", &e);
                false
            }
        }
    }

    async fn update(&self, record: &ElectionRecord, cancel: &CancellationToken) -> bool {
        let record = record.clone();
        let result = self
            .blocking(cancel, move |paths, seen| {
                paths.exclusive(|| {
                    let Some(current) = paths.read()? else {
                        return Ok(false);
                    };
                    let last_read = *seen.lock().unwrap_or_else(PoisonError::into_inner);
                    if last_read != Some(current.version) {
                        return Ok(false);
                    }

                    let version = current.version + 1;
                    paths.write(&StoredRecord { version, record })?;
                    remember(seen, version);
                    Ok(true)
                })
            })
            .await;

        match result {
            Ok(updated) => updated,
            Err(e) => {
                self.log_failure("Update", &e);
                false
            }
        }
    }
}
