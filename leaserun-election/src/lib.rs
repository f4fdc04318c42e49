//! Lease-based leader election over a shared, optimistically-locked record.
//!
//! Participants race to own one [`ElectionRecord`] in a shared store. The
//! winner keeps renewing its lease; when it stops (crash, network partition,
//! missed deadline) the others take over once the lease has expired.
//!
//! # Overview
//!
//! - **Narrow store contract**: any backend implementing [`ResourceLock`]
//!   (`get` / `create` / `update` with optimistic concurrency) can host an election
//! - **Bounded failover**: a dead leader is replaced within one lease duration
//!   plus one retry period
//! - **Deadline demotion**: a leader that cannot renew within the renew
//!   deadline gives up leadership, even if the renewal is still in flight
//! - **Events**: "started leading", "stopped leading" and "new leader" are
//!   delivered through an [`ElectionHandler`]
//!
//! Two backends are included: [`MemoryStore`] for participants in one process,
//! and [`FileLock`] for processes sharing a filesystem.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use leaserun_election::{ElectionConfig, ElectionEvent, FileLock, LeaderElector};
//! use tokio_util::sync::CancellationToken;
//!
//! let lock = FileLock::new("/var/run/leaserun", "default", "scheduler")?;
//! let (events, mut rx) = tokio::sync::mpsc::unbounded_channel();
//! let elector = LeaderElector::new(ElectionConfig::new("node-a"), Arc::new(lock))?
//!     .with_handler(Arc::new(events));
//!
//! let cancel = CancellationToken::new();
//! tokio::spawn(async move {
//!     while let Some(event) = rx.recv().await {
//!         match event {
//!             ElectionEvent::StartedLeading => println!("leading"),
//!             ElectionEvent::StoppedLeading => println!("follower"),
//!             ElectionEvent::NewLeader(id) => println!("leader is {}", id),
//!         }
//!     }
//! });
//!
//! elector.run(&cancel).await?;
//! ```

mod config;
mod elector;
mod error;
mod events;
mod lock;
mod record;

pub use config::{
    ElectionConfig, DEFAULT_JITTER_FACTOR, DEFAULT_LEASE_DURATION, DEFAULT_RENEW_DEADLINE,
    DEFAULT_RETRY_PERIOD,
};
pub use elector::LeaderElector;
pub use error::{ElectionError, LockError, Result};
pub use events::{Callbacks, ElectionEvent, ElectionHandler, NoopHandler};
pub use lock::{FileLock, MemoryLock, MemoryStore, ResourceLock};
pub use record::{is_modified, ElectionRecord};
