//! Elections between independent engines sharing a lock file

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use leaserun_election::{
    ElectionConfig, ElectionError, ElectionEvent, FileLock, LeaderElector, ResourceLock,
};
use tempfile::TempDir;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio_util::sync::CancellationToken;

fn fast_config(identity: &str) -> ElectionConfig {
    ElectionConfig::new(identity)
        .with_lease_duration(Duration::from_millis(1000))
        .with_renew_deadline(Duration::from_millis(600))
        .with_retry_period(Duration::from_millis(100))
}

fn file_elector(
    dir: &TempDir,
    identity: &str,
) -> Result<(LeaderElector, UnboundedReceiver<ElectionEvent>)> {
    let lock = FileLock::new(dir.path(), "default", "scheduler")?;
    let (tx, rx) = mpsc::unbounded_channel();
    let elector =
        LeaderElector::new(fast_config(identity), Arc::new(lock))?.with_handler(Arc::new(tx));
    Ok((elector, rx))
}

async fn next_event(rx: &mut UnboundedReceiver<ElectionEvent>) -> Option<ElectionEvent> {
    tokio::time::timeout(Duration::from_secs(10), rx.recv())
        .await
        .ok()
        .flatten()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_failover_between_file_lock_participants() -> Result<()> {
    let dir = TempDir::new()?;
    let (a, mut a_events) = file_elector(&dir, "a")?;
    let (b, mut b_events) = file_elector(&dir, "b")?;

    let a_cancel = CancellationToken::new();
    let a_run = tokio::spawn({
        let a = a.clone();
        let cancel = a_cancel.clone();
        async move { a.run(&cancel).await }
    });

    assert_eq!(
        next_event(&mut a_events).await,
        Some(ElectionEvent::NewLeader("a".to_string()))
    );
    assert_eq!(next_event(&mut a_events).await, Some(ElectionEvent::StartedLeading));

    let b_cancel = CancellationToken::new();
    let b_run = tokio::spawn({
        let b = b.clone();
        let cancel = b_cancel.clone();
        async move { b.run(&cancel).await }
    });

    assert_eq!(
        next_event(&mut b_events).await,
        Some(ElectionEvent::NewLeader("a".to_string()))
    );
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(a.is_leader());
    assert!(!b.is_leader());

    // a goes away without releasing the lease
    a_cancel.cancel();
    assert!(matches!(a_run.await?, Err(ElectionError::Cancelled)));
    assert_eq!(next_event(&mut a_events).await, Some(ElectionEvent::StoppedLeading));

    assert_eq!(
        next_event(&mut b_events).await,
        Some(ElectionEvent::NewLeader("b".to_string()))
    );
    assert_eq!(next_event(&mut b_events).await, Some(ElectionEvent::StartedLeading));
    assert!(b.is_leader());

    let lock = FileLock::new(dir.path(), "default", "scheduler")?;
    let record = lock.get(&CancellationToken::new()).await?;
    assert_eq!(record.holder(), Some("b"));
    assert_eq!(record.leader_transitions, 1);

    b_cancel.cancel();
    assert!(matches!(b_run.await?, Err(ElectionError::Cancelled)));
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_record_file_is_readable_json() -> Result<()> {
    let dir = TempDir::new()?;
    let lock = FileLock::new(dir.path(), "ops", "cron")?;
    let path = lock.record_path().to_path_buf();
    let elector = LeaderElector::new(fast_config("writer"), Arc::new(lock))?;

    assert!(elector.try_acquire_or_renew(&CancellationToken::new()).await);

    let json: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(path)?)?;
    assert_eq!(json["record"]["holderIdentity"], "writer");
    assert_eq!(json["version"], 1);
    Ok(())
}
