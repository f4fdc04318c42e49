//! Keeps this process in the election for as long as it should be there
//!
//! Without a pid file the election runs until shutdown. With one, the
//! election only runs while the process named in the file is alive: the file
//! is read, the process looked up, and the election cancelled as soon as the
//! process exits. Then the cycle starts over with a fresh read of the file.

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use leaserun_election::{ElectionConfig, ElectionError, LeaderElector, ResourceLock};
use sysinfo::{Pid, ProcessStatus, ProcessesToUpdate, System};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::{CliError, Result};
use crate::hooks::HookRunner;

/// Delay before retrying a missing pid file or process
pub const PID_RETRY_INTERVAL: Duration = Duration::from_secs(2);

/// How often a monitored process is checked while the election runs
pub const PROCESS_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Read the pid on the first line of `path`
pub fn read_pid(path: &Path) -> Result<Pid> {
    let pid_error = |message: String| CliError::PidFile {
        path: path.to_path_buf(),
        message,
    };

    let contents = fs::read_to_string(path).map_err(|e| pid_error(e.to_string()))?;
    let line = contents.lines().next().unwrap_or_default().trim();
    line.parse::<u32>()
        .map(Pid::from_u32)
        .map_err(|_| pid_error(format!("'{}' is not a pid", line)))
}

/// Whether `pid` names a running process
pub fn process_alive(pid: Pid) -> bool {
    let mut system = System::new();
    system.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
    system
        .process(pid)
        .is_some_and(|process| process.status() != ProcessStatus::Zombie)
}

/// [`process_alive`] on the blocking pool
pub async fn process_running(pid: Pid) -> bool {
    tokio::task::spawn_blocking(move || process_alive(pid))
        .await
        .unwrap_or(false)
}

/// Sleep for `period`; false if `cancel` fired first
async fn pause(period: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = sleep(period) => true,
    }
}

async fn process_exit(pid: Pid) {
    while process_running(pid).await {
        sleep(PROCESS_POLL_INTERVAL).await;
    }
}

/// Runs elections on one lock, delivering events to the hook commands
pub struct Supervisor {
    config: ElectionConfig,
    lock: Arc<dyn ResourceLock>,
    hooks: HookRunner,
}

impl std::fmt::Debug for Supervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Supervisor")
            .field("config", &self.config)
            .field("lock", &self.lock.describe())
            .field("hooks", &self.hooks)
            .finish()
    }
}

impl Supervisor {
    pub fn new(config: ElectionConfig, lock: Arc<dyn ResourceLock>, hooks: HookRunner) -> Self {
        Self {
            config,
            lock,
            hooks,
        }
    }

    /// Run until `cancel` fires, then wait for outstanding hook commands
    pub async fn run(&self, pid_file: Option<&Path>, cancel: &CancellationToken) -> Result<()> {
        let result = match pid_file {
            Some(path) => self.monitor(path, cancel).await,
            None => self.elect(cancel).await,
        };

        self.hooks.wait().await;
        result
    }

    /// Take part in the election until cancelled, rejoining after every loss
    /// of leadership.
    async fn elect(&self, cancel: &CancellationToken) -> Result<()> {
        loop {
            let elector = LeaderElector::new(self.config.clone(), Arc::clone(&self.lock))?
                .with_handler(Arc::new(self.hooks.clone()));

            match elector.run(cancel).await {
                Ok(()) => info!("Lost leadership, rejoining the election"),
                Err(ElectionError::Cancelled) => return Ok(()),
                Err(e) => return Err(e.into()),
            }

            if !pause(self.config.retry_period, cancel).await {
                return Ok(());
            }
        }
    }

    async fn monitor(&self, pid_file: &Path, cancel: &CancellationToken) -> Result<()> {
        loop {
            if cancel.is_cancelled() {
                return Ok(());
            }

            let pid = match read_pid(pid_file) {
                Ok(pid) => pid,
                Err(e) => {
                    warn!("Waiting for pid file: {}", e);
                    if !pause(PID_RETRY_INTERVAL, cancel).await {
                        return Ok(());
                    }
                    continue;
                }
            };

            if !process_running(pid).await {
                warn!("No such process ({})", pid);
                if !pause(PID_RETRY_INTERVAL, cancel).await {
                    return Ok(());
                }
                continue;
            }

            info!("Started. Id: {}, monitoring pid {}", self.config.identity, pid);
            let round = cancel.child_token();
            let election = self.elect(&round);
            tokio::pin!(election);

            tokio::select! {
                // Only returns once the outer token fires or the election fails
                result = &mut election => return result,
                _ = process_exit(pid) => {
                    round.cancel();
                    election.await?;
                    info!("Stopped. Process {} exited", pid);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hooks::Hook;
    use leaserun_election::MemoryStore;
    use tempfile::TempDir;

    fn fast_config(identity: &str) -> ElectionConfig {
        ElectionConfig::new(identity)
            .with_lease_duration(Duration::from_millis(1000))
            .with_renew_deadline(Duration::from_millis(600))
            .with_retry_period(Duration::from_millis(100))
    }

    #[test]
    fn test_read_pid() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.pid");

        fs::write(&path, "4242\n").unwrap();
        assert_eq!(read_pid(&path).unwrap(), Pid::from_u32(4242));

        fs::write(&path, "  17  \nignored\n").unwrap();
        assert_eq!(read_pid(&path).unwrap(), Pid::from_u32(17));
    }

    #[test]
    fn test_read_pid_rejects_garbage() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.pid");

        fs::write(&path, "running").unwrap();
        assert!(matches!(read_pid(&path), Err(CliError::PidFile { .. })));

        fs::write(&path, "").unwrap();
        assert!(read_pid(&path).is_err());
    }

    #[test]
    fn test_read_pid_missing_file() {
        let dir = TempDir::new().unwrap();
        assert!(read_pid(&dir.path().join("absent.pid")).is_err());
    }

    #[test]
    fn test_current_process_is_alive() {
        assert!(process_alive(Pid::from_u32(std::process::id())));
    }

    #[tokio::test]
    async fn test_process_running_checks_off_the_runtime() {
        assert!(process_running(Pid::from_u32(std::process::id())).await);
        assert!(!process_running(Pid::from_u32(u32::MAX)).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_elects_until_cancelled() {
        let store = MemoryStore::new();
        let supervisor = Supervisor::new(
            fast_config("node-a"),
            Arc::new(store.lock("default", "cron")),
            HookRunner::new("node-a"),
        );
        let cancel = CancellationToken::new();

        let run = tokio::spawn({
            let cancel = cancel.clone();
            async move { supervisor.run(None, &cancel).await }
        });

        sleep(Duration::from_secs(5)).await;
        let record = store.record("default", "cron").unwrap();
        assert_eq!(record.holder(), Some("node-a"));

        cancel.cancel();
        assert!(run.await.unwrap().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_waits_for_pid_file_until_cancelled() {
        let dir = TempDir::new().unwrap();
        let store = MemoryStore::new();
        let supervisor = Supervisor::new(
            fast_config("node-a"),
            Arc::new(store.lock("default", "cron")),
            HookRunner::new("node-a"),
        );
        let cancel = CancellationToken::new();
        let pid_file = dir.path().join("app.pid");

        let run = tokio::spawn({
            let cancel = cancel.clone();
            async move { supervisor.run(Some(&pid_file), &cancel).await }
        });

        sleep(Duration::from_secs(7)).await;
        assert!(store.record("default", "cron").is_none());

        cancel.cancel();
        assert!(run.await.unwrap().is_ok());
    }

    #[cfg(unix)]
    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_leads_only_while_process_runs() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("events");
        let pid_file = dir.path().join("app.pid");

        let mut child = tokio::process::Command::new("sleep")
            .arg("30")
            .spawn()
            .unwrap();
        fs::write(&pid_file, format!("{}\n", child.id().unwrap())).unwrap();

        let hooks = HookRunner::new("node-a")
            .with_command(Hook::Start, format!("echo start >> {}", out.display()))
            .with_command(Hook::Stop, format!("echo stop >> {}", out.display()));
        let store = MemoryStore::new();
        let supervisor = Supervisor::new(
            fast_config("node-a"),
            Arc::new(store.lock("default", "cron")),
            hooks,
        );
        let cancel = CancellationToken::new();
        let run = tokio::spawn({
            let cancel = cancel.clone();
            async move { supervisor.run(Some(&pid_file), &cancel).await }
        });

        let events = |expected: &str| {
            let out = out.clone();
            let expected = expected.to_string();
            async move {
                for _ in 0..100 {
                    if fs::read_to_string(&out).unwrap_or_default() == expected {
                        return true;
                    }
                    sleep(Duration::from_millis(100)).await;
                }
                false
            }
        };

        assert!(events("start\n").await);

        child.kill().await.unwrap();
        assert!(events("start\nstop\n").await);

        cancel.cancel();
        assert!(run.await.unwrap().is_ok());
    }
}
