//! leaserun command-line entry point
//!
//! Exit codes:
//! - 0: Success, including shutdown by Ctrl+C
//! - 1: Error

use std::sync::Arc;

use clap::Parser;
use leaserun::{Cli, HookRunner, Result, Settings, Supervisor};
use leaserun_election::FileLock;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let filter = if cli.debug {
        EnvFilter::new("leaserun=debug,leaserun_election=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(false)
        .with_writer(std::io::stderr)
        .init();

    let exit_code = result_to_exit(run(cli).await);
    std::process::exit(exit_code);
}

async fn run(cli: Cli) -> Result<()> {
    let settings = Settings::load(&cli)?;
    let config = settings.election_config()?;
    let hooks = HookRunner::from_settings(&settings);

    if cli.test {
        hooks.run_test().await;
        return Ok(());
    }

    let lock = FileLock::new(&settings.lock_dir, &settings.namespace, settings.lock_name()?)?;
    tracing::info!(
        "Joining election on {} as {}",
        lock.record_path().display(),
        config.identity
    );

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Interrupted, shutting down");
                cancel.cancel();
            }
        }
    });

    Supervisor::new(config, Arc::new(lock), hooks)
        .run(settings.pid_file(), &cancel)
        .await
}

/// Convert a `Result<(), E: Display>` to an exit code.
fn result_to_exit<E: std::fmt::Display>(result: std::result::Result<(), E>) -> i32 {
    match result {
        Ok(()) => 0,
        Err(e) => {
            tracing::error!("{}", e);
            1
        }
    }
}
