//! Command-line definition for `leaserun`.
//!
//! Every option except `--test`, `--config` and `--debug` is also a setting, so
//! it can come from the TOML file or a `LEASERUN_*` variable instead. Options
//! given here override both.

use std::path::PathBuf;

use clap::Parser;
use serde::Serialize;

/// Run commands when this host gains or loses leadership of a shared lease
#[derive(Parser, Debug, Default, Serialize)]
#[command(name = "leaserun")]
#[command(version)]
#[command(about = "Run commands when this host gains or loses leadership of a shared lease")]
pub struct Cli {
    /// Name of the shared lock to elect on
    #[arg(short = 'm', long = "shared-lock", value_name = "NAME")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shared_lock: Option<String>,

    /// Namespace of the shared lock [default: default]
    #[arg(short, long, value_name = "NS")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,

    /// Identity of this participant [default: $HOSTNAME]
    #[arg(short, long, value_name = "ID")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identity: Option<String>,

    /// Directory holding the lock files [default: system temp dir]
    #[arg(short = 'd', long, value_name = "DIR")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lock_dir: Option<PathBuf>,

    /// Command run when a new leader is elected ({{ id }}, {{ leader_id }})
    #[arg(short, long, value_name = "CMD")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elect: Option<String>,

    /// Command run when this participant starts leading ({{ id }})
    #[arg(short, long, value_name = "CMD")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start: Option<String>,

    /// Command run when this participant stops leading ({{ id }})
    #[arg(short = 'x', long, value_name = "CMD")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop: Option<String>,

    /// Lease duration in seconds [default: 10]
    #[arg(short, long, value_name = "SECONDS")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lease: Option<f64>,

    /// Retry period in seconds [default: 2]
    #[arg(short, long, value_name = "SECONDS")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry: Option<f64>,

    /// Renew deadline in seconds [default: two thirds of the lease]
    #[arg(long, value_name = "SECONDS")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub renew_deadline: Option<f64>,

    /// Lead only while the process whose pid is in this file is running
    #[arg(short, long, value_name = "PATH")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid_file: Option<PathBuf>,

    /// Run the elect, start and stop commands once each, then exit
    #[arg(short, long)]
    #[serde(skip)]
    pub test: bool,

    /// TOML settings file
    #[arg(short, long, value_name = "PATH")]
    #[serde(skip)]
    pub config: Option<PathBuf>,

    /// Enable debug output to stderr
    #[arg(long)]
    #[serde(skip)]
    pub debug: bool,
}
