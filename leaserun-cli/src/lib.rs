//! leaserun - run commands when this host gains or loses a shared lease
//!
//! The binary joins a [`leaserun_election`] election on a file-backed lock and
//! maps leadership events to shell commands:
//!
//! - `--elect`: a new leader was observed
//! - `--start`: this host became the leader
//! - `--stop`: this host stopped leading
//!
//! With `--pid-file`, the host only takes part while the process named in the
//! file is running.

pub mod cli;
pub mod config;
pub mod error;
pub mod hooks;
pub mod supervisor;

pub use cli::Cli;
pub use config::Settings;
pub use error::{CliError, Result};
pub use hooks::{Hook, HookRunner};
pub use supervisor::Supervisor;
