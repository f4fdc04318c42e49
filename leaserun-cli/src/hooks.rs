//! Commands run on leadership events
//!
//! Each configured command is a liquid template. `{{ id }}` is this
//! participant's identity; the elect command also gets `{{ leader_id }}`.
//! Rendered commands run through the platform shell. The engine never waits
//! for them: they are spawned on a [`TaskTracker`] and their exit status is
//! logged when they finish.

use std::fmt;
use std::process::ExitStatus;

use leaserun_election::ElectionHandler;
use liquid::model::Value;
use tokio::process::Command;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info};

use crate::config::Settings;
use crate::error::{CliError, Result};

/// The leadership event a command is attached to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hook {
    Elect,
    Start,
    Stop,
}

impl fmt::Display for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Hook::Elect => write!(f, "elect"),
            Hook::Start => write!(f, "start"),
            Hook::Stop => write!(f, "stop"),
        }
    }
}

/// Render a command template with the given variables
pub fn render(template: &str, vars: &[(&'static str, &str)]) -> Result<String> {
    let template_error = |e: liquid::Error| CliError::Template {
        template: template.to_string(),
        message: e.to_string(),
    };

    let parsed = liquid::ParserBuilder::with_stdlib()
        .build()
        .and_then(|parser| parser.parse(template))
        .map_err(template_error)?;

    let mut globals = liquid::Object::new();
    for (key, value) in vars {
        globals.insert((*key).into(), Value::scalar(value.to_string()));
    }

    parsed.render(&globals).map_err(template_error)
}

/// Run `command` through the platform shell and wait for it
pub async fn execute(command: &str) -> Result<ExitStatus> {
    let (program, args) = if cfg!(target_os = "windows") {
        ("cmd", ["/C", command])
    } else {
        ("sh", ["-c", command])
    };

    Command::new(program)
        .args(args)
        .status()
        .await
        .map_err(|source| CliError::Spawn {
            command: command.to_string(),
            source,
        })
}

/// Runs the configured commands for leadership events
#[derive(Debug, Clone)]
pub struct HookRunner {
    identity: String,
    elect: Option<String>,
    start: Option<String>,
    stop: Option<String>,
    tracker: TaskTracker,
}

impl HookRunner {
    pub fn new(identity: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            elect: None,
            start: None,
            stop: None,
            tracker: TaskTracker::new(),
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        let mut runner = Self::new(settings.identity.clone());
        runner.elect = settings.elect.clone();
        runner.start = settings.start.clone();
        runner.stop = settings.stop.clone();
        runner
    }

    pub fn with_command(mut self, hook: Hook, template: impl Into<String>) -> Self {
        let slot = match hook {
            Hook::Elect => &mut self.elect,
            Hook::Start => &mut self.start,
            Hook::Stop => &mut self.stop,
        };
        *slot = Some(template.into());
        self
    }

    fn template(&self, hook: Hook) -> Option<&str> {
        match hook {
            Hook::Elect => self.elect.as_deref(),
            Hook::Start => self.start.as_deref(),
            Hook::Stop => self.stop.as_deref(),
        }
    }

    /// The rendered command for `hook`, or `None` when no command is configured
    pub fn command(&self, hook: Hook, leader: Option<&str>) -> Result<Option<String>> {
        let Some(template) = self.template(hook) else {
            return Ok(None);
        };

        let mut vars = vec![("id", self.identity.as_str())];
        if let Some(leader) = leader {
            vars.push(("leader_id", leader));
        }
        render(template, &vars).map(Some)
    }

    /// Start the command for `hook` without waiting for it
    pub fn spawn(&self, hook: Hook, leader: Option<&str>) {
        let command = match self.command(hook, leader) {
            Ok(Some(command)) => command,
            Ok(None) => return,
            Err(e) => {
                error!("Skipping {} command: {}", hook, e);
                return;
            }
        };

        info!("Exec {}: {}", hook, command);
        self.tracker.spawn(async move {
            match execute(&command).await {
                Ok(status) if status.success() => debug!("Command finished: {}", command),
                Ok(status) => error!("Command exited with {}: {}", status, command),
                Err(e) => error!("{}", e),
            }
        });
    }

    /// Run the command for `hook` and wait for it to exit
    pub async fn run_and_wait(&self, hook: Hook, leader: Option<&str>) -> Result<()> {
        let Some(command) = self.command(hook, leader)? else {
            debug!("No {} command configured", hook);
            return Ok(());
        };

        info!("Exec {}: {}", hook, command);
        let status = execute(&command).await?;
        if status.success() {
            Ok(())
        } else {
            Err(CliError::CommandFailed { command, status })
        }
    }

    /// Run the elect, start and stop commands once each, in order, with this
    /// participant as the leader. Failures are logged and do not stop the
    /// sequence.
    pub async fn run_test(&self) {
        let identity = self.identity.clone();
        for (hook, leader) in [
            (Hook::Elect, Some(identity.as_str())),
            (Hook::Start, None),
            (Hook::Stop, None),
        ] {
            if let Err(e) = self.run_and_wait(hook, leader).await {
                error!("Test {} failed: {}", hook, e);
            }
        }
    }

    /// Wait for every spawned command to exit
    pub async fn wait(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }
}

impl ElectionHandler for HookRunner {
    fn on_started_leading(&self) {
        self.spawn(Hook::Start, None);
    }

    fn on_stopped_leading(&self) {
        self.spawn(Hook::Stop, None);
    }

    fn on_new_leader(&self, identity: &str) {
        self.spawn(Hook::Elect, Some(identity));
    }
}
