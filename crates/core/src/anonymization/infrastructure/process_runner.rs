use std::ffi::OsString;
use std::path::PathBuf;
use std::process::{Command, ExitStatus};
use std::thread;
use std::time::{Duration, Instant};

use crate::shared::error::{BlanketError, BlanketResult};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// A blocking external command.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessCommand {
    pub program: OsString,
    pub args: Vec<OsString>,
    pub working_dir: Option<PathBuf>,
    pub timeout: Option<Duration>,
}

impl ProcessCommand {
    pub fn new(program: impl Into<OsString>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_dir: None,
            timeout: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn working_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.working_dir = dir;
        self
    }

    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Space-joined command line, for logs.
    pub fn display(&self) -> String {
        std::iter::once(&self.program)
            .chain(self.args.iter())
            .map(|s| s.to_string_lossy())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// How a finished process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessOutcome {
    pub success: bool,
    pub code: Option<i32>,
}

impl From<ExitStatus> for ProcessOutcome {
    fn from(status: ExitStatus) -> Self {
        Self {
            success: status.success(),
            code: status.code(),
        }
    }
}

/// Runs external commands to completion.
pub trait ProcessRunner: Send + Sync {
    fn run(&self, command: &ProcessCommand) -> BlanketResult<ProcessOutcome>;
}

/// Spawns real child processes, inheriting stdout and stderr.
///
/// A command that outlives its timeout is killed and reported as
/// [`BlanketError::Timeout`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemProcessRunner;

impl ProcessRunner for SystemProcessRunner {
    fn run(&self, command: &ProcessCommand) -> BlanketResult<ProcessOutcome> {
        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args);
        if let Some(dir) = &command.working_dir {
            cmd.current_dir(dir);
        }

        log::info!("Running: {}", command.display());
        let mut child = cmd.spawn().map_err(|e| {
            BlanketError::external(
                format!("failed to start {}: {e}", command.program.to_string_lossy()),
                false,
            )
        })?;

        let Some(timeout) = command.timeout else {
            let status = child
                .wait()
                .map_err(|e| BlanketError::external(format!("failed to wait for child: {e}"), false))?;
            return Ok(status.into());
        };

        let started = Instant::now();
        loop {
            match child.try_wait() {
                Ok(Some(status)) => return Ok(status.into()),
                Ok(None) if started.elapsed() >= timeout => {
                    log::warn!(
                        "Killing {} after {:.1}s",
                        command.program.to_string_lossy(),
                        timeout.as_secs_f64()
                    );
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(BlanketError::Timeout(timeout));
                }
                Ok(None) => thread::sleep(POLL_INTERVAL),
                Err(e) => {
                    let _ = child.kill();
                    return Err(BlanketError::external(
                        format!("failed to poll child: {e}"),
                        false,
                    ));
                }
            }
        }
    }
}
