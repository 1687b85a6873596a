//! External process control.
//!
//! The scheduler never looks inside a workload: it launches the command,
//! asks whether it is still alive, and stops it. Those capabilities are
//! expressed as the [`Launcher`] and [`ProcessHandle`] traits so the work
//! queue can be driven by real child processes or by scripted test doubles.

pub mod child;
pub mod preempt;

use crate::scheduler::job::Job;
use async_trait::async_trait;
use std::fmt;

pub use child::{ChildProcess, CommandLauncher};
pub use preempt::{stop_with_grace, StopOutcome, DEFAULT_GRACE};

/// How a process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitSummary {
    /// Exit code, absent when the process was killed by a signal
    pub code: Option<i32>,
    /// Terminating signal number (Unix only)
    pub signal: Option<i32>,
}

impl ExitSummary {
    #[must_use]
    pub fn code(code: i32) -> Self {
        Self {
            code: Some(code),
            signal: None,
        }
    }

    #[must_use]
    pub fn signaled(signal: i32) -> Self {
        Self {
            code: None,
            signal: Some(signal),
        }
    }

    #[must_use]
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

impl From<std::process::ExitStatus> for ExitSummary {
    fn from(status: std::process::ExitStatus) -> Self {
        #[cfg(unix)]
        let signal = {
            use std::os::unix::process::ExitStatusExt;
            status.signal()
        };
        #[cfg(not(unix))]
        let signal = None;
        Self {
            code: status.code(),
            signal,
        }
    }
}

impl fmt::Display for ExitSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.code, self.signal) {
            (Some(code), _) => write!(f, "exit code {code}"),
            (None, Some(sig)) => write!(f, "signal {sig}"),
            (None, None) => f.write_str("unknown status"),
        }
    }
}

/// Process control errors
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("command is empty")]
    EmptyCommand,

    #[error("failed to spawn {program:?}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to query process status")]
    Status(#[source] std::io::Error),

    #[error("failed to deliver termination signal: {0}")]
    Signal(String),

    #[error("force kill was not confirmed")]
    KillUnconfirmed(#[source] std::io::Error),
}

/// A launched workload.
#[async_trait]
pub trait ProcessHandle: Send {
    /// OS process id, if the process has not been reaped yet.
    fn id(&self) -> Option<u32>;

    /// Non-blocking status check.
    fn try_wait(&mut self) -> Result<Option<ExitSummary>, ProcessError>;

    /// Send the graceful, catchable termination signal.
    fn terminate(&mut self) -> Result<(), ProcessError>;

    /// Wait for the process to exit on its own.
    async fn wait(&mut self) -> Result<ExitSummary, ProcessError>;

    /// Send the non-catchable kill and block until the OS confirms the
    /// process is gone.
    async fn kill(&mut self) -> Result<ExitSummary, ProcessError>;
}

/// Starts the external command of a job.
pub trait Launcher: Send + Sync {
    fn launch(&self, job: &Job) -> Result<Box<dyn ProcessHandle>, ProcessError>;
}
