use super::{ExitSummary, Launcher, ProcessError, ProcessHandle};
use crate::scheduler::job::Job;
use async_trait::async_trait;
use std::process::Stdio;
use tokio::process::{Child, Command};
use tracing::debug;

/// Launches jobs as OS child processes.
///
/// Children inherit the scheduler's environment and its stdout/stderr,
/// get no stdin, and are killed if their handle is dropped. On Unix each
/// child leads its own process group, so stopping a job also reaches
/// whatever a wrapper script started.
#[derive(Debug, Default, Clone, Copy)]
pub struct CommandLauncher;

impl Launcher for CommandLauncher {
    fn launch(&self, job: &Job) -> Result<Box<dyn ProcessHandle>, ProcessError> {
        let (program, args) = job
            .command
            .split_first()
            .ok_or(ProcessError::EmptyCommand)?;
        let mut command = Command::new(program);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        #[cfg(unix)]
        command.process_group(0);
        let child = command.spawn().map_err(|source| ProcessError::Spawn {
            program: program.clone(),
            source,
        })?;
        debug!("spawned {:?} as pid {:?}", job.command, child.id());
        Ok(Box::new(ChildProcess::new(child)))
    }
}

pub struct ChildProcess {
    child: Child,
    /// Process group led by the child, fixed at spawn so it can still be
    /// signalled after the leader has been reaped.
    group: Option<u32>,
}

impl ChildProcess {
    /// `child` must have been spawned as the leader of its own process
    /// group on Unix.
    pub fn new(child: Child) -> Self {
        let group = child.id();
        Self { child, group }
    }

    #[cfg(unix)]
    fn signal_group(&self, signal: nix::sys::signal::Signal) -> Result<(), nix::errno::Errno> {
        use nix::errno::Errno;
        use nix::sys::signal::killpg;
        use nix::unistd::Pid;

        let Some(group) = self.group else {
            return Ok(());
        };
        match killpg(Pid::from_raw(group as i32), signal) {
            // The whole group is gone already.
            Ok(()) | Err(Errno::ESRCH) => Ok(()),
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl ProcessHandle for ChildProcess {
    fn id(&self) -> Option<u32> {
        self.child.id()
    }

    fn try_wait(&mut self) -> Result<Option<ExitSummary>, ProcessError> {
        self.child
            .try_wait()
            .map(|status| status.map(ExitSummary::from))
            .map_err(ProcessError::Status)
    }

    #[cfg(unix)]
    fn terminate(&mut self) -> Result<(), ProcessError> {
        self.signal_group(nix::sys::signal::Signal::SIGTERM)
            .map_err(|e| ProcessError::Signal(e.to_string()))
    }

    #[cfg(not(unix))]
    fn terminate(&mut self) -> Result<(), ProcessError> {
        // No catchable termination signal exists here, so the grace
        // window is spent waiting on an already killed process.
        self.child
            .start_kill()
            .map_err(|e| ProcessError::Signal(e.to_string()))
    }

    async fn wait(&mut self) -> Result<ExitSummary, ProcessError> {
        self.child
            .wait()
            .await
            .map(ExitSummary::from)
            .map_err(ProcessError::Status)
    }

    #[cfg(unix)]
    async fn kill(&mut self) -> Result<ExitSummary, ProcessError> {
        self.signal_group(nix::sys::signal::Signal::SIGKILL)
            .map_err(|e| ProcessError::KillUnconfirmed(std::io::Error::from(e)))?;
        self.child
            .wait()
            .await
            .map(ExitSummary::from)
            .map_err(ProcessError::KillUnconfirmed)
    }

    #[cfg(not(unix))]
    async fn kill(&mut self) -> Result<ExitSummary, ProcessError> {
        self.child
            .kill()
            .await
            .map_err(ProcessError::KillUnconfirmed)?;
        self.child
            .wait()
            .await
            .map(ExitSummary::from)
            .map_err(ProcessError::KillUnconfirmed)
    }
}
