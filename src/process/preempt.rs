//! Graceful stop with escalation to a forced kill.

use super::{ExitSummary, ProcessError, ProcessHandle};
use std::time::Duration;
use tracing::{info, warn};

/// How long a signalled process gets to exit before it is killed.
pub const DEFAULT_GRACE: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// Exited on its own inside the grace window
    Exited(ExitSummary),
    /// Ignored the signal and was killed; termination is confirmed
    ForceKilled(ExitSummary),
}

impl StopOutcome {
    #[must_use]
    pub fn exit(&self) -> ExitSummary {
        match self {
            StopOutcome::Exited(exit) | StopOutcome::ForceKilled(exit) => *exit,
        }
    }
}

/// Signal `process` to terminate, wait up to `grace` for it, then kill it.
///
/// Returns only once the process is known to be dead. An error from the
/// final kill means the process may still hold resources and the caller
/// must not launch anything else.
pub async fn stop_with_grace(
    process: &mut dyn ProcessHandle,
    grace: Duration,
) -> Result<StopOutcome, ProcessError> {
    let pid = process.id();
    process.terminate()?;
    match tokio::time::timeout(grace, process.wait()).await {
        Ok(Ok(exit)) => {
            info!("pid {:?} exited within grace window ({})", pid, exit);
            Ok(StopOutcome::Exited(exit))
        }
        Ok(Err(e)) => {
            warn!("lost track of pid {:?} while stopping ({:?}), sending kill", pid, e);
            let exit = process.kill().await?;
            Ok(StopOutcome::ForceKilled(exit))
        }
        Err(_elapsed) => {
            warn!(
                "pid {:?} did not exit within {:?}, sending kill",
                pid, grace
            );
            let exit = process.kill().await?;
            Ok(StopOutcome::ForceKilled(exit))
        }
    }
}
