//! Lifecycle of a job while it is in flight.
//!
//! ```text
//! Queued -> Launching -> Running -> Exited{natural} -> Retired
//!                           |
//!                           +-> Stopping -> Exited -------> Requeued -> Queued
//!                                    |                        ^
//!                                    +-> ForceKilled ---------+
//! ```
//!
//! A process that had already exited when its quantum ended is finished and
//! retires. A process that was still alive is preempted and always requeued,
//! even when it exits right after the graceful signal.

use super::error::SchedulerError;
use std::fmt;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Queued,
    Launching,
    Running,
    Stopping,
    /// Process exited. `natural` is true when it finished before the
    /// quantum ended, false when it exited inside the grace window.
    Exited {
        natural: bool,
    },
    ForceKilled,
    Requeued,
    Retired,
}

impl JobState {
    #[must_use]
    pub fn can_transition_to(self, next: JobState) -> bool {
        use JobState::*;
        matches!(
            (self, next),
            (Queued, Launching)
                | (Launching, Running)
                | (Running, Exited { natural: true })
                | (Running, Stopping)
                | (Stopping, Exited { natural: false })
                | (Stopping, ForceKilled)
                | (Exited { natural: true }, Retired)
                | (Exited { natural: false }, Requeued)
                | (ForceKilled, Requeued)
                | (Requeued, Queued)
        )
    }

    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Retired)
    }

    /// Short phase name used in log lines and fatal error messages.
    #[must_use]
    pub fn phase(self) -> &'static str {
        match self {
            JobState::Queued => "queued",
            JobState::Launching => "launching",
            JobState::Running => "running",
            JobState::Stopping => "stopping",
            JobState::Exited { natural: true } => "finished",
            JobState::Exited { natural: false } => "exited",
            JobState::ForceKilled => "force-killed",
            JobState::Requeued => "requeued",
            JobState::Retired => "retired",
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.phase())
    }
}

/// State tracker for the one job the loop currently drives.
#[derive(Debug)]
pub struct Lifecycle {
    job: String,
    state: JobState,
    /// How the process left `Running`: `Exited` or `ForceKilled`
    stop: Option<JobState>,
}

impl Lifecycle {
    pub fn new(job: impl Into<String>) -> Self {
        Self {
            job: job.into(),
            state: JobState::Queued,
            stop: None,
        }
    }

    #[must_use]
    pub fn state(&self) -> JobState {
        self.state
    }

    /// The exit state reached before requeue or retirement, if any.
    #[must_use]
    pub fn stop_state(&self) -> Option<JobState> {
        self.stop
    }

    pub fn advance(&mut self, next: JobState) -> Result<(), SchedulerError> {
        if !self.state.can_transition_to(next) {
            return Err(SchedulerError::InvalidTransition {
                job: self.job.clone(),
                from: self.state,
                to: next,
            });
        }
        debug!("job {} {} -> {}", self.job, self.state, next);
        if matches!(next, JobState::Exited { .. } | JobState::ForceKilled) {
            self.stop = Some(next);
        }
        self.state = next;
        Ok(())
    }
}
