use super::state::JobState;
use crate::process::ProcessError;
use crate::timeseries::SinkError;
use std::time::Duration;

/// Fatal run errors.
///
/// Every variant aborts the run. The message always names the job and the
/// lifecycle phase it was in.
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("policy (selecting): selected index {index} but only {pending} jobs are pending")]
    PolicyIndexOutOfRange { index: usize, pending: usize },

    #[error("job {job} (queued): policy returned a non-positive quantum {quantum:?}")]
    NonPositiveQuantum { job: String, quantum: Duration },

    #[error("job {job} (launching): failed to start")]
    Launch {
        job: String,
        #[source]
        source: ProcessError,
    },

    #[error("job {job} ({phase}): process control failed")]
    Process {
        job: String,
        phase: JobState,
        #[source]
        source: ProcessError,
    },

    #[error("job {job} (recording): time-series write failed")]
    Sink {
        job: String,
        #[source]
        source: SinkError,
    },

    #[error("job {job}: invalid lifecycle transition {from} -> {to}")]
    InvalidTransition {
        job: String,
        from: JobState,
        to: JobState,
    },
}
