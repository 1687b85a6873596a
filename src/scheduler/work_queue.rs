//! The scheduling loop.
//!
//! Each iteration runs exactly one quantum of one job:
//!
//! 1. ask the policy for the next job and remove it from the pending set
//! 2. ask the policy for the quantum length, seeing only the remaining jobs
//! 3. launch the job's command and sleep for the quantum
//! 4. account the quantum, capture telemetry, append and flush one record
//! 5. retire the job if its process already exited, otherwise stop it
//!    (signal, grace window, kill) and requeue it at the back
//!
//! The sleep in step 3 and the grace wait in step 5 are the only points where
//! the loop yields. Nothing is launched until the previous process is
//! confirmed dead.

use super::error::SchedulerError;
use super::job::Job;
use super::policy::Policy;
use super::state::{JobState, Lifecycle};
use crate::process::{stop_with_grace, ExitSummary, Launcher, StopOutcome, DEFAULT_GRACE};
use crate::telemetry::TelemetryProbe;
use crate::timeseries::{RecordSink, TimeSeriesRecord};
use std::collections::VecDeque;
use std::time::Duration;
use tracing::{debug, info};

/// Source of record timestamps.
pub trait Clock: Send {
    /// Seconds since the Unix epoch.
    fn now_secs(&self) -> i64;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_secs(&self) -> i64 {
        chrono::Utc::now().timestamp()
    }
}

/// What happened to a job during one quantum.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuantumOutcome {
    pub job_name: String,
    pub quantum: Duration,
    pub accumulated_run_time: Duration,
    /// `Exited { natural }` or `ForceKilled`
    pub stopped: JobState,
    pub exit: ExitSummary,
    /// `Requeued` or `Retired`
    pub disposition: JobState,
}

impl QuantumOutcome {
    #[must_use]
    pub fn requeued(&self) -> bool {
        self.disposition == JobState::Requeued
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Every executed quantum, in order
    pub quanta: Vec<QuantumOutcome>,
    /// Job names in retirement order
    pub retired: Vec<String>,
    /// Jobs still pending when a quantum budget stopped the run
    pub unfinished: Vec<String>,
}

impl RunSummary {
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.unfinished.is_empty()
    }
}

pub struct WorkQueue {
    pending: VecDeque<Job>,
    policy: Box<dyn Policy>,
    launcher: Box<dyn Launcher>,
    probe: Box<dyn TelemetryProbe>,
    sink: Box<dyn RecordSink>,
    clock: Box<dyn Clock>,
    grace: Duration,
    max_quanta: Option<usize>,
}

impl WorkQueue {
    pub fn new(
        jobs: impl IntoIterator<Item = Job>,
        policy: Box<dyn Policy>,
        launcher: Box<dyn Launcher>,
        probe: Box<dyn TelemetryProbe>,
        sink: Box<dyn RecordSink>,
    ) -> Self {
        Self {
            pending: jobs.into_iter().collect(),
            policy,
            launcher,
            probe,
            sink,
            clock: Box::new(SystemClock),
            grace: DEFAULT_GRACE,
            max_quanta: None,
        }
    }

    /// Set how long a signalled job may take to exit before it is killed.
    #[must_use]
    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    /// Stop after `max_quanta` quanta even if jobs remain.
    #[must_use]
    pub fn with_max_quanta(mut self, max_quanta: Option<usize>) -> Self {
        self.max_quanta = max_quanta;
        self
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Box<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn pending(&self) -> impl Iterator<Item = &Job> {
        self.pending.iter()
    }

    /// Run quanta until every job has retired or the quantum budget is spent.
    pub async fn run_to_completion(&mut self) -> Result<RunSummary, SchedulerError> {
        let mut summary = RunSummary::default();
        while !self.pending.is_empty() {
            if self
                .max_quanta
                .is_some_and(|limit| summary.quanta.len() >= limit)
            {
                info!(
                    "quantum budget of {} spent, stopping with {} jobs pending",
                    summary.quanta.len(),
                    self.pending.len()
                );
                break;
            }
            let outcome = self.run_quantum().await?;
            if !outcome.requeued() {
                summary.retired.push(outcome.job_name.clone());
            }
            summary.quanta.push(outcome);
        }
        summary.unfinished = self.pending.iter().map(|job| job.name.clone()).collect();
        info!(
            "run finished after {} quanta, {} retired, {} unfinished",
            summary.quanta.len(),
            summary.retired.len(),
            summary.unfinished.len()
        );
        Ok(summary)
    }

    async fn run_quantum(&mut self) -> Result<QuantumOutcome, SchedulerError> {
        info!("{} jobs pending", self.pending.len());
        let index = self.policy.select_next(self.pending.make_contiguous());
        let pending = self.pending.len();
        let mut job = self
            .pending
            .remove(index)
            .ok_or(SchedulerError::PolicyIndexOutOfRange { index, pending })?;

        let quantum = self.policy.quantum_length(self.pending.make_contiguous());
        if quantum.is_zero() {
            return Err(SchedulerError::NonPositiveQuantum {
                job: job.name,
                quantum,
            });
        }

        let mut lifecycle = Lifecycle::new(job.name.as_str());
        lifecycle.advance(JobState::Launching)?;
        info!("running {} for {:?}", job.name, quantum);
        let mut process = self
            .launcher
            .launch(&job)
            .map_err(|source| SchedulerError::Launch {
                job: job.name.clone(),
                source,
            })?;
        lifecycle.advance(JobState::Running)?;

        tokio::time::sleep(quantum).await;

        job.grant(quantum);
        let snapshot = self.probe.capture();
        job.observe_usage(snapshot.attributable_bytes());
        let record = TimeSeriesRecord {
            timestamp: self.clock.now_secs(),
            job_name: job.name.clone(),
            quantum,
            accumulated_run_time: job.accumulated_run_time,
            snapshot,
        };
        debug!("{:?}", record);
        self.sink
            .append(&record)
            .map_err(|source| SchedulerError::Sink {
                job: job.name.clone(),
                source,
            })?;

        let status = process
            .try_wait()
            .map_err(|source| SchedulerError::Process {
                job: job.name.clone(),
                phase: JobState::Running,
                source,
            })?;
        let exit = match status {
            Some(exit) => {
                info!("job {} finished ({})", job.name, exit);
                lifecycle.advance(JobState::Exited { natural: true })?;
                lifecycle.advance(JobState::Retired)?;
                exit
            }
            None => {
                lifecycle.advance(JobState::Stopping)?;
                let stopped = stop_with_grace(process.as_mut(), self.grace)
                    .await
                    .map_err(|source| SchedulerError::Process {
                        job: job.name.clone(),
                        phase: JobState::Stopping,
                        source,
                    })?;
                match stopped {
                    StopOutcome::Exited(_) => {
                        info!("job {} exited gracefully", job.name);
                        lifecycle.advance(JobState::Exited { natural: false })?;
                    }
                    StopOutcome::ForceKilled(_) => {
                        info!("job {} did not exit in time, killed", job.name);
                        lifecycle.advance(JobState::ForceKilled)?;
                    }
                }
                lifecycle.advance(JobState::Requeued)?;
                stopped.exit()
            }
        };

        let outcome = QuantumOutcome {
            job_name: job.name.clone(),
            quantum,
            accumulated_run_time: job.accumulated_run_time,
            stopped: lifecycle
                .stop_state()
                .unwrap_or(JobState::Exited { natural: true }),
            exit,
            disposition: lifecycle.state(),
        };
        if outcome.requeued() {
            lifecycle.advance(JobState::Queued)?;
            self.pending.push_back(job);
        }
        Ok(outcome)
    }
}
