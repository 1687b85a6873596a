#![warn(clippy::cast_lossless)]
//! Cooperative time-slicing of long-running training jobs.
//!
//! Jobs are external commands. A [`scheduler::WorkQueue`] repeatedly asks a
//! [`scheduler::Policy`] which job runs next and for how long, runs it for
//! that quantum, samples device telemetry, appends a row to the time series
//! and then either retires the job or preempts it and puts it back in line.

pub mod analysis;
pub mod config;
pub mod process;
pub mod scheduler;
pub mod telemetry;
pub mod timeseries;

pub use config::{ConfigError, RunConfig};
pub use scheduler::{Job, Policy, RunSummary, SchedulerError, WorkQueue};
