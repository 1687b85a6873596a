//! The schedulable unit of work.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// One long-running external workload.
///
/// A job is created once from configuration and only mutated by the
/// work queue between quanta.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    /// Identifier, unique within a run
    pub name: String,

    /// Program followed by its arguments. Never interpreted by the scheduler.
    pub command: Vec<String>,

    /// Last observed memory footprint in bytes, 0 when never measured
    #[serde(default)]
    pub resource_usage: u64,

    /// Sum of every quantum granted so far
    #[serde(default)]
    pub accumulated_run_time: Duration,
}

impl Job {
    /// Create a job that has never run.
    #[must_use]
    pub fn new(name: impl Into<String>, command: Vec<String>) -> Self {
        Self {
            name: name.into(),
            command,
            resource_usage: 0,
            accumulated_run_time: Duration::ZERO,
        }
    }

    /// Whether memory usage has been observed at least once.
    #[must_use]
    pub fn is_measured(&self) -> bool {
        self.resource_usage > 0
    }

    pub(crate) fn grant(&mut self, quantum: Duration) {
        self.accumulated_run_time += quantum;
    }

    /// Record a new measurement; zero readings keep the previous value.
    pub(crate) fn observe_usage(&mut self, bytes: u64) {
        if bytes > 0 {
            self.resource_usage = bytes;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_job_is_unmeasured() {
        let job = Job::new("gpt2-small", vec!["python".into(), "train.py".into()]);
        assert_eq!(job.resource_usage, 0);
        assert_eq!(job.accumulated_run_time, Duration::ZERO);
        assert!(!job.is_measured());
    }

    #[test]
    fn test_grant_accumulates() {
        let mut job = Job::new("a", vec!["true".into()]);
        job.grant(Duration::from_secs(120));
        job.grant(Duration::from_secs(30));
        assert_eq!(job.accumulated_run_time, Duration::from_secs(150));
    }

    #[test]
    fn test_zero_observation_keeps_previous() {
        let mut job = Job::new("a", vec!["true".into()]);
        job.observe_usage(0);
        assert!(!job.is_measured());
        job.observe_usage(4096);
        job.observe_usage(0);
        assert_eq!(job.resource_usage, 4096);
    }
}
