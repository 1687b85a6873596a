//! Scheduling policies.
//!
//! A policy answers two questions at every quantum boundary: which pending
//! job runs next, and for how long. It may read `resource_usage` and
//! `accumulated_run_time` but never changes queue state.

use super::job::Job;
use rand::distr::weighted::WeightedIndex;
use rand::distr::Distribution;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

pub trait Policy: Send {
    /// Index into `pending` of the job to run. `pending` is never empty.
    fn select_next(&mut self, pending: &[Job]) -> usize;

    /// Length of the next quantum, given the jobs left waiting after the
    /// selected one was removed. Must be strictly positive.
    fn quantum_length(&self, remaining: &[Job]) -> Duration;
}

/// Always picks the head of the queue. With requeue-at-back this rotates
/// through the jobs in order.
#[derive(Debug, Clone)]
pub struct RoundRobin {
    quantum: Duration,
}

impl RoundRobin {
    pub fn new(quantum: Duration) -> Self {
        Self { quantum }
    }
}

impl Policy for RoundRobin {
    fn select_next(&mut self, _pending: &[Job]) -> usize {
        0
    }

    fn quantum_length(&self, _remaining: &[Job]) -> Duration {
        self.quantum
    }
}

/// Lottery where each job holds tickets in proportion to its last
/// observed memory usage.
///
/// Until every pending job has been measured at least once the draw is
/// uniform, otherwise unmeasured jobs would never win.
pub struct MemoryLottery {
    quantum: Duration,
    rng: StdRng,
}

impl MemoryLottery {
    pub fn new(quantum: Duration, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self { quantum, rng }
    }
}

impl Policy for MemoryLottery {
    fn select_next(&mut self, pending: &[Job]) -> usize {
        if pending.len() > 1 && pending.iter().all(Job::is_measured) {
            let weights = pending.iter().map(|job| job.resource_usage);
            // All weights are positive here, so construction cannot fail.
            if let Ok(dist) = WeightedIndex::new(weights) {
                let pick = dist.sample(&mut self.rng);
                debug!(
                    "lottery tickets {:?}, winner {}",
                    pending.iter().map(|j| j.resource_usage).collect::<Vec<_>>(),
                    pick
                );
                return pick;
            }
        }
        self.rng.random_range(0..pending.len())
    }

    fn quantum_length(&self, _remaining: &[Job]) -> Duration {
        self.quantum
    }
}

/// A policy built from two closures.
pub struct FnPolicy<S, Q> {
    select: S,
    quantum: Q,
}

impl<S, Q> FnPolicy<S, Q>
where
    S: FnMut(&[Job]) -> usize + Send,
    Q: Fn(&[Job]) -> Duration + Send,
{
    pub fn new(select: S, quantum: Q) -> Self {
        Self { select, quantum }
    }
}

impl<S, Q> Policy for FnPolicy<S, Q>
where
    S: FnMut(&[Job]) -> usize + Send,
    Q: Fn(&[Job]) -> Duration + Send,
{
    fn select_next(&mut self, pending: &[Job]) -> usize {
        (self.select)(pending)
    }

    fn quantum_length(&self, remaining: &[Job]) -> Duration {
        (self.quantum)(remaining)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyType {
    RoundRobin,
    MemoryLottery,
}

pub struct PolicyFactory;

impl PolicyFactory {
    pub fn get_policy(
        policy_type: PolicyType,
        quantum: Duration,
        seed: Option<u64>,
    ) -> Box<dyn Policy> {
        match policy_type {
            PolicyType::RoundRobin => Box::new(RoundRobin::new(quantum)),
            PolicyType::MemoryLottery => Box::new(MemoryLottery::new(quantum, seed)),
        }
    }
}
