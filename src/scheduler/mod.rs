pub mod error;
pub mod job;
pub mod policy;
pub mod state;
pub mod work_queue;

#[cfg(test)]
mod tests;

pub use error::SchedulerError;
pub use job::Job;
pub use policy::{FnPolicy, MemoryLottery, Policy, PolicyFactory, PolicyType, RoundRobin};
pub use state::{JobState, Lifecycle};
pub use work_queue::{Clock, QuantumOutcome, RunSummary, SystemClock, WorkQueue};
