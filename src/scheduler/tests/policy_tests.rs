use super::mocks::job;
use crate::scheduler::job::Job;
use crate::scheduler::policy::{
    FnPolicy, MemoryLottery, Policy, PolicyFactory, PolicyType, RoundRobin,
};
use std::time::Duration;

const Q: Duration = Duration::from_secs(120);
const DRAWS: usize = 10_000;
const TOLERANCE: f64 = 0.02;

fn measured(name: &str, bytes: u64) -> Job {
    let mut j = job(name);
    j.resource_usage = bytes;
    j
}

fn frequency_of_first(policy: &mut dyn Policy, pending: &[Job]) -> f64 {
    let hits = (0..DRAWS)
        .filter(|_| policy.select_next(pending) == 0)
        .count();
    hits as f64 / DRAWS as f64
}

#[test]
fn test_round_robin_picks_head_with_constant_quantum() {
    let mut rr = RoundRobin::new(Q);
    let pending = vec![job("a"), job("b"), job("c")];
    assert_eq!(rr.select_next(&pending), 0);
    assert_eq!(rr.quantum_length(&pending[1..]), Q);
    assert_eq!(rr.quantum_length(&[]), Q);
}

#[test]
fn test_lottery_converges_to_memory_share() {
    let mut lottery = MemoryLottery::new(Q, Some(42));
    let pending = vec![measured("big", 300), measured("small", 100)];
    let freq = frequency_of_first(&mut lottery, &pending);
    assert!(
        (freq - 0.75).abs() < TOLERANCE,
        "big job selected with frequency {freq}"
    );
}

#[test]
fn test_lottery_is_uniform_until_all_measured() {
    let mut lottery = MemoryLottery::new(Q, Some(7));
    // One measured job would otherwise win every draw.
    let pending = vec![measured("a", 1 << 30), job("b")];
    let freq = frequency_of_first(&mut lottery, &pending);
    assert!((freq - 0.5).abs() < TOLERANCE, "frequency {freq}");
}

#[test]
fn test_lottery_is_reproducible_with_seed() {
    let pending = vec![measured("a", 10), measured("b", 20), measured("c", 30)];
    let mut first = MemoryLottery::new(Q, Some(1234));
    let mut second = MemoryLottery::new(Q, Some(1234));
    let a: Vec<usize> = (0..100).map(|_| first.select_next(&pending)).collect();
    let b: Vec<usize> = (0..100).map(|_| second.select_next(&pending)).collect();
    assert_eq!(a, b);
    assert!(a.iter().all(|&i| i < pending.len()));
}

#[test]
fn test_lottery_single_job() {
    let mut lottery = MemoryLottery::new(Q, None);
    assert_eq!(lottery.select_next(&[job("only")]), 0);
    assert_eq!(lottery.quantum_length(&[]), Q);
}

#[test]
fn test_fn_policy_delegates() {
    let mut policy = FnPolicy::new(
        |pending: &[Job]| pending.len() - 1,
        |remaining: &[Job]| Duration::from_secs(60 * (remaining.len() as u64 + 1)),
    );
    let pending = vec![job("a"), job("b")];
    assert_eq!(policy.select_next(&pending), 1);
    assert_eq!(policy.quantum_length(&pending[..1]), Duration::from_secs(120));
}

#[test]
fn test_policy_factory() {
    let pending = vec![job("a"), job("b")];
    let mut rr = PolicyFactory::get_policy(PolicyType::RoundRobin, Q, None);
    assert_eq!(rr.select_next(&pending), 0);

    let mut lottery = PolicyFactory::get_policy(PolicyType::MemoryLottery, Q, Some(3));
    assert!(lottery.select_next(&pending) < 2);
    assert_eq!(lottery.quantum_length(&pending), Q);
}

#[test]
fn test_policy_type_names() {
    let parsed: PolicyType = serde_json::from_str("\"memory_lottery\"").unwrap();
    assert_eq!(parsed, PolicyType::MemoryLottery);
    assert_eq!(
        serde_json::to_string(&PolicyType::RoundRobin).unwrap(),
        "\"round_robin\""
    );
}
