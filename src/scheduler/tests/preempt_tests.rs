use super::mocks::{job, Behavior, EventKind, ScriptedLauncher};
use crate::process::{stop_with_grace, Launcher, ProcessError, StopOutcome, DEFAULT_GRACE};
use std::time::Duration;
use tokio::time::Instant;

#[tokio::test(start_paused = true)]
async fn test_exit_within_grace() {
    let (launcher, events) = ScriptedLauncher::new(&[("a", Behavior::ExitOnTerm)]);
    let mut handle = launcher.launch(&job("a")).unwrap();
    let start = Instant::now();
    let outcome = stop_with_grace(&mut *handle, DEFAULT_GRACE).await.unwrap();
    assert!(matches!(outcome, StopOutcome::Exited(_)));
    assert_eq!(outcome.exit().signal, Some(15));
    assert_eq!(start.elapsed(), Duration::ZERO);
    assert!(!events.lock().iter().any(|e| e.kind == EventKind::Killed));
}

#[tokio::test(start_paused = true)]
async fn test_finishing_process_keeps_its_exit_code() {
    let (launcher, _events) =
        ScriptedLauncher::new(&[("a", Behavior::FinishAfter(Duration::from_secs(5)))]);
    let mut handle = launcher.launch(&job("a")).unwrap();
    tokio::time::sleep(Duration::from_secs(6)).await;
    let outcome = stop_with_grace(&mut *handle, DEFAULT_GRACE).await.unwrap();
    assert_eq!(outcome, StopOutcome::Exited(crate::process::ExitSummary::code(0)));
}

#[tokio::test(start_paused = true)]
async fn test_ignored_signal_killed_after_grace() {
    let (launcher, events) = ScriptedLauncher::new(&[("a", Behavior::IgnoreTerm)]);
    let mut handle = launcher.launch(&job("a")).unwrap();
    let outcome = stop_with_grace(&mut *handle, DEFAULT_GRACE).await.unwrap();
    assert!(matches!(outcome, StopOutcome::ForceKilled(_)));

    let log = events.lock();
    let term = log.iter().find(|e| e.kind == EventKind::Terminated).unwrap();
    let kill = log.iter().find(|e| e.kind == EventKind::Killed).unwrap();
    assert_eq!(kill.at - term.at, DEFAULT_GRACE);
}

#[tokio::test(start_paused = true)]
async fn test_short_grace() {
    let grace = Duration::from_millis(250);
    let (launcher, _events) = ScriptedLauncher::new(&[("a", Behavior::IgnoreTerm)]);
    let mut handle = launcher.launch(&job("a")).unwrap();
    let start = Instant::now();
    let outcome = stop_with_grace(&mut *handle, grace).await.unwrap();
    assert!(matches!(outcome, StopOutcome::ForceKilled(_)));
    assert_eq!(start.elapsed(), grace);
}

#[tokio::test(start_paused = true)]
async fn test_failed_kill_is_an_error() {
    let (launcher, _events) = ScriptedLauncher::new(&[("a", Behavior::Unkillable)]);
    let mut handle = launcher.launch(&job("a")).unwrap();
    let err = stop_with_grace(&mut *handle, DEFAULT_GRACE)
        .await
        .unwrap_err();
    assert!(matches!(err, ProcessError::KillUnconfirmed(_)));
}
