//! Deployment tracker polling behaviour under a paused clock.

use std::sync::Arc;
use std::time::Duration;

use evolver_core::fakes::MemorySourceControl;
use evolver_core::{
    ActivityLog, CheckRun, CycleTiming, DeploymentCheck, DeploymentStatus, DeploymentTracker,
    RepositoryTarget,
};
use tokio::sync::{mpsc, watch};

fn tracker(repo: &Arc<MemorySourceControl>) -> DeploymentTracker {
    DeploymentTracker::new(
        repo.clone(),
        RepositoryTarget::new("acme", "site", "main"),
        &CycleTiming::default(),
    )
}

async fn track(tracker: &DeploymentTracker, sha: &str, log: &mut ActivityLog) -> DeploymentCheck {
    tracker.track(sha, log, &mut |_, _| {}).await
}

#[tokio::test(start_paused = true)]
async fn polling_stops_at_exactly_sixty_attempts() {
    let repo = Arc::new(MemorySourceControl::new().with_check_run_fallback(vec![CheckRun::pending()]));
    let mut log = ActivityLog::new();

    let started = tokio::time::Instant::now();
    let check = track(&tracker(&repo), "deadbeef", &mut log).await;

    assert_eq!(check.status, DeploymentStatus::TimedOut);
    assert_eq!(check.attempts, 60);
    assert_eq!(repo.calls().check_runs, 60);
    assert_eq!(started.elapsed(), Duration::from_secs(600));
    assert!(log.contains("timed out"));
}

#[tokio::test(start_paused = true)]
async fn commit_without_check_runs_times_out() {
    let repo = Arc::new(MemorySourceControl::new());
    let mut log = ActivityLog::new();

    let check = track(&tracker(&repo), "deadbeef", &mut log).await;

    assert_eq!(check.status, DeploymentStatus::TimedOut);
    assert_eq!(check.progress, 0);
    assert_eq!(repo.calls().check_runs, 60);
}

#[tokio::test(start_paused = true)]
async fn failed_conclusion_is_reported() {
    let repo = Arc::new(
        MemorySourceControl::new()
            .with_check_runs(vec![CheckRun::pending()])
            .with_check_runs(vec![CheckRun::completed("failure"), CheckRun::completed("success")]),
    );
    let (restart_tx, mut restart_rx) = mpsc::channel(1);
    let mut log = ActivityLog::new();

    let check = track(&tracker(&repo).with_restart(restart_tx), "deadbeef", &mut log).await;

    assert_eq!(
        check.status,
        DeploymentStatus::Failed {
            conclusion: "failure".to_string()
        }
    );
    assert_eq!(check.attempts, 2);
    assert!(log.contains("Deployment Failed: failure"));
    assert!(restart_rx.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn poll_error_counts_as_attempt() {
    let repo = Arc::new(
        MemorySourceControl::new()
            .with_check_run_failure("502 Bad Gateway")
            .with_check_runs(vec![CheckRun::completed("success")]),
    );
    let mut log = ActivityLog::new();

    let check = track(&tracker(&repo), "deadbeef", &mut log).await;

    assert_eq!(check.status, DeploymentStatus::Success);
    assert_eq!(check.attempts, 2);
}

#[tokio::test(start_paused = true)]
async fn progress_is_reported_after_every_poll() {
    let repo = Arc::new(
        MemorySourceControl::new()
            .with_check_runs(vec![])
            .with_check_runs(vec![CheckRun::pending()])
            .with_check_runs(vec![CheckRun::completed("success")]),
    );
    let mut log = ActivityLog::new();
    let mut seen = Vec::new();

    tracker(&repo)
        .track("deadbeef", &mut log, &mut |check, _| {
            seen.push((check.attempts, check.progress))
        })
        .await;

    assert_eq!(seen, [(1, 0), (2, 50), (3, 100)]);
}

#[tokio::test(start_paused = true)]
async fn halt_stops_future_polls() {
    let repo = Arc::new(MemorySourceControl::new().with_check_run_fallback(vec![CheckRun::pending()]));
    let (halt_tx, halt_rx) = watch::channel(false);
    let tracker = tracker(&repo).with_halt(halt_rx);

    let handle = tokio::spawn(async move {
        let mut log = ActivityLog::new();
        let check = tracker.track("deadbeef", &mut log, &mut |_, _| {}).await;
        (check, log)
    });

    tokio::time::sleep(Duration::from_secs(25)).await;
    halt_tx.send(true).unwrap();
    let (check, log) = handle.await.unwrap();

    assert_eq!(check.status, DeploymentStatus::Cancelled);
    assert_eq!(check.attempts, 2);
    assert_eq!(repo.calls().check_runs, 2);
    assert!(log.contains("cancelled"));
}
