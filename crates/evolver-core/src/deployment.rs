//! Deployment tracking for a committed mutation.
//!
//! A [`DeploymentTracker`] polls the check runs of one commit on a fixed
//! interval until they reach a terminal conclusion, the attempt ceiling is
//! hit, or the loop is halted. A successful deployment sends a
//! [`RestartRequest`] to the host process.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};
use tracing::{debug, warn};

use crate::activity_log::{ActivityLog, LogKind};
use crate::config::CycleTiming;
use crate::domain::{EvolverError, RepositoryTarget};
use crate::metrics::METRICS;
use crate::obs;
use crate::source_control::{CheckRun, SourceControl};

/// Status of one tracking session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum DeploymentStatus {
    Pending,
    Success,
    Failed { conclusion: String },
    TimedOut,
    /// Tracking stopped by a halt before a terminal conclusion.
    Cancelled,
}

impl DeploymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeploymentStatus::Pending => "pending",
            DeploymentStatus::Success => "success",
            DeploymentStatus::Failed { .. } => "failed",
            DeploymentStatus::TimedOut => "timed_out",
            DeploymentStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, DeploymentStatus::Pending)
    }
}

/// Why the host process is asked to restart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartReason {
    DeploymentSucceeded,
    PulledLatest,
}

/// Sent to the host when a new revision should be picked up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestartRequest {
    pub reason: RestartReason,
    pub commit_sha: String,
}

/// Poll state for one commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentCheck {
    pub sha: String,
    pub attempts: u32,
    pub status: DeploymentStatus,
    /// Coarse progress: 0 before any run is seen, 50 while running, 100 once completed.
    pub progress: u8,
}

impl DeploymentCheck {
    pub fn new(sha: impl Into<String>) -> Self {
        Self {
            sha: sha.into(),
            attempts: 0,
            status: DeploymentStatus::Pending,
            progress: 0,
        }
    }

    /// Fold the most recent check run into the status.
    pub fn observe(&mut self, latest: Option<&CheckRun>) {
        let Some(run) = latest else {
            return;
        };
        if !run.is_completed() {
            self.progress = 50;
            return;
        }
        self.progress = 100;
        self.status = if run.succeeded() {
            DeploymentStatus::Success
        } else {
            DeploymentStatus::Failed {
                conclusion: run
                    .conclusion
                    .clone()
                    .unwrap_or_else(|| "unknown".to_string()),
            }
        };
    }
}

pub struct DeploymentTracker {
    source_control: Arc<dyn SourceControl>,
    target: RepositoryTarget,
    poll_interval: Duration,
    max_attempts: u32,
    halt: Option<watch::Receiver<bool>>,
    restart: Option<mpsc::Sender<RestartRequest>>,
}

impl DeploymentTracker {
    pub fn new(
        source_control: Arc<dyn SourceControl>,
        target: RepositoryTarget,
        timing: &CycleTiming,
    ) -> Self {
        Self {
            source_control,
            target,
            poll_interval: timing.poll_interval,
            max_attempts: timing.max_poll_attempts,
            halt: None,
            restart: None,
        }
    }

    /// Stop polling once the receiver observes `true`.
    pub fn with_halt(mut self, halt: watch::Receiver<bool>) -> Self {
        self.halt = Some(halt);
        self
    }

    pub fn with_restart(mut self, restart: mpsc::Sender<RestartRequest>) -> Self {
        self.restart = Some(restart);
        self
    }

    /// Track `sha` to a terminal status.
    ///
    /// The first poll happens one interval after the call. A failed poll
    /// counts as an attempt and leaves the check pending. `on_poll` sees the
    /// check and the log after every poll.
    pub async fn track(
        &self,
        sha: &str,
        log: &mut ActivityLog,
        on_poll: &mut (dyn FnMut(&DeploymentCheck, &ActivityLog) + Send),
    ) -> DeploymentCheck {
        let mut check = DeploymentCheck::new(sha);
        let mut halt = self.halt.clone();

        loop {
            if check.attempts >= self.max_attempts {
                check.status = DeploymentStatus::TimedOut;
                let timeout = EvolverError::DeploymentTimedOut {
                    sha: sha.to_string(),
                    attempts: check.attempts,
                };
                warn!(error = %timeout, "deployment tracking gave up");
                log.record(
                    LogKind::Warning,
                    "Deployment timed out. Please check GitHub Actions.",
                );
                METRICS.inc_deployments_timed_out();
                break;
            }

            if !wait_for_next_poll(self.poll_interval, halt.as_mut()).await {
                check.status = DeploymentStatus::Cancelled;
                log.record(LogKind::Warning, "Deployment tracking cancelled by halt");
                break;
            }

            check.attempts += 1;
            match self.source_control.check_runs(&self.target, sha).await {
                Ok(runs) => check.observe(runs.first()),
                Err(e) => {
                    debug!(sha = %sha, attempt = check.attempts, error = %e, "check-run poll failed");
                }
            }
            obs::emit_deployment_polled(sha, check.attempts, check.progress);

            match &check.status {
                DeploymentStatus::Success => {
                    log.record(
                        LogKind::Success,
                        "Deployment successful! Restarting to load the new revision...",
                    );
                    METRICS.inc_deployments_succeeded();
                    self.request_restart(sha).await;
                }
                DeploymentStatus::Failed { conclusion } => {
                    log.record(LogKind::Error, format!("Deployment Failed: {conclusion}"));
                    METRICS.inc_deployments_failed();
                }
                _ => {}
            }

            on_poll(&check, log);
            if check.status.is_terminal() {
                break;
            }
        }

        obs::emit_deployment_finished(sha, check.status.as_str(), check.attempts);
        check
    }

    async fn request_restart(&self, sha: &str) {
        let Some(restart) = &self.restart else {
            return;
        };
        let request = RestartRequest {
            reason: RestartReason::DeploymentSucceeded,
            commit_sha: sha.to_string(),
        };
        if restart.send(request).await.is_err() {
            debug!(sha = %sha, "restart receiver dropped");
        }
    }
}

/// Sleep one interval. Returns `false` if a halt is (or becomes) active.
async fn wait_for_next_poll(interval: Duration, halt: Option<&mut watch::Receiver<bool>>) -> bool {
    let Some(halt) = halt else {
        tokio::time::sleep(interval).await;
        return true;
    };
    if *halt.borrow() {
        return false;
    }

    let sleep = tokio::time::sleep(interval);
    tokio::pin!(sleep);
    loop {
        tokio::select! {
            _ = &mut sleep => return !*halt.borrow(),
            changed = halt.changed() => {
                if changed.is_err() {
                    // Halt sender gone; nobody can stop us any more.
                    (&mut sleep).await;
                    return true;
                }
                if *halt.borrow() {
                    return false;
                }
            }
        }
    }
}
