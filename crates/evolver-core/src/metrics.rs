//! Process-wide counters for the evolution loop.
//!
//! Call sites increment silently; [`Metrics::flush`] reports everything in
//! one `info!` record, typically once per cycle.

use std::sync::atomic::{AtomicU64, Ordering};

pub static METRICS: Metrics = Metrics::new();

pub struct Metrics {
    cycles_completed: AtomicU64,
    mutations_committed: AtomicU64,
    deployments_succeeded: AtomicU64,
    deployments_failed: AtomicU64,
    deployments_timed_out: AtomicU64,
    upstream_failures: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Plain copy of the counters at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MetricsSnapshot {
    pub cycles_completed: u64,
    pub mutations_committed: u64,
    pub deployments_succeeded: u64,
    pub deployments_failed: u64,
    pub deployments_timed_out: u64,
    pub upstream_failures: u64,
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            cycles_completed: AtomicU64::new(0),
            mutations_committed: AtomicU64::new(0),
            deployments_succeeded: AtomicU64::new(0),
            deployments_failed: AtomicU64::new(0),
            deployments_timed_out: AtomicU64::new(0),
            upstream_failures: AtomicU64::new(0),
        }
    }

    fn bump(counter: &AtomicU64, name: &'static str) {
        counter.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = name, "counter incremented");
    }

    pub fn inc_cycles(&self) {
        Self::bump(&self.cycles_completed, "cycles_completed");
    }

    pub fn inc_mutations(&self) {
        Self::bump(&self.mutations_committed, "mutations_committed");
    }

    pub fn inc_deployments_succeeded(&self) {
        Self::bump(&self.deployments_succeeded, "deployments_succeeded");
    }

    pub fn inc_deployments_failed(&self) {
        Self::bump(&self.deployments_failed, "deployments_failed");
    }

    pub fn inc_deployments_timed_out(&self) {
        Self::bump(&self.deployments_timed_out, "deployments_timed_out");
    }

    pub fn inc_upstream_failures(&self) {
        Self::bump(&self.upstream_failures, "upstream_failures");
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            cycles_completed: self.cycles_completed.load(Ordering::Relaxed),
            mutations_committed: self.mutations_committed.load(Ordering::Relaxed),
            deployments_succeeded: self.deployments_succeeded.load(Ordering::Relaxed),
            deployments_failed: self.deployments_failed.load(Ordering::Relaxed),
            deployments_timed_out: self.deployments_timed_out.load(Ordering::Relaxed),
            upstream_failures: self.upstream_failures.load(Ordering::Relaxed),
        }
    }

    /// Emit all counters as a single `info!` event.
    pub fn flush(&self) {
        let s = self.snapshot();
        tracing::info!(
            metric = "flush",
            cycles_completed = s.cycles_completed,
            mutations_committed = s.mutations_committed,
            deployments_succeeded = s.deployments_succeeded,
            deployments_failed = s.deployments_failed,
            deployments_timed_out = s.deployments_timed_out,
            upstream_failures = s.upstream_failures,
        );
    }

    /// Reset all counters to zero (tests only).
    pub fn reset(&self) {
        for counter in [
            &self.cycles_completed,
            &self.mutations_committed,
            &self.deployments_succeeded,
            &self.deployments_failed,
            &self.deployments_timed_out,
            &self.upstream_failures,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}
