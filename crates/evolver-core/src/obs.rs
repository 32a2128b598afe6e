//! Structured lifecycle events for the evolution loop.
//!
//! Every function emits one `tracing` record tagged with an `event` field so
//! log pipelines can filter on it. The human-readable activity log is separate.

use tracing::{info, warn};

use crate::domain::CyclePhase;

/// The `evolver.cycle` span. Attach with `Instrument::instrument`, since a
/// cycle suspends across many awaits.
pub fn cycle_span(cycle: u64) -> tracing::Span {
    tracing::info_span!("evolver.cycle", cycle = cycle)
}

pub fn emit_cycle_started(cycle: u64) {
    info!(event = "cycle.started", cycle = cycle);
}

pub fn emit_phase_entered(cycle: u64, phase: CyclePhase) {
    info!(event = "cycle.phase", cycle = cycle, phase = %phase);
}

pub fn emit_decision(cycle: u64, affirmative: bool) {
    info!(event = "cycle.decision", cycle = cycle, affirmative = affirmative);
}

pub fn emit_commit_created(path: &str, sha: &str) {
    info!(event = "commit.created", path = %path, sha = %sha);
}

/// One deployment status poll.
pub fn emit_deployment_polled(sha: &str, attempt: u32, progress: u8) {
    info!(
        event = "deployment.polled",
        sha = %sha,
        attempt = attempt,
        progress = progress,
    );
}

pub fn emit_deployment_finished(sha: &str, status: &str, attempts: u32) {
    info!(
        event = "deployment.finished",
        sha = %sha,
        status = %status,
        attempts = attempts,
    );
}

/// Cycle reached its exit point; `outcome` is the snake_case outcome tag.
pub fn emit_cycle_finished(cycle: u64, outcome: &str, committed: bool) {
    info!(
        event = "cycle.finished",
        cycle = cycle,
        outcome = %outcome,
        committed = committed,
    );
}

pub fn emit_upstream_error(phase: CyclePhase, error: &dyn std::fmt::Display) {
    warn!(event = "cycle.upstream_error", phase = %phase, error = %error);
}
