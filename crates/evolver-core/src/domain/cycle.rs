//! Orchestrator phases, per-run counters and cycle outcomes.

use serde::{Deserialize, Serialize};

use crate::deployment::DeploymentStatus;

/// Phase of the mutation state machine.
///
/// `Idle` is both the initial and the terminal phase of every cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CyclePhase {
    Idle,
    Questioning,
    Answering,
    Deciding,
    Analyzing,
    Mutating,
    Committing,
    Deploying,
}

impl CyclePhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            CyclePhase::Idle => "IDLE",
            CyclePhase::Questioning => "QUESTIONING",
            CyclePhase::Answering => "ANSWERING",
            CyclePhase::Deciding => "DECIDING",
            CyclePhase::Analyzing => "ANALYZING",
            CyclePhase::Mutating => "MUTATING",
            CyclePhase::Committing => "COMMITTING",
            CyclePhase::Deploying => "DEPLOYING",
        }
    }
}

impl std::fmt::Display for CyclePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State carried by one orchestrator across cycles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleState {
    pub phase: CyclePhase,
    /// Completed cycles. Starts at 0 and only ever increases.
    pub cycle: u64,
    /// Self-dialogue confidence in `[0, 1]`; never decreases within a run.
    pub resonance: f64,
    /// Mutations committed to the target.
    pub mutations: u64,
}

impl CycleState {
    pub const RESONANCE_STEP: f64 = 0.1;

    pub fn new() -> Self {
        Self {
            phase: CyclePhase::Idle,
            cycle: 0,
            resonance: 0.0,
            mutations: 0,
        }
    }

    /// Raise resonance by one step, saturating at 1.0.
    pub fn raise_resonance(&mut self) {
        self.resonance = (self.resonance + Self::RESONANCE_STEP).min(1.0);
    }
}

impl Default for CycleState {
    fn default() -> Self {
        Self::new()
    }
}

/// How a single cycle ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CycleOutcome {
    /// Questioning or answering failed; the cycle counter is not advanced.
    DialogueAborted { phase: CyclePhase, reason: String },
    /// The model did not answer YES.
    Declined,
    /// No file survived the eligibility filter.
    NoEligibleTarget,
    /// The model output failed the sanity checks.
    NoImprovement { path: String },
    /// An external call after the decision failed.
    Aborted { phase: CyclePhase, reason: String },
    /// A mutation was committed and tracked to a terminal deployment status.
    Deployed {
        path: String,
        commit_sha: String,
        status: DeploymentStatus,
    },
}

impl CycleOutcome {
    /// Whether this outcome counts toward the cycle counter.
    pub fn advances_cycle(&self) -> bool {
        !matches!(self, CycleOutcome::DialogueAborted { .. })
    }

    /// Snake-case tag, as serialized.
    pub fn kind(&self) -> &'static str {
        match self {
            CycleOutcome::DialogueAborted { .. } => "dialogue_aborted",
            CycleOutcome::Declined => "declined",
            CycleOutcome::NoEligibleTarget => "no_eligible_target",
            CycleOutcome::NoImprovement { .. } => "no_improvement",
            CycleOutcome::Aborted { .. } => "aborted",
            CycleOutcome::Deployed { .. } => "deployed",
        }
    }

    pub fn committed(&self) -> bool {
        matches!(self, CycleOutcome::Deployed { .. })
    }
}
