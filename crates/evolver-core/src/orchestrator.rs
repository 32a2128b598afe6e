//! The mutation orchestrator: one self-dialogue, and possibly one committed
//! mutation, per cycle.
//!
//! Phases run strictly in sequence on the caller's task. Every external
//! failure ends the current cycle and is reported through the activity log;
//! nothing escapes [`MutationOrchestrator::run_cycle`].

use std::sync::Arc;

use knowledge_store::{DocumentFilter, KnowledgeStore};
use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tracing::Instrument;

use crate::activity_log::{ActivityLog, LogEntry, LogKind};
use crate::config::CycleTiming;
use crate::deployment::{DeploymentCheck, DeploymentStatus, DeploymentTracker, RestartRequest};
use crate::domain::{
    CycleOutcome, CyclePhase, CycleState, EvolverError, RepositoryTarget, Result, Upstream,
};
use crate::file_filter::{detect_language, eligible_files};
use crate::metrics::METRICS;
use crate::model_gateway::ModelGateway;
use crate::obs;
use crate::prompts;
use crate::ranker::retrieve_context;
use crate::source_control::{FileUpdate, SourceControl};

/// Number of knowledge documents embedded in a mutation prompt.
pub const CONTEXT_DOCUMENTS: usize = 3;
/// Model output at or below this many characters is rejected.
pub const MIN_MUTATION_LEN: usize = 10;

/// Read-only view of the orchestrator, published after every transition.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrchestratorSnapshot {
    pub phase: CyclePhase,
    pub cycle: u64,
    pub resonance: f64,
    pub mutations: u64,
    pub deployment: Option<DeploymentCheck>,
    pub running: bool,
    pub log: Vec<LogEntry>,
}

impl OrchestratorSnapshot {
    fn capture(
        state: &CycleState,
        running: bool,
        deployment: Option<&DeploymentCheck>,
        log: &ActivityLog,
    ) -> Self {
        Self {
            phase: state.phase,
            cycle: state.cycle,
            resonance: state.resonance,
            mutations: state.mutations,
            deployment: deployment.cloned(),
            running,
            log: log.to_vec(),
        }
    }
}

/// A committed change, before deployment tracking.
struct Commit {
    path: String,
    sha: String,
}

pub struct MutationOrchestrator {
    model: Arc<dyn ModelGateway>,
    source_control: Arc<dyn SourceControl>,
    knowledge: Arc<dyn KnowledgeStore>,
    target: RepositoryTarget,
    timing: CycleTiming,
    rng: Box<dyn RngCore + Send + Sync>,
    state: CycleState,
    log: ActivityLog,
    deployment: Option<DeploymentCheck>,
    running: bool,
    halt: Option<watch::Receiver<bool>>,
    restart: Option<mpsc::Sender<RestartRequest>>,
    snapshots: watch::Sender<OrchestratorSnapshot>,
}

impl MutationOrchestrator {
    pub fn new(
        model: Arc<dyn ModelGateway>,
        source_control: Arc<dyn SourceControl>,
        knowledge: Arc<dyn KnowledgeStore>,
        target: RepositoryTarget,
    ) -> Self {
        let state = CycleState::new();
        let log = ActivityLog::new();
        let (snapshots, _) =
            watch::channel(OrchestratorSnapshot::capture(&state, false, None, &log));
        Self {
            model,
            source_control,
            knowledge,
            target,
            timing: CycleTiming::default(),
            rng: Box::new(StdRng::from_entropy()),
            state,
            log,
            deployment: None,
            running: false,
            halt: None,
            restart: None,
            snapshots,
        }
    }

    pub fn with_timing(mut self, timing: CycleTiming) -> Self {
        self.timing = timing;
        self
    }

    /// Replace the source of randomness used for target selection.
    pub fn with_rng(mut self, rng: impl RngCore + Send + Sync + 'static) -> Self {
        self.rng = Box::new(rng);
        self
    }

    pub fn with_seed(self, seed: u64) -> Self {
        self.with_rng(StdRng::seed_from_u64(seed))
    }

    /// Deliver restart requests from successful deployments to `restart`.
    pub fn with_restart(mut self, restart: mpsc::Sender<RestartRequest>) -> Self {
        self.restart = Some(restart);
        self
    }

    /// Stop deployment polling once `halt` observes `true`.
    pub fn with_halt(mut self, halt: watch::Receiver<bool>) -> Self {
        self.halt = Some(halt);
        self
    }

    pub fn target(&self) -> &RepositoryTarget {
        &self.target
    }

    pub fn timing(&self) -> &CycleTiming {
        &self.timing
    }

    pub fn state(&self) -> &CycleState {
        &self.state
    }

    pub fn log(&self) -> &ActivityLog {
        &self.log
    }

    pub fn last_deployment(&self) -> Option<&DeploymentCheck> {
        self.deployment.as_ref()
    }

    pub fn subscribe(&self) -> watch::Receiver<OrchestratorSnapshot> {
        self.snapshots.subscribe()
    }

    pub fn snapshot(&self) -> OrchestratorSnapshot {
        OrchestratorSnapshot::capture(
            &self.state,
            self.running,
            self.deployment.as_ref(),
            &self.log,
        )
    }

    /// Record the run flag and an activity line for it.
    pub fn set_running(&mut self, running: bool) {
        self.running = running;
        if running {
            self.record(LogKind::Success, "Self-evolution sequence INITIALIZED");
        } else {
            self.record(LogKind::Warning, "Self-evolution sequence HALTED");
        }
    }

    /// Append to the activity log and publish.
    pub fn record(&mut self, kind: LogKind, message: impl Into<String>) {
        self.log.record(kind, message);
        self.publish();
    }

    fn publish(&self) {
        self.snapshots.send_replace(self.snapshot());
    }

    fn enter(&mut self, phase: CyclePhase) {
        self.state.phase = phase;
        if phase != CyclePhase::Idle {
            obs::emit_phase_entered(self.state.cycle, phase);
        }
        self.publish();
    }

    async fn pause(&self) {
        if !self.timing.dialogue_pause.is_zero() {
            tokio::time::sleep(self.timing.dialogue_pause).await;
        }
    }

    /// Run one full cycle and return to `Idle`.
    pub async fn run_cycle(&mut self) -> CycleOutcome {
        let cycle = self.state.cycle;
        let outcome = self.run_phases().instrument(obs::cycle_span(cycle)).await;

        if outcome.advances_cycle() {
            self.state.cycle += 1;
            METRICS.inc_cycles();
        }
        self.enter(CyclePhase::Idle);
        obs::emit_cycle_finished(cycle, outcome.kind(), outcome.committed());
        METRICS.flush();
        outcome
    }

    async fn run_phases(&mut self) -> CycleOutcome {
        obs::emit_cycle_started(self.state.cycle);

        self.enter(CyclePhase::Questioning);
        let question = match self.ask(prompts::QUESTION_PROMPT).await {
            Ok(q) => q,
            Err(e) => return self.dialogue_failed(CyclePhase::Questioning, e),
        };
        self.record(LogKind::Question, format!("AI PROBE: {question}"));
        self.pause().await;

        self.enter(CyclePhase::Answering);
        let answer = match self.ask(&prompts::answer_prompt(&question)).await {
            Ok(a) => a,
            Err(e) => return self.dialogue_failed(CyclePhase::Answering, e),
        };
        self.record(LogKind::Reflection, format!("AI SYNTHESIS: {answer}"));
        self.state.raise_resonance();
        self.pause().await;

        self.enter(CyclePhase::Deciding);
        let affirmative = match self
            .model
            .complete(&prompts::decision_prompt(&question, &answer))
            .await
        {
            Ok(reply) => prompts::is_affirmative(&reply),
            Err(e) => {
                METRICS.inc_upstream_failures();
                obs::emit_upstream_error(CyclePhase::Deciding, &e);
                self.record(LogKind::Warning, format!("Decision unavailable: {e}"));
                false
            }
        };
        obs::emit_decision(self.state.cycle, affirmative);
        if !affirmative {
            self.record(LogKind::Info, "Decision: hold. No mutation this cycle.");
            return CycleOutcome::Declined;
        }

        self.record(LogKind::Evolution, "INITIATING CODE MUTATION...");
        match self.mutate().await {
            Ok((commit, status)) => CycleOutcome::Deployed {
                path: commit.path,
                commit_sha: commit.sha,
                status,
            },
            Err(e) => self.mutation_failed(e),
        }
    }

    /// One dialogue call; an empty reply counts as a failure.
    async fn ask(&self, prompt: &str) -> Result<String> {
        let reply = self.model.complete(prompt).await?;
        let reply = reply.trim();
        if reply.is_empty() {
            return Err(EvolverError::model("empty response"));
        }
        Ok(reply.to_string())
    }

    fn dialogue_failed(&mut self, phase: CyclePhase, error: EvolverError) -> CycleOutcome {
        METRICS.inc_upstream_failures();
        obs::emit_upstream_error(phase, &error);
        self.record(LogKind::Error, format!("Self-dialogue interrupted: {error}"));
        CycleOutcome::DialogueAborted {
            phase,
            reason: error.to_string(),
        }
    }

    fn mutation_failed(&mut self, error: EvolverError) -> CycleOutcome {
        match error {
            EvolverError::NoEligibleTarget => {
                self.record(LogKind::Warning, "No eligible files found for mutation.");
                CycleOutcome::NoEligibleTarget
            }
            EvolverError::NoImprovementProduced { path } => {
                self.record(
                    LogKind::Warning,
                    format!("No optimizations found for {path}. Cycle skipped."),
                );
                CycleOutcome::NoImprovement { path }
            }
            other => {
                let phase = self.state.phase;
                if matches!(other, EvolverError::UpstreamCallFailed { .. }) {
                    METRICS.inc_upstream_failures();
                }
                obs::emit_upstream_error(phase, &other);
                self.record(LogKind::Error, format!("Evolution Error: {other}"));
                CycleOutcome::Aborted {
                    phase,
                    reason: other.to_string(),
                }
            }
        }
    }

    async fn mutate(&mut self) -> Result<(Commit, DeploymentStatus)> {
        self.enter(CyclePhase::Analyzing);
        let tree = self.source_control.list_tree(&self.target).await?;
        let candidates = eligible_files(&tree);
        if candidates.is_empty() {
            return Err(EvolverError::NoEligibleTarget);
        }
        let path = candidates[self.rng.gen_range(0..candidates.len())].path.clone();
        self.record(
            LogKind::Info,
            format!("Analyzing: {path} for architectural optimization..."),
        );

        let file = self.source_control.get_file(&self.target, &path).await?;
        let original = file.decode_text()?;
        let context = self.knowledge_context(&path, &original).await;

        self.enter(CyclePhase::Mutating);
        let evolved = self
            .model
            .complete(&prompts::mutation_prompt(&path, &original, &context))
            .await?;
        if evolved.chars().count() <= MIN_MUTATION_LEN || evolved == original {
            return Err(EvolverError::NoImprovementProduced { path });
        }

        self.enter(CyclePhase::Committing);
        let update = FileUpdate {
            path: path.clone(),
            content: evolved,
            expected_sha: file.sha,
            message: prompts::commit_message(self.state.cycle, &path),
        };
        let sha = self.source_control.put_file(&self.target, &update).await?;
        self.state.mutations += 1;
        METRICS.inc_mutations();
        obs::emit_commit_created(&path, &sha);
        self.record(
            LogKind::Success,
            "Mutation Committed. Awaiting deployment pipeline...",
        );

        self.enter(CyclePhase::Deploying);
        let status = self.track_deployment(&sha).await;
        Ok((Commit { path, sha }, status))
    }

    /// Ranked knowledge context for a file. Retrieval problems degrade to no context.
    async fn knowledge_context(&mut self, path: &str, original: &str) -> String {
        let query = prompts::retrieval_query(path, original);
        let filter = DocumentFilter::all().language(detect_language(path));
        match retrieve_context(self.knowledge.as_ref(), &query, &filter, CONTEXT_DOCUMENTS).await {
            Ok(retrieved) if !retrieved.is_empty() => {
                self.record(
                    LogKind::Info,
                    format!(
                        "Retrieved {} relevant code examples from knowledge base",
                        retrieved.documents.len()
                    ),
                );
                retrieved.context
            }
            Ok(_) => String::new(),
            Err(e) => {
                let error = EvolverError::UpstreamCallFailed {
                    service: Upstream::KnowledgeStore,
                    message: e.to_string(),
                };
                METRICS.inc_upstream_failures();
                obs::emit_upstream_error(CyclePhase::Analyzing, &error);
                String::new()
            }
        }
    }

    async fn track_deployment(&mut self, sha: &str) -> DeploymentStatus {
        let mut tracker =
            DeploymentTracker::new(self.source_control.clone(), self.target.clone(), &self.timing);
        if let Some(halt) = &self.halt {
            tracker = tracker.with_halt(halt.clone());
        }
        if let Some(restart) = &self.restart {
            tracker = tracker.with_restart(restart.clone());
        }

        let snapshots = &self.snapshots;
        let state = &self.state;
        let running = self.running;
        let mut on_poll = |check: &DeploymentCheck, log: &ActivityLog| {
            snapshots.send_replace(OrchestratorSnapshot::capture(
                state,
                running,
                Some(check),
                log,
            ));
        };
        let check = tracker.track(sha, &mut self.log, &mut on_poll).await;

        let status = check.status.clone();
        self.deployment = Some(check);
        self.publish();
        status
    }
}
