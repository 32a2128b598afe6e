//! Timer-driven evolution loop.
//!
//! [`EvolutionLoop::start`] moves an orchestrator onto its own task and runs
//! one cycle immediately. Each following cycle starts one cycle interval after
//! the previous one ended, so cycles never overlap. Halting clears the
//! schedule but lets the in-flight cycle reach its own exit point.

use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::info;

use crate::config::EvolverConfig;
use crate::domain::Result;
use crate::orchestrator::{MutationOrchestrator, OrchestratorSnapshot};

pub struct EvolutionLoop;

impl EvolutionLoop {
    /// Start the loop.
    ///
    /// Rejected with `ConfigurationMissing` when no model credential is
    /// configured; the orchestrator is dropped untouched in that case.
    pub fn start(orchestrator: MutationOrchestrator, config: &EvolverConfig) -> Result<LoopHandle> {
        config.require_model_credential()?;

        let (halt_tx, halt_rx) = watch::channel(false);
        let orchestrator = orchestrator.with_halt(halt_rx.clone());
        let snapshots = orchestrator.subscribe();
        let period = orchestrator.timing().cycle_interval;

        info!(target_repo = %orchestrator.target(), period_secs = period.as_secs(), "evolution loop starting");
        let task = tokio::spawn(run_loop(orchestrator, period, halt_rx));

        Ok(LoopHandle {
            halt: halt_tx,
            snapshots,
            task,
        })
    }
}

/// Control handle for a running loop.
pub struct LoopHandle {
    halt: watch::Sender<bool>,
    snapshots: watch::Receiver<OrchestratorSnapshot>,
    task: JoinHandle<MutationOrchestrator>,
}

impl LoopHandle {
    /// Cancel the pending schedule. Idempotent.
    pub fn halt(&self) {
        self.halt.send_replace(true);
    }

    pub fn is_halted(&self) -> bool {
        *self.halt.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<OrchestratorSnapshot> {
        self.snapshots.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the loop task to exit and take the orchestrator back.
    pub async fn join(self) -> std::result::Result<MutationOrchestrator, tokio::task::JoinError> {
        self.task.await
    }

    /// Halt, then join.
    pub async fn shutdown(self) -> std::result::Result<MutationOrchestrator, tokio::task::JoinError> {
        self.halt();
        self.join().await
    }
}

async fn run_loop(
    mut orchestrator: MutationOrchestrator,
    period: Duration,
    mut halt: watch::Receiver<bool>,
) -> MutationOrchestrator {
    orchestrator.set_running(true);

    loop {
        orchestrator.run_cycle().await;
        // The next cycle is scheduled from the end of this one.
        tokio::select! {
            biased;
            _ = halted(&mut halt) => break,
            _ = tokio::time::sleep(period) => {}
        }
    }

    orchestrator.set_running(false);
    info!(cycles = orchestrator.state().cycle, "evolution loop stopped");
    orchestrator
}

/// Resolves once a halt is requested or the handle is dropped.
async fn halted(halt: &mut watch::Receiver<bool>) {
    loop {
        if *halt.borrow_and_update() {
            return;
        }
        if halt.changed().await.is_err() {
            return;
        }
    }
}
