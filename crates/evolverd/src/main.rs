//! Evolution loop daemon.
//!
//! Runs cycles until Ctrl-C. When a mutation deploys successfully, or SIGHUP
//! pulls a newer commit of the target, the daemon exits with
//! [`RESTART_EXIT_CODE`] so its supervisor starts the new revision.

use std::future::Future;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use evolver_core::{
    pull_latest_and_restart, EvolutionLoop, EvolverConfig, GeminiClient, GitHubClient, LoopHandle,
    MutationOrchestrator, RepositoryTarget, RestartRequest, SourceControl,
};
use knowledge_store::JsonFileKnowledgeStore;
use tokio::sync::mpsc;
use tracing::{info, warn, Level};

/// Exit status asking the supervisor for a restart (`EX_TEMPFAIL`).
pub const RESTART_EXIT_CODE: i32 = 75;

#[derive(Parser)]
#[command(name = "evolverd")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Runs the evolution loop until interrupted", long_about = None)]
struct Args {
    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, env = "EVOLVER_LOG_JSON")]
    json: bool,

    /// Seed for target file selection
    #[arg(long)]
    seed: Option<u64>,
}

/// Why the daemon stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
enum ExitReason {
    Interrupted,
    Restart(RestartRequest),
}

impl ExitReason {
    fn code(&self) -> i32 {
        match self {
            ExitReason::Restart(_) => RESTART_EXIT_CODE,
            ExitReason::Interrupted => 0,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    evolver_core::telemetry::init_tracing(args.json, level);

    let config = EvolverConfig::from_env();
    let target = config.require_target()?.clone();
    let store = JsonFileKnowledgeStore::open(config.knowledge_path.clone())
        .await
        .with_context(|| {
            format!(
                "Failed to open knowledge base at {}",
                config.knowledge_path.display()
            )
        })?;

    let (restart_tx, restart_rx) = mpsc::channel(1);
    let github: Arc<dyn SourceControl> = Arc::new(GitHubClient::new(config.github.clone()));
    #[cfg(unix)]
    pull_on_hangup(github.clone(), target.clone(), restart_tx.clone())?;

    let mut orchestrator = MutationOrchestrator::new(
        Arc::new(GeminiClient::new(config.model.clone())),
        github,
        Arc::new(store),
        target,
    )
    .with_timing(config.timing.clone())
    .with_restart(restart_tx);
    if let Some(seed) = args.seed {
        orchestrator = orchestrator.with_seed(seed);
    }

    let handle = EvolutionLoop::start(orchestrator, &config).context("Failed to start evolution loop")?;
    info!(version = evolver_core::VERSION, "evolverd started");

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };
    let reason = supervise(handle, restart_rx, shutdown).await?;
    evolver_core::metrics::METRICS.flush();

    let code = reason.code();
    info!(?reason, code, "evolverd stopping");
    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}

/// Wait for a shutdown signal or a restart request, then halt and let the
/// in-flight cycle finish.
async fn supervise(
    handle: LoopHandle,
    mut restart: mpsc::Receiver<RestartRequest>,
    shutdown: impl Future<Output = ()>,
) -> Result<ExitReason> {
    let reason = tokio::select! {
        _ = shutdown => ExitReason::Interrupted,
        Some(request) = restart.recv() => {
            info!(sha = %request.commit_sha, "new revision deployed");
            ExitReason::Restart(request)
        }
    };

    let orchestrator = handle.shutdown().await.context("evolution loop task failed")?;
    info!(
        cycles = orchestrator.state().cycle,
        mutations = orchestrator.state().mutations,
        "evolution loop joined"
    );
    Ok(reason)
}

/// On every SIGHUP, pull the newest target commit and request a restart onto it.
#[cfg(unix)]
fn pull_on_hangup(
    source_control: Arc<dyn SourceControl>,
    target: RepositoryTarget,
    restart: mpsc::Sender<RestartRequest>,
) -> Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut hangups = signal(SignalKind::hangup()).context("Failed to install SIGHUP handler")?;
    tokio::spawn(async move {
        while hangups.recv().await.is_some() {
            info!(repo = %target, "SIGHUP received, pulling latest revision");
            match pull_latest_and_restart(source_control.as_ref(), &target, &restart).await {
                Ok(Some(_)) => {}
                Ok(None) => warn!(repo = %target, "target branch has no commits"),
                Err(e) => warn!(error = %e, "pull latest failed"),
            }
        }
    });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::time::Duration;

    use evolver_core::fakes::{MemorySourceControl, ScriptedModel};
    use evolver_core::{
        CheckRun, CycleTiming, GitHubConfig, MemoryKnowledgeStore, ModelConfig, RepositoryTarget,
        RestartReason,
    };

    fn config() -> EvolverConfig {
        EvolverConfig {
            model: ModelConfig {
                api_key: Some("k".to_string()),
                ..ModelConfig::default()
            },
            github: GitHubConfig::default(),
            target: RepositoryTarget::new("acme", "site", "main"),
            timing: CycleTiming::default(),
            knowledge_path: PathBuf::from("unused.json"),
        }
    }

    fn orchestrator(model: ScriptedModel, repo: MemorySourceControl) -> MutationOrchestrator {
        MutationOrchestrator::new(
            Arc::new(model),
            Arc::new(repo),
            Arc::new(MemoryKnowledgeStore::new()),
            RepositoryTarget::new("acme", "site", "main"),
        )
        .with_timing(CycleTiming {
            dialogue_pause: Duration::ZERO,
            ..CycleTiming::default()
        })
    }

    #[test]
    fn restart_maps_to_tempfail() {
        let restart = ExitReason::Restart(RestartRequest {
            reason: RestartReason::DeploymentSucceeded,
            commit_sha: "abc".to_string(),
        });
        assert_eq!(restart.code(), 75);
        assert_eq!(ExitReason::Interrupted.code(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn successful_deployment_requests_restart() {
        let model = ScriptedModel::new()
            .with_reply("q?")
            .with_reply("a.")
            .with_reply("YES")
            .with_reply("export const v: number = 1;\n");
        let repo = MemorySourceControl::new()
            .with_file("v.ts", "export const v = 1;\n")
            .with_commit_shas(["feed42"])
            .with_check_runs(vec![CheckRun::completed("success")]);
        let (tx, rx) = mpsc::channel(1);
        let handle =
            EvolutionLoop::start(orchestrator(model, repo).with_restart(tx), &config()).unwrap();

        let reason = supervise(handle, rx, std::future::pending()).await.unwrap();

        match reason {
            ExitReason::Restart(request) => assert_eq!(request.commit_sha, "feed42"),
            other => panic!("unexpected exit: {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn pulled_commit_requests_restart() {
        let model = ScriptedModel::new().with_reply("q?").with_reply("a.").with_reply("no");
        let repo: Arc<dyn SourceControl> =
            Arc::new(MemorySourceControl::new().with_commit("cafe1234", "Grace", "Tune cache"));
        let (tx, rx) = mpsc::channel(1);
        let handle = EvolutionLoop::start(
            orchestrator(model, MemorySourceControl::new()).with_restart(tx.clone()),
            &config(),
        )
        .unwrap();

        pull_latest_and_restart(repo.as_ref(), &RepositoryTarget::new("acme", "site", "main"), &tx)
            .await
            .unwrap();
        let reason = supervise(handle, rx, std::future::pending()).await.unwrap();

        match reason {
            ExitReason::Restart(request) => {
                assert_eq!(request.reason, RestartReason::PulledLatest);
                assert_eq!(request.commit_sha, "cafe1234");
                assert_eq!(ExitReason::Restart(request).code(), RESTART_EXIT_CODE);
            }
            other => panic!("unexpected exit: {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_signal_halts_loop() {
        let model = ScriptedModel::new().with_reply("q?").with_reply("a.").with_reply("no");
        let (_tx, rx) = mpsc::channel(1);
        let handle =
            EvolutionLoop::start(orchestrator(model, MemorySourceControl::new()), &config()).unwrap();

        let reason = supervise(handle, rx, tokio::time::sleep(Duration::from_secs(5)))
            .await
            .unwrap();

        assert_eq!(reason, ExitReason::Interrupted);
    }
}
