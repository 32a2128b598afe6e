//! Evolver core library
//!
//! A loop that asks a generative model to critique its own code, rewrites one
//! file of the target repository with the help of ranked reference material,
//! commits the result and follows the deployment to completion.

pub mod activity_log;
pub mod config;
pub mod deployment;
pub mod domain;
pub mod fakes;
pub mod file_filter;
pub mod knowledge_sync;
pub mod metrics;
pub mod model_gateway;
pub mod obs;
pub mod orchestrator;
pub mod prompts;
pub mod ranker;
pub mod scheduler;
pub mod source_control;
pub mod telemetry;

pub use activity_log::{ActivityLog, LogEntry, LogKind};
pub use config::{CycleTiming, EvolverConfig, GitHubConfig, ModelConfig};
pub use deployment::{
    DeploymentCheck, DeploymentStatus, DeploymentTracker, RestartReason, RestartRequest,
};
pub use domain::{
    CycleOutcome, CyclePhase, CycleState, EvolverError, RepositoryTarget, Result, Upstream,
};
pub use knowledge_sync::{
    pull_latest, pull_latest_and_restart, sync_repository, LatestCommit, SyncOptions, SyncReport,
};
pub use model_gateway::{GeminiClient, ModelGateway};
pub use orchestrator::{MutationOrchestrator, OrchestratorSnapshot};
pub use ranker::{rank, retrieve_context, RetrievedContext, ScoredDocument};
pub use scheduler::{EvolutionLoop, LoopHandle};
pub use source_control::{
    CheckRun, CommitSummary, FileUpdate, GitHubClient, RemoteFile, SourceControl, TreeEntry,
};

pub use knowledge_store::{
    DocumentFilter, DocumentOrigin, JsonFileKnowledgeStore, KnowledgeDocument, KnowledgeStore,
    MemoryKnowledgeStore, WatchedRepo,
};

/// Crate version, shared by every workspace member.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
