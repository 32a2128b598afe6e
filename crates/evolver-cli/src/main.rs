//! Evolver CLI
//!
//! The `evolver` command drives single mutation cycles and manages the
//! knowledge base that grounds them.
//!
//! ## Commands
//!
//! - `cycle`: run one self-dialogue / mutation cycle now
//! - `knowledge`: search, inspect, add and delete reference documents
//! - `repo`: register watched repositories and sync them into the knowledge base
//! - `pull-latest`: show the newest commit on the mutation target

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use evolver_core::ranker::rank;
use evolver_core::{
    pull_latest, sync_repository, CycleOutcome, EvolverConfig, GeminiClient, GitHubClient,
    MutationOrchestrator, RepositoryTarget, SyncOptions,
};
use knowledge_store::{
    DocumentFilter, DocumentOrigin, JsonFileKnowledgeStore, KnowledgeDocument, KnowledgeStore,
    WatchedRepo,
};
use tracing::{info, Level};

#[derive(Parser)]
#[command(name = "evolver")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Self-mutating code agent", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Knowledge base file
    #[arg(long, global = true, env = "EVOLVER_KNOWLEDGE_PATH")]
    knowledge_path: Option<PathBuf>,

    /// Owner of the mutation target
    #[arg(long, global = true, env = "EVOLVER_TARGET_OWNER")]
    owner: Option<String>,

    /// Name of the mutation target repository
    #[arg(long, global = true, env = "EVOLVER_TARGET_REPO")]
    repo_name: Option<String>,

    /// Branch of the mutation target
    #[arg(long, global = true, env = "EVOLVER_TARGET_BRANCH")]
    branch: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one cycle against the mutation target
    Cycle {
        /// Seed for target file selection
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Manage the knowledge base
    Knowledge {
        #[command(subcommand)]
        action: KnowledgeAction,
    },

    /// Manage watched repositories
    Repo {
        #[command(subcommand)]
        action: RepoAction,
    },

    /// Show the newest commit on the mutation target (SIGHUP makes evolverd restart onto it)
    PullLatest,
}

#[derive(Subcommand)]
enum KnowledgeAction {
    /// Rank documents against a query
    Search {
        query: String,

        #[arg(short, long)]
        language: Option<String>,

        /// upload, repository or external
        #[arg(short, long)]
        origin: Option<DocumentOrigin>,

        #[arg(short = 'n', long, default_value = "3")]
        limit: usize,

        /// Print the rendered prompt context instead of a summary
        #[arg(long)]
        context: bool,
    },

    /// List stored documents, newest first
    List {
        #[arg(short, long)]
        language: Option<String>,

        #[arg(short, long)]
        origin: Option<DocumentOrigin>,

        #[arg(short = 'n', long, default_value = "20")]
        limit: usize,
    },

    /// Add a local file as an uploaded document
    Add {
        path: PathBuf,

        /// Language tag (detected from the extension if omitted)
        #[arg(short, long)]
        language: Option<String>,
    },

    /// Delete a document by id
    Delete { id: String },

    /// Show document counts
    Stats,
}

#[derive(Subcommand)]
enum RepoAction {
    /// Register a repository as a knowledge source
    Add {
        owner: String,
        name: String,

        #[arg(short, long, default_value = "main")]
        branch: String,
    },

    /// List watched repositories
    List,

    /// Stop watching a repository (its documents are kept)
    Remove { id: String },

    /// Pull a watched repository's files into the knowledge base
    Sync {
        id: String,

        #[arg(long, default_value = "50")]
        max_files: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    evolver_core::telemetry::init_tracing(cli.json, level);

    let config = resolve_config(&cli);

    match cli.command {
        Commands::Cycle { seed } => cmd_cycle(&config, seed).await,
        Commands::Knowledge { action } => {
            let store = open_store(&config.knowledge_path).await?;
            match action {
                KnowledgeAction::Search {
                    query,
                    language,
                    origin,
                    limit,
                    context,
                } => cmd_knowledge_search(&store, &query, filter(language, origin), limit, context).await,
                KnowledgeAction::List {
                    language,
                    origin,
                    limit,
                } => cmd_knowledge_list(&store, filter(language, origin).limit(limit)).await,
                KnowledgeAction::Add { path, language } => {
                    cmd_knowledge_add(&store, &path, language).await
                }
                KnowledgeAction::Delete { id } => cmd_knowledge_delete(&store, &id).await,
                KnowledgeAction::Stats => cmd_knowledge_stats(&store).await,
            }
        }
        Commands::Repo { action } => {
            let store = open_store(&config.knowledge_path).await?;
            match action {
                RepoAction::Add {
                    owner,
                    name,
                    branch,
                } => cmd_repo_add(&store, &owner, &name, &branch).await,
                RepoAction::List => cmd_repo_list(&store).await,
                RepoAction::Remove { id } => cmd_repo_remove(&store, &id).await,
                RepoAction::Sync { id, max_files } => {
                    cmd_repo_sync(&config, &store, &id, max_files).await
                }
            }
        }
        Commands::PullLatest => cmd_pull_latest(&config).await,
    }
}

/// Environment first, then command-line overrides.
fn resolve_config(cli: &Cli) -> EvolverConfig {
    let mut config = EvolverConfig::from_env();
    if let Some(path) = &cli.knowledge_path {
        config.knowledge_path = path.clone();
    }
    let target = RepositoryTarget::new(
        cli.owner.clone().unwrap_or_else(|| config.target.owner.clone()),
        cli.repo_name.clone().unwrap_or_else(|| config.target.name.clone()),
        cli.branch.clone().unwrap_or_else(|| config.target.branch.clone()),
    );
    config.with_target(target)
}

fn filter(language: Option<String>, origin: Option<DocumentOrigin>) -> DocumentFilter {
    let mut filter = DocumentFilter::all();
    if let Some(language) = language {
        filter = filter.language(language);
    }
    if let Some(origin) = origin {
        filter = filter.origin(origin);
    }
    filter
}

async fn open_store(path: &Path) -> Result<JsonFileKnowledgeStore> {
    JsonFileKnowledgeStore::open(path)
        .await
        .with_context(|| format!("Failed to open knowledge base at {}", path.display()))
}

/// Run a single cycle
async fn cmd_cycle(config: &EvolverConfig, seed: Option<u64>) -> Result<()> {
    config.require_model_credential()?;
    let target = config.require_target()?.clone();
    let store = open_store(&config.knowledge_path).await?;

    let mut orchestrator = MutationOrchestrator::new(
        Arc::new(GeminiClient::new(config.model.clone())),
        Arc::new(GitHubClient::new(config.github.clone())),
        Arc::new(store),
        target,
    )
    .with_timing(config.timing.clone());
    if let Some(seed) = seed {
        orchestrator = orchestrator.with_seed(seed);
    }

    info!(target_repo = %orchestrator.target(), "running one cycle");
    let outcome = orchestrator.run_cycle().await;

    for entry in orchestrator.log().entries() {
        println!("[{:?}] {}", entry.kind, entry.message);
    }
    println!();
    println!("{}", serde_json::to_string_pretty(&outcome)?);

    match outcome {
        CycleOutcome::Aborted { reason, .. } | CycleOutcome::DialogueAborted { reason, .. } => {
            bail!("cycle aborted: {reason}")
        }
        _ => Ok(()),
    }
}

async fn cmd_knowledge_search(
    store: &JsonFileKnowledgeStore,
    query: &str,
    filter: DocumentFilter,
    limit: usize,
    context: bool,
) -> Result<()> {
    let candidates = store.query(&filter).await?;
    let ranked = rank(query, &candidates, limit);

    if ranked.is_empty() {
        println!("No relevant documents for '{}'", query);
        return Ok(());
    }

    if context {
        println!("{}", evolver_core::ranker::format_context(&ranked));
        return Ok(());
    }

    for scored in ranked {
        let doc = &scored.document;
        println!("{:>7.3}  {}  {} ({})", scored.score, doc.id, doc.file_path, doc.language);
    }
    Ok(())
}

async fn cmd_knowledge_list(store: &JsonFileKnowledgeStore, filter: DocumentFilter) -> Result<()> {
    let docs = store.query(&filter).await?;
    if docs.is_empty() {
        println!("Knowledge base is empty");
        return Ok(());
    }
    for doc in docs {
        let source = doc
            .repository_slug()
            .unwrap_or_else(|| doc.origin.to_string());
        println!(
            "{}  {}  {:<12} {}  {}",
            doc.id,
            doc.created_at.format("%Y-%m-%d %H:%M"),
            doc.language,
            source,
            doc.file_path
        );
    }
    Ok(())
}

async fn cmd_knowledge_add(
    store: &JsonFileKnowledgeStore,
    path: &Path,
    language: Option<String>,
) -> Result<()> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let display = path.to_string_lossy().to_string();
    let language = language
        .unwrap_or_else(|| evolver_core::file_filter::detect_language(&display).to_string());
    let name = evolver_core::file_filter::file_name(&display).to_string();

    let doc = KnowledgeDocument::new(name, content, DocumentOrigin::Upload, language);
    let id = doc.id.clone();
    store.insert(doc).await?;

    println!("Added {} as {}", display, id);
    Ok(())
}

async fn cmd_knowledge_delete(store: &JsonFileKnowledgeStore, id: &str) -> Result<()> {
    store.delete(id).await?;
    println!("Deleted {}", id);
    Ok(())
}

async fn cmd_knowledge_stats(store: &JsonFileKnowledgeStore) -> Result<()> {
    let stats = store.stats().await?;
    println!("Documents:  {}", stats.total);
    println!("  uploaded:   {}", stats.uploaded);
    println!("  repository: {}", stats.repository);
    println!("  external:   {}", stats.external);
    if !stats.by_language.is_empty() {
        println!("By language:");
        for (language, count) in &stats.by_language {
            println!("  {:<12} {}", language, count);
        }
    }
    if !stats.by_repo.is_empty() {
        println!("By repository:");
        for (repo, count) in &stats.by_repo {
            println!("  {:<30} {}", repo, count);
        }
    }
    Ok(())
}

async fn cmd_repo_add(
    store: &JsonFileKnowledgeStore,
    owner: &str,
    name: &str,
    branch: &str,
) -> Result<()> {
    let repo = store.add_repo(WatchedRepo::new(owner, name, branch)).await?;
    println!("Watching {}@{} ({})", repo.slug(), repo.branch, repo.id);
    Ok(())
}

async fn cmd_repo_list(store: &JsonFileKnowledgeStore) -> Result<()> {
    let repos = store.list_repos().await?;
    if repos.is_empty() {
        println!("No watched repositories");
        return Ok(());
    }
    for repo in repos {
        let last_sync = repo
            .last_sync
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "never".to_string());
        println!(
            "{}  {}@{}  files={}  last_sync={}",
            repo.id,
            repo.slug(),
            repo.branch,
            repo.files_count,
            last_sync
        );
    }
    Ok(())
}

async fn cmd_repo_remove(store: &JsonFileKnowledgeStore, id: &str) -> Result<()> {
    store.remove_repo(id).await?;
    println!("Removed {}", id);
    Ok(())
}

async fn cmd_repo_sync(
    config: &EvolverConfig,
    store: &JsonFileKnowledgeStore,
    id: &str,
    max_files: usize,
) -> Result<()> {
    let repo = store.get_repo(id).await?;
    let github = GitHubClient::new(config.github.clone());
    let options = SyncOptions {
        max_files,
        ..SyncOptions::default()
    };

    let report = sync_repository(&github, store, &repo, &options)
        .await
        .with_context(|| format!("Failed to sync {}", repo.slug()))?;

    println!(
        "Synced {} of {} files from {} ({} unchanged, {} failed)",
        report.synced,
        report.total_files,
        repo.slug(),
        report.unchanged,
        report.failed
    );
    Ok(())
}

async fn cmd_pull_latest(config: &EvolverConfig) -> Result<()> {
    let target = config.require_target()?;
    let github = GitHubClient::new(config.github.clone());
    match pull_latest(&github, target).await? {
        Some(commit) => println!("{}", commit.summary()),
        None => println!("No commits on {}", target),
    }
    Ok(())
}
