//! Bulk ingestion of watched repositories into the knowledge store, and
//! the pull-latest check against the mutation target.

use std::time::Duration;

use knowledge_store::{DocumentOrigin, KnowledgeDocument, KnowledgeStore, UpsertOutcome, WatchedRepo};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::deployment::{RestartReason, RestartRequest};
use crate::domain::{RepositoryTarget, Result};
use crate::file_filter::{detect_language, file_name, is_knowledge_file};
use crate::source_control::SourceControl;

/// Limits for one sync run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncOptions {
    /// Files fetched per run, in tree order.
    pub max_files: usize,
    /// Fixed pause between content fetches.
    pub fetch_delay: Duration,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            max_files: 50,
            fetch_delay: Duration::from_millis(100),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    /// Files stored or confirmed current.
    pub synced: usize,
    /// Of `synced`, files whose content was already identical.
    pub unchanged: usize,
    pub failed: usize,
    /// Eligible files in the tree, before the per-run cap.
    pub total_files: usize,
}

/// Pull the eligible files of `repo` into `store`.
///
/// Listing the tree is the only fatal step; per-file failures are counted
/// and skipped. The registry entry is stamped with the synced count.
pub async fn sync_repository(
    source_control: &dyn SourceControl,
    store: &dyn KnowledgeStore,
    repo: &WatchedRepo,
    options: &SyncOptions,
) -> Result<SyncReport> {
    let target = RepositoryTarget::new(&repo.owner, &repo.name, &repo.branch);
    let tree = source_control.list_tree(&target).await?;
    let files: Vec<_> = tree.iter().filter(|e| is_knowledge_file(e)).collect();
    info!(repo = %target, eligible = files.len(), "syncing repository");

    let mut report = SyncReport {
        total_files: files.len(),
        ..SyncReport::default()
    };

    for (i, entry) in files.iter().take(options.max_files).enumerate() {
        if i > 0 && !options.fetch_delay.is_zero() {
            tokio::time::sleep(options.fetch_delay).await;
        }

        let content = match source_control.get_file(&target, &entry.path).await {
            Ok(file) => file.decode_text(),
            Err(e) => Err(e),
        };
        let content = match content {
            Ok(c) => c,
            Err(e) => {
                warn!(path = %entry.path, error = %e, "skipping file");
                report.failed += 1;
                continue;
            }
        };

        let doc = KnowledgeDocument::new(
            file_name(&entry.path),
            content,
            DocumentOrigin::Repository,
            detect_language(&entry.path),
        )
        .with_path(&entry.path)
        .with_repository(&repo.owner, &repo.name);

        match store.upsert_repository_file(doc).await {
            Ok(outcome) => {
                report.synced += 1;
                if outcome == UpsertOutcome::Unchanged {
                    report.unchanged += 1;
                }
            }
            Err(e) => {
                warn!(path = %entry.path, error = %e, "failed to store file");
                report.failed += 1;
            }
        }
    }

    store.record_sync(&repo.id, report.synced).await?;
    info!(
        repo = %target,
        synced = report.synced,
        unchanged = report.unchanged,
        failed = report.failed,
        "repository sync finished"
    );
    Ok(report)
}

/// Newest commit on the target branch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LatestCommit {
    pub sha: String,
    pub author: String,
    /// First line of the message, at most 60 characters.
    pub headline: String,
}

impl LatestCommit {
    pub const HEADLINE_LIMIT: usize = 60;

    pub fn short_sha(&self) -> &str {
        self.sha.get(..7).unwrap_or(&self.sha)
    }

    pub fn summary(&self) -> String {
        format!("Latest commit: {} by {}: {}", self.short_sha(), self.author, self.headline)
    }

    pub fn restart_request(&self) -> RestartRequest {
        RestartRequest {
            reason: RestartReason::PulledLatest,
            commit_sha: self.sha.clone(),
        }
    }
}

/// Look up the newest commit on `target`. `None` for an empty branch.
pub async fn pull_latest(
    source_control: &dyn SourceControl,
    target: &RepositoryTarget,
) -> Result<Option<LatestCommit>> {
    let commits = source_control.list_commits(target).await?;
    Ok(commits.into_iter().next().map(|c| {
        let headline = c
            .message
            .lines()
            .next()
            .unwrap_or_default()
            .chars()
            .take(LatestCommit::HEADLINE_LIMIT)
            .collect();
        LatestCommit {
            sha: c.sha,
            author: c.author_name,
            headline,
        }
    }))
}

/// Pull the newest commit on `target` and ask the host to restart onto it.
/// Nothing is sent for an empty branch.
pub async fn pull_latest_and_restart(
    source_control: &dyn SourceControl,
    target: &RepositoryTarget,
    restart: &mpsc::Sender<RestartRequest>,
) -> Result<Option<LatestCommit>> {
    let latest = pull_latest(source_control, target).await?;
    if let Some(commit) = &latest {
        info!(repo = %target, sha = %commit.sha, "{}", commit.summary());
        if restart.send(commit.restart_request()).await.is_err() {
            debug!(sha = %commit.sha, "restart receiver dropped");
        }
    }
    Ok(latest)
}
