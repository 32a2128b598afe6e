//! Storage trait for reference documents and watched repositories.
//!
//! The store is a plain read/write collaborator: all relevance ranking
//! happens in the caller. In-memory and JSON-file implementations are
//! provided by [`crate::fakes`] and [`crate::file_store`].

use async_trait::async_trait;
use chrono::Utc;

use crate::error::StoreError;
use crate::schema::{DocumentFilter, KnowledgeDocument, KnowledgeStats, WatchedRepo};

/// Result type for store operations
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// What an upsert did to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
    /// Same owner/name/path already stored with identical content.
    Unchanged,
}

/// Knowledge document store.
///
/// Guarantees:
/// - `query` returns matching documents newest first, at most `filter.limit`.
/// - Documents are only removed by `delete`.
/// - `upsert_repository_file` keys on repository owner, name and file path.
#[async_trait]
pub trait KnowledgeStore: Send + Sync {
    /// Read documents matching the filter, newest first.
    async fn query(&self, filter: &DocumentFilter) -> StoreResult<Vec<KnowledgeDocument>>;

    /// Store a new document.
    async fn insert(&self, doc: KnowledgeDocument) -> StoreResult<()>;

    /// Fetch a document by id.
    async fn get(&self, id: &str) -> StoreResult<KnowledgeDocument>;

    /// Remove a document by id. Fails with `DocumentNotFound` if absent.
    async fn delete(&self, id: &str) -> StoreResult<()>;

    /// Insert a repository file, or refresh its content if already stored.
    async fn upsert_repository_file(&self, doc: KnowledgeDocument) -> StoreResult<UpsertOutcome>;

    /// Aggregate counts over all stored documents.
    async fn stats(&self) -> StoreResult<KnowledgeStats>;

    /// Register a repository as a knowledge source.
    async fn add_repo(&self, repo: WatchedRepo) -> StoreResult<WatchedRepo>;

    /// All registered repositories, newest first.
    async fn list_repos(&self) -> StoreResult<Vec<WatchedRepo>>;

    /// Look up a registered repository by id.
    async fn get_repo(&self, id: &str) -> StoreResult<WatchedRepo>;

    /// Remove a registered repository. Its documents are kept.
    async fn remove_repo(&self, id: &str) -> StoreResult<()>;

    /// Stamp a repository with the outcome of a sync.
    async fn record_sync(&self, id: &str, files_count: usize) -> StoreResult<WatchedRepo>;
}

/// Shared in-memory state and operations behind both store implementations.
#[derive(Debug, Default, Clone, serde::Serialize, serde::Deserialize)]
pub(crate) struct StoreState {
    pub documents: Vec<KnowledgeDocument>,
    pub repos: Vec<WatchedRepo>,
}

impl StoreState {
    pub fn query(&self, filter: &DocumentFilter) -> Vec<KnowledgeDocument> {
        let mut hits: Vec<KnowledgeDocument> = self
            .documents
            .iter()
            .filter(|d| filter.matches(d))
            .cloned()
            .collect();
        hits.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        hits.truncate(filter.limit);
        hits
    }

    pub fn get(&self, id: &str) -> StoreResult<KnowledgeDocument> {
        self.documents
            .iter()
            .find(|d| d.id == id)
            .cloned()
            .ok_or_else(|| StoreError::DocumentNotFound { id: id.to_string() })
    }

    pub fn delete(&mut self, id: &str) -> StoreResult<()> {
        let before = self.documents.len();
        self.documents.retain(|d| d.id != id);
        if self.documents.len() == before {
            return Err(StoreError::DocumentNotFound { id: id.to_string() });
        }
        Ok(())
    }

    pub fn upsert_repository_file(&mut self, doc: KnowledgeDocument) -> UpsertOutcome {
        let existing = self.documents.iter_mut().find(|d| {
            d.repo_owner == doc.repo_owner
                && d.repo_name == doc.repo_name
                && d.file_path == doc.file_path
        });
        match existing {
            Some(current) if current.content_digest == doc.content_digest => {
                UpsertOutcome::Unchanged
            }
            Some(current) => {
                current.refresh_content(doc.content);
                UpsertOutcome::Updated
            }
            None => {
                self.documents.push(doc);
                UpsertOutcome::Inserted
            }
        }
    }

    pub fn add_repo(&mut self, repo: WatchedRepo) -> StoreResult<WatchedRepo> {
        if self
            .repos
            .iter()
            .any(|r| r.owner == repo.owner && r.name == repo.name)
        {
            return Err(StoreError::AlreadyExists {
                owner: repo.owner,
                name: repo.name,
            });
        }
        self.repos.push(repo.clone());
        Ok(repo)
    }

    pub fn list_repos(&self) -> Vec<WatchedRepo> {
        let mut repos = self.repos.clone();
        repos.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        repos
    }

    pub fn get_repo(&self, id: &str) -> StoreResult<WatchedRepo> {
        self.repos
            .iter()
            .find(|r| r.id == id)
            .cloned()
            .ok_or_else(|| StoreError::RepoNotFound { id: id.to_string() })
    }

    pub fn remove_repo(&mut self, id: &str) -> StoreResult<()> {
        let before = self.repos.len();
        self.repos.retain(|r| r.id != id);
        if self.repos.len() == before {
            return Err(StoreError::RepoNotFound { id: id.to_string() });
        }
        Ok(())
    }

    pub fn record_sync(&mut self, id: &str, files_count: usize) -> StoreResult<WatchedRepo> {
        let repo = self
            .repos
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| StoreError::RepoNotFound { id: id.to_string() })?;
        repo.files_count = files_count;
        repo.last_sync = Some(Utc::now());
        Ok(repo.clone())
    }
}
