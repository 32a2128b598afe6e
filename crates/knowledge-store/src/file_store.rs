//! JSON-file backed knowledge store.
//!
//! The whole store lives in one JSON document which is rewritten after every
//! mutation. Suitable for the single-process, single-writer deployment the
//! evolver runs in.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use crate::schema::{DocumentFilter, KnowledgeDocument, KnowledgeStats, WatchedRepo};
use crate::store::{KnowledgeStore, StoreResult, StoreState, UpsertOutcome};

/// Knowledge store persisted to a single JSON file.
#[derive(Debug)]
pub struct JsonFileKnowledgeStore {
    path: PathBuf,
    state: Mutex<StoreState>,
}

impl JsonFileKnowledgeStore {
    /// Open the store at `path`, starting empty if the file does not exist.
    pub async fn open(path: impl Into<PathBuf>) -> StoreResult<Self> {
        let path = path.into();
        let state = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => StoreState::default(),
            Err(e) => return Err(e.into()),
        };
        debug!(path = %path.display(), "opened knowledge store");
        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(&self, state: &StoreState) -> StoreResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let json = serde_json::to_vec_pretty(state)?;
        tokio::fs::write(&self.path, json).await?;
        Ok(())
    }

    /// Apply `change` to a copy of the state. The copy replaces the live
    /// state only once it is on disk.
    async fn write<T>(
        &self,
        change: impl FnOnce(&mut StoreState) -> StoreResult<T>,
    ) -> StoreResult<T> {
        let mut state = self.state.lock().await;
        let mut next = state.clone();
        let out = change(&mut next)?;
        self.persist(&next).await?;
        *state = next;
        Ok(out)
    }
}

#[async_trait]
impl KnowledgeStore for JsonFileKnowledgeStore {
    async fn query(&self, filter: &DocumentFilter) -> StoreResult<Vec<KnowledgeDocument>> {
        Ok(self.state.lock().await.query(filter))
    }

    async fn insert(&self, doc: KnowledgeDocument) -> StoreResult<()> {
        self.write(|state| {
            state.documents.push(doc);
            Ok(())
        })
        .await
    }

    async fn get(&self, id: &str) -> StoreResult<KnowledgeDocument> {
        self.state.lock().await.get(id)
    }

    async fn delete(&self, id: &str) -> StoreResult<()> {
        self.write(|state| state.delete(id)).await
    }

    async fn upsert_repository_file(&self, doc: KnowledgeDocument) -> StoreResult<UpsertOutcome> {
        let mut state = self.state.lock().await;
        let mut next = state.clone();
        let outcome = next.upsert_repository_file(doc);
        if outcome != UpsertOutcome::Unchanged {
            self.persist(&next).await?;
            *state = next;
        }
        Ok(outcome)
    }

    async fn stats(&self) -> StoreResult<KnowledgeStats> {
        let state = self.state.lock().await;
        Ok(KnowledgeStats::from_documents(&state.documents))
    }

    async fn add_repo(&self, repo: WatchedRepo) -> StoreResult<WatchedRepo> {
        self.write(|state| state.add_repo(repo)).await
    }

    async fn list_repos(&self) -> StoreResult<Vec<WatchedRepo>> {
        Ok(self.state.lock().await.list_repos())
    }

    async fn get_repo(&self, id: &str) -> StoreResult<WatchedRepo> {
        self.state.lock().await.get_repo(id)
    }

    async fn remove_repo(&self, id: &str) -> StoreResult<()> {
        self.write(|state| state.remove_repo(id)).await
    }

    async fn record_sync(&self, id: &str, files_count: usize) -> StoreResult<WatchedRepo> {
        self.write(|state| state.record_sync(id, files_count)).await
    }
}
