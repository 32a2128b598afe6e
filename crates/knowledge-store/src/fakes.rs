//! In-memory knowledge store (testing and ephemeral runs)
//!
//! Satisfies the [`KnowledgeStore`] contract without touching disk.

use std::sync::Mutex;

use async_trait::async_trait;

use crate::schema::{DocumentFilter, KnowledgeDocument, KnowledgeStats, WatchedRepo};
use crate::store::{KnowledgeStore, StoreResult, StoreState, UpsertOutcome};

/// In-memory store backed by a `Vec` of documents and repositories.
#[derive(Debug, Default)]
pub struct MemoryKnowledgeStore {
    state: Mutex<StoreState>,
}

impl MemoryKnowledgeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a store with documents in insertion order.
    pub fn with_documents(docs: Vec<KnowledgeDocument>) -> Self {
        Self {
            state: Mutex::new(StoreState {
                documents: docs,
                repos: Vec::new(),
            }),
        }
    }

    pub fn len(&self) -> usize {
        self.state.lock().unwrap().documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl KnowledgeStore for MemoryKnowledgeStore {
    async fn query(&self, filter: &DocumentFilter) -> StoreResult<Vec<KnowledgeDocument>> {
        Ok(self.state.lock().unwrap().query(filter))
    }

    async fn insert(&self, doc: KnowledgeDocument) -> StoreResult<()> {
        self.state.lock().unwrap().documents.push(doc);
        Ok(())
    }

    async fn get(&self, id: &str) -> StoreResult<KnowledgeDocument> {
        self.state.lock().unwrap().get(id)
    }

    async fn delete(&self, id: &str) -> StoreResult<()> {
        self.state.lock().unwrap().delete(id)
    }

    async fn upsert_repository_file(&self, doc: KnowledgeDocument) -> StoreResult<UpsertOutcome> {
        Ok(self.state.lock().unwrap().upsert_repository_file(doc))
    }

    async fn stats(&self) -> StoreResult<KnowledgeStats> {
        let state = self.state.lock().unwrap();
        Ok(KnowledgeStats::from_documents(&state.documents))
    }

    async fn add_repo(&self, repo: WatchedRepo) -> StoreResult<WatchedRepo> {
        self.state.lock().unwrap().add_repo(repo)
    }

    async fn list_repos(&self) -> StoreResult<Vec<WatchedRepo>> {
        Ok(self.state.lock().unwrap().list_repos())
    }

    async fn get_repo(&self, id: &str) -> StoreResult<WatchedRepo> {
        self.state.lock().unwrap().get_repo(id)
    }

    async fn remove_repo(&self, id: &str) -> StoreResult<()> {
        self.state.lock().unwrap().remove_repo(id)
    }

    async fn record_sync(&self, id: &str, files_count: usize) -> StoreResult<WatchedRepo> {
        self.state.lock().unwrap().record_sync(id, files_count)
    }
}
