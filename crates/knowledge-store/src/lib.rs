//! Knowledge-Store: reference documents for grounding code mutations
//!
//! Holds the documents the relevance ranker scores, plus the registry of
//! repositories synced into it. The store is deliberately dumb: it filters
//! by language and origin and returns newest-first; ranking lives in
//! `evolver-core`.
//!
//! ## Key Components
//!
//! - `KnowledgeStore`: async storage trait
//! - `MemoryKnowledgeStore`: in-memory implementation (tests, ephemeral runs)
//! - `JsonFileKnowledgeStore`: single-file JSON persistence

mod error;
pub mod fakes;
pub mod file_store;
mod schema;
pub mod store;

pub use error::StoreError;
pub use fakes::MemoryKnowledgeStore;
pub use file_store::JsonFileKnowledgeStore;
pub use schema::{
    ContentDigest, DocumentFilter, DocumentOrigin, KnowledgeDocument, KnowledgeStats, WatchedRepo,
};
pub use store::{KnowledgeStore, StoreResult, UpsertOutcome};
